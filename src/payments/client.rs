use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use super::types::{
    Account, ApiErrorBody, ChargeRequest, ClonedPaymentMethod, Customer, PaymentIntent,
    PaymentMethod,
};
use crate::config::Config;
use crate::error::ConnectError;

/// API version pinned for every call.
pub const API_VERSION: &str = "2023-10-16";

/// Thin pass-through client for the processor's REST API.
///
/// Calls acting on a connected account carry a `Stripe-Account` header and are
/// authenticated with the platform secret. Independent charges use the second
/// credential and act on the platform's own customers.
pub struct PaymentsClient {
    secret_key: String,
    independent_secret_key: Option<String>,
    api_base: String,
    http: reqwest::Client,
}

impl PaymentsClient {
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self {
            secret_key: config.secret_key.clone(),
            independent_secret_key: config.independent_secret_key.clone(),
            api_base: config.api_base.clone(),
            http,
        }
    }

    fn request(&self, method: Method, path: &str, secret: &str, account: Option<&str>) -> RequestBuilder {
        let req = self
            .http
            .request(method, format!("{}/v1/{}", self.api_base, path))
            .bearer_auth(secret)
            .header("Stripe-Version", API_VERSION);

        match account {
            Some(account) => req.header("Stripe-Account", account),
            None => req,
        }
    }

    /// Send a request and decode the object, mapping processor rejections to `Api`.
    async fn send<T: DeserializeOwned>(req: RequestBuilder, what: &str) -> Result<T, ConnectError> {
        let resp = req
            .send()
            .await
            .map_err(|e| ConnectError::Transport(format!("{what} request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let message = match resp.json::<ApiErrorBody>().await {
                Ok(body) => {
                    if let Some(code) = body.error.code.as_deref() {
                        warn!(%status, code, "{what} rejected");
                    }
                    body.error.message.unwrap_or_else(|| format!("Failed to {what}"))
                }
                Err(_) => format!("Failed to {what}"),
            };
            return Err(ConnectError::Api(message));
        }

        resp.json()
            .await
            .map_err(|e| ConnectError::Api(format!("Malformed {what} response: {e}")))
    }

    /// Duplicate a platform payment method onto a connected account.
    pub async fn clone_payment_method(
        &self,
        connected_account_id: &str,
        platform_customer_id: &str,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, ConnectError> {
        let req = self
            .request(Method::POST, "payment_methods", &self.secret_key, Some(connected_account_id))
            .form(&[
                ("customer", platform_customer_id),
                ("payment_method", payment_method_id),
            ]);
        Self::send(req, "clone payment method").await
    }

    pub async fn create_customer(
        &self,
        connected_account_id: &str,
        email: &str,
        name: &str,
        payment_method_id: Option<&str>,
    ) -> Result<Customer, ConnectError> {
        let mut form = vec![("email", email), ("name", name)];
        if let Some(pm) = payment_method_id {
            form.push(("payment_method", pm));
        }

        let req = self
            .request(Method::POST, "customers", &self.secret_key, Some(connected_account_id))
            .form(&form);
        Self::send(req, "create customer").await
    }

    pub async fn attach_payment_method(
        &self,
        connected_account_id: &str,
        payment_method_id: &str,
        customer_id: &str,
    ) -> Result<PaymentMethod, ConnectError> {
        let req = self
            .request(
                Method::POST,
                &format!("payment_methods/{payment_method_id}/attach"),
                &self.secret_key,
                Some(connected_account_id),
            )
            .form(&[("customer", customer_id)]);
        Self::send(req, "attach payment method").await
    }

    pub async fn set_default_payment_method(
        &self,
        connected_account_id: &str,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<Customer, ConnectError> {
        let req = self
            .request(
                Method::POST,
                &format!("customers/{customer_id}"),
                &self.secret_key,
                Some(connected_account_id),
            )
            .form(&[("invoice_settings[default_payment_method]", payment_method_id)]);
        Self::send(req, "update customer").await
    }

    /// Clone a platform payment method, create a customer on the connected account,
    /// attach the clone to it and make it the default.
    pub async fn clone_and_attach(
        &self,
        connected_account_id: &str,
        platform_customer_id: &str,
        payment_method_id: &str,
    ) -> Result<ClonedPaymentMethod, ConnectError> {
        let payment_method = self
            .clone_payment_method(connected_account_id, platform_customer_id, payment_method_id)
            .await?;

        let customer = self
            .create_customer(
                connected_account_id,
                &format!("{platform_customer_id}@example.com"),
                &format!("Platform customer for {platform_customer_id}"),
                None,
            )
            .await?;

        self.attach_payment_method(connected_account_id, &payment_method.id, &customer.id)
            .await?;
        self.set_default_payment_method(connected_account_id, &customer.id, &payment_method.id)
            .await?;

        info!(
            connected_account_id,
            customer_id = %customer.id,
            payment_method_id = %payment_method.id,
            "payment method cloned"
        );

        Ok(ClonedPaymentMethod {
            payment_method_id: payment_method.id.clone(),
            customer_id: customer.id.clone(),
            customer,
            payment_method,
        })
    }

    /// Off-session, immediately confirmed charge on the connected account.
    pub async fn create_direct_charge(
        &self,
        connected_account_id: &str,
        charge: &ChargeRequest,
    ) -> Result<PaymentIntent, ConnectError> {
        let req = self
            .request(Method::POST, "payment_intents", &self.secret_key, Some(connected_account_id))
            .form(&charge_form(charge));
        let intent: PaymentIntent = Self::send(req, "create payment intent").await?;

        info!(connected_account_id, payment_intent = %intent.id, status = %intent.status, "direct charge created");
        Ok(intent)
    }

    /// Charge against the platform's own customer using the independent credential.
    pub async fn create_independent_charge(&self, charge: &ChargeRequest) -> Result<PaymentIntent, ConnectError> {
        let secret = self
            .independent_secret_key
            .as_deref()
            .ok_or_else(|| ConnectError::Config("INDEPENDENT_SECRET_KEY not configured".into()))?;

        let req = self
            .request(Method::POST, "payment_intents", secret, None)
            .form(&charge_form(charge));
        let intent: PaymentIntent = Self::send(req, "create payment intent").await?;

        info!(payment_intent = %intent.id, status = %intent.status, "independent charge created");
        Ok(intent)
    }

    pub async fn retrieve_account(&self, connected_account_id: &str) -> Result<Account, ConnectError> {
        let req = self.request(
            Method::GET,
            &format!("accounts/{connected_account_id}"),
            &self.secret_key,
            None,
        );
        Self::send(req, "retrieve account").await
    }
}

fn charge_form(charge: &ChargeRequest) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("payment_method", charge.payment_method_id.clone()),
        ("amount", charge.amount.to_string()),
        ("currency", charge.currency.to_lowercase()),
        ("confirm", "true".to_string()),
        ("off_session", "true".to_string()),
    ];
    if let Some(description) = &charge.description {
        form.push(("description", description.clone()));
    }
    if let Some(customer) = &charge.customer_id {
        form.push(("customer", customer.clone()));
    }
    form
}
