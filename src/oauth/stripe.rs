use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use super::traits::{Deauthorized, OAuthTokenRecord, TokenExchange};
use crate::config::Config;
use crate::error::ConnectError;

/// Connect OAuth token endpoint client.
///
/// Quirks:
/// - Both endpoints take form-encoded bodies and authenticate with the platform
///   secret as a bearer token (no client_secret field).
/// - Failures come back as `{ "error": ..., "error_description": ... }`; only the
///   description is surfaced.
pub struct StripeOAuthClient {
    client_id: String,
    secret_key: String,
    connect_base: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error_description: Option<String>,
}

impl StripeOAuthClient {
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self {
            client_id: config.client_id.clone(),
            secret_key: config.secret_key.clone(),
            connect_base: config.connect_base.clone(),
            http,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/oauth/{}", self.connect_base, path)
    }
}

/// Pull `error_description` out of a rejected response, or fall back to `fallback`.
async fn rejection_message(resp: reqwest::Response, fallback: &str) -> String {
    resp.json::<OAuthErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error_description)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

#[async_trait]
impl TokenExchange for StripeOAuthClient {
    async fn exchange_code(&self, code: &str) -> Result<OAuthTokenRecord, ConnectError> {
        let resp = self
            .http
            .post(self.endpoint("token"))
            .bearer_auth(&self.secret_key)
            .form(&[("grant_type", "authorization_code"), ("code", code)])
            .send()
            .await
            .map_err(|e| ConnectError::Transport(format!("Token exchange request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let message = rejection_message(resp, "Failed to exchange code for token").await;
            warn!(%status, "token exchange rejected: {message}");
            return Err(ConnectError::Exchange(message));
        }

        let record: OAuthTokenRecord = resp
            .json()
            .await
            .map_err(|e| ConnectError::Exchange(format!("Malformed token response: {e}")))?;

        info!(
            connected_account_id = %record.connected_account_id,
            livemode = record.live_mode,
            "authorization code exchanged"
        );
        Ok(record)
    }

    async fn deauthorize(&self, connected_account_id: &str) -> Result<Deauthorized, ConnectError> {
        let resp = self
            .http
            .post(self.endpoint("deauthorize"))
            .bearer_auth(&self.secret_key)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("stripe_user_id", connected_account_id),
            ])
            .send()
            .await
            .map_err(|e| ConnectError::Transport(format!("Deauthorize request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let message = rejection_message(resp, "Failed to deauthorize account").await;
            warn!(%status, connected_account_id, "deauthorize rejected: {message}");
            return Err(ConnectError::Exchange(message));
        }

        let revoked: Deauthorized = resp
            .json()
            .await
            .map_err(|e| ConnectError::Exchange(format!("Malformed deauthorize response: {e}")))?;

        info!(connected_account_id = %revoked.connected_account_id, "connected account deauthorized");
        Ok(revoked)
    }
}
