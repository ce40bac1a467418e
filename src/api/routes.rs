//! API route handlers for the connect-oauth service.
//!
//! All handlers receive `SharedState` via Axum state extraction. Handlers that act
//! on a connected account take a [`ConnectedAccountSession`] and let an explicit
//! `connectedAccountId` in the body win over it.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Deserializer};
use serde_json::json;
use tracing::{error, info, warn};

use crate::crypto::generate_state;
use crate::error::ConnectError;
use crate::oauth::{build_authorization_url, CallbackOutcome, CallbackParams, OAuthTokenRecord};
use crate::payments::{Account, ChargeRequest, ClonedPaymentMethod, Customer, PaymentIntent};
use crate::session::{
    clear_state_cookie, read_cookie, set_cookie, state_cookie, ConnectedAccountSession, STATE_COOKIE,
};
use crate::SharedState;

// =============================================================================
// Router
// =============================================================================

pub fn routes(state: SharedState) -> Router {
    Router::new()
        // ── Health ───────────────────────────────────────────────────────
        .route("/status", get(status))
        // ── OAuth redirect flow ──────────────────────────────────────────
        .route("/oauth/authorize", get(oauth_authorize))
        .route("/oauth/url", get(oauth_url))
        .route("/oauth/callback", get(oauth_callback))
        // ── OAuth API ────────────────────────────────────────────────────
        .route("/api/oauth/token", post(oauth_token).fallback(method_not_allowed))
        .route(
            "/api/oauth/deauthorize",
            post(oauth_deauthorize).fallback(method_not_allowed),
        )
        .route("/api/session", get(session_get))
        // ── Connected accounts ───────────────────────────────────────────
        .route("/api/connected-accounts", get(connected_accounts))
        .route("/api/connected-accounts/{id}", get(connected_account_get))
        .route("/api/connected-accounts/{id}/details", get(connected_account_details))
        // ── Payments ─────────────────────────────────────────────────────
        .route("/api/customers", post(customer_create).fallback(method_not_allowed))
        .route(
            "/api/clone/payment-method",
            post(payment_method_clone).fallback(method_not_allowed),
        )
        .route("/api/transactions", post(direct_charge).fallback(method_not_allowed))
        .route(
            "/api/independent/charge",
            post(independent_charge).fallback(method_not_allowed),
        )
        .with_state(state)
}

async fn method_not_allowed() -> ConnectError {
    ConnectError::MethodNotAllowed
}

/// Trimmed, non-empty value of an optional body field.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

// =============================================================================
// Health
// =============================================================================

async fn status(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "connect-oauth",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
    }))
}

// =============================================================================
// OAuth Redirect Flow
// =============================================================================

/// GET /oauth/authorize — Start an authorization round trip.
///
/// The anti-forgery state goes out twice: in the authorize URL and, signed, in
/// the `oauth_state` cookie the browser brings back to the callback.
async fn oauth_authorize(State(state): State<SharedState>) -> Result<Response, ConnectError> {
    let anti_forgery = generate_state();
    let url = build_authorization_url(&state.config, Some(&anti_forgery))?;

    let mut headers = HeaderMap::new();
    let sealed = state.signer.seal(&anti_forgery)?;
    set_cookie(&mut headers, &state_cookie(sealed, state.config.secure_cookies()))?;

    Ok((headers, Redirect::temporary(url.as_str())).into_response())
}

#[derive(Deserialize)]
struct AuthorizeUrlQuery {
    state: Option<String>,
}

/// GET /oauth/url — Authorize URL for callers that hold their own state.
async fn oauth_url(
    State(state): State<SharedState>,
    Query(q): Query<AuthorizeUrlQuery>,
) -> Result<Json<serde_json::Value>, ConnectError> {
    let url = build_authorization_url(&state.config, present(&q.state))?;
    Ok(Json(json!({ "url": url.as_str() })))
}

/// GET /oauth/callback — Handle the processor's redirect back.
async fn oauth_callback(
    State(state): State<SharedState>,
    headers: HeaderMap,
    mut session: ConnectedAccountSession,
    query: Result<Query<CallbackParams>, QueryRejection>,
) -> Result<Response, ConnectError> {
    let secure = state.config.secure_cookies();

    let expected = read_cookie(&headers, STATE_COOKIE).and_then(|sealed| {
        state
            .signer
            .unseal(&sealed)
            .map_err(|e| warn!("Discarding oauth_state cookie: {e}"))
            .ok()
    });

    let mut out = HeaderMap::new();
    set_cookie(&mut out, &clear_state_cookie(secure))?;

    let outcome = match query {
        Ok(Query(params)) => state.callback_handler().handle(&params, expected.as_deref()).await,
        Err(rejection) => {
            warn!("Unreadable callback query: {}", rejection.body_text());
            CallbackOutcome::Failed(rejection.into())
        }
    };

    match outcome {
        CallbackOutcome::Success(record) => {
            set_cookie(&mut out, &session.connect(&record.connected_account_id, secure))?;
            let body = json!({
                "status": "success",
                "data": record,
                "redirectTo": format!("{}/", state.config.base_url),
            });
            Ok((out, Json(body)).into_response())
        }
        CallbackOutcome::Failed(e) => Ok((out, e).into_response()),
    }
}

// =============================================================================
// OAuth API
// =============================================================================

#[derive(Deserialize)]
struct TokenBody {
    code: Option<String>,
}

/// POST /api/oauth/token — Exchange an authorization code and store the record.
async fn oauth_token(
    State(state): State<SharedState>,
    mut session: ConnectedAccountSession,
    payload: Result<Json<TokenBody>, JsonRejection>,
) -> Result<Response, ConnectError> {
    let Json(body) = payload?;
    let code = present(&body.code)
        .ok_or_else(|| ConnectError::Validation("Authorization code is required".into()))?;

    let record: OAuthTokenRecord = state
        .oauth
        .exchange_code(code)
        .await
        .inspect_err(|e| error!("OAuth token exchange error: {e}"))?;
    state.store.put(record.clone()).await?;

    let mut headers = HeaderMap::new();
    let cookie = session.connect(&record.connected_account_id, state.config.secure_cookies());
    set_cookie(&mut headers, &cookie)?;

    Ok((headers, Json(record)).into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeauthorizeBody {
    connected_account_id: Option<String>,
}

/// POST /api/oauth/deauthorize — Revoke access and forget the account.
async fn oauth_deauthorize(
    State(state): State<SharedState>,
    mut session: ConnectedAccountSession,
    payload: Result<Json<DeauthorizeBody>, JsonRejection>,
) -> Result<Response, ConnectError> {
    let Json(body) = payload?;
    let account = session
        .resolve(body.connected_account_id.as_deref())
        .ok_or_else(|| ConnectError::Validation("connectedAccountId is required".into()))?;

    let revoked = state
        .oauth
        .deauthorize(&account)
        .await
        .inspect_err(|e| error!("Deauthorize error: {e}"))?;
    let removed = state.store.remove(&revoked.connected_account_id).await?;

    let mut headers = HeaderMap::new();
    if session.account_id() == Some(account.as_str()) {
        set_cookie(&mut headers, &session.clear(state.config.secure_cookies()))?;
    }

    info!(connected_account_id = %revoked.connected_account_id, removed, "account disconnected");

    Ok((
        headers,
        Json(json!({
            "connectedAccountId": revoked.connected_account_id,
            "removed": removed,
        })),
    )
        .into_response())
}

/// GET /api/session — The active connected account for this client, if any.
async fn session_get(session: ConnectedAccountSession) -> impl IntoResponse {
    Json(json!({ "connectedAccountId": session.account_id() }))
}

// =============================================================================
// Connected Accounts
// =============================================================================

async fn connected_accounts(
    State(state): State<SharedState>,
) -> Result<Json<Vec<OAuthTokenRecord>>, ConnectError> {
    Ok(Json(state.store.list().await?))
}

async fn connected_account_get(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<OAuthTokenRecord>, ConnectError> {
    state
        .store
        .get(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ConnectError::NotFound("Connected account".into()))
}

/// GET /api/connected-accounts/:id/details — Account object from the processor.
async fn connected_account_details(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Account>, ConnectError> {
    let account = state
        .payments
        .retrieve_account(&id)
        .await
        .inspect_err(|e| error!("Account retrieval error: {e}"))?;
    Ok(Json(account))
}

// =============================================================================
// Payments
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCustomerBody {
    connected_account_id: Option<String>,
    email: Option<String>,
    name: Option<String>,
    payment_method_id: Option<String>,
}

/// POST /api/customers — Create a customer on the connected account.
async fn customer_create(
    State(state): State<SharedState>,
    session: ConnectedAccountSession,
    payload: Result<Json<CreateCustomerBody>, JsonRejection>,
) -> Result<Json<Customer>, ConnectError> {
    let Json(body) = payload?;
    let account = session.resolve(body.connected_account_id.as_deref());
    let (Some(account), Some(email), Some(name)) = (account, present(&body.email), present(&body.name))
    else {
        return Err(ConnectError::Validation(
            "connectedAccountId, email, and name are required".into(),
        ));
    };

    let customer = state
        .payments
        .create_customer(&account, email, name, present(&body.payment_method_id))
        .await
        .inspect_err(|e| error!("Customer creation error: {e}"))?;
    Ok(Json(customer))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClonePaymentMethodBody {
    connected_account_id: Option<String>,
    customer_id: Option<String>,
    payment_method_id: Option<String>,
}

/// POST /api/clone/payment-method — Clone a platform payment method onto the
/// connected account and attach it to a new customer there.
async fn payment_method_clone(
    State(state): State<SharedState>,
    session: ConnectedAccountSession,
    payload: Result<Json<ClonePaymentMethodBody>, JsonRejection>,
) -> Result<Json<ClonedPaymentMethod>, ConnectError> {
    let Json(body) = payload?;
    let account = session.resolve(body.connected_account_id.as_deref());
    let (Some(account), Some(customer_id), Some(payment_method_id)) =
        (account, present(&body.customer_id), present(&body.payment_method_id))
    else {
        return Err(ConnectError::Validation(
            "connectedAccountId, customerId, and paymentMethodId are required".into(),
        ));
    };

    let cloned = state
        .payments
        .clone_and_attach(&account, customer_id, payment_method_id)
        .await
        .inspect_err(|e| error!("Payment method cloning error: {e}"))?;
    Ok(Json(cloned))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChargeBody {
    connected_account_id: Option<String>,
    customer_id: Option<String>,
    payment_method_id: Option<String>,
    #[serde(default, deserialize_with = "amount_from_number_or_string")]
    amount: Option<i64>,
    currency: Option<String>,
    description: Option<String>,
}

/// Amounts arrive either as JSON integers or as numeric strings from form-backed clients.
fn amount_from_number_or_string<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Number(i64),
        Text(String),
    }

    match Option::<Amount>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Amount::Number(n)) => Ok(Some(n)),
        Some(Amount::Text(text)) => text
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("amount: expected an integer, got {text:?}"))),
    }
}

impl ChargeBody {
    /// Amounts are integers in the currency's minor unit and must be positive.
    fn charge(&self) -> Option<ChargeRequest> {
        Some(ChargeRequest {
            payment_method_id: present(&self.payment_method_id)?.to_string(),
            amount: self.amount.filter(|a| *a > 0)?,
            currency: present(&self.currency)?.to_string(),
            description: present(&self.description).map(str::to_string),
            customer_id: present(&self.customer_id).map(str::to_string),
        })
    }
}

/// POST /api/transactions — Direct charge on the connected account.
async fn direct_charge(
    State(state): State<SharedState>,
    session: ConnectedAccountSession,
    payload: Result<Json<ChargeBody>, JsonRejection>,
) -> Result<Json<PaymentIntent>, ConnectError> {
    let Json(body) = payload?;
    let account = session.resolve(body.connected_account_id.as_deref());
    let (Some(account), Some(charge)) = (account, body.charge()) else {
        return Err(ConnectError::Validation(
            "connectedAccountId, paymentMethodId, amount, and currency are required".into(),
        ));
    };

    let intent = state
        .payments
        .create_direct_charge(&account, &charge)
        .await
        .inspect_err(|e| error!("Transaction error: {e}"))?;
    Ok(Json(intent))
}

/// POST /api/independent/charge — Charge the platform's own customer with the
/// independent credential. No connected account is involved.
async fn independent_charge(
    State(state): State<SharedState>,
    payload: Result<Json<ChargeBody>, JsonRejection>,
) -> Result<Json<PaymentIntent>, ConnectError> {
    let Json(body) = payload?;
    let charge = body
        .charge()
        .filter(|c| c.customer_id.is_some())
        .ok_or_else(|| {
            ConnectError::Validation(
                "customerId, paymentMethodId, amount, and currency are required".into(),
            )
        })?;

    let intent = state
        .payments
        .create_independent_charge(&charge)
        .await
        .inspect_err(|e| error!("Independent charge error: {e}"))?;
    Ok(Json(intent))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
    use axum::http::{Method, Request, StatusCode};
    use cookie::Cookie;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::store::TokenStore;
    use crate::test_support::{sample_record, test_app_state, FakeExchange};

    fn test_state(exchange: Arc<FakeExchange>) -> SharedState {
        // Nothing listens there; only tests that mock the processor reach the network.
        test_app_state(exchange, "http://127.0.0.1:1")
    }

    fn json_request(method: Method, uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn set_cookies(response: &Response) -> Vec<Cookie<'static>> {
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| Cookie::parse(v.to_str().unwrap().to_string()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_token_endpoint_rejects_get_with_405() {
        let state = test_state(Arc::new(FakeExchange::returning(sample_record("acct_1"))));
        let response = routes(state).oneshot(get("/api/oauth/token", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body_json(response).await["error"], "Method not allowed");
    }

    #[tokio::test]
    async fn test_token_endpoint_requires_code() {
        let exchange = Arc::new(FakeExchange::returning(sample_record("acct_1")));
        let state = test_state(exchange.clone());

        let response = routes(state)
            .oneshot(json_request(Method::POST, "/api/oauth/token", json!({}), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Authorization code is required");
        assert_eq!(exchange.calls(), 0);
    }

    #[tokio::test]
    async fn test_token_endpoint_stores_record_and_binds_session() {
        let exchange = Arc::new(FakeExchange::returning(sample_record("acct_1")));
        let state = test_state(exchange.clone());

        let response = routes(state.clone())
            .oneshot(json_request(Method::POST, "/api/oauth/token", json!({ "code": "ac_123" }), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        assert!(cookies
            .iter()
            .any(|c| c.name() == "connected_account_id" && c.value() == "acct_1"));

        let body = body_json(response).await;
        assert_eq!(body["stripe_user_id"], "acct_1");
        assert_eq!(body["stripe_publishable_key"], "pk_test_abc");
        assert_eq!(exchange.last_code().as_deref(), Some("ac_123"));
        assert!(state.store.get("acct_1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_token_endpoint_exchange_failure() {
        let state = test_state(Arc::new(FakeExchange::failing("invalid_grant")));

        let response = routes(state.clone())
            .oneshot(json_request(Method::POST, "/api/oauth/token", json!({ "code": "ac_123" }), None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(response).await["error"], "invalid_grant");
        assert!(state.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_authorize_then_callback_round_trip() {
        let exchange = Arc::new(FakeExchange::returning(sample_record("acct_1")));
        let state = test_state(exchange.clone());
        let app = routes(state.clone());

        let response = app.clone().oneshot(get("/oauth/authorize", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

        let location = response.headers().get(LOCATION).unwrap().to_str().unwrap();
        let location = url::Url::parse(location).unwrap();
        assert_eq!(location.path(), "/oauth/authorize");
        let anti_forgery = location
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        let state_cookie = set_cookies(&response)
            .into_iter()
            .find(|c| c.name() == STATE_COOKIE)
            .unwrap();
        let cookie_header = format!("{}={}", state_cookie.name(), state_cookie.value());

        let response = app
            .oneshot(get(
                &format!("/oauth/callback?code=ac_123&state={anti_forgery}"),
                Some(&cookie_header),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookies = set_cookies(&response);
        assert!(cookies
            .iter()
            .any(|c| c.name() == "connected_account_id" && c.value() == "acct_1"));
        assert!(cookies.iter().any(|c| c.name() == STATE_COOKIE && c.value().is_empty()));

        let body = body_json(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["redirectTo"], "https://example.com/");
        assert_eq!(exchange.calls(), 1);
        assert_eq!(state.store.get("acct_1").await.unwrap(), Some(sample_record("acct_1")));
    }

    #[tokio::test]
    async fn test_callback_with_forged_state_never_exchanges() {
        let exchange = Arc::new(FakeExchange::returning(sample_record("acct_1")));
        let state = test_state(exchange.clone());
        let sealed = state.signer.seal("S1").unwrap();

        let response = routes(state.clone())
            .oneshot(get(
                "/oauth/callback?code=ac_123&state=S2",
                Some(&format!("oauth_state={sealed}")),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "state_mismatch");
        assert_eq!(exchange.calls(), 0);
    }

    #[tokio::test]
    async fn test_callback_without_state_cookie_is_rejected() {
        let exchange = Arc::new(FakeExchange::returning(sample_record("acct_1")));
        let state = test_state(exchange.clone());

        let response = routes(state)
            .oneshot(get("/oauth/callback?code=ac_123&state=S1", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(exchange.calls(), 0);
    }

    #[tokio::test]
    async fn test_callback_upstream_error() {
        let state = test_state(Arc::new(FakeExchange::returning(sample_record("acct_1"))));

        let response = routes(state)
            .oneshot(get(
                "/oauth/callback?error=access_denied&error_description=User+denied",
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "User denied");
    }

    #[tokio::test]
    async fn test_oauth_url_endpoint() {
        let state = test_state(Arc::new(FakeExchange::returning(sample_record("acct_1"))));

        let response = routes(state).oneshot(get("/oauth/url?state=abc123", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let url = body_json(response).await["url"].as_str().unwrap().to_string();
        assert!(url.ends_with("&state=abc123"));
        assert!(url.contains("client_id=ca_test"));
    }

    #[tokio::test]
    async fn test_connected_accounts_listing_and_lookup() {
        let state = test_state(Arc::new(FakeExchange::returning(sample_record("acct_1"))));
        state.store.put(sample_record("acct_1")).await.unwrap();
        let app = routes(state);

        let response = app.clone().oneshot(get("/api/connected-accounts", None)).await.unwrap();
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);

        let response = app
            .clone()
            .oneshot(get("/api/connected-accounts/acct_1", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get("/api/connected-accounts/acct_x", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_deauthorize_uses_session_and_clears_it() {
        let exchange = Arc::new(FakeExchange::returning(sample_record("acct_1")));
        let state = test_state(exchange.clone());
        state.store.put(sample_record("acct_1")).await.unwrap();

        let response = routes(state.clone())
            .oneshot(json_request(
                Method::POST,
                "/api/oauth/deauthorize",
                json!({}),
                Some("connected_account_id=acct_1"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(set_cookies(&response)
            .iter()
            .any(|c| c.name() == "connected_account_id" && c.value().is_empty()));
        assert_eq!(body_json(response).await["removed"], true);
        assert_eq!(exchange.deauthorized(), vec!["acct_1".to_string()]);
        assert!(state.store.get("acct_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_endpoint() {
        let state = test_state(Arc::new(FakeExchange::returning(sample_record("acct_1"))));
        let app = routes(state);

        let response = app
            .clone()
            .oneshot(get("/api/session", Some("connected_account_id=acct_9")))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["connectedAccountId"], "acct_9");

        let response = app.oneshot(get("/api/session", None)).await.unwrap();
        assert_eq!(body_json(response).await["connectedAccountId"], Value::Null);
    }

    #[tokio::test]
    async fn test_charge_validation() {
        let state = test_state(Arc::new(FakeExchange::returning(sample_record("acct_1"))));
        let app = routes(state);

        // No connected account in body or session.
        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/transactions",
                json!({ "paymentMethodId": "pm_1", "amount": 100, "currency": "usd" }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"],
            "connectedAccountId, paymentMethodId, amount, and currency are required"
        );

        // Zero amount.
        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/transactions",
                json!({ "paymentMethodId": "pm_1", "amount": 0, "currency": "usd" }),
                Some("connected_account_id=acct_1"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/independent/charge",
                json!({ "paymentMethodId": "pm_1", "amount": 100, "currency": "usd" }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.oneshot(get("/api/customers", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_independent_charge_without_credential_is_config_error() {
        let state = test_state(Arc::new(FakeExchange::returning(sample_record("acct_1"))));

        let response = routes(state)
            .oneshot(json_request(
                Method::POST,
                "/api/independent/charge",
                json!({ "customerId": "cus_1", "paymentMethodId": "pm_1", "amount": 100, "currency": "usd" }),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["code"], "config_error");
    }

    #[tokio::test]
    async fn test_unreadable_bodies_get_json_errors() {
        let exchange = Arc::new(FakeExchange::returning(sample_record("acct_1")));
        let app = routes(test_state(exchange.clone()));

        let no_content_type = Request::builder()
            .method(Method::POST)
            .uri("/api/oauth/token")
            .body(Body::from(r#"{"code":"ac_1"}"#))
            .unwrap();
        let wrong_type = json_request(Method::POST, "/api/oauth/token", json!({ "code": 123 }), None);
        let empty = Request::builder()
            .method(Method::POST)
            .uri("/api/oauth/token")
            .header("content-type", "application/json")
            .body(Body::empty())
            .unwrap();

        for (request, status) in [
            (no_content_type, StatusCode::UNSUPPORTED_MEDIA_TYPE),
            (wrong_type, StatusCode::UNPROCESSABLE_ENTITY),
            (empty, StatusCode::BAD_REQUEST),
        ] {
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), status);
            let body = body_json(response).await;
            assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
            assert_eq!(body["code"], "malformed_body");
        }
        assert_eq!(exchange.calls(), 0);
    }

    #[tokio::test]
    async fn test_callback_with_unreadable_query_fails_and_clears_state() {
        let exchange = Arc::new(FakeExchange::returning(sample_record("acct_1")));
        let state = test_state(exchange.clone());
        let sealed = state.signer.seal("S1").unwrap();

        let response = routes(state.clone())
            .oneshot(get(
                "/oauth/callback?code=ac_1&state=S1&state=S1",
                Some(&format!("oauth_state={sealed}")),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let cleared = set_cookies(&response)
            .into_iter()
            .find(|c| c.name() == STATE_COOKIE)
            .unwrap();
        assert_eq!(cleared.max_age(), Some(cookie::time::Duration::ZERO));
        assert_eq!(body_json(response).await["code"], "validation_error");
        assert_eq!(exchange.calls(), 0);
        assert!(state.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_direct_charge_uses_session_account() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/payment_intents")
            .match_header("stripe-account", "acct_session")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("payment_method".into(), "pm_1".into()),
                mockito::Matcher::UrlEncoded("amount".into(), "2500".into()),
                mockito::Matcher::UrlEncoded("currency".into(), "usd".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({ "id": "pi_1", "amount": 2500, "currency": "usd", "status": "succeeded" })
                    .to_string(),
            )
            .create_async()
            .await;
        let exchange = Arc::new(FakeExchange::returning(sample_record("acct_1")));
        let state = test_app_state(exchange, &server.url());

        let response = routes(state)
            .oneshot(json_request(
                Method::POST,
                "/api/transactions",
                json!({ "paymentMethodId": "pm_1", "amount": "2500", "currency": "USD" }),
                Some("connected_account_id=acct_session"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["id"], "pi_1");
        assert_eq!(body["status"], "succeeded");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_customer_uses_session_account() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/customers")
            .match_header("stripe-account", "acct_session")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("email".into(), "jo@example.com".into()),
                mockito::Matcher::UrlEncoded("name".into(), "Jo".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "id": "cus_9", "email": "jo@example.com" }).to_string())
            .create_async()
            .await;
        let exchange = Arc::new(FakeExchange::returning(sample_record("acct_1")));
        let state = test_app_state(exchange, &server.url());

        let response = routes(state)
            .oneshot(json_request(
                Method::POST,
                "/api/customers",
                json!({ "email": "jo@example.com", "name": "Jo" }),
                Some("connected_account_id=acct_session"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["id"], "cus_9");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_numeric_amount_is_rejected_before_processor() {
        let state = test_state(Arc::new(FakeExchange::returning(sample_record("acct_1"))));

        let response = routes(state)
            .oneshot(json_request(
                Method::POST,
                "/api/transactions",
                json!({ "connectedAccountId": "acct_1", "paymentMethodId": "pm_1", "amount": "lots", "currency": "usd" }),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["code"], "malformed_body");
    }
}
