use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Unified error type for the connect-oauth service.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    // ── Setup ───────────────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Config(String),

    // ── Request Errors ──────────────────────────────────────────────────
    #[error("{0}")]
    Validation(String),

    /// The request body could not be read as the expected JSON shape.
    #[error("{message}")]
    MalformedBody { status: StatusCode, message: String },

    #[error("Invalid state parameter")]
    StateMismatch,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    // ── Processor Errors ────────────────────────────────────────────────
    /// The processor redirected back with `error` / `error_description`.
    #[error("{0}")]
    UpstreamAuth(String),

    /// The OAuth token or deauthorize endpoint rejected the request.
    #[error("{0}")]
    Exchange(String),

    /// A REST API call (customers, payment methods, charges) was rejected.
    #[error("{0}")]
    Api(String),

    #[error("Transport error: {0}")]
    Transport(String),

    // ── Internal ────────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConnectError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ConnectError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            ConnectError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ConnectError::MalformedBody { status, .. } => (*status, "malformed_body"),
            ConnectError::StateMismatch => (StatusCode::BAD_REQUEST, "state_mismatch"),
            ConnectError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ConnectError::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed"),
            ConnectError::UpstreamAuth(_) => (StatusCode::BAD_REQUEST, "upstream_auth_error"),
            ConnectError::Exchange(_) => (StatusCode::BAD_GATEWAY, "exchange_error"),
            ConnectError::Api(_) => (StatusCode::BAD_GATEWAY, "api_error"),
            ConnectError::Transport(_) => (StatusCode::BAD_GATEWAY, "transport_error"),
            ConnectError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl From<anyhow::Error> for ConnectError {
    fn from(e: anyhow::Error) -> Self {
        ConnectError::Internal(e.to_string())
    }
}

impl From<JsonRejection> for ConnectError {
    fn from(rejection: JsonRejection) -> Self {
        ConnectError::MalformedBody {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ConnectError {
    fn from(rejection: QueryRejection) -> Self {
        ConnectError::Validation(rejection.body_text())
    }
}

impl From<reqwest::Error> for ConnectError {
    fn from(e: reqwest::Error) -> Self {
        ConnectError::Transport(e.to_string())
    }
}

impl IntoResponse for ConnectError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let body = json!({
            "error": self.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
