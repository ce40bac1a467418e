//! HTTP surface for connect-oauth.
//!
//! - /oauth/*                  — authorize redirect, callback
//! - /api/oauth/*              — code exchange, deauthorize
//! - /api/connected-accounts   — stored token records
//! - /api/customers, /api/clone, /api/transactions, /api/independent — payments
//! - /status                   — health check

pub mod routes;

use crate::SharedState;
use axum::http::{header::CONTENT_TYPE, HeaderValue, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub fn router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.base_url);

    routes::routes(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Session and state live in cookies, so cross-origin callers must be the
/// configured frontend origin and must send credentials.
fn cors_layer(base_url: &str) -> CorsLayer {
    match HeaderValue::from_str(base_url) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([CONTENT_TYPE]),
        Err(e) => {
            warn!("BASE_URL is not a valid origin ({e}); cross-origin requests disabled");
            CorsLayer::new()
        }
    }
}
