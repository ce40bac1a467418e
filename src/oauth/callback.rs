//! Redirect-back step of the Connect OAuth flow.
//!
//! `Pending` is the duration of [`CallbackHandler::handle`]; the returned
//! [`CallbackOutcome`] is always terminal.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use super::traits::{OAuthTokenRecord, TokenExchange};
use crate::error::ConnectError;
use crate::store::TokenStore;

/// Query parameters the processor appends to the redirect URI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug)]
pub enum CallbackOutcome {
    /// The record was exchanged and persisted.
    Success(OAuthTokenRecord),
    Failed(ConnectError),
}

impl CallbackOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CallbackOutcome::Success(_))
    }
}

pub struct CallbackHandler {
    exchange: Arc<dyn TokenExchange>,
    store: Arc<dyn TokenStore>,
}

impl CallbackHandler {
    pub fn new(exchange: Arc<dyn TokenExchange>, store: Arc<dyn TokenStore>) -> Self {
        Self { exchange, store }
    }

    /// Run one callback to completion.
    ///
    /// `expected_state` is the anti-forgery token the initiating client holds.
    /// The exchange endpoint is never called unless it equals the returned state.
    pub async fn handle(&self, params: &CallbackParams, expected_state: Option<&str>) -> CallbackOutcome {
        match self.run(params, expected_state).await {
            Ok(record) => CallbackOutcome::Success(record),
            Err(e) => {
                warn!("OAuth callback failed: {e}");
                CallbackOutcome::Failed(e)
            }
        }
    }

    async fn run(
        &self,
        params: &CallbackParams,
        expected_state: Option<&str>,
    ) -> Result<OAuthTokenRecord, ConnectError> {
        if params.error.is_some() {
            let message = params
                .error_description
                .clone()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| "Authorization failed".to_string());
            return Err(ConnectError::UpstreamAuth(message));
        }

        match (expected_state, params.state.as_deref()) {
            (Some(expected), Some(returned)) if expected == returned => {}
            _ => return Err(ConnectError::StateMismatch),
        }

        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ConnectError::Validation("No authorization code received".into()))?;

        let record = self.exchange.exchange_code(code).await?;
        self.store.put(record.clone()).await?;

        info!(connected_account_id = %record.connected_account_id, "connected account authorized");
        Ok(record)
    }
}
