pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod oauth;
pub mod payments;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use error::ConnectError;

use std::sync::Arc;
use std::time::Duration;

use crypto::StateSigner;
use oauth::{CallbackHandler, StripeOAuthClient, TokenExchange};
use payments::PaymentsClient;
use store::{MemoryTokenStore, TokenStore};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state passed to all API handlers.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn TokenStore>,
    pub oauth: Arc<dyn TokenExchange>,
    pub signer: StateSigner,
    pub payments: PaymentsClient,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire the processor clients and an in-memory token store from config.
    pub fn from_config(config: Config) -> Result<Self, ConnectError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ConnectError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            store: Arc::new(MemoryTokenStore::new()),
            oauth: Arc::new(StripeOAuthClient::new(&config, http.clone())),
            signer: StateSigner::new(config.state_secret.as_deref())?,
            payments: PaymentsClient::new(&config, http),
            config,
        })
    }

    pub fn callback_handler(&self) -> CallbackHandler {
        CallbackHandler::new(self.oauth.clone(), self.store.clone())
    }
}
