use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ConnectError;

/// Token record returned by the processor after a successful code exchange.
///
/// Field names on the wire follow the processor (`stripe_user_id`, `livemode`, ...),
/// and the record is serialized back out the same way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokenRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    #[serde(rename = "stripe_publishable_key")]
    pub publishable_key: String,
    #[serde(rename = "stripe_user_id")]
    pub connected_account_id: String,
    #[serde(rename = "livemode")]
    pub live_mode: bool,
    pub scope: String,
}

/// Response of a successful deauthorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deauthorized {
    #[serde(rename = "stripe_user_id")]
    pub connected_account_id: String,
}

/// Server-to-server half of the Connect OAuth flow.
///
/// Both calls are single requests. Authorization codes are one-time-use, so a
/// failure is returned to the caller rather than retried.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchange an authorization code for the connected account's token record.
    async fn exchange_code(&self, code: &str) -> Result<OAuthTokenRecord, ConnectError>;

    /// Revoke the platform's access to a connected account.
    async fn deauthorize(&self, connected_account_id: &str) -> Result<Deauthorized, ConnectError>;
}
