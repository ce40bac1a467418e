//! Token store — keyed association from connected-account id to its OAuth token record.
//!
//! Only an in-memory backend ships here. Anything durable plugs in behind
//! [`TokenStore`] without touching the callback handler or the API routes.

pub mod memory;

use async_trait::async_trait;

use crate::error::ConnectError;
use crate::oauth::OAuthTokenRecord;

pub use memory::MemoryTokenStore;

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert or replace the record for `record.connected_account_id`.
    async fn put(&self, record: OAuthTokenRecord) -> Result<(), ConnectError>;

    async fn get(&self, connected_account_id: &str) -> Result<Option<OAuthTokenRecord>, ConnectError>;

    /// All stored records, ordered by connected-account id.
    async fn list(&self) -> Result<Vec<OAuthTokenRecord>, ConnectError>;

    /// Returns whether a record existed.
    async fn remove(&self, connected_account_id: &str) -> Result<bool, ConnectError>;
}
