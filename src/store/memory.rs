//! Process-lifetime token store. No eviction, nothing survives a restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::TokenStore;
use crate::error::ConnectError;
use crate::oauth::OAuthTokenRecord;

#[derive(Default)]
pub struct MemoryTokenStore {
    records: RwLock<HashMap<String, OAuthTokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn put(&self, record: OAuthTokenRecord) -> Result<(), ConnectError> {
        let id = record.connected_account_id.clone();
        let replaced = self.records.write().await.insert(id.clone(), record).is_some();
        debug!(connected_account_id = %id, replaced, "stored OAuth token record");
        Ok(())
    }

    async fn get(&self, connected_account_id: &str) -> Result<Option<OAuthTokenRecord>, ConnectError> {
        Ok(self.records.read().await.get(connected_account_id).cloned())
    }

    async fn list(&self) -> Result<Vec<OAuthTokenRecord>, ConnectError> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.connected_account_id.cmp(&b.connected_account_id));
        Ok(records)
    }

    async fn remove(&self, connected_account_id: &str) -> Result<bool, ConnectError> {
        Ok(self.records.write().await.remove(connected_account_id).is_some())
    }
}
