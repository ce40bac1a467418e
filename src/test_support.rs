//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::crypto::StateSigner;
use crate::error::ConnectError;
use crate::oauth::{Deauthorized, OAuthTokenRecord, TokenExchange};
use crate::payments::PaymentsClient;
use crate::store::MemoryTokenStore;
use crate::{AppState, Config, SharedState};

/// App state with a fake token exchange and the processor REST API at `api_base`.
pub(crate) fn test_app_state(exchange: Arc<FakeExchange>, api_base: &str) -> SharedState {
    let config = Config::for_tests(api_base);
    Arc::new(AppState {
        store: Arc::new(MemoryTokenStore::new()),
        oauth: exchange,
        signer: StateSigner::new(None).unwrap(),
        payments: PaymentsClient::new(&config, reqwest::Client::new()),
        config,
    })
}

pub(crate) fn sample_record(connected_account_id: &str) -> OAuthTokenRecord {
    OAuthTokenRecord {
        access_token: "sk_test_access".into(),
        refresh_token: "rt_test_refresh".into(),
        token_type: "bearer".into(),
        publishable_key: "pk_test_abc".into(),
        connected_account_id: connected_account_id.into(),
        live_mode: false,
        scope: "read_write".into(),
    }
}

/// Token exchange double that counts calls and returns a canned result.
pub(crate) struct FakeExchange {
    result: Result<OAuthTokenRecord, String>,
    calls: AtomicUsize,
    last_code: Mutex<Option<String>>,
    deauthorized: Mutex<Vec<String>>,
}

impl FakeExchange {
    pub(crate) fn returning(record: OAuthTokenRecord) -> Self {
        Self::with_result(Ok(record))
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self::with_result(Err(message.to_string()))
    }

    fn with_result(result: Result<OAuthTokenRecord, String>) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
            last_code: Mutex::new(None),
            deauthorized: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_code(&self) -> Option<String> {
        self.last_code.lock().unwrap().clone()
    }

    pub(crate) fn deauthorized(&self) -> Vec<String> {
        self.deauthorized.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenExchange for FakeExchange {
    async fn exchange_code(&self, code: &str) -> Result<OAuthTokenRecord, ConnectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_code.lock().unwrap() = Some(code.to_string());
        self.result.clone().map_err(ConnectError::Exchange)
    }

    async fn deauthorize(&self, connected_account_id: &str) -> Result<Deauthorized, ConnectError> {
        self.deauthorized
            .lock()
            .unwrap()
            .push(connected_account_id.to_string());
        Ok(Deauthorized {
            connected_account_id: connected_account_id.to_string(),
        })
    }
}
