use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use sha2::Sha256;

use crate::error::ConnectError;

type HmacSha256 = Hmac<Sha256>;

/// How long an issued anti-forgery state stays valid.
pub const STATE_TTL_SECS: i64 = 10 * 60;

const STATE_LEN: usize = 24;

/// Generate a fresh anti-forgery state for one authorization round trip.
pub fn generate_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LEN)
        .map(char::from)
        .collect()
}

/// HMAC signing for the client-held `oauth_state` cookie.
///
/// The state itself is never stored server-side; the signature only proves the
/// cookie was issued by this process (or one sharing `STATE_SECRET`).
pub struct StateSigner {
    hmac_key: Vec<u8>,
}

impl StateSigner {
    /// Create a signer from a base64-encoded key, or a random key when none is given.
    pub fn new(secret_b64: Option<&str>) -> Result<Self, ConnectError> {
        let hmac_key = match secret_b64 {
            Some(secret) => {
                let key = STANDARD
                    .decode(secret)
                    .map_err(|e| ConnectError::Config(format!("Invalid STATE_SECRET base64: {e}")))?;
                if key.len() < 32 {
                    return Err(ConnectError::Config(format!(
                        "STATE_SECRET must be at least 32 bytes, got {}",
                        key.len()
                    )));
                }
                key
            }
            None => {
                let mut key = vec![0u8; 32];
                rand::thread_rng().fill_bytes(&mut key);
                key
            }
        };

        Ok(Self { hmac_key })
    }

    fn mac(&self, body: &str) -> Result<HmacSha256, ConnectError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.hmac_key)
            .map_err(|e| ConnectError::Internal(format!("state MAC init failed: {e}")))?;
        mac.update(body.as_bytes());
        Ok(mac)
    }

    /// Seal a state together with its issue time, for the `oauth_state` cookie.
    ///
    /// Cookie value is `<state>.<issued_at>.<base64url(mac)>`; the MAC covers
    /// everything before the last dot.
    pub fn seal(&self, state: &str) -> Result<String, ConnectError> {
        self.seal_at(state, Utc::now().timestamp())
    }

    fn seal_at(&self, state: &str, issued_at: i64) -> Result<String, ConnectError> {
        let body = format!("{state}.{issued_at}");
        let tag = self.mac(&body)?.finalize().into_bytes();
        Ok(format!("{body}.{}", URL_SAFE_NO_PAD.encode(tag)))
    }

    /// Recover the state from a sealed cookie value, rejecting forged or expired ones.
    pub fn unseal(&self, sealed: &str) -> Result<String, ConnectError> {
        let (body, tag) = sealed.rsplit_once('.').ok_or(ConnectError::StateMismatch)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| ConnectError::StateMismatch)?;
        self.mac(body)?
            .verify_slice(&tag)
            .map_err(|_| ConnectError::StateMismatch)?;

        let (state, issued_at) = body.rsplit_once('.').ok_or(ConnectError::StateMismatch)?;
        let issued_at: i64 = issued_at.parse().map_err(|_| ConnectError::StateMismatch)?;
        if Utc::now().timestamp() - issued_at > STATE_TTL_SECS {
            return Err(ConnectError::StateMismatch);
        }

        Ok(state.to_string())
    }
}
