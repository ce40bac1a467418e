//! Client-held session values carried in cookies.
//!
//! Two cookies are used:
//! - `connected_account_id`: the one active connected account for this client.
//! - `oauth_state`: the signed anti-forgery state for an in-flight authorization.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use cookie::{Cookie, SameSite};

use crate::crypto::STATE_TTL_SECS;
use crate::error::ConnectError;

pub const SESSION_COOKIE: &str = "connected_account_id";
pub const STATE_COOKIE: &str = "oauth_state";

/// Read a cookie value from the request headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| Cookie::split_parse(v))
        .filter_map(Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Append a `Set-Cookie` header.
pub fn set_cookie(headers: &mut HeaderMap, cookie: &Cookie<'_>) -> Result<(), ConnectError> {
    let value = HeaderValue::from_str(&cookie.to_string())
        .map_err(|e| ConnectError::Internal(format!("invalid cookie value: {e}")))?;
    headers.append(SET_COOKIE, value);
    Ok(())
}

fn build_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

fn expired_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    let mut cookie = build_cookie(name, String::new(), secure);
    cookie.set_max_age(cookie::time::Duration::ZERO);
    cookie
}

/// Cookie holding a sealed anti-forgery state.
pub fn state_cookie(sealed: String, secure: bool) -> Cookie<'static> {
    let mut cookie = build_cookie(STATE_COOKIE, sealed, secure);
    cookie.set_max_age(cookie::time::Duration::seconds(STATE_TTL_SECS));
    cookie
}

/// States are single-use; drop the cookie once a callback has been processed.
pub fn clear_state_cookie(secure: bool) -> Cookie<'static> {
    expired_cookie(STATE_COOKIE, secure)
}

/// The connected account this client is currently working with.
///
/// Handlers take it as an explicit argument; nothing looks it up ambiently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectedAccountSession {
    account_id: Option<String>,
}

impl ConnectedAccountSession {
    pub fn new(account_id: Option<String>) -> Self {
        Self { account_id }
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self::new(read_cookie(headers, SESSION_COOKIE))
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    /// Make `account_id` the active account, replacing any previous one.
    pub fn connect(&mut self, account_id: &str, secure: bool) -> Cookie<'static> {
        self.account_id = Some(account_id.to_string());
        build_cookie(SESSION_COOKIE, account_id.to_string(), secure)
    }

    pub fn clear(&mut self, secure: bool) -> Cookie<'static> {
        self.account_id = None;
        expired_cookie(SESSION_COOKIE, secure)
    }

    /// An explicitly supplied id wins; otherwise fall back to the active session.
    pub fn resolve(&self, explicit: Option<&str>) -> Option<String> {
        explicit
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or(self.account_id())
            .map(str::to_string)
    }
}

impl<S> FromRequestParts<S> for ConnectedAccountSession
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}
