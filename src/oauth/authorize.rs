use url::Url;

use crate::config::Config;
use crate::error::ConnectError;

/// Scope requested for every connected account.
pub const SCOPE: &str = "read_write";

/// Build the authorize URL the user is sent to.
///
/// Query order is fixed: `response_type`, `client_id`, `scope`, `redirect_uri`,
/// then `state` when one is supplied. No network call is made.
pub fn build_authorization_url(config: &Config, state: Option<&str>) -> Result<Url, ConnectError> {
    let mut url = Url::parse(&format!("{}/oauth/authorize", config.connect_base))
        .map_err(|e| ConnectError::Config(format!("Invalid STRIPE_CONNECT_BASE: {e}")))?;

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", &config.client_id)
            .append_pair("scope", SCOPE)
            .append_pair("redirect_uri", &config.redirect_uri());
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }

    Ok(url)
}
