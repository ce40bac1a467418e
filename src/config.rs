use anyhow::{Context, Result};

/// Application configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // ── Server ──────────────────────────────────────────────────────────
    pub host: String,
    pub port: u16,
    /// Public origin of this deployment, without a trailing slash.
    pub base_url: String,
    /// Path the processor redirects back to after authorization.
    pub redirect_path: String,

    // ── Platform credentials ────────────────────────────────────────────
    /// Connect platform client id (`ca_...`).
    pub client_id: String,
    /// Platform secret key used for the token endpoint and API calls.
    pub secret_key: String,
    /// Second credential used for independent charges on the platform's own customers.
    pub independent_secret_key: Option<String>,
    /// `test` or `live`.
    pub environment: String,

    // ── Processor endpoints ─────────────────────────────────────────────
    pub connect_base: String,
    pub api_base: String,

    // ── State signing ───────────────────────────────────────────────────
    /// Base64 HMAC key for the `oauth_state` cookie. Random per process when unset.
    pub state_secret: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: var("PORT")
                .unwrap_or_else(|| "3000".into())
                .parse()
                .context("Invalid PORT")?,
            base_url: trim_slash(var("BASE_URL").unwrap_or_else(|| "http://localhost:3000".into())),
            redirect_path: var("REDIRECT_PATH").unwrap_or_else(|| "/oauth/callback".into()),

            client_id: var("STRIPE_CLIENT_ID")
                .context("STRIPE_CLIENT_ID is required (Connect platform client id)")?,
            secret_key: var("STRIPE_SECRET_KEY")
                .context("STRIPE_SECRET_KEY is required (platform secret key)")?,
            independent_secret_key: var("INDEPENDENT_SECRET_KEY"),
            environment: var("STRIPE_ENVIRONMENT").unwrap_or_else(|| "test".into()),

            connect_base: trim_slash(
                var("STRIPE_CONNECT_BASE").unwrap_or_else(|| "https://connect.stripe.com".into()),
            ),
            api_base: trim_slash(
                var("STRIPE_API_BASE").unwrap_or_else(|| "https://api.stripe.com".into()),
            ),

            state_secret: var("STATE_SECRET"),
        })
    }

    /// Full redirect URI registered with the processor.
    pub fn redirect_uri(&self) -> String {
        format!("{}{}", self.base_url, self.redirect_path)
    }

    pub fn is_live(&self) -> bool {
        self.environment.eq_ignore_ascii_case("live")
    }

    /// Cookies are only marked `Secure` when the public origin is HTTPS.
    pub fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn trim_slash(s: String) -> String {
    s.trim_end_matches('/').to_string()
}

#[cfg(test)]
impl Config {
    /// Fixed configuration pointing both processor bases at `base` (a mock server).
    pub(crate) fn for_tests(base: &str) -> Self {
        Config {
            host: "127.0.0.1".into(),
            port: 0,
            base_url: "https://example.com".into(),
            redirect_path: "/callback".into(),
            client_id: "ca_test".into(),
            secret_key: "sk_test_123".into(),
            independent_secret_key: None,
            environment: "test".into(),
            connect_base: base.trim_end_matches('/').to_string(),
            api_base: base.trim_end_matches('/').to_string(),
            state_secret: None,
        }
    }
}
