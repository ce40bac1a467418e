use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use connect_oauth::{api, AppState, Config, SharedState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "connect_oauth=info,tower_http=info".into()),
        )
        .init();

    // Load config
    let config = Config::from_env()?;
    info!("connect-oauth v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Connect client {} ({} mode), redirect URI {}",
        config.client_id,
        if config.is_live() { "live" } else { "test" },
        config.redirect_uri()
    );
    if config.state_secret.is_none() {
        warn!("STATE_SECRET not set; in-flight authorizations will not survive a restart");
    }
    if config.independent_secret_key.is_none() {
        warn!("INDEPENDENT_SECRET_KEY not set; independent charges are disabled");
    }

    // Build shared state
    let state: SharedState = Arc::new(AppState::from_config(config.clone())?);
    info!("Token store: in-memory (not persisted across restarts)");

    // Build router
    let app = api::router(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
