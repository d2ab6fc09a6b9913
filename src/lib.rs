pub mod config;
pub mod error;
pub mod logger;
pub mod peer;
pub mod signaling;
pub mod utils;

use crate::config::AppConfig;
use crate::peer::{Negotiator, SessionRegistry};
use crate::signaling::AppState;

/// Bind the configured address and serve offers until shutdown.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let negotiator = Negotiator::from_config(&config, SessionRegistry::new())?;
    let state = AppState::new(negotiator, config.asset_dir.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", config.bind_addr, e))?;

    tracing::info!(
        stun_urls = ?config.stun_urls,
        asset_dir = %config.asset_dir.display(),
        gather_timeout_secs = config.gather_timeout_secs,
        "Starting tsfeed"
    );
    signaling::serve(listener, state).await
}
