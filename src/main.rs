//! Main entry point for the Anix API server

use anix_api::{init_logger_with_level, log_info, ApiServer, AppConfig, AppState};
use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;

    init_logger_with_level(&config.log_level);

    log_info!("Starting anix API server");
    if config.redis.connection_url().is_some() {
        log_info!("Redis found. Cache enabled.");
    }

    let state = AppState::new(config).context("Failed to initialize server state")?;
    ApiServer::new(state)
        .start()
        .await
        .context("Server error")?;

    Ok(())
}
