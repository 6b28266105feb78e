//! Atlas Agent - HTTP Server Entry Point
//!
//! Starts the HTTP server that exposes the chat agent API.

use atlas_agent::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atlas_agent=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: model={}, tables={}, layers={}",
        config.reasoning.model,
        config.local_tables.len(),
        config.remote_layers.len()
    );

    api::serve(config).await?;

    Ok(())
}
