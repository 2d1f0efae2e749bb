mod aggregate;
mod chain;
mod classify;
mod config;
mod engine;
mod geo;
mod history;
mod identity;
mod insight;
mod metrics;
mod sample;
mod score;
mod snapshot;
mod web;

use std::sync::Arc;
use tracing::{error, info};

use crate::config::Config;
use crate::engine::MonitorEngine;
use crate::web::server::WebServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stakepulse=info".into()),
        )
        .init();

    info!("📡 stakepulse v{} starting...", env!("CARGO_PKG_VERSION"));

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "stakepulse.toml".to_string());

    let config = Config::load(&config_path)?;
    info!("Config loaded from {}", config_path);
    info!("Watching cluster at {}", config.rpc.url);

    let config = Arc::new(config);

    // Initialize monitor engine (contains chain client, geo cache, snapshot store)
    let engine = Arc::new(MonitorEngine::new(config.clone())?);

    // Start snapshot collector
    let snapshot_engine = engine.clone();
    tokio::spawn(async move {
        snapshot_engine.run_snapshot_loop().await;
    });

    // Start Web UI
    let web_engine = engine.clone();
    let web_config = config.clone();
    tokio::spawn(async move {
        let web = WebServer::new(web_engine, web_config);
        if let Err(e) = web.run().await {
            error!("Web server error: {}", e);
        }
    });

    // Main polling loop
    engine.run_poll_loop().await;
    Ok(())
}
