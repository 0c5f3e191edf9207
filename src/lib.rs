//! Price Tracker - Flipkart price watch service
//!
//! Polls a single product page on a fixed cadence, stores every observed
//! price in SQLite and sends a Telegram alert when the price falls to or
//! below the configured threshold.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod notifier;
pub mod scraping;
pub mod state;
pub mod tracker;

use api::ApiServer;
use config::ServerConfig;
use state::AppState;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging, start the API server and run until Ctrl-C
pub async fn run() -> anyhow::Result<()> {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "price_tracker_lib=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting price tracker...");

    let config = ServerConfig::from_env()?;
    let addr = config.socket_addr()?;

    let state = Arc::new(AppState::new(&config)?);
    tracing::info!("Application state initialized");

    let mut server = ApiServer::new();
    server.start(state.clone(), addr).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    state.tracker.shutdown().await;
    server.shutdown().await;

    tracing::info!("Price tracker stopped");
    Ok(())
}
