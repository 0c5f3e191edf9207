//! HTTP server for the tracking API
//!
//! Provides:
//! - Tracking control (/api/start_tracking, /api/stop_tracking)
//! - Status and price history (/api/status, /api/price_history)
//! - Tracker settings (/api/settings)

use crate::api::handlers;
use crate::error::{AppError, Result};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Build the API router over shared state
pub fn build_router(state: Arc<AppState>) -> Router {
    // Build CORS layer (allow all for local use)
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .route("/", get(handlers::health_check))
        // Tracking control
        .route("/api/start_tracking", post(handlers::start_tracking))
        .route(
            "/api/stop_tracking",
            get(handlers::stop_tracking).post(handlers::stop_tracking),
        )
        // Observers
        .route("/api/status", get(handlers::get_status))
        .route("/api/price_history", get(handlers::get_price_history))
        // Settings
        .route(
            "/api/settings",
            get(handlers::get_settings).post(handlers::update_settings),
        )
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// API server manager
pub struct ApiServer {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ApiServer {
    /// Create a new server
    pub fn new() -> Self {
        Self {
            shutdown_tx: None,
            task: None,
        }
    }

    /// Bind and start serving; returns the bound address
    pub async fn start(&mut self, state: Arc<AppState>, addr: SocketAddr) -> Result<SocketAddr> {
        let app = build_router(state);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| AppError::Config(format!("Failed to bind to {}: {}", addr, e)))?;
        let local_addr = listener.local_addr()?;

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        self.shutdown_tx = Some(shutdown_tx);

        info!("Starting price tracker API server on {}", local_addr);

        // Spawn server task
        self.task = Some(tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("API server shutting down");
            });

            if let Err(e) = server.await {
                error!("API server error: {}", e);
            }
        }));

        info!("=== Endpoints ===");
        info!("  GET  http://{}/health", local_addr);
        info!("  POST http://{}/api/start_tracking", local_addr);
        info!("  GET  http://{}/api/stop_tracking", local_addr);
        info!("  GET  http://{}/api/status", local_addr);
        info!("  GET  http://{}/api/price_history?limit=50", local_addr);
        info!("  GET  http://{}/api/settings", local_addr);

        Ok(local_addr)
    }

    /// Send the stop signal
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            info!("API server stop signal sent");
        }
    }

    /// Stop and wait for in-flight requests to finish
    pub async fn shutdown(&mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("API server task failed: {}", e);
            }
        }
    }
}

impl Default for ApiServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.stop();
    }
}
