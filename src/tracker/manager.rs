//! Tracking control surface
//!
//! `start`, `stop` and `status` are constant-time transitions on the shared
//! session. Network work only ever happens inside the spawned polling task.

use crate::error::{AppError, Result};
use crate::notifier::NotificationTarget;
use crate::scraping::{PageFetch, PRODUCT_URL_PREFIXES};
use crate::tracker::engine::{EngineConfig, EngineDeps, LoopControl, PollingEngine};
use crate::tracker::session::{
    SharedSession, StartOutcome, StatusSnapshot, TrackingSession, TrackingTarget,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A start request before validation
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub url: String,
    pub threshold_price: f64,
    pub notification: NotificationTarget,
}

/// Owns the session and the polling task
pub struct TrackingManager {
    session: SharedSession,
    control: Arc<LoopControl>,
    deps: Mutex<EngineDeps>,
    config: Mutex<EngineConfig>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TrackingManager {
    pub fn new(deps: EngineDeps, config: EngineConfig) -> Self {
        Self {
            session: TrackingSession::shared(),
            control: Arc::new(LoopControl::new()),
            deps: Mutex::new(deps),
            config: Mutex::new(config),
            task: Mutex::new(None),
        }
    }

    /// Swap the fetcher and timings used by the next polling loop
    pub fn reconfigure(&self, fetcher: Arc<dyn PageFetch>, config: EngineConfig) {
        self.deps.lock().fetcher = fetcher;
        *self.config.lock() = config;
        info!("Tracker settings updated; they take effect on the next start");
    }

    /// Begin tracking, or retarget the running loop in place
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, request: StartRequest) -> Result<StartOutcome> {
        let target = validate_start(request)?;
        let url = target.url.clone();
        let threshold = target.threshold_price;

        let mut session = self.session.lock();
        let outcome = session.begin(target);

        match outcome {
            StartOutcome::Spawn(generation) => {
                let engine = PollingEngine::new(
                    self.session.clone(),
                    generation,
                    self.deps.lock().clone(),
                    self.config.lock().clone(),
                    self.control.clone(),
                );
                let handle = tokio::spawn(engine.run());
                drop(session);

                // A previous, stopped loop exits on its own at its next check
                *self.task.lock() = Some(handle);
                info!("Started tracking {} with threshold {:.2}", url, threshold);
            }
            StartOutcome::Replaced => {
                drop(session);
                info!("Retargeted running tracker to {} with threshold {:.2}", url, threshold);
            }
        }

        Ok(outcome)
    }

    /// Stop tracking; harmless when nothing is running
    pub fn stop(&self) -> bool {
        let was_running = self.control.stop(&self.session);

        if was_running {
            info!("Tracking stopped");
        }
        was_running
    }

    pub fn status(&self) -> StatusSnapshot {
        self.session.lock().snapshot()
    }

    /// Stop tracking and wait for the polling task to exit
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Polling task ended abnormally: {}", e);
            }
        }
    }
}

/// Check a start request against the tracking invariants
pub fn validate_start(request: StartRequest) -> Result<TrackingTarget> {
    let url = request.url.trim();
    if url.is_empty() {
        return Err(AppError::Validation("url is required".to_string()));
    }
    if !PRODUCT_URL_PREFIXES.iter().any(|prefix| url.starts_with(prefix)) {
        return Err(AppError::Validation(
            "Please provide a valid Flipkart product URL".to_string(),
        ));
    }
    url::Url::parse(url).map_err(|e| AppError::Validation(format!("Invalid url: {}", e)))?;

    if !request.threshold_price.is_finite() || request.threshold_price <= 0.0 {
        return Err(AppError::Validation(
            "threshold_price must be a positive number".to_string(),
        ));
    }

    let token = request.notification.token.trim();
    let chat_id = request.notification.chat_id.trim();
    if token.is_empty() || chat_id.is_empty() {
        return Err(AppError::Validation(
            "notification token and chat id are required".to_string(),
        ));
    }

    Ok(TrackingTarget {
        url: url.to_string(),
        threshold_price: request.threshold_price,
        notification: NotificationTarget::new(token, chat_id),
    })
}
