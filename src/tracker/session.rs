//! Tracking session state
//!
//! The session is the only state shared between the HTTP front end and the
//! polling task. All transitions are methods on `TrackingSession` and run
//! under one mutex; each polling loop carries the generation it was started
//! with and every write it makes is rejected once that generation is stale.

use crate::notifier::NotificationTarget;
use crate::scraping::Observation;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Session handle shared by the front end and the polling task
pub type SharedSession = Arc<Mutex<TrackingSession>>;

/// Polling engine lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Backoff(u32),
    Stopped,
    Failed,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Running => "running",
            EngineState::Backoff(_) => "backoff",
            EngineState::Stopped => "stopped",
            EngineState::Failed => "failed",
        }
    }
}

/// What is being tracked and who hears about it
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingTarget {
    pub url: String,
    pub threshold_price: f64,
    pub notification: NotificationTarget,
}

/// Result of a start request against the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new polling loop must be spawned with this generation
    Spawn(u64),
    /// The running loop picked up the new target in place
    Replaced,
}

/// Whether a finished cycle may still write to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleCheck {
    Current,
    /// Same loop, but the URL it fetched was replaced mid-cycle
    Retargeted,
    /// The loop was stopped or superseded
    Stale,
}

/// Point-in-time view for status queries
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub is_tracking: bool,
    pub state: String,
    pub current_data: Option<Observation>,
    pub product_url: Option<String>,
    pub threshold_price: Option<f64>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

/// The single tracking session
#[derive(Debug)]
pub struct TrackingSession {
    target: Option<TrackingTarget>,
    is_running: bool,
    state: EngineState,
    last_observation: Option<Observation>,
    last_error: Option<String>,
    consecutive_failures: u32,
    generation: u64,
}

impl Default for TrackingSession {
    fn default() -> Self {
        Self {
            target: None,
            is_running: false,
            state: EngineState::Idle,
            last_observation: None,
            last_error: None,
            consecutive_failures: 0,
            generation: 0,
        }
    }
}

impl TrackingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedSession {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_observation(&self) -> Option<&Observation> {
        self.last_observation.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn target(&self) -> Option<&TrackingTarget> {
        self.target.as_ref()
    }

    /// Apply a validated start request
    pub fn begin(&mut self, target: TrackingTarget) -> StartOutcome {
        if self.is_running {
            let url_changed = self.target.as_ref().map(|t| t.url != target.url).unwrap_or(true);
            if url_changed {
                self.last_observation = None;
                self.consecutive_failures = 0;
                self.last_error = None;
            }
            self.target = Some(target);
            return StartOutcome::Replaced;
        }

        self.generation += 1;
        self.target = Some(target);
        self.is_running = true;
        self.state = EngineState::Running;
        self.last_observation = None;
        self.last_error = None;
        self.consecutive_failures = 0;

        StartOutcome::Spawn(self.generation)
    }

    /// Apply a stop request; returns whether a loop was running
    pub fn stop(&mut self) -> bool {
        let was_running = self.is_running;
        self.is_running = false;
        if was_running {
            self.state = EngineState::Stopped;
        }
        was_running
    }

    /// Whether the loop started with `generation` may keep going
    pub fn is_current(&self, generation: u64) -> bool {
        self.is_running && self.generation == generation
    }

    /// Target and attempt number for the next cycle of a current loop
    pub fn next_cycle(&self, generation: u64) -> Option<(TrackingTarget, u32)> {
        if !self.is_current(generation) {
            return None;
        }
        let target = self.target.clone()?;
        Some((target, self.consecutive_failures + 1))
    }

    /// Whether a cycle of `generation` that fetched `url` is still wanted
    pub fn check_cycle(&self, generation: u64, url: &str) -> CycleCheck {
        if !self.is_current(generation) {
            return CycleCheck::Stale;
        }
        match &self.target {
            Some(target) if target.url == url => CycleCheck::Current,
            _ => CycleCheck::Retargeted,
        }
    }

    /// Record a successful observation of `url`
    pub fn record_success(&mut self, generation: u64, url: &str, observation: Observation) -> CycleCheck {
        let check = self.check_cycle(generation, url);
        if check == CycleCheck::Current {
            self.last_observation = Some(observation);
            self.last_error = None;
            self.consecutive_failures = 0;
            self.state = EngineState::Running;
        }
        check
    }

    /// Record a failed cycle; returns the new consecutive failure count
    pub fn record_failure(
        &mut self,
        generation: u64,
        url: &str,
        error: String,
    ) -> Result<u32, CycleCheck> {
        match self.check_cycle(generation, url) {
            CycleCheck::Current => {
                self.consecutive_failures += 1;
                self.last_error = Some(error);
                self.state = EngineState::Backoff(self.consecutive_failures);
                Ok(self.consecutive_failures)
            }
            other => Err(other),
        }
    }

    /// Leave backoff for another attempt
    pub fn resume(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.state = EngineState::Running;
        true
    }

    /// Open the circuit breaker; the session stays down until the next start
    pub fn trip_breaker(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.is_running = false;
        self.state = EngineState::Failed;
        true
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            is_tracking: self.is_running,
            state: self.state.as_str().to_string(),
            current_data: self.last_observation.clone(),
            product_url: self.target.as_ref().map(|t| t.url.clone()),
            threshold_price: self.target.as_ref().map(|t| t.threshold_price),
            last_error: self.last_error.clone(),
            consecutive_failures: self.consecutive_failures,
        }
    }
}
