//! Polling engine
//!
//! One background task per tracking session. Each cycle fetches the page,
//! extracts an observation, records it and evaluates the threshold. Failed
//! cycles back off exponentially up to a cap and the loop gives up after a
//! fixed number of consecutive failures.

use crate::db::sqlite::{NewPriceRecord, TrackerConfig};
use crate::db::HistoryStore;
use crate::notifier::Notifier;
use crate::scraping::{ExtractionError, Observation, PageFetch, PriceExtractor, TransportError};
use crate::tracker::session::{CycleCheck, SharedSession};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Upper bound on how long a stop request can go unnoticed during a sleep
const STOP_CHECK_TICK: Duration = Duration::from_millis(500);

/// Stand-in deadline for sleeps too long to represent as an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Timing and give-up parameters for one polling loop
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub poll_interval: Duration,
    pub backoff_cap: Duration,
    pub max_consecutive_failures: u32,
    pub stop_check_tick: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&TrackerConfig::default())
    }
}

impl From<&TrackerConfig> for EngineConfig {
    fn from(config: &TrackerConfig) -> Self {
        let poll_interval = Duration::from_secs(config.poll_interval_secs);
        Self {
            poll_interval,
            backoff_cap: Duration::from_secs(config.backoff_cap_secs),
            max_consecutive_failures: config.max_consecutive_failures.max(1),
            stop_check_tick: STOP_CHECK_TICK.min(poll_interval),
        }
    }
}

impl EngineConfig {
    /// Sleep after the n-th consecutive failure: `min(interval * 2^(n-1), cap)`
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.poll_interval
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_cap)
    }
}

/// Why a cycle failed
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("soft block detected (matched \"{0}\")")]
    SoftBlocked(&'static str),

    #[error("extraction failed: {}", .0.reason())]
    Extraction(#[from] ExtractionError),
}

/// Result of a single cycle
#[derive(Debug)]
pub enum CycleOutcome {
    Observed { price: f64, alerted: bool },
    Failed { consecutive_failures: u32, error: CycleError },
    /// The URL was replaced while the cycle ran; its result was dropped
    Retargeted,
    /// The session was stopped or restarted under this loop
    Cancelled,
}

/// Signals shared between the tracking manager and its polling loops
#[derive(Default)]
pub struct LoopControl {
    wakeup: Notify,
    /// Held across each history append and by `stop`
    commit: Mutex<()>,
}

impl LoopControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the session and wake its loop; returns whether it was running
    ///
    /// Waits out an append already in progress, so no history record is
    /// written once this returns.
    pub fn stop(&self, session: &SharedSession) -> bool {
        let was_running = {
            let _commit = self.commit.lock();
            session.lock().stop()
        };
        self.wakeup.notify_waiters();
        was_running
    }
}

/// Collaborators shared by every polling loop
#[derive(Clone)]
pub struct EngineDeps {
    pub fetcher: Arc<dyn PageFetch>,
    pub history: Arc<dyn HistoryStore>,
    pub notifier: Arc<dyn Notifier>,
}

/// The polling loop bound to one session generation
pub struct PollingEngine {
    session: SharedSession,
    generation: u64,
    deps: EngineDeps,
    extractor: PriceExtractor,
    config: EngineConfig,
    control: Arc<LoopControl>,
}

impl PollingEngine {
    pub fn new(
        session: SharedSession,
        generation: u64,
        deps: EngineDeps,
        config: EngineConfig,
        control: Arc<LoopControl>,
    ) -> Self {
        Self {
            session,
            generation,
            deps,
            extractor: PriceExtractor::new(),
            config,
            control,
        }
    }

    /// Run until stopped, superseded, or the failure limit is reached
    pub async fn run(self) {
        info!(
            "Polling engine {} started (interval {:?}, cap {:?}, max failures {})",
            self.generation,
            self.config.poll_interval,
            self.config.backoff_cap,
            self.config.max_consecutive_failures
        );

        loop {
            match self.run_cycle().await {
                CycleOutcome::Cancelled => break,
                CycleOutcome::Retargeted => {
                    debug!("Target replaced mid-cycle; polling the new one");
                }
                CycleOutcome::Observed { .. } => {
                    if !self.sleep(self.config.poll_interval).await {
                        break;
                    }
                }
                CycleOutcome::Failed {
                    consecutive_failures,
                    ..
                } => {
                    let backoff = self.config.backoff_delay(consecutive_failures);
                    debug!(
                        "Backing off {:?} after {} consecutive failures",
                        backoff, consecutive_failures
                    );
                    if !self.sleep(backoff).await {
                        break;
                    }

                    // A retarget during the sleep resets the count
                    let failures = self.session.lock().consecutive_failures();
                    if failures >= self.config.max_consecutive_failures {
                        let tripped = self.session.lock().trip_breaker(self.generation);
                        if tripped {
                            error!(
                                "Giving up after {} consecutive failures; tracking halted until restarted",
                                failures
                            );
                        }
                        break;
                    }

                    let resumed = self.session.lock().resume(self.generation);
                    if !resumed {
                        break;
                    }
                }
            }
        }

        info!("Polling engine {} exited", self.generation);
    }

    /// Execute one fetch, extract, record and notify pass
    pub async fn run_cycle(&self) -> CycleOutcome {
        let next = self.session.lock().next_cycle(self.generation);
        let Some((target, attempt)) = next else {
            return CycleOutcome::Cancelled;
        };

        let observed = tokio::select! {
            result = self.observe(&target.url, attempt) => result,
            _ = self.cancelled() => return CycleOutcome::Cancelled,
        };
        let observation = match observed {
            Ok(observation) => observation,
            Err(err) => {
                warn!("Cycle attempt {} for {} failed: {}", attempt, target.url, err);
                let recorded = self
                    .session
                    .lock()
                    .record_failure(self.generation, &target.url, err.to_string());
                return match recorded {
                    Ok(consecutive_failures) => CycleOutcome::Failed {
                        consecutive_failures,
                        error: err,
                    },
                    Err(check) => Self::dropped(check),
                };
            }
        };

        // The commit gate keeps a stop from landing between the session
        // check and the append; status readers only wait on the session lock.
        {
            let _commit = self.control.commit.lock();
            let check = self
                .session
                .lock()
                .record_success(self.generation, &target.url, observation.clone());
            if check != CycleCheck::Current {
                return Self::dropped(check);
            }

            let record = NewPriceRecord {
                url: target.url.clone(),
                title: observation.title.clone(),
                price: observation.price,
                observed_at: observation.observed_at,
                threshold_price: target.threshold_price,
            };
            if let Err(e) = self.deps.history.append(&record) {
                error!("Failed to store price observation: {}", e);
            }
        }

        info!(
            "Observed {} at {:.2} (threshold {:.2})",
            observation.title, observation.price, target.threshold_price
        );

        let alerted = observation.price <= target.threshold_price;
        if alerted {
            let delivered = self
                .deps
                .notifier
                .send_price_alert(
                    &target.notification,
                    &target.url,
                    &observation,
                    target.threshold_price,
                )
                .await;
            if !delivered {
                warn!("Price alert for {} was not delivered", target.url);
            }
        }

        CycleOutcome::Observed {
            price: observation.price,
            alerted,
        }
    }

    fn dropped(check: CycleCheck) -> CycleOutcome {
        match check {
            CycleCheck::Retargeted => CycleOutcome::Retargeted,
            _ => CycleOutcome::Cancelled,
        }
    }

    async fn observe(&self, url: &str, attempt: u32) -> Result<Observation, CycleError> {
        let page = self.deps.fetcher.fetch(url).await?;
        if let Some(marker) = page.soft_block {
            return Err(CycleError::SoftBlocked(marker));
        }
        Ok(self.extractor.extract(&page.body, attempt)?)
    }

    /// Resolves once this loop has been stopped or superseded
    async fn cancelled(&self) {
        loop {
            if !self.session.lock().is_current(self.generation) {
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.stop_check_tick) => {}
                _ = self.control.wakeup.notified() => {}
            }
        }
    }

    /// Sleep in short ticks; false once this loop should stop
    async fn sleep(&self, total: Duration) -> bool {
        let start = Instant::now();
        let deadline = start
            .checked_add(total)
            .unwrap_or_else(|| start + FAR_FUTURE);
        loop {
            if !self.session.lock().is_current(self.generation) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let step = (deadline - now).min(self.config.stop_check_tick);
            tokio::select! {
                _ = tokio::time::sleep(step) => {}
                _ = self.control.wakeup.notified() => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::SqliteDb;
    use crate::notifier::NotificationTarget;
    use crate::scraping::{FetchedPage, TransportErrorKind};
    use crate::tracker::session::{EngineState, StartOutcome, TrackingSession, TrackingTarget};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const URL: &str = "https://www.flipkart.com/widget/p/itm123";

    fn product_page(price: &str) -> String {
        format!(
            r#"<html><body><span class="B_NuCI">Widget</span><div class="_30jeq3 _16Jk6d">{}</div></body></html>"#,
            price
        )
    }

    enum Script {
        Page(String),
        Error,
    }

    struct ScriptedFetcher {
        script: Mutex<VecDeque<Script>>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(script: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PageFetch for ScriptedFetcher {
        async fn fetch(&self, _url: &str) -> Result<FetchedPage, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().pop_front();
            match next {
                Some(Script::Page(body)) => Ok(FetchedPage {
                    status_code: 200,
                    content_length: body.len(),
                    soft_block: crate::scraping::fetcher::detect_soft_block(&body),
                    body,
                }),
                Some(Script::Error) | None => Err(TransportError {
                    kind: TransportErrorKind::Connection,
                    message: "connection reset".to_string(),
                }),
            }
        }
    }

    struct CountingNotifier {
        calls: AtomicUsize,
        succeed: bool,
    }

    impl CountingNotifier {
        fn new(succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                succeed,
            })
        }
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn send_price_alert(
            &self,
            _target: &NotificationTarget,
            _product_url: &str,
            _observation: &Observation,
            _threshold_price: f64,
        ) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.succeed
        }
    }

    fn fast_config(max_failures: u32) -> EngineConfig {
        EngineConfig {
            poll_interval: Duration::from_millis(5),
            backoff_cap: Duration::from_millis(20),
            max_consecutive_failures: max_failures,
            stop_check_tick: Duration::from_millis(1),
        }
    }

    struct Harness {
        session: SharedSession,
        engine: PollingEngine,
        history: Arc<SqliteDb>,
        notifier: Arc<CountingNotifier>,
    }

    /// Holds every fetch until released, then serves `body`
    struct GatedFetcher {
        body: String,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl PageFetch for GatedFetcher {
        async fn fetch(&self, _url: &str) -> Result<FetchedPage, TransportError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(FetchedPage {
                status_code: 200,
                content_length: self.body.len(),
                soft_block: None,
                body: self.body.clone(),
            })
        }
    }

    fn harness(script: Vec<Script>, threshold: f64, notifier_ok: bool, config: EngineConfig) -> Harness {
        harness_with(ScriptedFetcher::new(script), threshold, notifier_ok, config)
    }

    fn harness_with(
        fetcher: Arc<dyn PageFetch>,
        threshold: f64,
        notifier_ok: bool,
        config: EngineConfig,
    ) -> Harness {
        let session = TrackingSession::shared();
        let outcome = session.lock().begin(TrackingTarget {
            url: URL.to_string(),
            threshold_price: threshold,
            notification: NotificationTarget::new("token", "chat"),
        });
        let StartOutcome::Spawn(generation) = outcome else {
            panic!("expected a fresh session");
        };

        let history = Arc::new(SqliteDb::in_memory().unwrap());
        let notifier = CountingNotifier::new(notifier_ok);
        let deps = EngineDeps {
            fetcher,
            history: history.clone(),
            notifier: notifier.clone(),
        };
        let engine = PollingEngine::new(
            session.clone(),
            generation,
            deps,
            config,
            Arc::new(LoopControl::new()),
        );

        Harness {
            session,
            engine,
            history,
            notifier,
        }
    }

    #[test]
    fn test_backoff_delay_doubles_and_caps() {
        let config = EngineConfig::from(&TrackerConfig::default());
        let delays: Vec<u64> = (1..=6).map(|n| config.backoff_delay(n).as_secs()).collect();
        assert_eq!(delays, vec![60, 120, 240, 300, 300, 300]);
        assert_eq!(config.backoff_delay(200).as_secs(), 300);
    }

    #[tokio::test]
    async fn test_price_below_threshold_notifies_once() {
        let h = harness(vec![Script::Page(product_page("₹899"))], 999.0, true, fast_config(5));

        let outcome = h.engine.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Observed { price, alerted: true } if price == 899.0));
        assert_eq!(h.notifier.calls.load(Ordering::SeqCst), 1);

        let history = h.history.get_price_history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].title, "Widget");
        assert_eq!(history[0].threshold_price, 999.0);

        let snapshot = h.session.lock().snapshot();
        assert_eq!(snapshot.current_data.unwrap().attempt_count, 1);
    }

    #[tokio::test]
    async fn test_price_equal_to_threshold_notifies() {
        let h = harness(vec![Script::Page(product_page("₹999"))], 999.0, true, fast_config(5));
        h.engine.run_cycle().await;
        assert_eq!(h.notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_price_above_threshold_does_not_notify() {
        let h = harness(vec![Script::Page(product_page("₹1,299"))], 999.0, true, fast_config(5));

        let outcome = h.engine.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Observed { alerted: false, .. }));
        assert_eq!(h.notifier.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.history.count_price_records().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_affect_state() {
        let h = harness(vec![Script::Page(product_page("₹10"))], 999.0, false, fast_config(5));

        h.engine.run_cycle().await;
        let session = h.session.lock();
        assert!(session.is_running());
        assert_eq!(session.state(), EngineState::Running);
        assert_eq!(session.consecutive_failures(), 0);
        assert!(session.last_error().is_none());
    }

    #[tokio::test]
    async fn test_soft_block_counts_as_failure() {
        let page = "<html><body>Please complete the CAPTCHA</body></html>".to_string();
        let h = harness(vec![Script::Page(page)], 999.0, true, fast_config(5));

        let outcome = h.engine.run_cycle().await;
        assert!(matches!(
            outcome,
            CycleOutcome::Failed { consecutive_failures: 1, error: CycleError::SoftBlocked("captcha") }
        ));
        assert_eq!(h.session.lock().state(), EngineState::Backoff(1));
        assert_eq!(h.history.count_price_records().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_extraction_failure_records_reason() {
        let page = "<html><body><h1>Widget</h1></body></html>".to_string();
        let h = harness(vec![Script::Page(page)], 999.0, true, fast_config(5));

        h.engine.run_cycle().await;
        let session = h.session.lock();
        assert!(session.last_error().unwrap().contains("no_price_found"));
    }

    #[tokio::test]
    async fn test_success_after_failures_resets_counter() {
        let mut script: Vec<Script> = (0..4).map(|_| Script::Error).collect();
        script.push(Script::Page(product_page("₹500")));
        let h = harness(script, 100.0, true, fast_config(5));

        for n in 1..=4 {
            let outcome = h.engine.run_cycle().await;
            assert!(matches!(outcome, CycleOutcome::Failed { consecutive_failures, .. } if consecutive_failures == n));
        }

        let outcome = h.engine.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Observed { .. }));

        let session = h.session.lock();
        assert_eq!(session.consecutive_failures(), 0);
        assert_eq!(session.state(), EngineState::Running);
        assert!(session.is_running());
        assert_eq!(session.last_observation().unwrap().attempt_count, 5);
    }

    #[tokio::test]
    async fn test_run_trips_breaker_after_max_failures() {
        let h = harness(Vec::new(), 100.0, true, fast_config(3));
        let session = h.session.clone();

        tokio::time::timeout(Duration::from_secs(5), h.engine.run())
            .await
            .expect("engine should give up on its own");

        let snapshot = session.lock().snapshot();
        assert!(!snapshot.is_tracking);
        assert_eq!(snapshot.state, "failed");
        assert_eq!(snapshot.consecutive_failures, 3);
        assert!(snapshot.last_error.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_stop_interrupts_long_sleep() {
        let config = EngineConfig {
            poll_interval: Duration::from_secs(3600),
            backoff_cap: Duration::from_secs(3600),
            max_consecutive_failures: 5,
            stop_check_tick: Duration::from_millis(10),
        };
        let h = harness(vec![Script::Page(product_page("₹500"))], 100.0, true, config);
        let session = h.session.clone();
        let history = h.history.clone();

        let handle = tokio::spawn(h.engine.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(history.count_price_records().unwrap(), 1);

        session.lock().stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("engine should exit promptly")
            .unwrap();

        let snapshot = session.lock().snapshot();
        assert_eq!(snapshot.state, "stopped");
        assert_eq!(snapshot.current_data.unwrap().price, 500.0);
        assert_eq!(history.count_price_records().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stale_engine_does_not_write() {
        let h = harness(vec![Script::Page(product_page("₹50"))], 100.0, true, fast_config(5));
        h.session.lock().stop();

        let outcome = h.engine.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Cancelled));
        assert_eq!(h.history.count_price_records().unwrap(), 0);
        assert_eq!(h.notifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retarget_mid_fetch_drops_old_result() {
        let fetcher = Arc::new(GatedFetcher {
            body: product_page("₹700"),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let h = harness_with(fetcher.clone(), 999.0, true, fast_config(5));
        let other = "https://www.flipkart.com/other/p/itm9";

        let cycle = h.engine.run_cycle();
        tokio::pin!(cycle);
        tokio::select! {
            _ = &mut cycle => panic!("cycle finished before the fetch was released"),
            _ = fetcher.entered.notified() => {}
        }

        let outcome = h.session.lock().begin(TrackingTarget {
            url: other.to_string(),
            threshold_price: 800.0,
            notification: NotificationTarget::new("token", "chat"),
        });
        assert_eq!(outcome, StartOutcome::Replaced);
        fetcher.release.notify_one();

        assert!(matches!(cycle.await, CycleOutcome::Retargeted));
        let snapshot = h.session.lock().snapshot();
        assert_eq!(snapshot.product_url.as_deref(), Some(other));
        assert!(snapshot.current_data.is_none());
        assert!(snapshot.is_tracking);
        assert_eq!(h.history.count_price_records().unwrap(), 0);
        assert_eq!(h.notifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unrepresentable_interval_sleeps_until_stopped() {
        let config = EngineConfig {
            poll_interval: Duration::MAX,
            backoff_cap: Duration::MAX,
            max_consecutive_failures: 5,
            stop_check_tick: Duration::from_millis(5),
        };
        let h = harness(vec![Script::Page(product_page("₹500"))], 100.0, true, config);
        let session = h.session.clone();
        let history = h.history.clone();

        let handle = tokio::spawn(h.engine.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        assert_eq!(history.count_price_records().unwrap(), 1);

        session.lock().stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("engine should exit promptly")
            .expect("engine must not panic");
    }

    #[test]
    fn test_loop_control_stop_reports_previous_state() {
        let h = harness(Vec::new(), 100.0, true, fast_config(5));
        let control = LoopControl::new();

        assert!(control.stop(&h.session));
        assert!(!control.stop(&h.session));
        assert!(!h.session.lock().is_current(1));
    }
}
