//! Background monitor for screen changes
//! Periodically captures the watched region, compares it against the
//! previous capture and raises a notification when enough pixels changed.
//!
//! A failed iteration is logged and counted but never stops the loop; the
//! baseline is only replaced after a successful comparison.

use crate::capture::{ComparisonResult, FrameCapture, FrameComparator};
use crate::error::{Result, WatchError};
use crate::logging::MonitorLogger;
use crate::notifications::Notifier;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(2000);
pub const CHANGE_TITLE: &str = "Screen Change Detected";

/// Shortest interval the loop will sleep between iterations
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Snapshot of a monitor, safe to hand out over the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub iterations: u64,
    pub has_baseline: bool,
    pub interval_ms: u64,
    pub changes_detected: u64,
    pub failed_iterations: u64,
}

/// What one iteration did
#[derive(Debug)]
pub enum IterationOutcome {
    /// First successful capture, stored as the baseline
    Baseline,
    Unchanged(ComparisonResult),
    Changed(ComparisonResult),
    /// Logged and counted; the baseline was left alone
    Failed(WatchError),
}

impl IterationOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, IterationOutcome::Failed(_))
    }
}

struct HandleInner {
    running: AtomicBool,
    interval_ms: AtomicU64,
    iterations: AtomicU64,
    changes: AtomicU64,
    failures: AtomicU64,
    has_baseline: AtomicBool,
    wake: Notify,
    logger: Arc<dyn MonitorLogger>,
}

/// Shared control state of one [`ScreenMonitor`]
///
/// Cloning is cheap; every clone controls the same monitor.
#[derive(Clone)]
pub struct MonitorHandle {
    inner: Arc<HandleInner>,
}

impl MonitorHandle {
    fn new(interval: Duration, logger: Arc<dyn MonitorLogger>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                running: AtomicBool::new(false),
                interval_ms: AtomicU64::new(duration_ms(interval.max(MIN_INTERVAL))),
                iterations: AtomicU64::new(0),
                changes: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                has_baseline: AtomicBool::new(false),
                wake: Notify::new(),
                logger,
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Ask the loop to stop. Wakes it if it is sleeping between iterations.
    pub fn stop(&self) {
        let was_running = self.inner.running.swap(false, Ordering::SeqCst);
        self.inner.wake.notify_waiters();

        self.inner.logger.info(
            "Monitoring stopped",
            &json!({ "total_iterations": self.iterations(), "was_running": was_running }),
        );
    }

    /// Applies from the next sleep on. Clamped to [`MIN_INTERVAL`].
    pub fn set_interval(&self, interval: Duration) {
        let ms = duration_ms(interval.max(MIN_INTERVAL));
        let previous = self.inner.interval_ms.swap(ms, Ordering::SeqCst);
        self.inner.logger.info(
            "Monitoring interval updated",
            &json!({ "previous_ms": previous, "new_ms": ms }),
        );
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.inner.interval_ms.load(Ordering::SeqCst))
    }

    pub fn iterations(&self) -> u64 {
        self.inner.iterations.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> MonitorStatus {
        MonitorStatus {
            running: self.is_running(),
            iterations: self.iterations(),
            has_baseline: self.inner.has_baseline.load(Ordering::SeqCst),
            interval_ms: self.inner.interval_ms.load(Ordering::SeqCst),
            changes_detected: self.inner.changes.load(Ordering::SeqCst),
            failed_iterations: self.inner.failures.load(Ordering::SeqCst),
        }
    }

    /// Sleep for the current interval, returning early on `stop()`.
    async fn wait_for_next_tick(&self) {
        let notified = self.inner.wake.notified();
        tokio::pin!(notified);
        // Register before re-checking the flag so a concurrent stop is not missed.
        notified.as_mut().enable();

        if !self.is_running() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(self.interval()) => {},
            _ = notified => {
                tracing::debug!("Monitor sleep interrupted by stop");
            }
        }
    }
}

fn duration_ms(interval: Duration) -> u64 {
    u64::try_from(interval.as_millis()).unwrap_or(u64::MAX)
}

/// Capture → compare → notify loop
pub struct ScreenMonitor {
    capturer: Box<dyn FrameCapture>,
    comparator: Arc<dyn FrameComparator>,
    notifier: Arc<dyn Notifier>,
    logger: Arc<dyn MonitorLogger>,
    handle: MonitorHandle,
    previous_frame: Option<Bytes>,
}

impl ScreenMonitor {
    pub fn new(
        capturer: Box<dyn FrameCapture>,
        comparator: Arc<dyn FrameComparator>,
        notifier: Arc<dyn Notifier>,
        logger: Arc<dyn MonitorLogger>,
        interval: Duration,
    ) -> Self {
        Self {
            capturer,
            comparator,
            notifier,
            handle: MonitorHandle::new(interval, logger.clone()),
            logger,
            previous_frame: None,
        }
    }

    pub fn handle(&self) -> MonitorHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    pub fn has_baseline(&self) -> bool {
        self.previous_frame.is_some()
    }

    pub fn status(&self) -> MonitorStatus {
        self.handle.status()
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    pub fn set_interval(&self, interval: Duration) {
        self.handle.set_interval(interval);
    }

    /// Run the loop until stopped.
    ///
    /// Returns immediately if the monitor is already running. A failing capture
    /// setup is fatal: the monitor is stopped and the error returned.
    pub async fn start(&mut self) -> Result<()> {
        if !self.claim() {
            self.logger.warn("Monitoring is already running", &json!({}));
            return Ok(());
        }
        self.run_claimed().await
    }

    /// Flip the monitor to running. False if it already was.
    pub(crate) fn claim(&self) -> bool {
        !self.handle.inner.running.swap(true, Ordering::SeqCst)
    }

    /// The body of [`start`](Self::start), for a caller that already won [`claim`](Self::claim).
    pub(crate) async fn run_claimed(&mut self) -> Result<()> {
        self.logger.info(
            "Starting screen monitoring",
            &json!({ "interval_ms": self.handle.interval().as_millis() as u64 }),
        );

        if let Err(e) = self.capturer.initialize().await {
            self.logger.error(
                "Fatal error in monitoring setup",
                &json!({ "error": e.to_string(), "kind": e.kind() }),
            );
            self.handle.stop();
            return Err(e);
        }

        while self.handle.is_running() {
            self.run_iteration().await;

            if !self.handle.is_running() {
                break;
            }
            self.handle.wait_for_next_tick().await;
        }

        tracing::debug!("Monitor loop exited after {} iterations", self.handle.iterations());
        Ok(())
    }

    /// One capture/compare cycle. Errors are absorbed into the outcome.
    pub async fn run_iteration(&mut self) -> IterationOutcome {
        let iteration = self.handle.inner.iterations.fetch_add(1, Ordering::SeqCst) + 1;
        self.logger
            .debug("Starting monitoring iteration", &json!({ "iteration": iteration }));

        match self.try_iteration(iteration).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.handle.inner.failures.fetch_add(1, Ordering::SeqCst);
                self.logger.error(
                    "Error in monitoring iteration",
                    &json!({
                        "error": e.to_string(),
                        "kind": e.kind(),
                        "iteration": iteration,
                        "has_baseline": self.has_baseline(),
                    }),
                );
                IterationOutcome::Failed(e)
            }
        }
    }

    async fn try_iteration(&mut self, iteration: u64) -> Result<IterationOutcome> {
        let current = self.capturer.capture_region().await?;

        let Some(previous) = self.previous_frame.as_ref() else {
            self.logger
                .info("Initial baseline captured", &json!({ "iteration": iteration }));
            self.previous_frame = Some(current);
            self.handle.inner.has_baseline.store(true, Ordering::SeqCst);
            return Ok(IterationOutcome::Baseline);
        };

        let result = self.comparator.compare(previous, &current).await?;

        let outcome = if result.has_changes {
            self.handle.inner.changes.fetch_add(1, Ordering::SeqCst);
            self.notifier.notify(CHANGE_TITLE, &result.summary());
            self.logger.info(
                "Screen change detected",
                &json!({
                    "iteration": iteration,
                    "diff_pixels": result.diff_pixels,
                    "diff_percentage": result.diff_percentage,
                }),
            );
            IterationOutcome::Changed(result)
        } else {
            self.logger.debug(
                "No significant changes",
                &json!({ "iteration": iteration, "diff_pixels": result.diff_pixels }),
            );
            IterationOutcome::Unchanged(result)
        };

        self.previous_frame = Some(current);
        Ok(outcome)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::logging::{LogLevel, MemoryLogger};
    use crate::notifications::NotificationCenter;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Returns scripted captures; once the script runs out, repeats `fallback`.
    pub(crate) struct ScriptedCapture {
        script: Mutex<VecDeque<Result<Bytes>>>,
        fallback: Bytes,
        fail_setup: bool,
    }

    impl ScriptedCapture {
        pub(crate) fn new(script: Vec<Result<Bytes>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback: Bytes::from_static(b"frame"),
                fail_setup: false,
            }
        }

        pub(crate) fn failing_setup() -> Self {
            Self {
                fail_setup: true,
                ..Self::new(Vec::new())
            }
        }
    }

    #[async_trait]
    impl FrameCapture for ScriptedCapture {
        async fn initialize(&self) -> Result<()> {
            if self.fail_setup {
                return Err(WatchError::Capture("No screens found".to_string()));
            }
            Ok(())
        }

        async fn capture_region(&self) -> Result<Bytes> {
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(self.fallback.clone()))
        }
    }

    /// Reports a change whenever the two buffers differ, and remembers pairs.
    #[derive(Default)]
    pub(crate) struct ByteComparator {
        pub(crate) calls: Mutex<Vec<(Bytes, Bytes)>>,
    }

    #[async_trait]
    impl FrameComparator for ByteComparator {
        async fn compare(&self, previous: &Bytes, current: &Bytes) -> Result<ComparisonResult> {
            self.calls
                .lock()
                .unwrap()
                .push((previous.clone(), current.clone()));
            let diff = if previous == current { 0 } else { 500 };
            Ok(ComparisonResult::from_counts(diff, 1000, 100))
        }
    }

    fn frame(tag: &'static str) -> Result<Bytes> {
        Ok(Bytes::from_static(tag.as_bytes()))
    }

    fn monitor(
        capture: ScriptedCapture,
        comparator: Arc<ByteComparator>,
        notifier: Arc<NotificationCenter>,
        logger: Arc<MemoryLogger>,
    ) -> ScreenMonitor {
        ScreenMonitor::new(
            Box::new(capture),
            comparator,
            notifier,
            logger,
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn test_baseline_then_change_notifies() {
        let notes = Arc::new(NotificationCenter::new());
        let mut m = monitor(
            ScriptedCapture::new(vec![frame("a"), frame("a"), frame("b")]),
            Arc::new(ByteComparator::default()),
            notes.clone(),
            Arc::new(MemoryLogger::new()),
        );

        assert!(matches!(m.run_iteration().await, IterationOutcome::Baseline));
        assert!(m.has_baseline());
        assert!(matches!(m.run_iteration().await, IterationOutcome::Unchanged(_)));
        assert!(matches!(m.run_iteration().await, IterationOutcome::Changed(_)));

        let items = notes.list(None);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Screen Change Detected");
        assert_eq!(items[0].body, "Changes found: 500 pixels (50.00%)");

        let status = m.status();
        assert_eq!(status.iterations, 3);
        assert_eq!(status.changes_detected, 1);
        assert!(status.has_baseline);
        assert!(!status.running);
    }

    #[tokio::test]
    async fn test_failed_iteration_keeps_baseline() {
        let comparator = Arc::new(ByteComparator::default());
        let logger = Arc::new(MemoryLogger::new());
        let mut m = monitor(
            ScriptedCapture::new(vec![
                frame("a"),
                Err(WatchError::Capture("display went away".to_string())),
                frame("c"),
            ]),
            comparator.clone(),
            Arc::new(NotificationCenter::new()),
            logger.clone(),
        );

        assert!(matches!(m.run_iteration().await, IterationOutcome::Baseline));
        assert!(m.run_iteration().await.is_failure());
        assert!(matches!(m.run_iteration().await, IterationOutcome::Changed(_)));

        // Iteration 3 compared against the frame from iteration 1.
        let calls = comparator.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, Bytes::from_static(b"a"));
        assert_eq!(calls[0].1, Bytes::from_static(b"c"));

        let errors = logger.entries_at(LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].context["iteration"], 2);
        assert_eq!(errors[0].context["has_baseline"], true);
        assert_eq!(m.status().failed_iterations, 1);
    }

    #[tokio::test]
    async fn test_failure_before_baseline_reports_no_baseline() {
        let logger = Arc::new(MemoryLogger::new());
        let mut m = monitor(
            ScriptedCapture::new(vec![Err(WatchError::InvalidImageBuffer("Empty buffer".into()))]),
            Arc::new(ByteComparator::default()),
            Arc::new(NotificationCenter::new()),
            logger.clone(),
        );

        assert!(m.run_iteration().await.is_failure());
        assert!(!m.has_baseline());
        assert_eq!(logger.entries_at(LogLevel::Error)[0].context["has_baseline"], false);
    }

    #[tokio::test]
    async fn test_setup_failure_is_fatal() {
        let logger = Arc::new(MemoryLogger::new());
        let mut m = monitor(
            ScriptedCapture::failing_setup(),
            Arc::new(ByteComparator::default()),
            Arc::new(NotificationCenter::new()),
            logger.clone(),
        );

        let err = m.start().await.unwrap_err();
        assert!(matches!(err, WatchError::Capture(_)));
        assert!(!m.is_running());
        assert_eq!(m.status().iterations, 0);
        assert!(logger
            .entries_at(LogLevel::Error)
            .iter()
            .any(|e| e.message == "Fatal error in monitoring setup"));
    }

    #[tokio::test]
    async fn test_stop_wakes_sleeping_loop() {
        let mut m = monitor(
            ScriptedCapture::new(Vec::new()),
            Arc::new(ByteComparator::default()),
            Arc::new(NotificationCenter::new()),
            Arc::new(MemoryLogger::new()),
        );
        m.set_interval(Duration::from_secs(3600));
        let handle = m.handle();

        let task = tokio::spawn(async move {
            m.start().await.unwrap();
            m
        });

        while handle.iterations() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.stop();

        let m = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("loop should exit promptly")
            .unwrap();
        assert_eq!(m.status().iterations, 1);
        assert!(!m.is_running());
    }

    #[tokio::test]
    async fn test_start_is_idempotent_while_running() {
        let logger = Arc::new(MemoryLogger::new());
        let mut m = monitor(
            ScriptedCapture::new(Vec::new()),
            Arc::new(ByteComparator::default()),
            Arc::new(NotificationCenter::new()),
            logger.clone(),
        );

        // Simulate a loop that is already running elsewhere.
        m.handle.inner.running.store(true, Ordering::SeqCst);
        m.start().await.unwrap();

        assert_eq!(m.status().iterations, 0);
        assert!(logger
            .entries_at(LogLevel::Warn)
            .iter()
            .any(|e| e.message == "Monitoring is already running"));
    }

    #[tokio::test]
    async fn test_loop_runs_until_stopped_and_restarts() {
        let mut m = monitor(
            ScriptedCapture::new(Vec::new()),
            Arc::new(ByteComparator::default()),
            Arc::new(NotificationCenter::new()),
            Arc::new(MemoryLogger::new()),
        );
        let handle = m.handle();

        let stopper = handle.clone();
        tokio::spawn(async move {
            while stopper.iterations() < 3 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            stopper.stop();
        });
        m.start().await.unwrap();
        let first_run = handle.iterations();
        assert!(first_run >= 3);

        let stopper = handle.clone();
        tokio::spawn(async move {
            while stopper.iterations() < first_run + 1 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            stopper.stop();
        });
        m.start().await.unwrap();

        // The restart compares against the old baseline instead of re-capturing one.
        assert!(m.has_baseline());
        assert!(handle.iterations() > first_run);
    }

    #[test]
    fn test_set_interval_updates_status() {
        let m = monitor(
            ScriptedCapture::new(Vec::new()),
            Arc::new(ByteComparator::default()),
            Arc::new(NotificationCenter::new()),
            Arc::new(MemoryLogger::new()),
        );
        m.set_interval(Duration::from_millis(750));
        assert_eq!(m.status().interval_ms, 750);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let m = monitor(
            ScriptedCapture::new(Vec::new()),
            Arc::new(ByteComparator::default()),
            Arc::new(NotificationCenter::new()),
            Arc::new(MemoryLogger::new()),
        );
        m.set_interval(Duration::ZERO);
        assert_eq!(m.status().interval_ms, 1);
        assert_eq!(m.handle().interval(), MIN_INTERVAL);
    }

    #[test]
    fn test_stop_always_logs_iteration_count() {
        let logger = Arc::new(MemoryLogger::new());
        let m = monitor(
            ScriptedCapture::new(Vec::new()),
            Arc::new(ByteComparator::default()),
            Arc::new(NotificationCenter::new()),
            logger.clone(),
        );

        m.stop();

        let stopped: Vec<_> = logger
            .entries_at(LogLevel::Info)
            .into_iter()
            .filter(|e| e.message == "Monitoring stopped")
            .collect();
        assert_eq!(stopped.len(), 1);
        assert_eq!(stopped[0].context["total_iterations"], 0);
        assert_eq!(stopped[0].context["was_running"], false);
    }

    #[tokio::test]
    async fn test_loop_survives_failed_iteration() {
        let comparator = Arc::new(ByteComparator::default());
        let mut m = monitor(
            ScriptedCapture::new(vec![
                frame("a"),
                Err(WatchError::Capture("display went away".to_string())),
                frame("c"),
            ]),
            comparator.clone(),
            Arc::new(NotificationCenter::new()),
            Arc::new(MemoryLogger::new()),
        );
        let handle = m.handle();

        let stopper = handle.clone();
        tokio::spawn(async move {
            while stopper.iterations() < 3 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            stopper.stop();
        });
        tokio::time::timeout(Duration::from_secs(5), m.start())
            .await
            .expect("loop should stop after three iterations")
            .unwrap();

        assert!(handle.iterations() >= 3);
        assert_eq!(m.status().failed_iterations, 1);
        assert!(m.has_baseline());

        // The first comparison ran in iteration 3 against the iteration 1 frame.
        let calls = comparator.calls.lock().unwrap();
        assert_eq!(calls[0].0, Bytes::from_static(b"a"));
        assert_eq!(calls[0].1, Bytes::from_static(b"c"));
    }
}
