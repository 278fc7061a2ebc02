//! Leak Tester
//!
//! Repeatedly exercises caller-supplied workloads, samples process memory
//! at a fixed iteration cadence and decides whether the heap shows
//! sustained growth over the baseline.
//!
//! # Usage
//!
//! ```rust,ignore
//! let tester = LeakTester::new(TesterConfig::default())?;
//! tester.subscribe(EventKind::Warning, |event| eprintln!("{event}"));
//!
//! let case = WorkloadCase::new("parse-fixture", || async { parse_fixture().await });
//! let result = tester.run_tests(&[case]).await;
//! if result.has_leak {
//!     println!("heap grew {:.2} MB", result.memory_growth_mb);
//! }
//! ```
//!
//! # Run lifecycle
//!
//! ```text
//! Idle ──run_tests──▶ Running ──all iterations / cancel──▶ Completed
//!                        │
//!                        ├─ per iteration: each case → await workload → cleanup
//!                        └─ every `snapshot_interval` (and last): reclaim → sample → append → publish
//! ```
//!
//! Workloads never run concurrently. Queries such as
//! [`LeakTester::get_memory_info`] read immutable views and can be called
//! from another task while a run is in progress.

use crate::analyzer::LeakAnalyzer;
use crate::cancel::CancelToken;
use crate::config::TesterConfig;
use crate::error::{LeakError, Result};
use crate::events::{Event, EventBus, EventKind, EventRecord, SubscriptionId};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::workload::WorkloadCase;
use leakwatch_memory::{MeasurementProvider, MemoryMeasurement, ProcessMeasurementProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const BASELINE_LABEL: &str = "baseline";

/// Lifecycle of the tester's current (or last) run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum RunState {
    Idle = 0,
    Running = 1,
    Completed = 2,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            _ => Self::Completed,
        }
    }
}

/// Outcome of one `run_tests` call; owned by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub has_leak: bool,
    /// Heap-used growth of the last sample over the baseline
    pub memory_growth_mb: f64,
    /// Iterations actually completed
    pub iterations: u32,
    pub snapshots: Vec<Snapshot>,
    pub leak_threshold: f64,
    /// Trend signal the verdict was based on
    pub monotonicity: f64,
    /// The run stopped early on a cancellation request
    pub cancelled: bool,
}

/// Read-only view of the tester's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryInfo {
    pub current: MemoryMeasurement,
    pub baseline: Option<Snapshot>,
    pub events: Vec<EventRecord>,
    pub snapshots: Vec<Snapshot>,
    pub state: RunState,
}

/// Marks the run completed even if the run future is dropped mid-flight.
struct RunGuard<'a> {
    state: &'a AtomicU8,
}

impl<'a> RunGuard<'a> {
    fn enter(state: &'a AtomicU8) -> Self {
        state.store(RunState::Running as u8, Ordering::SeqCst);
        Self { state }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.state.store(RunState::Completed as u8, Ordering::SeqCst);
    }
}

/// Memory leak test harness
pub struct LeakTester {
    config: TesterConfig,
    provider: Arc<dyn MeasurementProvider>,
    analyzer: LeakAnalyzer,
    store: SnapshotStore,
    events: EventBus,
    state: AtomicU8,
    /// Serializes runs and resets
    run_lock: Mutex<()>,
    /// Capability warnings already published
    reclaim_warned: AtomicBool,
    heap_warned: AtomicBool,
}

impl LeakTester {
    /// Create a tester measuring the current process.
    pub fn new(config: TesterConfig) -> Result<Self> {
        Self::with_provider(config, Arc::new(ProcessMeasurementProvider::new()))
    }

    /// Create a tester with a specific measurement provider.
    ///
    /// Fails with [`LeakError::ConfigurationInvalid`] before any sampling
    /// if the configuration is invalid; otherwise takes the baseline.
    pub fn with_provider(
        config: TesterConfig,
        provider: Arc<dyn MeasurementProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let tester = Self {
            config,
            provider,
            analyzer: LeakAnalyzer::default(),
            store: SnapshotStore::new(),
            events: EventBus::new(),
            state: AtomicU8::new(RunState::Idle as u8),
            run_lock: Mutex::new(()),
            reclaim_warned: AtomicBool::new(false),
            heap_warned: AtomicBool::new(false),
        };

        let baseline = tester.baseline();
        info!(
            "Leak tester ready: {} iterations, sample every {}, threshold {:.2} MB, baseline heap {:.2} MB",
            tester.config.iterations,
            tester.config.snapshot_interval,
            tester.config.leak_threshold_mb,
            baseline.measurement().heap_used_mb()
        );
        Ok(tester)
    }

    /// Replace the leak decision policy
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: LeakAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn config(&self) -> &TesterConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    /// Immutable view of all snapshots taken so far.
    pub fn snapshots(&self) -> Arc<Vec<Snapshot>> {
        self.store.all()
    }

    /// Immutable view of the event log.
    pub fn event_log(&self) -> Arc<Vec<EventRecord>> {
        self.events.records()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Register a handler for one kind of event.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, handler)
    }

    /// The session baseline, sampled now if none exists yet.
    pub fn baseline(&self) -> Snapshot {
        match self.store.baseline() {
            Ok(baseline) => baseline,
            Err(err) => {
                debug!("{}, sampling baseline now", err);
                self.take_snapshot(BASELINE_LABEL)
            }
        }
    }

    /// Run every case for the configured iterations and analyze growth.
    pub async fn run_tests(&self, cases: &[WorkloadCase]) -> TestResult {
        self.run_tests_with_cancel(cases, &CancelToken::new()).await
    }

    /// Like [`run_tests`](Self::run_tests), stopping at the next iteration
    /// boundary once `cancel` is triggered.
    ///
    /// Always returns a result: failing cases are reported as `error`
    /// events and excluded from the rest of the run.
    pub async fn run_tests_with_cancel(
        &self,
        cases: &[WorkloadCase],
        cancel: &CancelToken,
    ) -> TestResult {
        let _lock = self.run_lock.lock().await;
        let _guard = RunGuard::enter(&self.state);
        self.baseline();

        let total = self.config.iterations;
        let interval = self.config.snapshot_interval;
        info!("Starting leak test: {} cases x {} iterations", cases.len(), total);

        let mut quarantined = vec![false; cases.len()];
        let mut completed = 0;
        let mut last_sampled = 0;
        let mut cancelled = false;

        for iteration in 1..=total {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            for (index, case) in cases.iter().enumerate() {
                if quarantined[index] {
                    continue;
                }
                if let Err(err) = self.run_case(case).await {
                    quarantined[index] = true;
                    self.report_failure(case, err);
                }
            }
            completed = iteration;

            if iteration % interval == 0 || iteration == total {
                self.take_snapshot(format!("iteration-{iteration}"));
                last_sampled = iteration;
            } else if self.config.verbose {
                info!("Iteration {}/{} complete", iteration, total);
            } else {
                debug!("Iteration {}/{} complete", iteration, total);
            }
        }

        if cancelled {
            warn!("Leak test cancelled after {} of {} iterations", completed, total);
            if completed > last_sampled {
                self.take_snapshot(format!("cancelled-{completed}"));
            }
            self.events.publish(Event::Warning {
                message: format!("Run cancelled after {completed} of {total} iterations"),
            });
        }

        self.finish(completed, cancelled)
    }

    /// Current sample plus the stored state. Never mutates the tester.
    pub fn get_memory_info(&self) -> MemoryInfo {
        MemoryInfo {
            current: self.provider.peek(),
            baseline: self.store.baseline().ok(),
            events: self.events.records().as_ref().clone(),
            snapshots: self.store.all().as_ref().clone(),
            state: self.state(),
        }
    }

    /// Discard all snapshots and events and take a fresh baseline.
    ///
    /// Waits for an in-flight run to finish first.
    pub async fn reset(&self) {
        let _lock = self.run_lock.lock().await;
        self.store.clear();
        self.events.clear_log();
        self.state.store(RunState::Idle as u8, Ordering::SeqCst);

        let baseline = self.baseline();
        info!(
            "Leak tester reset, new baseline heap {:.2} MB",
            baseline.measurement().heap_used_mb()
        );
    }

    async fn run_case(&self, case: &WorkloadCase) -> Result<()> {
        let failure = |reason: String| LeakError::WorkloadFailure {
            case: case.name().to_string(),
            reason,
        };

        case.execute().await.map_err(&failure)?;
        case.run_cleanup().map_err(failure)
    }

    fn report_failure(&self, case: &WorkloadCase, err: LeakError) {
        error!("{}; skipping case for the rest of the run", err);
        self.events.publish(Event::Error {
            case: Some(case.name().to_string()),
            message: err.to_string(),
        });
    }

    fn take_snapshot(&self, label: impl Into<String>) -> Snapshot {
        self.reclaim_if_enabled();
        if !self.provider.heap_figures_available() {
            self.warn_capability_once(
                &self.heap_warned,
                "heap figures unavailable, growth cannot be measured; install TrackingAllocator as the global allocator",
            );
        }
        let snapshot = self.store.append(label, self.provider.sample());

        if self.config.verbose {
            info!(
                "Snapshot #{} '{}': heap {:.2} MB, RSS {:.2} MB",
                snapshot.sequence_index(),
                snapshot.label(),
                snapshot.measurement().heap_used_mb(),
                snapshot.measurement().rss_mb()
            );
        } else {
            debug!(
                index = snapshot.sequence_index(),
                label = snapshot.label(),
                heap_used = snapshot.heap_used_bytes(),
                "Snapshot taken"
            );
        }

        self.events.publish(Event::Snapshot(snapshot.clone()));
        snapshot
    }

    fn reclaim_if_enabled(&self) {
        if !self.config.enable_gc || self.provider.try_force_reclaim() {
            return;
        }
        self.warn_capability_once(
            &self.reclaim_warned,
            "allocator does not support explicit collection; sampling without it",
        );
    }

    fn warn_capability_once(&self, flag: &AtomicBool, detail: &str) {
        if flag.swap(true, Ordering::SeqCst) {
            return;
        }

        let err = LeakError::CapabilityUnavailable(detail.to_string());
        warn!("{}", err);
        self.events.publish(Event::Warning {
            message: err.to_string(),
        });
    }

    fn finish(&self, completed: u32, cancelled: bool) -> TestResult {
        let snapshots = self.store.all();
        let threshold = self.config.leak_threshold_mb;
        let verdict = self.analyzer.evaluate(&snapshots, threshold);

        if verdict.has_leak {
            let message = format!(
                "Possible memory leak: heap grew {:.2} MB over baseline (threshold {:.2} MB, {:.0}% of intervals non-decreasing)",
                verdict.growth_mb,
                threshold,
                verdict.monotonicity * 100.0
            );
            warn!("{}", message);
            self.events.publish(Event::Warning { message });
        } else {
            info!(
                "No leak detected: heap grew {:.2} MB over {} samples",
                verdict.growth_mb, verdict.samples
            );
        }

        TestResult {
            has_leak: verdict.has_leak,
            memory_growth_mb: verdict.growth_mb,
            iterations: completed,
            snapshots: snapshots.as_ref().clone(),
            leak_threshold: threshold,
            monotonicity: verdict.monotonicity,
            cancelled,
        }
    }
}

impl std::fmt::Debug for LeakTester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeakTester")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("snapshots", &self.store.len())
            .finish_non_exhaustive()
    }
}
