//! leakwatch Leak Tester
//!
//! Drives async workloads repeatedly and detects sustained heap growth:
//! - Snapshot store with immutable, concurrently readable views
//! - Trend-based leak analysis over snapshot sequences
//! - Typed event bus for warnings, errors and snapshots
//! - Workload isolation: a failing case never aborts the run

mod analyzer;
mod cancel;
mod config;
mod error;
mod events;
mod snapshot;
mod tester;
mod workload;

#[cfg(test)]
mod test_support;

pub use analyzer::{LeakAnalyzer, LeakVerdict, MIN_MONOTONIC_FRACTION, monotonicity};
pub use cancel::CancelToken;
pub use config::{
    ConfigError, DEFAULT_ITERATIONS, DEFAULT_LEAK_THRESHOLD_MB, DEFAULT_SNAPSHOT_INTERVAL,
    TesterConfig,
};
pub use error::{LeakError, Result};
pub use events::{Event, EventBus, EventHandler, EventKind, EventRecord, SubscriptionId};
pub use snapshot::{Snapshot, SnapshotStore};
pub use tester::{LeakTester, MemoryInfo, RunState, TestResult};
pub use workload::{WorkloadCase, WorkloadFuture};

pub use leakwatch_memory::{MeasurementProvider, MemoryMeasurement, ProcessMeasurementProvider};
