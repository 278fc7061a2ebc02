//! Built-in workload scenarios for the command line tester.

use anyhow::anyhow;
use clap::ValueEnum;
use leakwatch_tester::{TesterConfig, WorkloadCase};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Bytes retained per call by the leaking scenario
pub const LEAK_CHUNK_BYTES: usize = 512 * 1024;

/// Bytes allocated and released per call by the steady scenario
pub const STEADY_CHUNK_BYTES: usize = 256 * 1024;

/// Size of the single transient burst
pub const SPIKE_BYTES: usize = 64 * 1024 * 1024;

/// Workload shapes the CLI can exercise
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Retains a chunk on every call
    Leak,
    /// Allocates and frees on every call
    Steady,
    /// One large burst, released on the following call
    Spike,
    /// An always-failing case next to a steady one
    Failing,
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leak => write!(f, "leak"),
            Self::Steady => write!(f, "steady"),
            Self::Spike => write!(f, "spike"),
            Self::Failing => write!(f, "failing"),
        }
    }
}

/// Workload cases for `scenario` under `config`.
pub fn build(scenario: Scenario, config: &TesterConfig) -> Vec<WorkloadCase> {
    match scenario {
        Scenario::Leak => vec![retaining()],
        Scenario::Steady => vec![steady()],
        Scenario::Spike => vec![spike(spike_iteration(config))],
        Scenario::Failing => vec![failing(), steady()],
    }
}

/// Iteration carrying the burst. Lands on the first sampled iteration when
/// a later sample exists to show it was released.
fn spike_iteration(config: &TesterConfig) -> u32 {
    if config.snapshot_interval < config.iterations {
        config.snapshot_interval
    } else {
        (config.iterations / 2).max(1)
    }
}

fn retaining() -> WorkloadCase {
    let retained: Arc<Mutex<Vec<Vec<u8>>>> = Arc::default();
    WorkloadCase::new("retain-chunk", move || {
        let retained = retained.clone();
        async move {
            let chunk = vec![0xA5; LEAK_CHUNK_BYTES];
            retained
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(chunk);
            tokio::task::yield_now().await;
            Ok(())
        }
    })
}

fn steady() -> WorkloadCase {
    WorkloadCase::new("alloc-and-free", || async {
        let buffer = vec![0x5A_u8; STEADY_CHUNK_BYTES];
        let checksum = buffer
            .iter()
            .fold(0u64, |acc, byte| acc.wrapping_add(u64::from(*byte)));
        tokio::task::yield_now().await;
        std::hint::black_box(checksum);
        Ok(())
    })
}

fn spike(at: u32) -> WorkloadCase {
    let calls = Arc::new(AtomicU32::new(0));
    let burst: Arc<Mutex<Option<Vec<u8>>>> = Arc::default();
    WorkloadCase::new("transient-burst", move || {
        let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
        let burst = burst.clone();
        async move {
            *burst.lock().unwrap_or_else(PoisonError::into_inner) =
                (call == at).then(|| vec![0x3C; SPIKE_BYTES]);
            Ok(())
        }
    })
}

fn failing() -> WorkloadCase {
    WorkloadCase::new("unreachable-backend", || async {
        Err(anyhow!("connection refused by simulated backend"))
    })
}
