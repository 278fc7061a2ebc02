//! Process memory measurement
//!
//! A [`MeasurementProvider`] reads the current process's memory figures and
//! can optionally ask the allocator for an explicit reclamation pass first.
//! Sampling never fails: figures that cannot be read are reported as zero.

use crate::reclaim::ReclaimStats;
use crate::tracking;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{debug, info};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One reading of process memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMeasurement {
    /// Resident set size
    pub resident_set_size_bytes: u64,
    /// High-water mark of the tracked heap
    pub heap_total_bytes: u64,
    /// Live bytes on the tracked heap
    pub heap_used_bytes: u64,
    /// Resident memory not accounted for by the tracked heap
    pub external_bytes: u64,
    /// When the reading was taken
    pub taken_at: DateTime<Utc>,
}

impl MemoryMeasurement {
    /// Build a measurement stamped with the current time.
    pub fn new(
        resident_set_size_bytes: u64,
        heap_total_bytes: u64,
        heap_used_bytes: u64,
        external_bytes: u64,
    ) -> Self {
        Self {
            resident_set_size_bytes,
            heap_total_bytes,
            heap_used_bytes,
            external_bytes,
            taken_at: Utc::now(),
        }
    }

    /// A measurement with every figure unavailable.
    pub fn zeroed() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Heap used in megabytes
    pub fn heap_used_mb(&self) -> f64 {
        self.heap_used_bytes as f64 / BYTES_PER_MB
    }

    /// RSS in megabytes
    pub fn rss_mb(&self) -> f64 {
        self.resident_set_size_bytes as f64 / BYTES_PER_MB
    }
}

/// Source of memory measurements.
pub trait MeasurementProvider: Send + Sync {
    /// Read current memory figures. Never fails.
    fn sample(&self) -> MemoryMeasurement;

    /// Attempt an explicit reclamation pass.
    ///
    /// Returns whether a pass was actually performed; `false` means the
    /// environment lacks the capability, which is not an error.
    fn try_force_reclaim(&self) -> bool;

    /// Whether the heap fields of a measurement are real figures. When
    /// `false` they read as zero and growth cannot be observed.
    fn heap_figures_available(&self) -> bool;

    /// Reading for observers outside the sampling loop. Must not wait on
    /// a concurrent [`sample`](Self::sample) or reclamation pass.
    fn peek(&self) -> MemoryMeasurement {
        self.sample()
    }
}

impl<P: MeasurementProvider + ?Sized> MeasurementProvider for Arc<P> {
    fn sample(&self) -> MemoryMeasurement {
        (**self).sample()
    }

    fn try_force_reclaim(&self) -> bool {
        (**self).try_force_reclaim()
    }

    fn heap_figures_available(&self) -> bool {
        (**self).heap_figures_available()
    }

    fn peek(&self) -> MemoryMeasurement {
        (**self).peek()
    }
}

/// Measures the current process: RSS from the OS, heap figures from the
/// [`TrackingAllocator`](crate::TrackingAllocator) when it is installed.
pub struct ProcessMeasurementProvider {
    /// Used by `sample` and reclamation passes
    system: Mutex<System>,
    /// Used by `peek`, so observers never queue behind the sampling loop
    observer_system: Mutex<System>,
    pid: Pid,
    reclaim_stats: Mutex<ReclaimStats>,
}

impl ProcessMeasurementProvider {
    /// Create a provider for the current process.
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            observer_system: Mutex::new(System::new()),
            pid: Pid::from_u32(std::process::id()),
            reclaim_stats: Mutex::new(ReclaimStats::default()),
        }
    }

    /// Read RSS in bytes, or 0 if the process cannot be inspected.
    pub fn read_rss(&self) -> u64 {
        self.read_rss_with(&self.system)
    }

    fn read_rss_with(&self, system: &Mutex<System>) -> u64 {
        let mut system = system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );

        match system.process(self.pid) {
            Some(process) => process.memory(),
            None => {
                debug!(pid = %self.pid, "Process not visible to sysinfo, reporting zero RSS");
                0
            }
        }
    }

    /// Statistics of reclamation passes requested so far.
    pub fn reclaim_stats(&self) -> ReclaimStats {
        self.reclaim_stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for ProcessMeasurementProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Combine an RSS reading with the tracked heap counters.
fn measurement_with_rss(rss: u64) -> MemoryMeasurement {
    let (heap_used, heap_total) = if tracking::is_tracking_active() {
        let stats = tracking::heap_stats();
        (stats.live() as u64, stats.peak() as u64)
    } else {
        (0, 0)
    };

    MemoryMeasurement::new(rss, heap_total, heap_used, rss.saturating_sub(heap_used))
}

impl MeasurementProvider for ProcessMeasurementProvider {
    fn sample(&self) -> MemoryMeasurement {
        measurement_with_rss(self.read_rss())
    }

    fn heap_figures_available(&self) -> bool {
        tracking::is_tracking_active()
    }

    fn peek(&self) -> MemoryMeasurement {
        measurement_with_rss(self.read_rss_with(&self.observer_system))
    }

    fn try_force_reclaim(&self) -> bool {
        let before = self.read_rss();
        let started = Instant::now();

        if !tracking::collect() {
            self.reclaim_stats
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record_unavailable();
            return false;
        }

        let pause = started.elapsed();
        let released = before.saturating_sub(self.read_rss());
        self.reclaim_stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(released, pause);

        info!(
            "Reclaim complete: released {:.2}MB in {:.2}ms",
            released as f64 / BYTES_PER_MB,
            pause.as_secs_f64() * 1000.0
        );
        true
    }
}
