//! Fake measurement providers shared by the unit tests.

use leakwatch_memory::{MeasurementProvider, MemoryMeasurement};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

pub const MB: u64 = 1024 * 1024;

/// Provider reporting a heap figure that workloads move by hand.
#[derive(Debug)]
pub struct SimulatedHeap {
    heap_used: AtomicU64,
    reclaim_supported: bool,
    heap_tracked: bool,
    reclaims: AtomicUsize,
    samples: AtomicUsize,
    peeks: AtomicUsize,
}

impl SimulatedHeap {
    pub fn new(reclaim_supported: bool) -> Arc<Self> {
        Self::build(reclaim_supported, true)
    }

    /// Provider without heap figures: heap fields always read zero.
    pub fn untracked() -> Arc<Self> {
        Self::build(true, false)
    }

    fn build(reclaim_supported: bool, heap_tracked: bool) -> Arc<Self> {
        Arc::new(Self {
            heap_used: AtomicU64::new(0),
            reclaim_supported,
            heap_tracked,
            reclaims: AtomicUsize::new(0),
            samples: AtomicUsize::new(0),
            peeks: AtomicUsize::new(0),
        })
    }

    pub fn grow(&self, bytes: u64) {
        self.heap_used.fetch_add(bytes, Ordering::SeqCst);
    }

    pub fn set(&self, bytes: u64) {
        self.heap_used.store(bytes, Ordering::SeqCst);
    }

    pub fn reclaims(&self) -> usize {
        self.reclaims.load(Ordering::SeqCst)
    }

    pub fn samples(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }

    pub fn peeks(&self) -> usize {
        self.peeks.load(Ordering::SeqCst)
    }

    fn reading(&self) -> MemoryMeasurement {
        let heap = if self.heap_tracked {
            self.heap_used.load(Ordering::SeqCst)
        } else {
            0
        };
        MemoryMeasurement::new(heap + 8 * MB, heap, heap, 8 * MB)
    }
}

impl MeasurementProvider for SimulatedHeap {
    fn sample(&self) -> MemoryMeasurement {
        self.samples.fetch_add(1, Ordering::SeqCst);
        self.reading()
    }

    fn heap_figures_available(&self) -> bool {
        self.heap_tracked
    }

    fn peek(&self) -> MemoryMeasurement {
        self.peeks.fetch_add(1, Ordering::SeqCst);
        self.reading()
    }

    fn try_force_reclaim(&self) -> bool {
        if self.reclaim_supported {
            self.reclaims.fetch_add(1, Ordering::SeqCst);
        }
        self.reclaim_supported
    }
}
