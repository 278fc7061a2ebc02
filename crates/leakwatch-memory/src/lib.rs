//! leakwatch memory measurement
//!
//! Reads process memory for the leak tester: resident set size from the
//! OS and live heap figures from a counting allocator layered over
//! mimalloc. Explicit reclamation is a capability of that allocator and
//! is reported, not assumed.

mod provider;
mod reclaim;
mod stats;
mod tracking;

pub use provider::{MeasurementProvider, MemoryMeasurement, ProcessMeasurementProvider};
pub use reclaim::ReclaimStats;
pub use stats::MemoryStats;
pub use tracking::{collect, heap_stats, is_tracking_active, TrackingAllocator};

#[cfg(test)]
#[global_allocator]
static TEST_ALLOCATOR: TrackingAllocator = TrackingAllocator;
