//! Counting global allocator backed by mimalloc.
//!
//! Install it in the binary to get heap figures in every sample:
//!
//! ```rust,ignore
//! #[global_allocator]
//! static GLOBAL: leakwatch_memory::TrackingAllocator = leakwatch_memory::TrackingAllocator;
//! ```
//!
//! Without it, heap fields of a measurement read as zero and explicit
//! collection reports itself unavailable.

use crate::stats::MemoryStats;
use mimalloc::MiMalloc;
use std::alloc::{GlobalAlloc, Layout};
use tracing::debug;

static HEAP_STATS: MemoryStats = MemoryStats::new();

/// Global allocator that forwards to mimalloc and keeps [`MemoryStats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackingAllocator;

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { MiMalloc.alloc(layout) };
        if !ptr.is_null() {
            HEAP_STATS.record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { MiMalloc.alloc_zeroed(layout) };
        if !ptr.is_null() {
            HEAP_STATS.record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { MiMalloc.dealloc(ptr, layout) };
        HEAP_STATS.record_dealloc(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { MiMalloc.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            HEAP_STATS.record_realloc(layout.size(), new_size);
        }
        new_ptr
    }
}

/// Process-wide counters fed by [`TrackingAllocator`].
pub fn heap_stats() -> &'static MemoryStats {
    &HEAP_STATS
}

/// Whether the tracking allocator is serving this process's allocations.
pub fn is_tracking_active() -> bool {
    HEAP_STATS.allocation_count() > 0
}

/// Force mimalloc to collect and return freed pages to the OS.
///
/// Returns `false` without doing anything when the tracking allocator is
/// not installed, since mimalloc then owns none of the process heap.
pub fn collect() -> bool {
    if !is_tracking_active() {
        debug!("Tracking allocator inactive, skipping mi_collect");
        return false;
    }
    unsafe { libmimalloc_sys::mi_collect(true) };
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_alloc_is_counted() {
        let layout = Layout::from_size_align(4096, 8).unwrap();
        let before = heap_stats().allocation_count();

        let ptr = unsafe { TrackingAllocator.alloc(layout) };
        assert!(!ptr.is_null());
        assert!(heap_stats().allocation_count() > before);
        assert!(is_tracking_active());
        assert!(heap_stats().peak() >= 4096);

        unsafe { TrackingAllocator.dealloc(ptr, layout) };
    }

    #[test]
    fn test_realloc_preserves_contents() {
        let layout = Layout::from_size_align(16, 8).unwrap();
        unsafe {
            let ptr = TrackingAllocator.alloc_zeroed(layout);
            assert!(!ptr.is_null());
            *ptr = 42;

            let grown = TrackingAllocator.realloc(ptr, layout, 1024);
            assert!(!grown.is_null());
            assert_eq!(*grown, 42);

            TrackingAllocator.dealloc(grown, Layout::from_size_align(1024, 8).unwrap());
        }
    }

    #[test]
    fn test_collect_when_active() {
        // The test binary installs the tracking allocator (see lib.rs).
        let _warm = vec![0u8; 128];
        assert!(collect());
    }
}
