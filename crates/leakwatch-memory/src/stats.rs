//! Allocation statistics collection.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Allocation counters maintained by the tracking allocator.
///
/// Every method is allocation-free so the counters can be updated from
/// inside `GlobalAlloc` itself.
#[derive(Debug, Default)]
pub struct MemoryStats {
    /// Bytes currently allocated and not yet freed
    pub live_bytes: AtomicUsize,
    /// High-water mark of `live_bytes`
    pub peak_bytes: AtomicUsize,
    /// Number of allocations served
    pub allocations: AtomicUsize,
}

impl MemoryStats {
    /// Create a zeroed stats tracker (usable in a `static`).
    pub const fn new() -> Self {
        Self {
            live_bytes: AtomicUsize::new(0),
            peak_bytes: AtomicUsize::new(0),
            allocations: AtomicUsize::new(0),
        }
    }

    /// Record an allocation.
    pub fn record_alloc(&self, size: usize) {
        self.allocations.fetch_add(1, Ordering::Relaxed);
        let new_live = self
            .live_bytes
            .fetch_add(size, Ordering::Relaxed)
            .saturating_add(size);
        self.raise_peak(new_live);
    }

    /// Record a deallocation.
    pub fn record_dealloc(&self, size: usize) {
        self.live_bytes.fetch_sub(size, Ordering::Relaxed);
    }

    /// Record an in-place or moving reallocation from `old_size` to `new_size`.
    pub fn record_realloc(&self, old_size: usize, new_size: usize) {
        if new_size >= old_size {
            let grown = new_size - old_size;
            let new_live = self
                .live_bytes
                .fetch_add(grown, Ordering::Relaxed)
                .saturating_add(grown);
            self.raise_peak(new_live);
        } else {
            self.live_bytes
                .fetch_sub(old_size - new_size, Ordering::Relaxed);
        }
    }

    fn raise_peak(&self, candidate: usize) {
        let mut peak = self.peak_bytes.load(Ordering::Relaxed);
        while candidate > peak {
            match self.peak_bytes.compare_exchange_weak(
                peak,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => peak = current,
            }
        }
    }

    /// Get current live bytes.
    pub fn live(&self) -> usize {
        self.live_bytes.load(Ordering::Relaxed)
    }

    /// Get peak live bytes.
    pub fn peak(&self) -> usize {
        self.peak_bytes.load(Ordering::Relaxed)
    }

    /// Get number of allocations served so far.
    pub fn allocation_count(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Format memory size for display.
    pub fn format_bytes(bytes: u64) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if bytes >= GB {
            format!("{:.2} GB", bytes as f64 / GB as f64)
        } else if bytes >= MB {
            format!("{:.2} MB", bytes as f64 / MB as f64)
        } else if bytes >= KB {
            format!("{:.2} KB", bytes as f64 / KB as f64)
        } else {
            format!("{} B", bytes)
        }
    }
}
