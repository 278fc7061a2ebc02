//! Explicit reclamation statistics
//!
//! Tracks how often a provider forced the allocator to return memory and
//! how long the caller was paused for it.

use std::time::Duration;

/// Reclamation run statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    /// Passes actually performed
    pub total_runs: u64,
    /// Requests that could not be honoured
    pub unavailable: u64,
    /// Total pause time
    pub total_pause_time: Duration,
    /// Longest pause
    pub max_pause_time: Duration,
    /// Resident bytes released, as seen by RSS before and after each pass
    pub total_released: u64,
}

impl ReclaimStats {
    /// Record a completed pass
    pub fn record(&mut self, released: u64, pause_time: Duration) {
        self.total_runs += 1;
        self.total_released = self.total_released.saturating_add(released);
        self.total_pause_time += pause_time;

        if pause_time > self.max_pause_time {
            self.max_pause_time = pause_time;
        }
    }

    /// Record a request that found no reclamation capability
    pub fn record_unavailable(&mut self) {
        self.unavailable += 1;
    }

    /// Average pause time
    pub fn average_pause(&self) -> Duration {
        if self.total_runs == 0 {
            Duration::ZERO
        } else {
            self.total_pause_time / self.total_runs as u32
        }
    }

    /// Format as human-readable string
    pub fn format(&self) -> String {
        format!(
            "Reclaim: {} runs ({} unavailable), {:.2}ms avg pause, {:.2}MB released",
            self.total_runs,
            self.unavailable,
            self.average_pause().as_secs_f64() * 1000.0,
            self.total_released as f64 / (1024.0 * 1024.0)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_runs() {
        let mut stats = ReclaimStats::default();
        assert_eq!(stats.average_pause(), Duration::ZERO);

        stats.record(1024, Duration::from_millis(4));
        stats.record(0, Duration::from_millis(2));
        stats.record_unavailable();

        assert_eq!(stats.total_runs, 2);
        assert_eq!(stats.unavailable, 1);
        assert_eq!(stats.max_pause_time, Duration::from_millis(4));
        assert_eq!(stats.average_pause(), Duration::from_millis(3));
        assert_eq!(stats.total_released, 1024);
    }

    #[test]
    fn test_format() {
        let mut stats = ReclaimStats::default();
        stats.record(2 * 1024 * 1024, Duration::from_millis(10));
        assert_eq!(
            stats.format(),
            "Reclaim: 1 runs (0 unavailable), 10.00ms avg pause, 2.00MB released"
        );
    }
}
