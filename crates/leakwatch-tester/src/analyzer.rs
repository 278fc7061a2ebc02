//! Growth analysis over a snapshot sequence.
//!
//! A leak verdict needs two things: heap growth over the baseline of at
//! least the configured threshold, and a sustained upward trend. The trend
//! is measured as the fraction of consecutive post-baseline sample pairs
//! whose heap-used value does not decrease; it must reach
//! [`MIN_MONOTONIC_FRACTION`]. A single allocation burst that happens to
//! land on the last sample therefore does not count as a leak unless the
//! samples before it were already climbing.

use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};

/// Minimum share of non-decreasing sample pairs for a leak verdict
pub const MIN_MONOTONIC_FRACTION: f64 = 0.5;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Outcome of one analysis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeakVerdict {
    pub has_leak: bool,
    /// Heap-used growth of the last sample over the baseline, in MB
    pub growth_mb: f64,
    /// Fraction of non-decreasing post-baseline pairs, in `[0, 1]`
    pub monotonicity: f64,
    /// Number of snapshots considered
    pub samples: usize,
}

impl LeakVerdict {
    fn insufficient(samples: usize) -> Self {
        Self {
            has_leak: false,
            growth_mb: 0.0,
            monotonicity: 0.0,
            samples,
        }
    }
}

/// Stateless leak decision policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeakAnalyzer {
    min_monotonic_fraction: f64,
}

impl Default for LeakAnalyzer {
    fn default() -> Self {
        Self {
            min_monotonic_fraction: MIN_MONOTONIC_FRACTION,
        }
    }
}

impl LeakAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different trend requirement
    #[must_use]
    pub fn with_min_monotonic_fraction(mut self, fraction: f64) -> Self {
        self.min_monotonic_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn min_monotonic_fraction(&self) -> f64 {
        self.min_monotonic_fraction
    }

    /// Decide whether `snapshots` (baseline first) show a leak.
    ///
    /// Fewer than two snapshots is not an error, just no evidence.
    pub fn evaluate(&self, snapshots: &[Snapshot], threshold_mb: f64) -> LeakVerdict {
        let (baseline, last) = match snapshots {
            [baseline, .., last] => (baseline, last),
            _ => return LeakVerdict::insufficient(snapshots.len()),
        };

        let growth_mb =
            (last.heap_used_bytes() as f64 - baseline.heap_used_bytes() as f64) / BYTES_PER_MB;
        let monotonicity = monotonicity(&snapshots[1..]);

        LeakVerdict {
            has_leak: growth_mb >= threshold_mb && monotonicity >= self.min_monotonic_fraction,
            growth_mb,
            monotonicity,
            samples: snapshots.len(),
        }
    }
}

/// Fraction of consecutive pairs in `samples` whose heap-used value is
/// non-decreasing. With fewer than two samples there are no pairs and the
/// lone sample is its own trend, so the result is 1.0.
pub fn monotonicity(samples: &[Snapshot]) -> f64 {
    let pairs = samples.len().saturating_sub(1);
    if pairs == 0 {
        return 1.0;
    }

    let rising = samples
        .windows(2)
        .filter(|pair| pair[1].heap_used_bytes() >= pair[0].heap_used_bytes())
        .count();

    rising as f64 / pairs as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotStore;
    use leakwatch_memory::MemoryMeasurement;

    const MB: u64 = 1024 * 1024;

    /// Build snapshots whose heap-used values are the given MB figures.
    fn series(heap_mb: &[u64]) -> Vec<Snapshot> {
        let store = SnapshotStore::new();
        for (i, mb) in heap_mb.iter().enumerate() {
            store.append(format!("s{i}"), MemoryMeasurement::new(0, 0, mb * MB, 0));
        }
        store.all().as_ref().clone()
    }

    #[test]
    fn test_insufficient_data() {
        let analyzer = LeakAnalyzer::new();

        let verdict = analyzer.evaluate(&[], 1.0);
        assert!(!verdict.has_leak);
        assert_eq!(verdict.growth_mb, 0.0);

        let verdict = analyzer.evaluate(&series(&[50]), 1.0);
        assert!(!verdict.has_leak);
        assert_eq!(verdict.growth_mb, 0.0);
        assert_eq!(verdict.samples, 1);
    }

    #[test]
    fn test_monotonic_growth_over_threshold() {
        let verdict = LeakAnalyzer::new().evaluate(&series(&[0, 20, 40]), 30.0);

        assert!(verdict.has_leak);
        assert!((verdict.growth_mb - 40.0).abs() < 1e-9);
        assert_eq!(verdict.monotonicity, 1.0);
    }

    #[test]
    fn test_growth_under_threshold() {
        let verdict = LeakAnalyzer::new().evaluate(&series(&[0, 5, 10]), 30.0);

        assert!(!verdict.has_leak);
        assert!((verdict.growth_mb - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_net_growth() {
        for threshold in [0.001, 1.0, 100.0] {
            let verdict = LeakAnalyzer::new().evaluate(&series(&[8, 30, 8, 30, 8]), threshold);
            assert!(!verdict.has_leak);
            assert_eq!(verdict.growth_mb, 0.0);
        }
    }

    #[test]
    fn test_transient_spike() {
        let verdict = LeakAnalyzer::new().evaluate(&series(&[0, 0, 0, 45, 0]), 30.0);

        assert!(!verdict.has_leak);
        assert_eq!(verdict.growth_mb, 0.0);
    }

    #[test]
    fn test_burst_then_settle_is_not_a_trend() {
        // Final sample is over threshold, but the samples before it fell.
        let verdict = LeakAnalyzer::new().evaluate(&series(&[0, 40, 5, 2, 35]), 30.0);

        assert!(verdict.growth_mb >= 30.0);
        assert!(verdict.monotonicity < MIN_MONOTONIC_FRACTION);
        assert!(!verdict.has_leak);
    }

    #[test]
    fn test_single_post_baseline_sample() {
        let verdict = LeakAnalyzer::new().evaluate(&series(&[0, 12]), 10.0);

        assert_eq!(verdict.monotonicity, 1.0);
        assert!(verdict.has_leak);
    }

    #[test]
    fn test_shrinking_heap_is_negative_growth() {
        let verdict = LeakAnalyzer::new().evaluate(&series(&[20, 15, 10]), 1.0);

        assert!((verdict.growth_mb + 10.0).abs() < 1e-9);
        assert!(!verdict.has_leak);
    }

    #[test]
    fn test_custom_trend_requirement() {
        let snapshots = series(&[0, 40, 5, 2, 35]);
        let lenient = LeakAnalyzer::new().with_min_monotonic_fraction(0.25);

        assert!(lenient.evaluate(&snapshots, 30.0).has_leak);
        assert_eq!(
            LeakAnalyzer::new().with_min_monotonic_fraction(2.0).min_monotonic_fraction(),
            1.0
        );
    }

    #[test]
    fn test_monotonicity_counts_equal_pairs() {
        let samples = series(&[3, 3, 4, 2]);
        assert!((monotonicity(&samples) - 2.0 / 3.0).abs() < 1e-9);
    }
}
