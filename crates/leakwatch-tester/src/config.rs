//! Leak Tester Configuration
//!
//! Run parameters for one tester instance. Built in code or loaded from a
//! TOML file; missing keys fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of iterations per run
pub const DEFAULT_ITERATIONS: u32 = 100;

/// Default iterations between samples
pub const DEFAULT_SNAPSHOT_INTERVAL: u32 = 10;

/// Default leak threshold in MB
pub const DEFAULT_LEAK_THRESHOLD_MB: f64 = 10.0;

/// Complete leak tester configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesterConfig {
    /// How many times each workload case is invoked
    pub iterations: u32,

    /// Iterations between samples (the final iteration is always sampled)
    pub snapshot_interval: u32,

    /// Heap growth over the baseline, in MB, at which a sustained trend
    /// counts as a leak
    pub leak_threshold_mb: f64,

    /// Log every sample and iteration at info level
    pub verbose: bool,

    /// Request explicit reclamation before every sample
    pub enable_gc: bool,
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            leak_threshold_mb: DEFAULT_LEAK_THRESHOLD_MB,
            verbose: false,
            enable_gc: true,
        }
    }
}

impl TesterConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Set the iteration count
    #[must_use]
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the sampling interval
    #[must_use]
    pub fn with_snapshot_interval(mut self, interval: u32) -> Self {
        self.snapshot_interval = interval;
        self
    }

    /// Set the leak threshold
    #[must_use]
    pub fn with_leak_threshold_mb(mut self, threshold: f64) -> Self {
        self.leak_threshold_mb = threshold;
        self
    }

    /// Enable or disable verbose logging
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Enable or disable explicit reclamation before samples
    #[must_use]
    pub fn with_gc(mut self, enable_gc: bool) -> Self {
        self.enable_gc = enable_gc;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if self.snapshot_interval == 0 {
            return Err(ConfigError::ZeroSnapshotInterval);
        }
        if self.snapshot_interval > self.iterations {
            return Err(ConfigError::IntervalExceedsIterations {
                interval: self.snapshot_interval,
                iterations: self.iterations,
            });
        }
        if !self.leak_threshold_mb.is_finite() || self.leak_threshold_mb <= 0.0 {
            return Err(ConfigError::InvalidThreshold(self.leak_threshold_mb));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Iterations must be positive")]
    ZeroIterations,

    #[error("Snapshot interval must be positive")]
    ZeroSnapshotInterval,

    #[error("Snapshot interval ({interval}) cannot exceed iterations ({iterations})")]
    IntervalExceedsIterations { interval: u32, iterations: u32 },

    #[error("Leak threshold must be a positive number of MB, got {0}")]
    InvalidThreshold(f64),

    #[error("Failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TesterConfig::default();

        assert_eq!(config.iterations, 100);
        assert_eq!(config.snapshot_interval, 10);
        assert!(config.enable_gc);
        assert!(!config.verbose);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = TesterConfig::default().with_iterations(0);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroIterations)));

        let config = TesterConfig::default().with_snapshot_interval(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroSnapshotInterval)
        ));

        let config = TesterConfig::default()
            .with_iterations(5)
            .with_snapshot_interval(10);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IntervalExceedsIterations { interval: 10, iterations: 5 })
        ));

        for threshold in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = TesterConfig::default().with_leak_threshold_mb(threshold);
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidThreshold(_))
            ));
        }
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = TesterConfig::from_toml_str(
            r#"
            iterations = 20
            leak_threshold_mb = 2.5
            verbose = true
            "#,
        )
        .unwrap();

        assert_eq!(config.iterations, 20);
        assert_eq!(config.snapshot_interval, DEFAULT_SNAPSHOT_INTERVAL);
        assert_eq!(config.leak_threshold_mb, 2.5);
        assert!(config.verbose);
        assert!(config.enable_gc);
    }

    #[test]
    fn test_toml_rejects_invalid_values() {
        let err = TesterConfig::from_toml_str("snapshot_interval = 0").unwrap_err();
        assert!(matches!(err, ConfigError::ZeroSnapshotInterval));

        let err = TesterConfig::from_toml_str("iterations = -3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = TesterConfig::load("/nonexistent/leakwatch.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/leakwatch.toml"));
    }
}
