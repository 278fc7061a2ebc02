//! Leak tester error taxonomy.
//!
//! Only [`LeakError::ConfigurationInvalid`] is ever returned to callers;
//! the other variants are recovered internally or reported as events.

use crate::config::ConfigError;

/// Errors raised by the leak tester
#[derive(Debug, thiserror::Error)]
pub enum LeakError {
    #[error("No baseline snapshot has been recorded")]
    NotInitialized,

    #[error("Workload '{case}' failed: {reason}")]
    WorkloadFailure { case: String, reason: String },

    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, LeakError>;
