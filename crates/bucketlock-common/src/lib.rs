//! bucketlock Common - Shared configuration, errors and logging
//!
//! This crate provides the foundational pieces used across all bucketlock components:
//! - Lease configuration and its loader
//! - Configuration error types
//! - Logging bootstrap

pub mod settings;
pub mod error;
pub mod logging;

// Re-exports for convenience
pub use settings::LeaseConfig;
pub use error::ConfigError;
pub use logging::{LoggingConfig, init_logging};

/// Default key prefix for lease markers
pub const DEFAULT_ACCESS_FILE_PREFIX: &str = "ACCESS_FILE_";

/// Default poll interval while waiting for single access (milliseconds)
pub const DEFAULT_CHECK_INTERVAL_FOR_SINGLE_ACCESS_MS: u64 = 1000;

/// Default poll interval of the termination watch cycle (milliseconds)
pub const DEFAULT_CHECK_INTERVAL_FOR_TERMINATE_ACCESS_MS: u64 = 1000;

/// Default heartbeat interval for a held token (milliseconds)
pub const DEFAULT_KEEP_ALIVE_INTERVAL_MS: u64 = 1000;

/// Largest accepted interval or staleness threshold (one week, milliseconds)
pub const MAX_INTERVAL_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Environment variable prefix used by [`LeaseConfig::load`]
pub const ENV_PREFIX: &str = "BUCKETLOCK";
