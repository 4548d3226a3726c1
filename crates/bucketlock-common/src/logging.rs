//! Logging bootstrap for processes embedding bucketlock.
//!
//! Coordinators only emit `tracing` events; this module installs a console
//! subscriber for binaries and test suites that want to see them.
//! `RUST_LOG` takes precedence over the configured level.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Console logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level used when `RUST_LOG` is not set
    pub level: Level,
    /// Include thread names (heartbeat and watch cycles run on worker threads)
    pub thread_names: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            thread_names: true,
        }
    }
}

impl LoggingConfig {
    /// Create from the `BUCKETLOCK_LOG_LEVEL` environment variable.
    pub fn from_env() -> Self {
        Self {
            level: parse_level(std::env::var(LOG_LEVEL_ENV).ok().as_deref()),
            ..Default::default()
        }
    }
}

const LOG_LEVEL_ENV: &str = "BUCKETLOCK_LOG_LEVEL";

/// Unset or unparsable values fall back to `INFO`
fn parse_level(value: Option<&str>) -> Level {
    value.and_then(|v| v.parse().ok()).unwrap_or(Level::INFO)
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already set, which callers running several
/// test cases in one process may ignore.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));
    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(config.thread_names)
        .with_filter(filter);

    Registry::default().with(console_layer).try_init()
}
