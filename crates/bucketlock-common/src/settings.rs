//! Lease configuration
//!
//! Holds the namespace and timing knobs shared by every coordinator that
//! contends for the same bucket. Values can be built in code or loaded from a
//! file plus `BUCKETLOCK__*` environment variables.

use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::{
    DEFAULT_ACCESS_FILE_PREFIX, DEFAULT_CHECK_INTERVAL_FOR_SINGLE_ACCESS_MS,
    DEFAULT_CHECK_INTERVAL_FOR_TERMINATE_ACCESS_MS, DEFAULT_KEEP_ALIVE_INTERVAL_MS, ENV_PREFIX,
    MAX_INTERVAL_MS,
};

/// Configuration for a lease coordinator
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LeaseConfig {
    /// Key prefix under which lease markers are written
    #[serde(default = "default_access_file_prefix")]
    pub access_file_prefix: String,
    /// Bucket (or container) holding the markers
    pub bucket: String,
    /// Poll interval while waiting for a free lease
    #[serde(default = "default_single_access_interval")]
    pub check_interval_for_single_access_ms: u64,
    /// Poll interval of the termination watch cycle
    #[serde(default = "default_terminate_access_interval")]
    pub check_interval_for_terminate_access_ms: u64,
    /// Heartbeat interval for a held token
    #[serde(default = "default_keep_alive_interval")]
    pub keep_alive_interval_ms: u64,
    /// Age after which a marker is considered abandoned.
    /// Derived from the heartbeat interval when unset.
    #[serde(default)]
    pub staleness_threshold_ms: Option<u64>,
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn default_access_file_prefix() -> String {
    DEFAULT_ACCESS_FILE_PREFIX.to_string()
}

fn default_single_access_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_FOR_SINGLE_ACCESS_MS
}

fn default_terminate_access_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_FOR_TERMINATE_ACCESS_MS
}

fn default_keep_alive_interval() -> u64 {
    DEFAULT_KEEP_ALIVE_INTERVAL_MS
}

impl LeaseConfig {
    /// Create a configuration for `bucket` with default prefix and intervals
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            access_file_prefix: default_access_file_prefix(),
            bucket: bucket.into(),
            check_interval_for_single_access_ms: default_single_access_interval(),
            check_interval_for_terminate_access_ms: default_terminate_access_interval(),
            keep_alive_interval_ms: default_keep_alive_interval(),
            staleness_threshold_ms: None,
        }
    }

    /// Load configuration from an optional file, overlaid with environment
    /// variables such as `BUCKETLOCK__BUCKET` or `BUCKETLOCK__KEEP_ALIVE_INTERVAL_MS`.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: LeaseConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_access_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.access_file_prefix = prefix.into();
        self
    }

    pub fn with_check_interval_for_single_access(mut self, interval: Duration) -> Self {
        self.check_interval_for_single_access_ms = saturating_millis(interval);
        self
    }

    pub fn with_check_interval_for_terminate_access(mut self, interval: Duration) -> Self {
        self.check_interval_for_terminate_access_ms = saturating_millis(interval);
        self
    }

    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval_ms = saturating_millis(interval);
        self
    }

    pub fn with_staleness_threshold(mut self, threshold: Duration) -> Self {
        self.staleness_threshold_ms = Some(saturating_millis(threshold));
        self
    }

    pub fn check_interval_for_single_access(&self) -> Duration {
        Duration::from_millis(self.check_interval_for_single_access_ms)
    }

    pub fn check_interval_for_terminate_access(&self) -> Duration {
        Duration::from_millis(self.check_interval_for_terminate_access_ms)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    /// Age after which an unrenewed marker may be reaped.
    ///
    /// Defaults to two missed heartbeats plus one millisecond.
    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_millis(self.staleness_threshold_millis())
    }

    fn staleness_threshold_millis(&self) -> u64 {
        self.staleness_threshold_ms.unwrap_or_else(|| {
            self.keep_alive_interval_ms
                .checked_mul(2)
                .and_then(|ms| ms.checked_add(1))
                .unwrap_or(u64::MAX)
        })
    }

    /// Check the invariants every coordinator relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_file_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "access_file_prefix must not be empty".to_string(),
            ));
        }
        if self.bucket.is_empty() {
            return Err(ConfigError::Invalid("bucket must not be empty".to_string()));
        }
        if self.check_interval_for_single_access_ms == 0
            || self.check_interval_for_terminate_access_ms == 0
            || self.keep_alive_interval_ms == 0
        {
            return Err(ConfigError::Invalid(
                "intervals must be greater than zero".to_string(),
            ));
        }
        for (name, ms) in [
            (
                "check_interval_for_single_access_ms",
                self.check_interval_for_single_access_ms,
            ),
            (
                "check_interval_for_terminate_access_ms",
                self.check_interval_for_terminate_access_ms,
            ),
            ("keep_alive_interval_ms", self.keep_alive_interval_ms),
            ("staleness_threshold_ms", self.staleness_threshold_millis()),
        ] {
            if ms > MAX_INTERVAL_MS {
                return Err(ConfigError::Invalid(format!(
                    "{} ({}) exceeds the maximum of {} ms",
                    name, ms, MAX_INTERVAL_MS
                )));
            }
        }
        if self.keep_alive_interval() >= self.staleness_threshold() {
            return Err(ConfigError::Invalid(format!(
                "keep_alive_interval_ms ({}) must be below the staleness threshold ({} ms)",
                self.keep_alive_interval_ms,
                self.staleness_threshold().as_millis()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = LeaseConfig::new("bucket");
        assert_eq!(config.access_file_prefix, "ACCESS_FILE_");
        assert_eq!(config.check_interval_for_single_access(), Duration::from_secs(1));
        assert_eq!(config.check_interval_for_terminate_access(), Duration::from_secs(1));
        assert_eq!(config.keep_alive_interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_derived_staleness_threshold() {
        let config = LeaseConfig::new("bucket").with_keep_alive_interval(Duration::from_millis(100));
        assert_eq!(config.staleness_threshold(), Duration::from_millis(201));

        let config = config.with_staleness_threshold(Duration::from_millis(500));
        assert_eq!(config.staleness_threshold(), Duration::from_millis(500));
    }

    #[test]
    fn test_validate_rejects_short_staleness() {
        let config = LeaseConfig::new("bucket")
            .with_keep_alive_interval(Duration::from_millis(100))
            .with_staleness_threshold(Duration::from_millis(100));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_huge_staleness_threshold() {
        let config = LeaseConfig::new("bucket")
            .with_staleness_threshold(Duration::from_millis(u64::MAX));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = LeaseConfig::new("bucket")
            .with_staleness_threshold(Duration::from_millis(MAX_INTERVAL_MS + 1));
        assert!(config.validate().is_err());

        let config = LeaseConfig::new("bucket")
            .with_staleness_threshold(Duration::from_millis(MAX_INTERVAL_MS));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_huge_keep_alive_interval_does_not_overflow() {
        let config = LeaseConfig {
            keep_alive_interval_ms: u64::MAX,
            ..LeaseConfig::new("bucket")
        };
        assert_eq!(config.staleness_threshold(), Duration::from_millis(u64::MAX));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = LeaseConfig::new("bucket").with_keep_alive_interval(Duration::MAX);
        assert_eq!(config.keep_alive_interval_ms, u64::MAX);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        assert!(LeaseConfig::new("").validate().is_err());
        assert!(
            LeaseConfig::new("bucket")
                .with_access_file_prefix("")
                .validate()
                .is_err()
        );
        assert!(
            LeaseConfig::new("bucket")
                .with_check_interval_for_single_access(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
bucket = "TEST-BUCKET"
access_file_prefix = "PREFIX-"
keep_alive_interval_ms = 100
check_interval_for_single_access_ms = 10
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = LeaseConfig::load(Some(&path)).unwrap();
        assert_eq!(config.bucket, "TEST-BUCKET");
        assert_eq!(config.access_file_prefix, "PREFIX-");
        assert_eq!(config.keep_alive_interval_ms, 100);
        assert_eq!(config.check_interval_for_single_access_ms, 10);
        assert_eq!(
            config.check_interval_for_terminate_access_ms,
            DEFAULT_CHECK_INTERVAL_FOR_TERMINATE_ACCESS_MS
        );
        assert_eq!(config.staleness_threshold_ms, None);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
bucket = "TEST-BUCKET"
keep_alive_interval_ms = 500
staleness_threshold_ms = 200
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        assert!(matches!(
            LeaseConfig::load(Some(&path)),
            Err(ConfigError::Invalid(_))
        ));
    }
}
