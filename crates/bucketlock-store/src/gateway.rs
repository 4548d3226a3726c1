//! Marker gateway trait
//!
//! The minimal set of store operations the lease protocol needs. Every call is
//! a remote round trip: nothing is cached and nothing is retried here, so a
//! transient failure surfaces to the caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// A lease marker as seen in a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerEntry {
    /// Object key, relative to the gateway root
    pub key: String,
    /// Last time the object was written
    pub last_modified: DateTime<Utc>,
}

impl MarkerEntry {
    pub fn new(key: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            last_modified,
        }
    }

    /// True if the marker was last written before `deadline`
    pub fn is_older_than(&self, deadline: DateTime<Utc>) -> bool {
        self.last_modified < deadline
    }
}

/// Store operations used by lease coordinators.
///
/// Implementations hold no per-session state and are shared by every
/// coordinator contending for the same bucket.
#[async_trait]
pub trait MarkerGateway: Send + Sync {
    /// All objects whose key starts with `prefix`, in no particular order
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<MarkerEntry>>;

    /// Whether an object exists at `key`.
    ///
    /// Access-denied answers, which some stores return for missing keys, count
    /// as "does not exist".
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Write a zero-length object at `key`, refreshing its timestamp if present
    async fn create_marker(&self, key: &str) -> Result<()>;

    /// Remove the object at `key`; absent keys are not an error
    async fn delete(&self, key: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_is_older_than() {
        let now = Utc::now();
        let entry = MarkerEntry::new("ACCESS_FILE_000001", now - Duration::milliseconds(500));

        assert!(entry.is_older_than(now - Duration::milliseconds(201)));
        assert!(!entry.is_older_than(now - Duration::milliseconds(600)));
    }
}
