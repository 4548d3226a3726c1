//! In-memory marker gateway
//!
//! Behaves like a strongly consistent bucket. Used by tests and by processes
//! that only need to coordinate tasks within themselves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::{Result, StoreError};
use crate::gateway::{MarkerEntry, MarkerGateway};

#[derive(Debug, Default)]
pub struct InMemoryGateway {
    objects: Mutex<HashMap<String, DateTime<Utc>>>,
    unavailable: AtomicBool,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a marker with an explicit timestamp, e.g. to simulate a crashed owner
    pub fn insert_marker_at(&self, key: impl Into<String>, last_modified: DateTime<Utc>) {
        self.objects.lock().insert(key.into(), last_modified);
    }

    /// Snapshot of all stored keys
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    /// Make every operation fail until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store switched off".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MarkerGateway for InMemoryGateway {
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<MarkerEntry>> {
        self.check_available()?;
        Ok(self
            .objects
            .lock()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, last_modified)| MarkerEntry::new(key.clone(), *last_modified))
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.objects.lock().contains_key(key))
    }

    async fn create_marker(&self, key: &str) -> Result<()> {
        self.check_available()?;
        self.objects.lock().insert(key.to_string(), Utc::now());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_available()?;
        self.objects.lock().remove(key);
        Ok(())
    }
}
