//! Marker gateway over an `object_store` backend
//!
//! `object_store` lists by path segment, not by raw key prefix, so a listing
//! reads the directory that contains the prefix without recursing and filters
//! the keys locally.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use tracing::debug;

use crate::error::Result;
use crate::gateway::{MarkerEntry, MarkerGateway};

/// Gateway backed by any [`ObjectStore`] implementation.
#[derive(Debug, Clone)]
pub struct ObjectStoreGateway {
    /// Object store implementation (S3, GCS, local filesystem, etc.).
    store: Arc<dyn ObjectStore>,
    /// Path prepended to every marker key.
    root: Path,
}

impl ObjectStoreGateway {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_root(store, Path::default())
    }

    pub fn with_root(store: Arc<dyn ObjectStore>, root: Path) -> Self {
        Self { store, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_key(&self, key: &str) -> String {
        let root = self.root.as_ref();
        if root.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", root, key)
        }
    }

    fn location(&self, key: &str) -> Path {
        Path::from(self.full_key(key))
    }

    fn relative_key<'a>(&self, location: &'a str) -> &'a str {
        let root = self.root.as_ref();
        if root.is_empty() {
            return location;
        }
        location
            .strip_prefix(root)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(location)
    }
}

#[async_trait]
impl MarkerGateway for ObjectStoreGateway {
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<MarkerEntry>> {
        let full_prefix = self.full_key(prefix);
        let directory = full_prefix
            .rsplit_once('/')
            .map(|(dir, _)| Path::from(dir));

        let listing = self.store.list_with_delimiter(directory.as_ref()).await?;
        let markers: Vec<MarkerEntry> = listing
            .objects
            .into_iter()
            .filter(|meta| meta.location.as_ref().starts_with(&full_prefix))
            .map(|meta| {
                MarkerEntry::new(
                    self.relative_key(meta.location.as_ref()),
                    meta.last_modified,
                )
            })
            .collect();

        debug!(prefix = %full_prefix, count = markers.len(), "Listed markers");
        Ok(markers)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        head_to_exists(self.store.head(&self.location(key)).await)
    }

    async fn create_marker(&self, key: &str) -> Result<()> {
        self.store
            .put(&self.location(key), PutPayload::from(Bytes::new()))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self.store.delete(&self.location(key)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn head_to_exists(head: object_store::Result<ObjectMeta>) -> Result<bool> {
    match head {
        Ok(_) => Ok(true),
        Err(object_store::Error::NotFound { .. }) => Ok(false),
        // Some S3 compatible stores answer 403 instead of 404 for missing keys
        Err(object_store::Error::PermissionDenied { .. }) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
