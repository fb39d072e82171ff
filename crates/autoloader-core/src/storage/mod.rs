//! Object storage abstraction.
//!
//! Provides a bucket-scoped interface over GCS, the local filesystem and an
//! in-memory store. Every configured archive bucket gets one
//! [`StorageProvider`].

mod gcs;
mod local;
mod url_parser;

pub use gcs::GcsConfig;
pub use local::{LocalConfig, MemoryConfig};
pub use url_parser::BackendConfig;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, future::ready};
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use snafu::prelude::*;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ObjectStoreSnafu, StorageError};

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Bucket-level attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketAttrs {
    pub name: String,
    /// Region the bucket lives in (e.g. "US"); inherited by new datasets.
    pub location: String,
}

/// Metadata of a single listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Object name relative to the bucket root.
    pub name: String,
    pub bucket: String,
    pub updated: DateTime<Utc>,
    pub size: u64,
}

impl ObjectInfo {
    fn from_meta(meta: ObjectMeta, bucket: &str) -> Self {
        Self {
            name: meta.location.to_string(),
            bucket: bucket.to_string(),
            updated: meta.last_modified,
            size: meta.size,
        }
    }
}

/// Storage provider bound to a single bucket.
#[derive(Clone)]
pub struct StorageProvider {
    config: BackendConfig,
    object_store: Arc<dyn ObjectStore>,
    location: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "StorageProvider<{}://{}>",
            self.config.scheme(),
            self.config.bucket()
        )
    }
}

impl StorageProvider {
    /// Create a storage provider for a bucket URL.
    ///
    /// `location` is the bucket's region; object stores do not expose bucket
    /// metadata, so it is supplied by configuration.
    pub fn for_url(url: &str, location: &str) -> Result<Self, StorageError> {
        let location = location.to_string();
        match BackendConfig::parse_url(url)? {
            BackendConfig::Gcs(config) => Self::construct_gcs(config, location),
            BackendConfig::Local(config) => Self::construct_local(config, location),
            BackendConfig::Memory(config) => Ok(Self::construct_memory(config, location)),
        }
    }

    fn with_store(
        config: BackendConfig,
        object_store: Arc<dyn ObjectStore>,
        location: String,
    ) -> Self {
        Self {
            config,
            object_store,
            location,
        }
    }

    /// Get the backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Bucket name.
    pub fn bucket(&self) -> &str {
        self.config.bucket()
    }

    /// Bucket attributes (name and region).
    pub fn attrs(&self) -> BucketAttrs {
        BucketAttrs {
            name: self.bucket().to_string(),
            location: self.location.clone(),
        }
    }

    /// Fully-qualified URI of an object path, e.g. `gs://bucket/a/b`.
    pub fn uri(&self, path: &str) -> String {
        format!("{}://{}/{}", self.config.scheme(), self.bucket(), path)
    }

    /// List all objects under `prefix` recursively.
    ///
    /// Prefix matching is segment-based: `a/b` matches `a/b/c` but not `a/bc`.
    pub fn list(&self, prefix: &str) -> impl Stream<Item = Result<ObjectInfo, StorageError>> + 'static {
        debug!(bucket = %self.bucket(), prefix, "Listing objects");
        let bucket = self.bucket().to_string();
        self.object_store
            .list(Some(&Path::from(prefix)))
            .map(move |meta| {
                meta.map(|meta| ObjectInfo::from_meta(meta, &bucket))
                    .context(ObjectStoreSnafu)
            })
    }

    /// List objects under `prefix` whose names sort after `start_offset` and
    /// strictly before `end_offset`.
    ///
    /// The start bound is applied by the store; the end bound is applied while
    /// streaming since not every backend supports it.
    pub fn list_range(
        &self,
        prefix: &str,
        start_offset: &str,
        end_offset: &str,
    ) -> impl Stream<Item = Result<ObjectInfo, StorageError>> + 'static {
        debug!(
            bucket = %self.bucket(),
            prefix,
            start_offset,
            end_offset,
            "Listing objects in range"
        );
        let bucket = self.bucket().to_string();
        let end_offset = end_offset.to_string();
        self.object_store
            .list_with_offset(Some(&Path::from(prefix)), &Path::from(start_offset))
            .filter_map(move |meta| {
                let result = match meta {
                    Ok(meta) if meta.location.as_ref() >= end_offset.as_str() => None,
                    Ok(meta) => Some(Ok(ObjectInfo::from_meta(meta, &bucket))),
                    Err(source) => Some(Err(StorageError::ObjectStore { source })),
                };
                ready(result)
            })
    }

    /// List the immediate child "directories" of `prefix` (delimiter listing).
    ///
    /// Returns the child names only, e.g. `["mlab", "tables"]` for `autoload/v2`.
    pub async fn list_children(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let result = self
            .object_store
            .list_with_delimiter(Some(&Path::from(prefix)))
            .await
            .context(ObjectStoreSnafu)?;

        let children: Vec<String> = result
            .common_prefixes
            .iter()
            .filter_map(|p| p.filename().map(str::to_string))
            .collect();

        debug!(bucket = %self.bucket(), prefix, count = children.len(), "Listed children");
        Ok(children)
    }

    /// Check whether at least one object exists under `prefix`.
    ///
    /// Reads a single listing entry; never walks the whole prefix.
    pub async fn has_objects(&self, prefix: &str) -> Result<bool, StorageError> {
        let mut stream = self.object_store.list(Some(&Path::from(prefix)));
        match stream.next().await {
            Some(Ok(_)) => Ok(true),
            Some(Err(source)) => Err(StorageError::ObjectStore { source }),
            None => Ok(false),
        }
    }

    /// Check whether the object at `path` exists.
    ///
    /// Listing is segment-based, so a full object path never lists itself.
    pub async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        match self.object_store.head(&Path::from(path)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(source) => Err(StorageError::ObjectStore { source }),
        }
    }

    /// Get the contents of an object.
    pub async fn get(&self, path: &str) -> Result<Bytes, StorageError> {
        let bytes = self
            .object_store
            .get(&Path::from(path))
            .await
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)?;
        Ok(bytes)
    }

    /// Put bytes to an object path.
    pub async fn put(&self, path: &str, bytes: impl Into<Bytes>) -> Result<(), StorageError> {
        let payload = PutPayload::from(bytes.into());
        self.object_store
            .put(&Path::from(path), payload)
            .await
            .context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Delete an object.
    pub async fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.object_store
            .delete(&Path::from(path))
            .await
            .context(ObjectStoreSnafu)?;
        Ok(())
    }
}
