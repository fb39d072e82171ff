//! Local filesystem and in-memory backends.
//!
//! The local backend serves a directory as if it were a bucket; the in-memory
//! backend is used for tests and dry runs.

use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use snafu::prelude::*;
use std::sync::Arc;

use crate::error::{LocalConfigSnafu, StorageError};

use super::{BackendConfig, StorageProvider};

/// Local filesystem configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    /// Absolute directory standing in for the bucket root.
    pub path: String,
    /// Bucket name (last component of `path`).
    pub bucket: String,
}

/// In-memory bucket configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    pub bucket: String,
}

impl StorageProvider {
    pub(super) fn construct_local(
        config: LocalConfig,
        location: String,
    ) -> Result<Self, StorageError> {
        let store = LocalFileSystem::new_with_prefix(&config.path).context(LocalConfigSnafu {
            path: config.path.clone(),
        })?;
        let object_store: Arc<dyn ObjectStore> = Arc::new(store);
        Ok(Self::with_store(BackendConfig::Local(config), object_store, location))
    }

    pub(super) fn construct_memory(config: MemoryConfig, location: String) -> Self {
        let object_store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        Self::with_store(BackendConfig::Memory(config), object_store, location)
    }

    /// Create an empty in-memory bucket.
    pub fn in_memory(bucket: &str, location: &str) -> Self {
        Self::construct_memory(
            MemoryConfig {
                bucket: bucket.to_string(),
            },
            location.to_string(),
        )
    }
}
