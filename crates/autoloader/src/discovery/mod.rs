//! Datatype discovery.
//!
//! Walks the schema declarations of every configured bucket and turns each
//! one into zero or more [`Datatype`]s. A bad declaration is skipped, never
//! fatal; a bucket whose organizations cannot be listed is skipped for the
//! pass.

mod dirs;
mod schema_path;

pub use dirs::{DATE_FORMAT, Dir, enumerate_dirs};
pub use schema_path::{DataProbe, SchemaLocation, SchemaPath};

use autoloader_core::emit;
use autoloader_core::metrics::MetricsSink;
use autoloader_core::metrics::events::{SchemaFileSkipped, SkipReason};
use autoloader_core::{ObjectInfo, StorageError, StorageProviderRef};
use futures::StreamExt;
use regex::Regex;
use std::pin::pin;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::datatype::{Datatype, DatatypeOpts, Layout, Scheme};

const TABLES_DIR: &str = "tables";

fn owner_pattern() -> &'static Regex {
    static OWNER: OnceLock<Regex> = OnceLock::new();
    OWNER.get_or_init(|| Regex::new(r"(mlab|measurement)-.*").expect("valid owner pattern"))
}

/// Derive the owning project from a bucket name
/// (e.g. "archive-mlab-sandbox" -> "mlab-sandbox").
///
/// Returns an empty string when the name carries no owner.
pub fn owner_from_bucket(bucket: &str) -> String {
    owner_pattern()
        .find(bucket)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// A bucket to discover datatypes in.
#[derive(Debug, Clone)]
pub struct BucketSource {
    pub storage: StorageProviderRef,
    pub layout: Layout,
    /// Owning project, used to pick the naming scheme.
    pub owner: String,
}

impl BucketSource {
    /// Create a source; the owner is derived from the bucket name if not given.
    pub fn new(storage: StorageProviderRef, layout: Layout, owner: Option<String>) -> Self {
        let owner = owner.unwrap_or_else(|| owner_from_bucket(storage.bucket()));
        Self {
            storage,
            layout,
            owner,
        }
    }
}

/// Discovers datatypes across buckets.
pub struct Discovery {
    buckets: Vec<BucketSource>,
    first_party_owners: Vec<String>,
    metrics: Arc<dyn MetricsSink>,
}

impl Discovery {
    pub fn new(
        buckets: Vec<BucketSource>,
        first_party_owners: Vec<String>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            buckets,
            first_party_owners,
            metrics,
        }
    }

    pub fn buckets(&self) -> &[BucketSource] {
        &self.buckets
    }

    /// Naming scheme for an owner. An empty owner is first-party.
    pub fn scheme_for(&self, owner: &str) -> Scheme {
        if owner.is_empty() || self.first_party_owners.iter().any(|o| o == owner) {
            Scheme::FirstParty
        } else {
            Scheme::ThirdParty {
                owner: owner.to_string(),
            }
        }
    }

    /// Discover every datatype in every bucket.
    pub async fn discover(&self) -> Vec<Datatype> {
        let mut datatypes = Vec::new();

        for source in &self.buckets {
            match self.discover_bucket(source).await {
                Ok(found) => {
                    info!(
                        bucket = %source.storage.bucket(),
                        layout = %source.layout,
                        count = found.len(),
                        "Discovered datatypes"
                    );
                    datatypes.extend(found);
                }
                Err(e) => {
                    warn!(
                        bucket = %source.storage.bucket(),
                        error = %e,
                        "Failed to get organizations for bucket, skipping"
                    );
                }
            }
        }

        datatypes
    }

    /// Organizations uploading data to a v2 bucket.
    async fn organizations(&self, source: &BucketSource) -> Result<Vec<String>, StorageError> {
        if source.layout == Layout::V1 {
            return Ok(Vec::new());
        }
        let children = source.storage.list_children(&source.layout.prefix()).await?;
        Ok(children
            .into_iter()
            .filter(|child| child != TABLES_DIR)
            .collect())
    }

    async fn discover_bucket(&self, source: &BucketSource) -> Result<Vec<Datatype>, StorageError> {
        let candidates = self.organizations(source).await?;
        let scheme = self.scheme_for(&source.owner);
        let bucket = source.storage.bucket().to_string();

        debug!(bucket = %bucket, ?candidates, ?scheme, "Walking schema declarations");

        let mut datatypes = Vec::new();
        let mut objects = pin!(source.storage.list(&source.layout.tables_prefix()));
        while let Some(object) = objects.next().await {
            let object = match object {
                Ok(object) => object,
                Err(e) => {
                    warn!(bucket = %bucket, error = %e, "Schema listing failed, ending walk");
                    break;
                }
            };
            datatypes.extend(self.datatypes_for(source, &scheme, &candidates, object).await);
        }

        Ok(datatypes)
    }

    async fn datatypes_for(
        &self,
        source: &BucketSource,
        scheme: &Scheme,
        candidates: &[String],
        object: ObjectInfo,
    ) -> Vec<Datatype> {
        let bucket = source.storage.bucket().to_string();

        let location = match SchemaLocation::parse(&object.name, source.layout) {
            Ok(location) => location,
            Err(e) => {
                warn!(bucket = %bucket, error = %e, "Skipping schema declaration");
                emit!(self.metrics, SchemaFileSkipped { bucket, reason: SkipReason::InvalidPath });
                return Vec::new();
            }
        };

        let schema = match source.storage.get(&object.name).await {
            Ok(bytes) if bytes.is_empty() => {
                warn!(bucket = %bucket, path = %object.name, "Skipping empty schema file");
                emit!(self.metrics, SchemaFileSkipped { bucket, reason: SkipReason::Empty });
                return Vec::new();
            }
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(bucket = %bucket, path = %object.name, error = %e, "Skipping unreadable schema file");
                emit!(self.metrics, SchemaFileSkipped { bucket, reason: SkipReason::Unreadable });
                return Vec::new();
            }
        };

        let path = location
            .resolve(source.layout, source.storage.as_ref(), candidates)
            .await;
        if path.organizations.is_empty() {
            debug!(bucket = %bucket, path = %object.name, "No organization has data for schema yet");
            emit!(self.metrics, SchemaFileSkipped { bucket, reason: SkipReason::NoData });
            return Vec::new();
        }

        let location = source.storage.attrs().location;
        path.organizations
            .into_iter()
            .map(|organization| {
                Datatype::new(
                    DatatypeOpts {
                        name: path.datatype.clone(),
                        experiment: path.experiment.clone(),
                        organization,
                        layout: source.layout,
                        location: location.clone(),
                        schema: schema.clone(),
                        updated_time: object.updated,
                        schema_path: object.name.clone(),
                        bucket: source.storage.clone(),
                    },
                    scheme,
                )
            })
            .collect()
    }
}
