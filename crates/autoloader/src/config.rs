//! Configuration for the autoloader service.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

pub use autoloader_core::config::MetricsConfig;
use autoloader_core::config::{load_yaml_file, parse_addr, parse_yaml};
use autoloader_core::error::{
    ConfigError, EmptyBucketUrlSnafu, EmptyProjectSnafu, NoBucketsSnafu, ZeroConcurrencySnafu,
};

use crate::datatype::Layout;
use crate::warehouse::DEFAULT_ENDPOINT;

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_location() -> String {
    "US".to_string()
}

/// Owners whose buckets use the M-Lab naming scheme unless configured otherwise.
pub fn default_first_party_owners() -> Vec<String> {
    ["mlab-sandbox", "mlab-staging", "mlab-oti", "measurement-lab"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_max_concurrent_datatypes() -> usize {
    1
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address serving `/v1/load` (default: "0.0.0.0:8080").
    #[serde(default = "default_listen_address")]
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_listen_address(),
        }
    }
}

/// Warehouse connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WarehouseConfig {
    /// Project holding the raw datasets.
    pub project: String,
    /// Project holding the views (default: `project`).
    #[serde(default)]
    pub view_project: Option<String>,
    /// API endpoint, overridable for emulators.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Fixed access token. When unset, tokens come from the metadata server.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Interval between load job status checks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl WarehouseConfig {
    pub fn view_project(&self) -> &str {
        self.view_project.as_deref().unwrap_or(&self.project)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// An archive bucket to discover datatypes in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BucketConfig {
    /// Bucket URL (`gs://bucket`, `file:///path`, `memory://name`).
    pub url: String,
    /// Bucket region, inherited by new datasets.
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default)]
    pub layout: Layout,
    /// Owning project. Derived from the bucket name when unset.
    #[serde(default)]
    pub owner: Option<String>,
}

/// Main configuration.
///
/// # Example
///
/// ```yaml
/// warehouse:
///   project: mlab-sandbox
///   view_project: mlab-sandbox
///
/// buckets:
///   - url: gs://archive-mlab-sandbox
///     location: US
///     layout: v1
///   - url: gs://archive-mlab-autojoin
///     layout: v2
///
/// max_concurrent_datatypes: 4
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub warehouse: WarehouseConfig,
    /// Owners whose data follows the first-party naming scheme.
    #[serde(default = "default_first_party_owners")]
    pub first_party_owners: Vec<String>,
    /// Datatypes processed concurrently within a load pass.
    #[serde(default = "default_max_concurrent_datatypes")]
    pub max_concurrent_datatypes: usize,
    #[serde(default)]
    pub buckets: Vec<BucketConfig>,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = load_yaml_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = parse_yaml(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.warehouse.project.is_empty(), EmptyProjectSnafu);
        ensure!(!self.buckets.is_empty(), NoBucketsSnafu);
        for (index, bucket) in self.buckets.iter().enumerate() {
            ensure!(!bucket.url.trim().is_empty(), EmptyBucketUrlSnafu { index });
        }
        ensure!(self.max_concurrent_datatypes > 0, ZeroConcurrencySnafu);
        self.server_addr()?;
        self.metrics.socket_addr()?;
        Ok(())
    }

    pub fn server_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr(&self.server.address)
    }
}
