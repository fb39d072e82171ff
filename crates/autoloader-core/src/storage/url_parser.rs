//! URL parsing for storage backends.
//!
//! Extracts backend configuration from bucket URLs (GCS, local filesystem, in-memory).

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{InvalidUrlSnafu, StorageError};

use super::{GcsConfig, LocalConfig, MemoryConfig};

const GCS_URL: &str = r"^[gG][sS]://(?P<bucket>[a-z0-9\-\._]+)/?$";
const GCS_PATH: &str = r"^https://storage\.googleapis\.com/(?P<bucket>[a-z0-9\-_\.]+)/?$";
const MEMORY_URL: &str = r"^memory://(?P<bucket>[A-Za-z0-9\-\._]+)/?$";
const FILE_URI: &str = r"^file://(?P<path>/.+?)/?$";
const FILE_PATH: &str = r"^(?P<path>/.+?)/?$";

struct Matchers {
    gcs: [Regex; 2],
    memory: Regex,
    local: [Regex; 2],
}

fn matchers() -> &'static Matchers {
    static MATCHERS: OnceLock<Matchers> = OnceLock::new();
    MATCHERS.get_or_init(|| Matchers {
        gcs: [
            Regex::new(GCS_URL).expect("valid GCS url pattern"),
            Regex::new(GCS_PATH).expect("valid GCS path pattern"),
        ],
        memory: Regex::new(MEMORY_URL).expect("valid memory url pattern"),
        local: [
            Regex::new(FILE_URI).expect("valid file uri pattern"),
            Regex::new(FILE_PATH).expect("valid file path pattern"),
        ],
    })
}

/// Parsed storage backend configuration for a single bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Gcs(GcsConfig),
    Local(LocalConfig),
    Memory(MemoryConfig),
}

impl BackendConfig {
    /// Parse a bucket URL into a backend configuration.
    ///
    /// Accepted forms:
    /// - `gs://bucket` or `https://storage.googleapis.com/bucket`
    /// - `file:///abs/path` or `/abs/path` (the last path component is the bucket name)
    /// - `memory://bucket`
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        let m = matchers();

        for re in &m.gcs {
            if let Some(caps) = re.captures(url) {
                return Ok(BackendConfig::Gcs(GcsConfig {
                    bucket: caps["bucket"].to_string(),
                }));
            }
        }

        if let Some(caps) = m.memory.captures(url) {
            return Ok(BackendConfig::Memory(MemoryConfig {
                bucket: caps["bucket"].to_string(),
            }));
        }

        for re in &m.local {
            if let Some(caps) = re.captures(url) {
                let path = caps["path"].to_string();
                let bucket = path
                    .rsplit('/')
                    .find(|part| !part.is_empty())
                    .unwrap_or_default()
                    .to_string();
                return Ok(BackendConfig::Local(LocalConfig { path, bucket }));
            }
        }

        InvalidUrlSnafu { url }.fail()
    }

    /// Bucket name as it appears in object URIs.
    pub fn bucket(&self) -> &str {
        match self {
            BackendConfig::Gcs(c) => &c.bucket,
            BackendConfig::Local(c) => &c.bucket,
            BackendConfig::Memory(c) => &c.bucket,
        }
    }

    /// URI scheme used when handing object paths to external loaders.
    pub fn scheme(&self) -> &'static str {
        match self {
            BackendConfig::Gcs(_) => "gs",
            BackendConfig::Local(_) => "file",
            BackendConfig::Memory(_) => "memory",
        }
    }
}
