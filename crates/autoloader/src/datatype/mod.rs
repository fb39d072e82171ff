//! Datatypes: the unit of work of a load pass.
//!
//! A datatype is one logical stream of archived data, declared by a schema
//! file in a bucket, mapped to one warehouse table.

mod namer;

pub use namer::{Identity, Namer, Scheme, strip_platform_prefix};

use autoloader_core::StorageProviderRef;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Suffix of schema declaration files.
pub const SCHEMA_FILE_SUFFIX: &str = ".table.json";

/// Generation of the bucket layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// `autoload/v1/<experiment>/<datatype>/...`, single owner per bucket.
    #[default]
    V1,
    /// `autoload/v2/<organization>/<experiment>/<datatype>/...`.
    V2,
}

impl Layout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::V1 => "v1",
            Layout::V2 => "v2",
        }
    }

    /// Root prefix of the layout, e.g. `autoload/v2`.
    pub fn prefix(&self) -> String {
        format!("autoload/{}", self.as_str())
    }

    /// Prefix under which schema declarations live.
    pub fn tables_prefix(&self) -> String {
        format!("{}/tables", self.prefix())
    }
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields a datatype is built from.
#[derive(Debug, Clone)]
pub struct DatatypeOpts {
    pub name: String,
    pub experiment: String,
    pub organization: String,
    pub layout: Layout,
    /// Region of the source bucket.
    pub location: String,
    /// Raw schema declaration.
    pub schema: Bytes,
    /// Last modification of the schema declaration.
    pub updated_time: DateTime<Utc>,
    /// Object path of the schema declaration.
    pub schema_path: String,
    pub bucket: StorageProviderRef,
}

/// A discovered datatype. Immutable once built.
#[derive(Debug, Clone)]
pub struct Datatype {
    pub name: String,
    pub experiment: String,
    pub organization: String,
    pub layout: Layout,
    pub location: String,
    pub schema: Bytes,
    pub updated_time: DateTime<Utc>,
    pub schema_path: String,
    pub bucket: StorageProviderRef,
    namer: Namer,
}

impl Datatype {
    /// Build a datatype, fixing its naming convention from `scheme`.
    pub fn new(opts: DatatypeOpts, scheme: &Scheme) -> Self {
        let namer = Namer::resolve(
            Identity {
                datatype: &opts.name,
                experiment: &opts.experiment,
                organization: &opts.organization,
            },
            opts.layout,
            scheme,
        );

        Self {
            name: opts.name,
            experiment: opts.experiment,
            organization: opts.organization,
            layout: opts.layout,
            location: opts.location,
            schema: opts.schema,
            updated_time: opts.updated_time,
            schema_path: opts.schema_path,
            bucket: opts.bucket,
            namer,
        }
    }

    pub fn dataset(&self) -> String {
        self.namer.dataset()
    }

    pub fn table(&self) -> String {
        self.namer.table()
    }

    pub fn view_dataset(&self) -> String {
        self.namer.view_dataset()
    }

    pub fn view_table(&self) -> String {
        self.namer.view_table()
    }

    /// Object prefix holding this datatype's dated directories.
    pub fn data_prefix(&self) -> String {
        match self.layout {
            Layout::V1 => format!("{}/{}/{}", self.layout.prefix(), self.experiment, self.name),
            Layout::V2 => format!(
                "{}/{}/{}/{}",
                self.layout.prefix(),
                self.organization,
                self.experiment,
                self.name
            ),
        }
    }
}

impl std::fmt::Display for Datatype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.organization.is_empty() {
            write!(f, "{}/{}", self.experiment, self.name)
        } else {
            write!(f, "{}/{}/{}", self.organization, self.experiment, self.name)
        }
    }
}
