//! Warehouse naming conventions for datatypes.
//!
//! A [`Namer`] is chosen once, when a datatype is discovered, and derives the
//! dataset, table and view identifiers from the datatype's identity alone.

use super::Layout;

const PLATFORM_PREFIX: &str = "mlab-";
const FIRST_PARTY_TAG: &str = "mlab";

/// Who owns the data a datatype describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scheme {
    /// Data produced by the platform itself.
    FirstParty,
    /// Data brought by another owner (e.g. "mlab-thirdparty").
    ThirdParty { owner: String },
}

/// Identity fields a namer is derived from.
#[derive(Debug, Clone, Copy)]
pub struct Identity<'a> {
    pub datatype: &'a str,
    pub experiment: &'a str,
    /// Uploading organization; empty for the v1 layout.
    pub organization: &'a str,
}

/// Naming convention for one datatype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Namer {
    /// v1 layout, first-party data.
    FirstParty { datatype: String, experiment: String },
    /// v1 layout, third-party data. `project` has the platform prefix stripped.
    ThirdParty {
        datatype: String,
        experiment: String,
        project: String,
    },
    /// v2 layout, any owner.
    V2 {
        datatype: String,
        experiment: String,
        organization: String,
        version: String,
        sub_project: String,
    },
}

/// Strip the platform prefix from an owner identifier ("mlab-acme" -> "acme").
pub fn strip_platform_prefix(owner: &str) -> &str {
    owner.strip_prefix(PLATFORM_PREFIX).unwrap_or(owner)
}

impl Namer {
    /// Select the naming convention for a datatype.
    pub fn resolve(identity: Identity<'_>, layout: Layout, scheme: &Scheme) -> Self {
        let datatype = identity.datatype.to_string();
        let experiment = identity.experiment.to_string();

        match (layout, scheme) {
            (Layout::V1, Scheme::FirstParty) => Namer::FirstParty {
                datatype,
                experiment,
            },
            (Layout::V1, Scheme::ThirdParty { owner }) => Namer::ThirdParty {
                datatype,
                experiment,
                project: strip_platform_prefix(owner).to_string(),
            },
            (Layout::V2, scheme) => {
                let organization = if identity.organization.is_empty() {
                    FIRST_PARTY_TAG
                } else {
                    identity.organization
                };
                let sub_project = match scheme {
                    Scheme::FirstParty => FIRST_PARTY_TAG,
                    Scheme::ThirdParty { owner } => strip_platform_prefix(owner),
                };
                Namer::V2 {
                    datatype,
                    experiment,
                    organization: organization.to_string(),
                    version: layout.as_str().to_string(),
                    sub_project: sub_project.to_string(),
                }
            }
        }
    }

    /// Dataset holding the raw table (e.g. "raw_ndt", "autoload_v2_mlab_ndt").
    pub fn dataset(&self) -> String {
        match self {
            Namer::FirstParty { experiment, .. } => format!("raw_{experiment}"),
            Namer::ThirdParty { experiment, .. } => experiment.clone(),
            Namer::V2 {
                experiment,
                organization,
                version,
                ..
            } => format!("autoload_{version}_{organization}_{experiment}"),
        }
    }

    /// Raw table name (e.g. "ndt7", "ndt7_raw").
    pub fn table(&self) -> String {
        match self {
            Namer::FirstParty { datatype, .. } | Namer::ThirdParty { datatype, .. } => {
                datatype.clone()
            }
            Namer::V2 { datatype, .. } => format!("{datatype}_raw"),
        }
    }

    /// Dataset holding the read-optimized view (e.g. "ndt_raw", "mlab_v2_ndt").
    pub fn view_dataset(&self) -> String {
        match self {
            Namer::FirstParty { experiment, .. } => format!("{experiment}_raw"),
            Namer::ThirdParty { project, .. } => project.clone(),
            Namer::V2 {
                experiment,
                version,
                sub_project,
                ..
            } => format!("{sub_project}_{version}_{experiment}"),
        }
    }

    /// View name within [`Namer::view_dataset`].
    pub fn view_table(&self) -> String {
        match self {
            Namer::FirstParty { datatype, .. } => datatype.clone(),
            Namer::ThirdParty {
                datatype,
                experiment,
                ..
            } => format!("{experiment}_{datatype}"),
            Namer::V2 { .. } => self.table(),
        }
    }
}
