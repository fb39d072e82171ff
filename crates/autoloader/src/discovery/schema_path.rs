//! Interpretation of schema declaration paths.
//!
//! Declarations live under `autoload/<version>/tables/`:
//! - `<experiment>/<datatype>.table.json` is out-of-band: the owning
//!   organizations are found by probing for data.
//! - `<organization>/<experiment>/<datatype>.table.json` is in-band (v2 only).

use async_trait::async_trait;
use autoloader_core::{StorageError, StorageProvider};
use snafu::prelude::*;
use tracing::{debug, warn};

use crate::datatype::{Layout, SCHEMA_FILE_SUFFIX};
use crate::error::{InvalidPathSnafu, SchemaPathError};

/// Existence check for an organization's data.
#[async_trait]
pub trait DataProbe: Send + Sync {
    /// Report whether any object exists under
    /// `autoload/v2/<organization>/<experiment>/<datatype>/`.
    async fn has_data(
        &self,
        organization: &str,
        experiment: &str,
        datatype: &str,
    ) -> Result<bool, StorageError>;
}

#[async_trait]
impl DataProbe for StorageProvider {
    async fn has_data(
        &self,
        organization: &str,
        experiment: &str,
        datatype: &str,
    ) -> Result<bool, StorageError> {
        let prefix = format!(
            "{}/{organization}/{experiment}/{datatype}/",
            Layout::V2.prefix()
        );
        self.has_objects(&prefix).await
    }
}

/// Shape of a declaration path, before organizations are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaLocation {
    InBand {
        organization: String,
        experiment: String,
        datatype: String,
    },
    OutOfBand {
        experiment: String,
        datatype: String,
    },
}

/// A resolved declaration path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaPath {
    pub datatype: String,
    pub experiment: String,
    /// Owning organizations, in candidate order. May be empty.
    pub organizations: Vec<String>,
}

impl SchemaLocation {
    /// Classify a declaration path by its segment count.
    pub fn parse(path: &str, layout: Layout) -> Result<Self, SchemaPathError> {
        let tables = format!("{}/", layout.tables_prefix());
        let rest = path
            .strip_prefix(&tables)
            .context(InvalidPathSnafu { path })?;

        let parts: Vec<&str> = rest.split('/').collect();
        ensure!(
            parts.iter().all(|p| !p.is_empty()),
            InvalidPathSnafu { path }
        );

        let datatype = |file: &str| file.strip_suffix(SCHEMA_FILE_SUFFIX).unwrap_or(file).to_string();
        let named = parts.last().is_some_and(|file| !datatype(*file).is_empty());
        ensure!(named, InvalidPathSnafu { path });

        match (layout, parts.as_slice()) {
            (_, [experiment, file]) => Ok(SchemaLocation::OutOfBand {
                experiment: experiment.to_string(),
                datatype: datatype(*file),
            }),
            (Layout::V2, [organization, experiment, file]) => Ok(SchemaLocation::InBand {
                organization: organization.to_string(),
                experiment: experiment.to_string(),
                datatype: datatype(*file),
            }),
            _ => InvalidPathSnafu { path }.fail(),
        }
    }

    /// Resolve the owning organizations.
    ///
    /// In-band declarations name their organization and never probe. v1
    /// declarations have a single implicit owner. v2 out-of-band declarations
    /// keep the candidates for which the probe finds data; a failing probe
    /// counts as no data.
    pub async fn resolve(
        self,
        layout: Layout,
        probe: &dyn DataProbe,
        candidates: &[String],
    ) -> SchemaPath {
        match self {
            SchemaLocation::InBand {
                organization,
                experiment,
                datatype,
            } => SchemaPath {
                datatype,
                experiment,
                organizations: vec![organization],
            },
            SchemaLocation::OutOfBand {
                experiment,
                datatype,
            } if layout == Layout::V1 => SchemaPath {
                datatype,
                experiment,
                organizations: vec![String::new()],
            },
            SchemaLocation::OutOfBand {
                experiment,
                datatype,
            } => {
                let mut organizations = Vec::new();
                for org in candidates {
                    match probe.has_data(org, &experiment, &datatype).await {
                        Ok(true) => organizations.push(org.clone()),
                        Ok(false) => {}
                        Err(e) => {
                            warn!(
                                organization = %org,
                                experiment = %experiment,
                                datatype = %datatype,
                                error = %e,
                                "Failed to probe organization data"
                            );
                        }
                    }
                }
                debug!(
                    experiment = %experiment,
                    datatype = %datatype,
                    ?organizations,
                    "Resolved out-of-band schema"
                );
                SchemaPath {
                    datatype,
                    experiment,
                    organizations,
                }
            }
        }
    }
}

impl SchemaPath {
    /// Parse and resolve a declaration path in one step.
    pub async fn resolve(
        path: &str,
        layout: Layout,
        probe: &dyn DataProbe,
        candidates: &[String],
    ) -> Result<Self, SchemaPathError> {
        let location = SchemaLocation::parse(path, layout)?;
        Ok(location.resolve(layout, probe, candidates).await)
    }
}
