//! Removal of a datatype from storage and the warehouse.
//!
//! Deletes the schema declarations and data objects of one
//! `<experiment>/<datatype>` from every configured bucket and drops the
//! matching tables. Dry-run unless `execute` is set.

use futures::TryStreamExt;
use std::collections::BTreeSet;
use std::str::FromStr;
use tracing::{info, warn};

use crate::datatype::{Identity, Layout, Namer, SCHEMA_FILE_SUFFIX};
use crate::discovery::{BucketSource, Discovery};
use crate::error::{AutoloaderError, InvalidDatatypeSnafu};
use crate::warehouse::Warehouse;

/// The datatype to remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NukeTarget {
    pub experiment: String,
    pub datatype: String,
}

impl FromStr for NukeTarget {
    type Err = AutoloaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split('/').collect::<Vec<_>>().as_slice() {
            [experiment, datatype] if !experiment.is_empty() && !datatype.is_empty() => {
                Ok(Self {
                    experiment: experiment.to_string(),
                    datatype: datatype.to_string(),
                })
            }
            _ => InvalidDatatypeSnafu { value: s }.fail(),
        }
    }
}

/// What was (or, in a dry run, would be) deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NukeReport {
    /// `<scheme>://<bucket>/<path>` of every object.
    pub objects: Vec<String>,
    /// `<dataset>.<table>` of every table.
    pub tables: Vec<String>,
}

/// Remove `target` from every bucket known to `discovery` and from `warehouse`.
pub async fn nuke(
    discovery: &Discovery,
    warehouse: &dyn Warehouse,
    target: &NukeTarget,
    execute: bool,
) -> Result<NukeReport, AutoloaderError> {
    info!(
        experiment = %target.experiment,
        datatype = %target.datatype,
        execute,
        "Nuking datatype"
    );

    let mut report = NukeReport::default();
    let mut tables = BTreeSet::new();

    for source in discovery.buckets() {
        let organizations = organizations(source).await?;

        let paths = paths(source.layout, &organizations, target);
        for file in &paths.schema_files {
            if let Some(uri) = delete_object(source, file, execute).await? {
                report.objects.push(uri);
            }
        }
        for prefix in &paths.data_prefixes {
            report
                .objects
                .extend(delete_objects(source, prefix, execute).await?);
        }

        let scheme = discovery.scheme_for(&source.owner);
        for organization in &organizations {
            let namer = Namer::resolve(
                Identity {
                    datatype: &target.datatype,
                    experiment: &target.experiment,
                    organization,
                },
                source.layout,
                &scheme,
            );
            tables.insert((namer.dataset(), namer.table()));
        }
    }

    for (dataset, table) in tables {
        info!(project = %warehouse.project(), dataset = %dataset, table = %table, "delete table");
        if execute {
            match warehouse.delete_table(&dataset, &table).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    warn!(dataset = %dataset, table = %table, "Table does not exist");
                    continue;
                }
                Err(source) => return Err(AutoloaderError::Warehouse { source }),
            }
        }
        report.tables.push(format!("{dataset}.{table}"));
    }

    if execute {
        warn!("Active storage transfer jobs may recreate files just removed from archive buckets");
    }
    Ok(report)
}

/// Organizations whose data may hold the datatype. v1 has one implicit owner.
async fn organizations(source: &BucketSource) -> Result<Vec<String>, AutoloaderError> {
    match source.layout {
        Layout::V1 => Ok(vec![String::new()]),
        Layout::V2 => Ok(source
            .storage
            .list_children(&Layout::V2.prefix())
            .await?
            .into_iter()
            .filter(|child| child != "tables")
            .collect()),
    }
}

/// Objects owned by a datatype within one bucket.
#[derive(Debug, Default, PartialEq, Eq)]
struct DatatypePaths {
    schema_files: Vec<String>,
    data_prefixes: Vec<String>,
}

fn paths(layout: Layout, organizations: &[String], target: &NukeTarget) -> DatatypePaths {
    let NukeTarget {
        experiment,
        datatype,
    } = target;
    let tables = layout.tables_prefix();
    let root = layout.prefix();

    let mut paths = DatatypePaths {
        schema_files: vec![format!("{tables}/{experiment}/{datatype}{SCHEMA_FILE_SUFFIX}")],
        data_prefixes: Vec::new(),
    };
    match layout {
        Layout::V1 => paths
            .data_prefixes
            .push(format!("{root}/{experiment}/{datatype}")),
        Layout::V2 => {
            for org in organizations {
                paths.schema_files.push(format!(
                    "{tables}/{org}/{experiment}/{datatype}{SCHEMA_FILE_SUFFIX}"
                ));
                paths
                    .data_prefixes
                    .push(format!("{root}/{org}/{experiment}/{datatype}"));
            }
        }
    }
    paths
}

/// Delete a single object if it exists, returning its URI.
async fn delete_object(
    source: &BucketSource,
    path: &str,
    execute: bool,
) -> Result<Option<String>, AutoloaderError> {
    let storage = &source.storage;
    if !storage.exists(path).await? {
        return Ok(None);
    }

    let uri = storage.uri(path);
    info!(object = %uri, "delete");
    if execute {
        storage.delete(path).await?;
    }
    Ok(Some(uri))
}

async fn delete_objects(
    source: &BucketSource,
    prefix: &str,
    execute: bool,
) -> Result<Vec<String>, AutoloaderError> {
    let storage = &source.storage;
    let objects: Vec<_> = storage.list(prefix).try_collect().await?;

    let mut deleted = Vec::with_capacity(objects.len());
    for object in objects {
        let uri = storage.uri(&object.name);
        info!(object = %uri, "delete");
        if execute {
            storage.delete(&object.name).await?;
        }
        deleted.push(uri);
    }
    Ok(deleted)
}
