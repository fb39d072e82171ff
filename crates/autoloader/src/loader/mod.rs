//! Load orchestration.
//!
//! For every discovered datatype the loader walks the same sequence:
//! resolve the dataset, resolve the table, refresh a stale schema, enumerate
//! the dated directories in the load window and load each one into its date
//! partition. Datatypes are independent: one failing never stops another.

mod locks;

pub use locks::KeyedLocks;

use autoloader_core::emit;
use autoloader_core::metrics::MetricsSink;
use autoloader_core::metrics::events::{
    AutoloadCompleted, LoadedDate, OperationStatus, WarehouseOperation,
    WarehouseOperationCompleted,
};
use chrono::NaiveDate;
use futures::{StreamExt, stream};
use snafu::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::datatype::Datatype;
use crate::discovery::{Dir, Discovery, enumerate_dirs};
use crate::error::{
    CreateDatasetSnafu, CreateTableSnafu, DatatypeError, DatatypesSnafu, GetDatasetSnafu,
    GetTableSnafu, InvalidSchemaSnafu, ListDirsSnafu, LoadError, LoadSnafu, UpdateSchemaSnafu,
    UpdateViewSnafu, WarehouseError,
};
use crate::options::LoadOptions;
use crate::schema::TableSchema;
use crate::warehouse::{TableMetadata, TimePartitioning, WarehouseRef, WriteDisposition};

/// Format of the partition decoration (`table$YYYYMMDD`).
const PARTITION_FORMAT: &str = "%Y%m%d";

/// Outcome of a successful load pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Datatypes processed.
    pub datatypes: usize,
    /// Partitions loaded.
    pub partitions: usize,
}

/// Runs load passes over every discovered datatype.
pub struct Loader {
    discovery: Discovery,
    warehouse: WarehouseRef,
    views: WarehouseRef,
    metrics: Arc<dyn MetricsSink>,
    max_concurrent: usize,
    locks: KeyedLocks,
}

impl Loader {
    /// Create a loader.
    ///
    /// `views` is the warehouse holding read-optimized views; it may be the
    /// same handle as `warehouse`.
    pub fn new(
        discovery: Discovery,
        warehouse: WarehouseRef,
        views: WarehouseRef,
        metrics: Arc<dyn MetricsSink>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            discovery,
            warehouse,
            views,
            metrics,
            max_concurrent: max_concurrent.max(1),
            locks: KeyedLocks::new(),
        }
    }

    /// Discover all datatypes and load each one over `options`.
    ///
    /// Every datatype is attempted; failures are collected into one error with
    /// a line per failed datatype.
    pub async fn load(&self, options: &LoadOptions) -> Result<LoadReport, LoadError> {
        let datatypes = self.discovery.discover().await;
        info!(
            datatypes = datatypes.len(),
            start = %options.start,
            end = %options.end,
            period = %options.period,
            "Starting load pass"
        );

        let tasks: Vec<_> = datatypes
            .iter()
            .map(|datatype| async move {
                (datatype, self.process_datatype(datatype, options).await)
            })
            .collect();
        let results: Vec<_> = stream::iter(tasks)
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut report = LoadReport {
            datatypes: datatypes.len(),
            partitions: 0,
        };
        let mut failures = Vec::new();
        for (datatype, result) in results {
            match result {
                Ok(loaded) => report.partitions += loaded,
                Err(e) => failures.push(format!(
                    "failed to autoload {}.{}: {e}",
                    datatype.dataset(),
                    datatype.table()
                )),
            }
        }

        info!(
            datatypes = report.datatypes,
            partitions = report.partitions,
            failed = failures.len(),
            "Finished load pass"
        );

        ensure!(failures.is_empty(), DatatypesSnafu { failures });
        Ok(report)
    }

    /// Process one datatype. Returns the number of partitions loaded.
    pub async fn process_datatype(
        &self,
        datatype: &Datatype,
        options: &LoadOptions,
    ) -> Result<usize, DatatypeError> {
        let started = Instant::now();
        let result = self.sync_datatype(datatype, options).await;

        emit!(
            self.metrics,
            AutoloadCompleted {
                organization: datatype.organization.clone(),
                experiment: datatype.experiment.clone(),
                datatype: datatype.name.clone(),
                status: OperationStatus::from_result(&result),
                duration: started.elapsed(),
            }
        );
        if let Err(e) = &result {
            error!(
                datatype = %datatype,
                dataset = %datatype.dataset(),
                table = %datatype.table(),
                error = %e,
                "Failed to autoload datatype"
            );
        }
        result
    }

    async fn sync_datatype(
        &self,
        datatype: &Datatype,
        options: &LoadOptions,
    ) -> Result<usize, DatatypeError> {
        self.resolve_dataset(datatype).await?;
        let (table, created) = self.resolve_table(datatype).await?;

        // A new table is backfilled with its complete history.
        let window = if created {
            options.everything()
        } else {
            options.clone()
        };

        self.maybe_update_schema(datatype, &table).await?;

        let prefix = datatype.data_prefix();
        let dirs = enumerate_dirs(datatype, &window.start, &window.end)
            .await
            .context(ListDirsSnafu { prefix })?;

        self.load_dirs(datatype, &dirs, &window).await
    }

    fn record(&self, datatype: &Datatype, operation: WarehouseOperation, status: OperationStatus) {
        emit!(
            self.metrics,
            WarehouseOperationCompleted {
                organization: datatype.organization.clone(),
                experiment: datatype.experiment.clone(),
                datatype: datatype.name.clone(),
                operation,
                status,
            }
        );
    }

    async fn resolve_dataset(&self, datatype: &Datatype) -> Result<(), DatatypeError> {
        let dataset = datatype.dataset();
        let _guard = self.locks.lock(&format!("dataset:{dataset}")).await;

        match self.warehouse.get_dataset(&dataset).await {
            Ok(_) => return Ok(()),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e).context(GetDatasetSnafu { dataset }),
        }

        let result = self
            .warehouse
            .create_dataset(&dataset, &datatype.location)
            .await;
        self.record(
            datatype,
            WarehouseOperation::CreateDataset,
            OperationStatus::from_result(&result),
        );
        result.context(CreateDatasetSnafu { dataset: &dataset })?;

        info!(dataset = %dataset, location = %datatype.location, "Created dataset");
        Ok(())
    }

    /// Returns the table metadata and whether the table was just created.
    async fn resolve_table(
        &self,
        datatype: &Datatype,
    ) -> Result<(TableMetadata, bool), DatatypeError> {
        let dataset = datatype.dataset();
        let table = datatype.table();
        let _guard = self.locks.lock(&format!("table:{dataset}.{table}")).await;

        match self.warehouse.get_table_metadata(&dataset, &table).await {
            Ok(metadata) => return Ok((metadata, false)),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e).context(GetTableSnafu { dataset, table }),
        }

        let schema = TableSchema::from_json(&datatype.schema).context(InvalidSchemaSnafu {
            path: &datatype.schema_path,
        })?;

        let result = self
            .warehouse
            .create_table(&dataset, &table, &schema, &TimePartitioning::default())
            .await;
        self.record(
            datatype,
            WarehouseOperation::CreateTable,
            OperationStatus::from_result(&result),
        );
        let metadata = result.context(CreateTableSnafu {
            dataset: &dataset,
            table: &table,
        })?;

        info!(dataset = %dataset, table = %table, "Created table, loading complete history");
        Ok((metadata, true))
    }

    async fn maybe_update_schema(
        &self,
        datatype: &Datatype,
        table: &TableMetadata,
    ) -> Result<(), DatatypeError> {
        if datatype.updated_time <= table.last_modified {
            return Ok(());
        }

        let result = self.update_schema(datatype).await;
        self.record(
            datatype,
            WarehouseOperation::UpdateSchema,
            OperationStatus::from_result(&result),
        );
        result
    }

    async fn update_schema(&self, datatype: &Datatype) -> Result<(), DatatypeError> {
        let dataset = datatype.dataset();
        let table = datatype.table();
        let schema = TableSchema::from_json(&datatype.schema).context(InvalidSchemaSnafu {
            path: &datatype.schema_path,
        })?;

        self.warehouse
            .update_table_schema(&dataset, &table, &schema)
            .await
            .context(UpdateSchemaSnafu {
                dataset: &dataset,
                table: &table,
            })?;
        info!(dataset = %dataset, table = %table, "Updated table schema");

        self.update_view(datatype, &schema).await
    }

    /// Push the schema to the datatype's view, if the view exists.
    async fn update_view(
        &self,
        datatype: &Datatype,
        schema: &TableSchema,
    ) -> Result<(), DatatypeError> {
        let dataset = datatype.view_dataset();
        let table = datatype.view_table();

        // Lookup failures also cover missing permissions; either way there
        // is nothing to update.
        if let Err(e) = self.views.get_dataset(&dataset).await {
            debug!(dataset = %dataset, error = %e, "View dataset unavailable, skipping view update");
            return Ok(());
        }
        if let Err(e) = self.views.get_table_metadata(&dataset, &table).await {
            debug!(dataset = %dataset, table = %table, error = %e, "View unavailable, skipping view update");
            return Ok(());
        }

        self.views
            .update_table_schema(&dataset, &table, schema)
            .await
            .context(UpdateViewSnafu {
                dataset: &dataset,
                table: &table,
            })?;
        info!(dataset = %dataset, table = %table, "Updated view schema");
        Ok(())
    }

    /// Load every directory into its partition. All directories are attempted.
    async fn load_dirs(
        &self,
        datatype: &Datatype,
        dirs: &[Dir],
        window: &LoadOptions,
    ) -> Result<usize, DatatypeError> {
        let dataset = datatype.dataset();
        let table = datatype.table();
        let started = Instant::now();
        info!(
            dataset = %dataset,
            table = %table,
            start = %window.start,
            end = %window.end,
            dirs = dirs.len(),
            "Started loading data"
        );

        let mut loaded = 0;
        let mut last_error: Option<WarehouseError> = None;
        let mut latest_ok: Option<NaiveDate> = None;
        let mut latest_failed: Option<NaiveDate> = None;

        for dir in dirs {
            let partition = format!("{table}${}", dir.date.format(PARTITION_FORMAT));
            let result = self
                .warehouse
                .load_from_uris(
                    &dataset,
                    &partition,
                    std::slice::from_ref(&dir.path),
                    WriteDisposition::Truncate,
                )
                .await;

            match result {
                Ok(()) => {
                    loaded += 1;
                    latest_ok = latest_ok.max(Some(dir.date));
                }
                Err(e) => {
                    warn!(path = %dir.path, dataset = %dataset, table = %partition, error = %e, "Failed to load directory");
                    latest_failed = latest_failed.max(Some(dir.date));
                    last_error = Some(e);
                }
            }
        }

        info!(
            dataset = %dataset,
            table = %table,
            loaded,
            failed = dirs.len() - loaded,
            duration_ms = started.elapsed().as_millis(),
            "Finished loading data"
        );

        for (date, status) in [
            (latest_ok, OperationStatus::Ok),
            (latest_failed, OperationStatus::Error),
        ] {
            if let Some(date) = date {
                self.record_loaded_date(datatype, window, date, status);
            }
        }

        let status = if last_error.is_none() {
            OperationStatus::Ok
        } else {
            OperationStatus::Error
        };
        self.record(datatype, WarehouseOperation::Load, status);

        match last_error {
            None => Ok(loaded),
            Some(source) => Err(source).context(LoadSnafu {
                failed: dirs.len() - loaded,
                attempted: dirs.len(),
            }),
        }
    }

    fn record_loaded_date(
        &self,
        datatype: &Datatype,
        window: &LoadOptions,
        date: NaiveDate,
        status: OperationStatus,
    ) {
        let timestamp = date
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc().timestamp())
            .unwrap_or_default();
        emit!(
            self.metrics,
            LoadedDate {
                organization: datatype.organization.clone(),
                experiment: datatype.experiment.clone(),
                datatype: datatype.name.clone(),
                period: window.period.as_str().to_string(),
                status,
                timestamp,
            }
        );
    }
}
