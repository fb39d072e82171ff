//! Warehouse abstraction.
//!
//! The loader talks to the warehouse only through the [`Warehouse`] trait so
//! it can run against BigQuery or an in-process fake.

mod bigquery;

pub use bigquery::{BigQuery, DEFAULT_ENDPOINT, TokenSource};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::WarehouseError;
use crate::schema::TableSchema;

/// A shared warehouse handle.
pub type WarehouseRef = Arc<dyn Warehouse>;

/// Dataset metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetMetadata {
    pub name: String,
    pub location: String,
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    pub dataset: String,
    pub name: String,
    pub last_modified: DateTime<Utc>,
}

/// Day partitioning on a date column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimePartitioning {
    pub field: String,
    /// Reject queries that do not filter on the partition column.
    pub require_partition_filter: bool,
}

impl Default for TimePartitioning {
    fn default() -> Self {
        Self {
            field: "date".to_string(),
            require_partition_filter: true,
        }
    }
}

/// What a load does with existing rows in the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDisposition {
    /// Replace the destination (a single partition when decorated).
    Truncate,
}

impl WriteDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteDisposition::Truncate => "WRITE_TRUNCATE",
        }
    }
}

/// Operations the loader needs from a warehouse.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Project the handle operates on.
    fn project(&self) -> &str;

    /// Fetch a dataset. Not-found is reported through [`WarehouseError::is_not_found`].
    async fn get_dataset(&self, dataset: &str) -> Result<DatasetMetadata, WarehouseError>;

    /// Create a dataset in `location`. Fails if it already exists.
    async fn create_dataset(
        &self,
        dataset: &str,
        location: &str,
    ) -> Result<DatasetMetadata, WarehouseError>;

    /// Fetch table metadata.
    async fn get_table_metadata(
        &self,
        dataset: &str,
        table: &str,
    ) -> Result<TableMetadata, WarehouseError>;

    /// Create a partitioned table.
    async fn create_table(
        &self,
        dataset: &str,
        table: &str,
        schema: &TableSchema,
        partitioning: &TimePartitioning,
    ) -> Result<TableMetadata, WarehouseError>;

    /// Replace a table's schema.
    async fn update_table_schema(
        &self,
        dataset: &str,
        table: &str,
        schema: &TableSchema,
    ) -> Result<TableMetadata, WarehouseError>;

    /// Run a load job from `uris` into `table` and wait for it to finish.
    ///
    /// `table` may carry a partition decoration (`name$YYYYMMDD`).
    async fn load_from_uris(
        &self,
        dataset: &str,
        table: &str,
        uris: &[String],
        disposition: WriteDisposition,
    ) -> Result<(), WarehouseError>;

    /// Delete a table.
    async fn delete_table(&self, dataset: &str, table: &str) -> Result<(), WarehouseError>;
}
