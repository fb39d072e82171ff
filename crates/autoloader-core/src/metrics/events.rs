//! Internal events for autoloader metrics emission.
//!
//! Each event struct represents a measurable occurrence in an autoload pass.
//! Events implement the `InternalEvent` trait which records the corresponding
//! metric on a [`MetricsSink`].

use std::time::Duration;
use tracing::trace;

use super::MetricsSink;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event to the given sink.
    fn emit(self, sink: &dyn MetricsSink);
}

/// Outcome label shared by all events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Ok,
    Error,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Ok => "OK",
            OperationStatus::Error => "error",
        }
    }

    pub fn from_result<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            OperationStatus::Ok
        } else {
            OperationStatus::Error
        }
    }
}

/// Warehouse operation performed on behalf of a datatype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarehouseOperation {
    CreateDataset,
    CreateTable,
    UpdateSchema,
    Load,
}

impl WarehouseOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarehouseOperation::CreateDataset => "create-dataset",
            WarehouseOperation::CreateTable => "create-table",
            WarehouseOperation::UpdateSchema => "update-schema",
            WarehouseOperation::Load => "load",
        }
    }
}

/// Histogram buckets (seconds) for whole-datatype autoload latency.
pub const AUTOLOAD_DURATION_BUCKETS: &[f64] = &[
    10.0, 21.5, 46.4, 100.0, 215.0, 464.0, 1000.0, 2150.0, 4640.0, 10000.0, 21500.0, 46400.0,
];

pub const AUTOLOAD_DURATION: &str = "autoloader_duration_seconds";
pub const WAREHOUSE_OPERATIONS_TOTAL: &str = "autoloader_bigquery_operations_total";
pub const LOADED_DATES: &str = "autoloader_loaded_dates";
pub const SCHEMA_FILES_SKIPPED_TOTAL: &str = "autoloader_schema_files_skipped_total";

/// Event emitted when a datatype finishes processing.
pub struct AutoloadCompleted {
    /// Owning organization; empty for single-owner buckets.
    pub organization: String,
    pub experiment: String,
    pub datatype: String,
    pub status: OperationStatus,
    pub duration: Duration,
}

impl InternalEvent for AutoloadCompleted {
    fn emit(self, sink: &dyn MetricsSink) {
        trace!(
            organization = %self.organization,
            experiment = %self.experiment,
            datatype = %self.datatype,
            status = self.status.as_str(),
            duration_ms = self.duration.as_millis(),
            "Autoload completed"
        );
        sink.observe_duration(
            AUTOLOAD_DURATION,
            vec![
                ("organization", self.organization),
                ("experiment", self.experiment),
                ("datatype", self.datatype),
                ("status", self.status.as_str().to_string()),
            ],
            self.duration,
        );
    }
}

/// Event emitted for every create, update and load operation.
pub struct WarehouseOperationCompleted {
    pub organization: String,
    pub experiment: String,
    pub datatype: String,
    pub operation: WarehouseOperation,
    pub status: OperationStatus,
}

impl InternalEvent for WarehouseOperationCompleted {
    fn emit(self, sink: &dyn MetricsSink) {
        trace!(
            organization = %self.organization,
            experiment = %self.experiment,
            datatype = %self.datatype,
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            "Warehouse operation completed"
        );
        sink.increment_counter(
            WAREHOUSE_OPERATIONS_TOTAL,
            vec![
                ("organization", self.organization),
                ("experiment", self.experiment),
                ("datatype", self.datatype),
                ("operation", self.operation.as_str().to_string()),
                ("status", self.status.as_str().to_string()),
            ],
        );
    }
}

/// Event emitted with the most recent partition date loaded for a datatype.
pub struct LoadedDate {
    pub organization: String,
    pub experiment: String,
    pub datatype: String,
    /// Load period tag (e.g. "day", "everything").
    pub period: String,
    pub status: OperationStatus,
    /// Unix timestamp (seconds) of the partition date.
    pub timestamp: i64,
}

impl InternalEvent for LoadedDate {
    fn emit(self, sink: &dyn MetricsSink) {
        trace!(
            organization = %self.organization,
            experiment = %self.experiment,
            datatype = %self.datatype,
            period = %self.period,
            timestamp = self.timestamp,
            "Loaded date"
        );
        sink.set_gauge(
            LOADED_DATES,
            vec![
                ("organization", self.organization),
                ("experiment", self.experiment),
                ("datatype", self.datatype),
                ("period", self.period),
                ("status", self.status.as_str().to_string()),
            ],
            self.timestamp as f64,
        );
    }
}

/// Reason a schema declaration was skipped during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InvalidPath,
    Unreadable,
    Empty,
    /// Out-of-band declaration with no organization data yet.
    NoData,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::InvalidPath => "invalid_path",
            SkipReason::Unreadable => "unreadable",
            SkipReason::Empty => "empty",
            SkipReason::NoData => "no_data",
        }
    }
}

/// Event emitted when discovery skips a schema declaration.
pub struct SchemaFileSkipped {
    pub bucket: String,
    pub reason: SkipReason,
}

impl InternalEvent for SchemaFileSkipped {
    fn emit(self, sink: &dyn MetricsSink) {
        trace!(bucket = %self.bucket, reason = self.reason.as_str(), "Schema file skipped");
        sink.increment_counter(
            SCHEMA_FILES_SKIPPED_TOTAL,
            vec![
                ("bucket", self.bucket),
                ("reason", self.reason.as_str().to_string()),
            ],
        );
    }
}
