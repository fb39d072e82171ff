//! Error types for the autoloader service.

use snafu::prelude::*;

// Re-export common errors
pub use autoloader_core::error::{ConfigError, MetricsError, StorageError};

/// Errors produced while interpreting a schema declaration path.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SchemaPathError {
    /// The path does not match any recognized declaration layout.
    #[snafu(display("invalid schema path {path}"))]
    InvalidPath { path: String },
}

/// Errors produced while parsing a column-schema declaration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SchemaError {
    /// The declaration is not valid JSON of the expected shape.
    #[snafu(display("failed to parse schema: {source}"))]
    Json { source: serde_json::Error },

    /// The declaration has no columns.
    #[snafu(display("schema declares no fields"))]
    NoFields,

    /// A column is malformed.
    #[snafu(display("invalid field '{name}': {reason}"))]
    InvalidField { name: String, reason: String },
}

/// Errors returned by a warehouse client.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WarehouseError {
    /// The dataset or table does not exist.
    #[snafu(display("not found: {resource}"))]
    NotFound { resource: String },

    /// The warehouse API rejected the request.
    #[snafu(display("warehouse request failed with status {status}: {message}"))]
    Api { status: u16, message: String },

    /// The request could not be sent or the response could not be read.
    #[snafu(display("warehouse request failed: {source}"))]
    Http { source: reqwest::Error },

    /// A load job finished with an error.
    #[snafu(display("load job {job_id} failed: {message}"))]
    Job { job_id: String, message: String },

    /// No access token could be obtained.
    #[snafu(display("failed to obtain access token: {message}"))]
    Auth { message: String },

    /// The schema could not be converted for the warehouse.
    #[snafu(display("invalid schema: {source}"))]
    Schema { source: SchemaError },
}

impl WarehouseError {
    /// Check if this error represents a "not found" condition.
    pub fn is_not_found(&self) -> bool {
        match self {
            WarehouseError::NotFound { .. } => true,
            WarehouseError::Api { status, .. } => *status == 404,
            _ => false,
        }
    }
}

/// Errors that stop a single datatype from being loaded.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DatatypeError {
    #[snafu(display("failed to get dataset {dataset}: {source}"))]
    GetDataset {
        dataset: String,
        source: WarehouseError,
    },

    #[snafu(display("failed to create dataset {dataset}: {source}"))]
    CreateDataset {
        dataset: String,
        source: WarehouseError,
    },

    #[snafu(display("failed to get table {dataset}.{table}: {source}"))]
    GetTable {
        dataset: String,
        table: String,
        source: WarehouseError,
    },

    #[snafu(display("invalid schema {path}: {source}"))]
    InvalidSchema { path: String, source: SchemaError },

    #[snafu(display("failed to create table {dataset}.{table}: {source}"))]
    CreateTable {
        dataset: String,
        table: String,
        source: WarehouseError,
    },

    #[snafu(display("failed to update schema of {dataset}.{table}: {source}"))]
    UpdateSchema {
        dataset: String,
        table: String,
        source: WarehouseError,
    },

    #[snafu(display("failed to update view {dataset}.{table}: {source}"))]
    UpdateView {
        dataset: String,
        table: String,
        source: WarehouseError,
    },

    #[snafu(display("failed to list directories under {prefix}: {source}"))]
    ListDirs {
        prefix: String,
        source: StorageError,
    },

    /// One or more partition loads failed. Every directory was still attempted.
    #[snafu(display("{failed} of {attempted} loads failed, last error: {source}"))]
    Load {
        failed: usize,
        attempted: usize,
        source: WarehouseError,
    },
}

/// Errors in the parameters of a load request.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum OptionsError {
    #[snafu(display("invalid date format (want YYYY/MM/DD): {value}"))]
    InvalidDate { value: String },

    #[snafu(display(
        "invalid or missing period '{period}' (want 'day', 'month', 'annual', 'everything' or 'new')"
    ))]
    InvalidPeriod { period: String },
}

/// Aggregate failure of a load pass.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LoadError {
    /// One line per failed datatype.
    #[snafu(display("{}", failures.join("\n")))]
    Datatypes { failures: Vec<String> },
}

/// Top-level errors for the autoloader binary.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AutoloaderError {
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    #[snafu(display("Storage error: {source}"))]
    Storage { source: StorageError },

    #[snafu(display("Warehouse error: {source}"))]
    Warehouse { source: WarehouseError },

    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: MetricsError },

    #[snafu(display("Invalid load options: {source}"))]
    Options { source: OptionsError },

    #[snafu(display("{source}"))]
    LoadPass { source: LoadError },

    #[snafu(display("Invalid datatype '{value}' (want <experiment>/<datatype>)"))]
    InvalidDatatype { value: String },

    #[snafu(display("Failed to bind {address}: {source}"))]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[snafu(display("Server error: {source}"))]
    Serve { source: std::io::Error },
}

impl From<ConfigError> for AutoloaderError {
    fn from(source: ConfigError) -> Self {
        AutoloaderError::Config { source }
    }
}

impl From<StorageError> for AutoloaderError {
    fn from(source: StorageError) -> Self {
        AutoloaderError::Storage { source }
    }
}

impl From<WarehouseError> for AutoloaderError {
    fn from(source: WarehouseError) -> Self {
        AutoloaderError::Warehouse { source }
    }
}

impl From<LoadError> for AutoloaderError {
    fn from(source: LoadError) -> Self {
        AutoloaderError::LoadPass { source }
    }
}
