//! autoloader-core: Shared components for the autoloader service.
//!
//! - `storage/` - Bucket-scoped object storage abstraction (GCS, local, in-memory)
//! - `metrics/` - Injected metrics sink, internal events and Prometheus endpoint
//! - `config/` - Common configuration types and YAML loading
//! - `signal` - Signal handling for graceful shutdown
//! - `error` - Common error types

pub mod config;
pub mod error;
pub mod metrics;
pub mod signal;
pub mod storage;
pub mod tracing;

// Re-export commonly used items
pub use config::MetricsConfig;
pub use error::{ConfigError, MetricsError, StorageError};
pub use metrics::{MetricsSink, NoopSink, PrometheusSink};
pub use signal::{shutdown_signal, shutdown_token};
pub use storage::{BucketAttrs, ObjectInfo, StorageProvider, StorageProviderRef};
pub use tracing::init_tracing;
