//! Autoloader: discovers archived datatypes in object storage and loads them
//! into BigQuery.
//!
//! - `discovery` - schema declaration walk, naming scheme selection, dated directory listing
//! - `datatype` - the unit of work and its warehouse naming conventions
//! - `loader` - per-datatype create/update/load state machine
//! - `warehouse` - warehouse trait and BigQuery REST client
//! - `server` - HTTP trigger
//! - `nuke` - datatype removal tool

pub mod app;
pub mod cli;
pub mod config;
pub mod datatype;
pub mod discovery;
pub mod error;
pub mod loader;
pub mod nuke;
pub mod options;
pub mod schema;
pub mod server;
pub mod warehouse;

// Re-export commonly used items
pub use config::Config;
pub use datatype::{Datatype, Layout, Namer, Scheme};
pub use discovery::{BucketSource, Dir, Discovery, enumerate_dirs};
pub use error::AutoloaderError;
pub use loader::{LoadReport, Loader};
pub use options::{LoadOptions, Period};
pub use warehouse::{Warehouse, WarehouseRef};

pub use autoloader_core::{StorageProvider, StorageProviderRef, init_tracing, shutdown_signal};
