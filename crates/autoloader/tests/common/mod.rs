//! Shared fixtures for autoloader integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use autoloader::config::default_first_party_owners;
use autoloader::discovery::{BucketSource, Discovery};
use autoloader::error::WarehouseError;
use autoloader::schema::TableSchema;
use autoloader::warehouse::{
    DatasetMetadata, TableMetadata, TimePartitioning, Warehouse, WarehouseRef, WriteDisposition,
};
use autoloader::{Layout, Loader, StorageProvider, StorageProviderRef};
use autoloader_core::metrics::{Labels, MetricsSink};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SCHEMA: &str = r#"[
  {"name": "id", "type": "STRING", "mode": "REQUIRED"},
  {"name": "date", "type": "DATE"},
  {"name": "raw", "type": "RECORD", "fields": [{"name": "bytes", "type": "INTEGER"}]}
]"#;

/// A recorded load job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadCall {
    pub dataset: String,
    /// Destination including the partition decoration.
    pub table: String,
    pub uris: Vec<String>,
}

#[derive(Default)]
struct State {
    datasets: HashMap<String, String>,
    tables: HashMap<(String, String), TableMetadata>,
    create_dataset_calls: usize,
    created_datasets: Vec<String>,
    created_tables: Vec<(String, String)>,
    schema_updates: Vec<(String, String)>,
    loads: Vec<LoadCall>,
    deleted: Vec<(String, String)>,
    failing_partitions: HashSet<String>,
    fail_create_table: bool,
}

/// In-process warehouse that records every call.
pub struct FakeWarehouse {
    project: String,
    state: Mutex<State>,
}

impl FakeWarehouse {
    pub fn new(project: &str) -> Arc<Self> {
        Arc::new(Self {
            project: project.to_string(),
            state: Mutex::new(State::default()),
        })
    }

    pub fn add_dataset(&self, dataset: &str) {
        self.state
            .lock()
            .unwrap()
            .datasets
            .insert(dataset.to_string(), "US".to_string());
    }

    /// Seed an existing table last modified at `last_modified`.
    pub fn add_table(&self, dataset: &str, table: &str, last_modified: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        state.datasets.insert(dataset.to_string(), "US".to_string());
        state.tables.insert(
            (dataset.to_string(), table.to_string()),
            TableMetadata {
                dataset: dataset.to_string(),
                name: table.to_string(),
                last_modified,
            },
        );
    }

    /// Make loads into `table$YYYYMMDD` fail.
    pub fn fail_partition(&self, partition: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_partitions
            .insert(partition.to_string());
    }

    pub fn fail_create_table(&self) {
        self.state.lock().unwrap().fail_create_table = true;
    }

    pub fn has_table(&self, dataset: &str, table: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .tables
            .contains_key(&(dataset.to_string(), table.to_string()))
    }

    /// Every `create_dataset` call, including rejected ones.
    pub fn create_dataset_calls(&self) -> usize {
        self.state.lock().unwrap().create_dataset_calls
    }

    pub fn created_datasets(&self) -> Vec<String> {
        self.state.lock().unwrap().created_datasets.clone()
    }

    pub fn created_tables(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().created_tables.clone()
    }

    pub fn schema_updates(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().schema_updates.clone()
    }

    pub fn loads(&self) -> Vec<LoadCall> {
        self.state.lock().unwrap().loads.clone()
    }

    pub fn deleted(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().deleted.clone()
    }
}

fn not_found(resource: String) -> WarehouseError {
    WarehouseError::NotFound { resource }
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    fn project(&self) -> &str {
        &self.project
    }

    async fn get_dataset(&self, dataset: &str) -> Result<DatasetMetadata, WarehouseError> {
        let result = {
            let state = self.state.lock().unwrap();
            state
                .datasets
                .get(dataset)
                .map(|location| DatasetMetadata {
                    name: dataset.to_string(),
                    location: location.clone(),
                })
                .ok_or_else(|| not_found(dataset.to_string()))
        };
        // Let other datatypes run between the lookup and a following create.
        tokio::task::yield_now().await;
        result
    }

    async fn create_dataset(
        &self,
        dataset: &str,
        location: &str,
    ) -> Result<DatasetMetadata, WarehouseError> {
        self.state.lock().unwrap().create_dataset_calls += 1;
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();
        if state.datasets.contains_key(dataset) {
            return Err(WarehouseError::Api {
                status: 409,
                message: format!("Already Exists: Dataset {dataset}"),
            });
        }
        state
            .datasets
            .insert(dataset.to_string(), location.to_string());
        state.created_datasets.push(dataset.to_string());
        Ok(DatasetMetadata {
            name: dataset.to_string(),
            location: location.to_string(),
        })
    }

    async fn get_table_metadata(
        &self,
        dataset: &str,
        table: &str,
    ) -> Result<TableMetadata, WarehouseError> {
        let result = {
            let state = self.state.lock().unwrap();
            state
                .tables
                .get(&(dataset.to_string(), table.to_string()))
                .cloned()
                .ok_or_else(|| not_found(format!("{dataset}.{table}")))
        };
        tokio::task::yield_now().await;
        result
    }

    async fn create_table(
        &self,
        dataset: &str,
        table: &str,
        _schema: &TableSchema,
        _partitioning: &TimePartitioning,
    ) -> Result<TableMetadata, WarehouseError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create_table {
            return Err(WarehouseError::Api {
                status: 403,
                message: "Access Denied".to_string(),
            });
        }
        let metadata = TableMetadata {
            dataset: dataset.to_string(),
            name: table.to_string(),
            last_modified: Utc::now(),
        };
        state
            .tables
            .insert((dataset.to_string(), table.to_string()), metadata.clone());
        state
            .created_tables
            .push((dataset.to_string(), table.to_string()));
        Ok(metadata)
    }

    async fn update_table_schema(
        &self,
        dataset: &str,
        table: &str,
        _schema: &TableSchema,
    ) -> Result<TableMetadata, WarehouseError> {
        let mut state = self.state.lock().unwrap();
        let key = (dataset.to_string(), table.to_string());
        let Some(metadata) = state.tables.get_mut(&key) else {
            return Err(not_found(format!("{dataset}.{table}")));
        };
        metadata.last_modified = Utc::now();
        let metadata = metadata.clone();
        state.schema_updates.push(key);
        Ok(metadata)
    }

    async fn load_from_uris(
        &self,
        dataset: &str,
        table: &str,
        uris: &[String],
        _disposition: WriteDisposition,
    ) -> Result<(), WarehouseError> {
        let mut state = self.state.lock().unwrap();
        state.loads.push(LoadCall {
            dataset: dataset.to_string(),
            table: table.to_string(),
            uris: uris.to_vec(),
        });
        if state.failing_partitions.contains(table) {
            return Err(WarehouseError::Job {
                job_id: format!("job-{table}"),
                message: "Error while reading data".to_string(),
            });
        }
        Ok(())
    }

    async fn delete_table(&self, dataset: &str, table: &str) -> Result<(), WarehouseError> {
        let mut state = self.state.lock().unwrap();
        let key = (dataset.to_string(), table.to_string());
        if state.tables.remove(&key).is_none() {
            return Err(not_found(format!("{dataset}.{table}")));
        }
        state.deleted.push(key);
        Ok(())
    }
}

/// Metrics sink that keeps every observation.
#[derive(Default)]
pub struct RecordingSink {
    counters: Mutex<Vec<(&'static str, Labels)>>,
    gauges: Mutex<Vec<(&'static str, Labels, f64)>>,
    durations: Mutex<Vec<(&'static str, Labels)>>,
}

impl RecordingSink {
    pub fn counters(&self, name: &str) -> Vec<Labels> {
        self.counters
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| *n == name)
            .map(|(_, labels)| labels.clone())
            .collect()
    }

    pub fn gauges(&self, name: &str) -> Vec<(Labels, f64)> {
        self.gauges
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _, _)| *n == name)
            .map(|(_, labels, value)| (labels.clone(), *value))
            .collect()
    }

    pub fn durations(&self, name: &str) -> Vec<Labels> {
        self.durations
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| *n == name)
            .map(|(_, labels)| labels.clone())
            .collect()
    }
}

impl MetricsSink for RecordingSink {
    fn observe_duration(&self, name: &'static str, labels: Labels, _duration: Duration) {
        self.durations.lock().unwrap().push((name, labels));
    }

    fn increment_counter(&self, name: &'static str, labels: Labels) {
        self.counters.lock().unwrap().push((name, labels));
    }

    fn set_gauge(&self, name: &'static str, labels: Labels, value: f64) {
        self.gauges.lock().unwrap().push((name, labels, value));
    }
}

/// Look up a label value.
pub fn label<'a>(labels: &'a Labels, key: &str) -> Option<&'a str> {
    labels
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.as_str())
}

/// An in-memory bucket seeded with `objects` (path, contents).
pub async fn bucket(name: &str, objects: &[(&str, &str)]) -> StorageProviderRef {
    let storage = StorageProvider::in_memory(name, "US");
    for (path, contents) in objects {
        storage
            .put(path, contents.as_bytes().to_vec())
            .await
            .unwrap();
    }
    Arc::new(storage)
}

pub fn discovery(sources: Vec<BucketSource>, metrics: Arc<dyn MetricsSink>) -> Discovery {
    Discovery::new(sources, default_first_party_owners(), metrics)
}

pub fn source(storage: StorageProviderRef, layout: Layout) -> BucketSource {
    BucketSource::new(storage, layout, None)
}

/// Loader over one warehouse for both tables and views.
pub fn loader(
    sources: Vec<BucketSource>,
    warehouse: Arc<FakeWarehouse>,
    metrics: Arc<dyn MetricsSink>,
) -> Loader {
    loader_with_concurrency(sources, warehouse, metrics, 2)
}

pub fn loader_with_concurrency(
    sources: Vec<BucketSource>,
    warehouse: Arc<FakeWarehouse>,
    metrics: Arc<dyn MetricsSink>,
    max_concurrent: usize,
) -> Loader {
    let handle: WarehouseRef = warehouse;
    Loader::new(
        discovery(sources, metrics.clone()),
        handle.clone(),
        handle,
        metrics,
        max_concurrent,
    )
}
