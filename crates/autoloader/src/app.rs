//! Wiring of configured components.

use autoloader_core::StorageProvider;
use autoloader_core::metrics::MetricsSink;
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, WarehouseConfig};
use crate::discovery::{BucketSource, Discovery};
use crate::error::AutoloaderError;
use crate::loader::Loader;
use crate::warehouse::{BigQuery, TokenSource, WarehouseRef};

/// Open every configured bucket.
pub fn bucket_sources(config: &Config) -> Result<Vec<BucketSource>, AutoloaderError> {
    config
        .buckets
        .iter()
        .map(|bucket| -> Result<BucketSource, AutoloaderError> {
            let storage = StorageProvider::for_url(&bucket.url, &bucket.location)?;
            let source = BucketSource::new(Arc::new(storage), bucket.layout, bucket.owner.clone());
            info!(
                bucket = %source.storage.bucket(),
                layout = %source.layout,
                owner = %source.owner,
                "Configured bucket"
            );
            Ok(source)
        })
        .collect()
}

fn token_source(config: &WarehouseConfig) -> TokenSource {
    match &config.access_token {
        Some(token) => TokenSource::fixed(token.clone()),
        None => TokenSource::metadata(),
    }
}

/// Warehouse handles for raw tables and for views.
pub fn warehouses(config: &WarehouseConfig) -> Result<(WarehouseRef, WarehouseRef), AutoloaderError> {
    let main: WarehouseRef = Arc::new(BigQuery::new(
        &config.endpoint,
        &config.project,
        token_source(config),
        config.poll_interval(),
    )?);

    if config.view_project() == config.project {
        return Ok((main.clone(), main));
    }

    let views: WarehouseRef = Arc::new(BigQuery::new(
        &config.endpoint,
        config.view_project(),
        token_source(config),
        config.poll_interval(),
    )?);
    Ok((main, views))
}

/// Build the discovery component.
pub fn discovery(config: &Config, metrics: Arc<dyn MetricsSink>) -> Result<Discovery, AutoloaderError> {
    Ok(Discovery::new(
        bucket_sources(config)?,
        config.first_party_owners.clone(),
        metrics,
    ))
}

/// Build a loader from configuration.
pub fn loader(config: &Config, metrics: Arc<dyn MetricsSink>) -> Result<Loader, AutoloaderError> {
    let (warehouse, views) = warehouses(&config.warehouse)?;
    Ok(Loader::new(
        discovery(config, metrics.clone())?,
        warehouse,
        views,
        metrics,
        config.max_concurrent_datatypes,
    ))
}
