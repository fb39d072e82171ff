//! BigQuery REST client.
//!
//! Implements [`Warehouse`] against the BigQuery v2 REST API. Load jobs are
//! submitted and then polled until they reach the `DONE` state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use snafu::prelude::*;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{DatasetMetadata, TableMetadata, TimePartitioning, Warehouse, WriteDisposition};
use crate::error::{ApiSnafu, AuthSnafu, HttpSnafu, JobSnafu, NotFoundSnafu, WarehouseError};
use crate::schema::TableSchema;

/// Public BigQuery endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com";

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh cached tokens this long before they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Where access tokens come from.
pub enum TokenSource {
    /// A fixed token (e.g. from `gcloud auth print-access-token`, or any
    /// string for an emulator).
    Static(String),
    /// The GCE metadata server of the instance the service runs on.
    Metadata {
        url: String,
        cached: Mutex<Option<(String, Instant)>>,
    },
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::Static(_) => f.write_str("TokenSource::Static(..)"),
            TokenSource::Metadata { url, .. } => write!(f, "TokenSource::Metadata({url})"),
        }
    }
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

impl TokenSource {
    pub fn fixed(token: impl Into<String>) -> Self {
        TokenSource::Static(token.into())
    }

    pub fn metadata() -> Self {
        TokenSource::Metadata {
            url: METADATA_TOKEN_URL.to_string(),
            cached: Mutex::new(None),
        }
    }

    async fn token(&self, client: &reqwest::Client) -> Result<String, WarehouseError> {
        let (url, cached) = match self {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Metadata { url, cached } => (url, cached),
        };

        let mut cached = cached.lock().await;
        if let Some((token, expires_at)) = cached.as_ref() {
            if Instant::now() < *expires_at {
                return Ok(token.clone());
            }
        }

        let response = client
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .context(HttpSnafu)?;
        ensure!(
            response.status().is_success(),
            AuthSnafu {
                message: format!("metadata server returned {}", response.status()),
            }
        );
        let token: MetadataToken = response.json().await.context(HttpSnafu)?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some((token.access_token.clone(), Instant::now() + lifetime));
        debug!(expires_in = token.expires_in, "Refreshed access token");
        Ok(token.access_token)
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference {
    dataset_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetResource {
    dataset_reference: DatasetReference,
    #[serde(default)]
    location: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    dataset_id: String,
    table_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableResource {
    table_reference: TableReference,
    /// Milliseconds since the epoch, as a string.
    last_modified_time: Option<String>,
}

impl From<TableResource> for TableMetadata {
    fn from(table: TableResource) -> Self {
        let last_modified = table
            .last_modified_time
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        TableMetadata {
            dataset: table.table_reference.dataset_id,
            name: table.table_reference.table_id,
            last_modified,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    state: String,
    error_result: Option<ErrorBody>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    job_reference: JobReference,
    status: Option<JobStatus>,
}

/// BigQuery client bound to one project.
pub struct BigQuery {
    client: reqwest::Client,
    endpoint: String,
    project: String,
    tokens: TokenSource,
    poll_interval: Duration,
}

impl std::fmt::Debug for BigQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BigQuery<{}@{}>", self.project, self.endpoint)
    }
}

impl BigQuery {
    pub fn new(
        endpoint: &str,
        project: &str,
        tokens: TokenSource,
        poll_interval: Duration,
    ) -> Result<Self, WarehouseError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION"),
            ))
            .build()
            .context(HttpSnafu)?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project: project.to_string(),
            tokens,
            poll_interval,
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/{path}",
            self.endpoint, self.project
        )
    }

    async fn execute(
        &self,
        request: RequestBuilder,
        resource: &str,
    ) -> Result<reqwest::Response, WarehouseError> {
        let token = self.tokens.token(&self.client).await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .context(HttpSnafu)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return NotFoundSnafu { resource }.fail();
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return ApiSnafu {
                status: status.as_u16(),
                message,
            }
            .fail();
        }
        Ok(response)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource: &str,
    ) -> Result<T, WarehouseError> {
        self.execute(request, resource)
            .await?
            .json::<T>()
            .await
            .context(HttpSnafu)
    }

    async fn wait_for_job(&self, job: JobResource) -> Result<(), WarehouseError> {
        let job_id = job.job_reference.job_id.clone();
        let path = match &job.job_reference.location {
            Some(location) => format!("jobs/{job_id}?location={location}"),
            None => format!("jobs/{job_id}"),
        };

        let mut status = job.status;
        loop {
            match status.take() {
                Some(JobStatus {
                    state,
                    error_result: Some(error),
                }) if state == "DONE" => {
                    return JobSnafu {
                        job_id,
                        message: error.message,
                    }
                    .fail();
                }
                Some(JobStatus { state, .. }) if state == "DONE" => return Ok(()),
                _ => {}
            }

            tokio::time::sleep(self.poll_interval).await;
            let job: JobResource = self
                .call(self.client.get(self.url(&path)), &job_id)
                .await?;
            status = job.status;
        }
    }
}

#[async_trait]
impl Warehouse for BigQuery {
    fn project(&self) -> &str {
        &self.project
    }

    async fn get_dataset(&self, dataset: &str) -> Result<DatasetMetadata, WarehouseError> {
        let resource: DatasetResource = self
            .call(
                self.client.get(self.url(&format!("datasets/{dataset}"))),
                dataset,
            )
            .await?;
        Ok(DatasetMetadata {
            name: resource.dataset_reference.dataset_id,
            location: resource.location,
        })
    }

    async fn create_dataset(
        &self,
        dataset: &str,
        location: &str,
    ) -> Result<DatasetMetadata, WarehouseError> {
        let body = json!({
            "datasetReference": { "projectId": self.project, "datasetId": dataset },
            "location": location,
        });
        let resource: DatasetResource = self
            .call(self.client.post(self.url("datasets")).json(&body), dataset)
            .await?;
        info!(project = %self.project, dataset, location, "Created dataset");
        Ok(DatasetMetadata {
            name: resource.dataset_reference.dataset_id,
            location: resource.location,
        })
    }

    async fn get_table_metadata(
        &self,
        dataset: &str,
        table: &str,
    ) -> Result<TableMetadata, WarehouseError> {
        let resource: TableResource = self
            .call(
                self.client
                    .get(self.url(&format!("datasets/{dataset}/tables/{table}"))),
                &format!("{dataset}.{table}"),
            )
            .await?;
        Ok(resource.into())
    }

    async fn create_table(
        &self,
        dataset: &str,
        table: &str,
        schema: &TableSchema,
        partitioning: &TimePartitioning,
    ) -> Result<TableMetadata, WarehouseError> {
        let body = json!({
            "tableReference": {
                "projectId": self.project,
                "datasetId": dataset,
                "tableId": table,
            },
            "schema": schema,
            "timePartitioning": { "type": "DAY", "field": partitioning.field },
            "requirePartitionFilter": partitioning.require_partition_filter,
        });
        let resource: TableResource = self
            .call(
                self.client
                    .post(self.url(&format!("datasets/{dataset}/tables")))
                    .json(&body),
                &format!("{dataset}.{table}"),
            )
            .await?;
        info!(project = %self.project, dataset, table, "Created table");
        Ok(resource.into())
    }

    async fn update_table_schema(
        &self,
        dataset: &str,
        table: &str,
        schema: &TableSchema,
    ) -> Result<TableMetadata, WarehouseError> {
        let body = json!({ "schema": schema });
        let resource: TableResource = self
            .call(
                self.client
                    .patch(self.url(&format!("datasets/{dataset}/tables/{table}")))
                    .json(&body),
                &format!("{dataset}.{table}"),
            )
            .await?;
        Ok(resource.into())
    }

    async fn load_from_uris(
        &self,
        dataset: &str,
        table: &str,
        uris: &[String],
        disposition: WriteDisposition,
    ) -> Result<(), WarehouseError> {
        let body = json!({
            "configuration": {
                "load": {
                    "sourceUris": uris,
                    "sourceFormat": "NEWLINE_DELIMITED_JSON",
                    "destinationTable": {
                        "projectId": self.project,
                        "datasetId": dataset,
                        "tableId": table,
                    },
                    "writeDisposition": disposition.as_str(),
                }
            }
        });
        let job: JobResource = self
            .call(
                self.client.post(self.url("jobs")).json(&body),
                &format!("{dataset}.{table}"),
            )
            .await?;
        debug!(job_id = %job.job_reference.job_id, dataset, table, "Submitted load job");
        self.wait_for_job(job).await
    }

    async fn delete_table(&self, dataset: &str, table: &str) -> Result<(), WarehouseError> {
        self.execute(
            self.client
                .delete(self.url(&format!("datasets/{dataset}/tables/{table}"))),
            &format!("{dataset}.{table}"),
        )
        .await?;
        Ok(())
    }
}
