//! HTTP trigger end to end.

mod common;

use autoloader::Layout;
use autoloader::server::serve;
use chrono::{Days, Utc};
use common::{FakeWarehouse, RecordingSink, SCHEMA, bucket, loader, source};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

struct Harness {
    base: String,
    warehouse: Arc<FakeWarehouse>,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<Result<(), autoloader::AutoloaderError>>,
}

async fn start(objects: &[(&str, &str)], warehouse: Arc<FakeWarehouse>) -> Harness {
    let storage = bucket("archive-mlab-sandbox", objects).await;
    let loader = Arc::new(loader(
        vec![source(storage, Layout::V1)],
        warehouse.clone(),
        Arc::new(RecordingSink::default()),
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(serve(listener, loader, shutdown.clone()));

    Harness {
        base,
        warehouse,
        shutdown,
        server,
    }
}

impl Harness {
    async fn get(&self, path: &str) -> (u16, String) {
        let response = reqwest::get(format!("{}{path}", self.base)).await.unwrap();
        let status = response.status().as_u16();
        (status, response.text().await.unwrap())
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.server.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_daily_load_of_new_datatype() {
    let yesterday = Utc::now().date_naive() - Days::new(1);
    let data = format!("autoload/v1/ndt/ndt7/{}/a.json", yesterday.format("%Y/%m/%d"));
    let harness = start(
        &[
            ("autoload/v1/tables/ndt/ndt7.table.json", SCHEMA),
            (data.as_str(), "{}"),
        ],
        FakeWarehouse::new("mlab-sandbox"),
    )
    .await;

    let (status, body) = harness.get("/v1/load?period=day").await;
    assert_eq!(status, 200, "{body}");
    assert!(body.is_empty());

    let partition = format!("ndt7${}", yesterday.format("%Y%m%d"));
    assert!(harness.warehouse.has_table("raw_ndt", "ndt7"));
    let loads = harness.warehouse.loads();
    assert_eq!(loads.len(), 1);
    assert_eq!(loads[0].table, partition);

    harness.stop().await;
}

#[tokio::test]
async fn test_rejects_bad_parameters() {
    let harness = start(
        &[("autoload/v1/tables/ndt/ndt7.table.json", SCHEMA)],
        FakeWarehouse::new("mlab-sandbox"),
    )
    .await;

    for query in [
        "/v1/load?period=fortnight",
        "/v1/load",
        "/v1/load?start=2023/01/01",
        "/v1/load?start=2023/13/01&end=2023/14/01",
    ] {
        let (status, _) = harness.get(query).await;
        assert_eq!(status, 400, "{query}");
    }
    assert!(harness.warehouse.created_datasets().is_empty());

    let (status, body) = harness.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body, "ok\n");

    harness.stop().await;
}

#[tokio::test]
async fn test_failed_datatype_returns_500() {
    let warehouse = FakeWarehouse::new("mlab-sandbox");
    warehouse.fail_create_table();
    let harness = start(
        &[("autoload/v1/tables/ndt/ndt7.table.json", SCHEMA)],
        warehouse,
    )
    .await;

    let (status, body) = harness.get("/v1/load?start=2023/01/01&end=2023/02/01").await;
    assert_eq!(status, 500);
    assert!(body.contains("failed to autoload raw_ndt.ndt7"), "{body}");

    harness.stop().await;
}
