//! Load passes against an in-process warehouse.

mod common;

use autoloader::error::LoadError;
use autoloader::{Layout, LoadOptions, Period};
use autoloader_core::metrics::events::{
    AUTOLOAD_DURATION, LOADED_DATES, WAREHOUSE_OPERATIONS_TOTAL,
};
use chrono::{Days, Duration, NaiveDate, TimeZone, Utc};
use common::{
    FakeWarehouse, RecordingSink, SCHEMA, bucket, label, loader, loader_with_concurrency, source,
};
use std::collections::HashSet;
use std::sync::Arc;

fn day_path(date: NaiveDate) -> String {
    date.format("%Y/%m/%d").to_string()
}

fn partitions(warehouse: &FakeWarehouse) -> HashSet<String> {
    warehouse
        .loads()
        .into_iter()
        .map(|call| format!("{}.{}", call.dataset, call.table))
        .collect()
}

fn set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_new_datatype_loads_complete_history() {
    let today = Utc::now().date_naive();
    let yesterday = today - Days::new(1);
    let recent = format!("autoload/v1/ndt/ndt7/{}/a.json", day_path(yesterday));
    let storage = bucket(
        "archive-mlab-sandbox",
        &[
            ("autoload/v1/tables/ndt/ndt7.table.json", SCHEMA),
            ("autoload/v1/ndt/ndt7/2019/01/01/a.json", "{}"),
            (recent.as_str(), "{}"),
        ],
    )
    .await;
    let warehouse = FakeWarehouse::new("mlab-sandbox");
    let sink = Arc::new(RecordingSink::default());
    let loader = loader(
        vec![source(storage, Layout::V1)],
        warehouse.clone(),
        sink.clone(),
    );

    let options = LoadOptions::for_period(Period::Day, today).unwrap();
    let report = loader.load(&options).await.unwrap();
    let recent_partition = format!("raw_ndt.ndt7${}", yesterday.format("%Y%m%d"));

    assert_eq!(report.datatypes, 1);
    assert_eq!(report.partitions, 2);
    assert_eq!(warehouse.created_datasets(), vec!["raw_ndt"]);
    assert_eq!(
        warehouse.created_tables(),
        vec![("raw_ndt".to_string(), "ndt7".to_string())]
    );
    assert_eq!(
        partitions(&warehouse),
        set(&[
            "raw_ndt.ndt7$20190101",
            recent_partition.as_str(),
        ])
    );
    assert!(warehouse.schema_updates().is_empty());

    let load = warehouse
        .loads()
        .into_iter()
        .find(|call| call.table == "ndt7$20190101")
        .unwrap();
    assert_eq!(
        load.uris,
        vec!["memory://archive-mlab-sandbox/autoload/v1/ndt/ndt7/2019/01/01/*"]
    );

    let operations: HashSet<String> = sink
        .counters(WAREHOUSE_OPERATIONS_TOTAL)
        .iter()
        .filter_map(|labels| label(labels, "operation").map(str::to_string))
        .collect();
    assert_eq!(operations, set(&["create-dataset", "create-table", "load"]));

    let gauges = sink.gauges(LOADED_DATES);
    assert_eq!(gauges.len(), 1);
    let (labels, timestamp) = &gauges[0];
    assert_eq!(label(labels, "period"), Some("everything"));
    assert_eq!(label(labels, "status"), Some("OK"));
    let expected = Utc
        .from_utc_datetime(&yesterday.and_hms_opt(0, 0, 0).unwrap())
        .timestamp() as f64;
    assert_eq!(*timestamp, expected);
}

#[tokio::test]
async fn test_existing_table_loads_only_window() {
    let today = Utc::now().date_naive();
    let yesterday = today - Days::new(1);
    let recent = format!("autoload/v1/ndt/ndt7/{}/a.json", day_path(yesterday));
    let storage = bucket(
        "archive-mlab-sandbox",
        &[
            ("autoload/v1/tables/ndt/ndt7.table.json", SCHEMA),
            ("autoload/v1/ndt/ndt7/2019/01/01/a.json", "{}"),
            (recent.as_str(), "{}"),
        ],
    )
    .await;
    let warehouse = FakeWarehouse::new("mlab-sandbox");
    warehouse.add_table("raw_ndt", "ndt7", Utc::now() + Duration::hours(1));
    let loader = loader(
        vec![source(storage, Layout::V1)],
        warehouse.clone(),
        Arc::new(RecordingSink::default()),
    );

    let options = LoadOptions::for_period(Period::Day, today).unwrap();
    let report = loader.load(&options).await.unwrap();
    let recent_partition = format!("raw_ndt.ndt7${}", yesterday.format("%Y%m%d"));

    assert_eq!(report.partitions, 1);
    assert!(warehouse.created_datasets().is_empty());
    assert!(warehouse.created_tables().is_empty());
    assert!(warehouse.schema_updates().is_empty());
    assert_eq!(
        partitions(&warehouse),
        set(&[recent_partition.as_str()])
    );
}

#[tokio::test]
async fn test_failed_partition_does_not_stop_others() {
    let today = NaiveDate::from_ymd_opt(2023, 3, 20).unwrap();
    let storage = bucket(
        "archive-mlab-sandbox",
        &[
            ("autoload/v1/tables/ndt/ndt7.table.json", SCHEMA),
            ("autoload/v1/tables/ndt/ndt5.table.json", SCHEMA),
            ("autoload/v1/ndt/ndt7/2023/03/02/a.json", "{}"),
            ("autoload/v1/ndt/ndt7/2023/03/03/a.json", "{}"),
            ("autoload/v1/ndt/ndt7/2023/03/04/a.json", "{}"),
            ("autoload/v1/ndt/ndt5/2023/03/03/a.json", "{}"),
        ],
    )
    .await;
    let warehouse = FakeWarehouse::new("mlab-sandbox");
    let future = Utc::now() + Duration::hours(1);
    warehouse.add_table("raw_ndt", "ndt7", future);
    warehouse.add_table("raw_ndt", "ndt5", future);
    warehouse.fail_partition("ndt7$20230303");
    let sink = Arc::new(RecordingSink::default());
    let loader = loader(
        vec![source(storage, Layout::V1)],
        warehouse.clone(),
        sink.clone(),
    );

    let options = LoadOptions::custom("2023/03/01", "2023/03/10", today).unwrap();
    let err = loader.load(&options).await.unwrap_err();

    let LoadError::Datatypes { failures } = &err;
    assert_eq!(failures.len(), 1);
    assert!(
        failures[0].starts_with("failed to autoload raw_ndt.ndt7:"),
        "{}",
        failures[0]
    );
    assert!(err.to_string().contains("raw_ndt.ndt7"));

    assert_eq!(
        partitions(&warehouse),
        set(&[
            "raw_ndt.ndt7$20230302",
            "raw_ndt.ndt7$20230303",
            "raw_ndt.ndt7$20230304",
            "raw_ndt.ndt5$20230303",
        ])
    );

    let ndt7_gauges: Vec<(String, f64)> = sink
        .gauges(LOADED_DATES)
        .into_iter()
        .filter(|(labels, _)| label(labels, "datatype") == Some("ndt7"))
        .map(|(labels, value)| (label(&labels, "status").unwrap().to_string(), value))
        .collect();
    let ts = |d: u32| {
        Utc.with_ymd_and_hms(2023, 3, d, 0, 0, 0)
            .unwrap()
            .timestamp() as f64
    };
    assert!(ndt7_gauges.contains(&("OK".to_string(), ts(4))));
    assert!(ndt7_gauges.contains(&("error".to_string(), ts(3))));

    let statuses: Vec<(String, String)> = sink
        .durations(AUTOLOAD_DURATION)
        .iter()
        .map(|labels| {
            (
                label(labels, "datatype").unwrap().to_string(),
                label(labels, "status").unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.contains(&("ndt7".into(), "error".into())));
    assert!(statuses.contains(&("ndt5".into(), "OK".into())));
}

#[tokio::test]
async fn test_stale_table_schema_updates_view() {
    let today = NaiveDate::from_ymd_opt(2023, 3, 20).unwrap();
    let storage = bucket(
        "archive-mlab-sandbox",
        &[("autoload/v1/tables/ndt/ndt7.table.json", SCHEMA)],
    )
    .await;
    let warehouse = FakeWarehouse::new("mlab-sandbox");
    let stale = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
    warehouse.add_table("raw_ndt", "ndt7", stale);
    warehouse.add_table("ndt_raw", "ndt7", stale);
    let loader = loader(
        vec![source(storage, Layout::V1)],
        warehouse.clone(),
        Arc::new(RecordingSink::default()),
    );

    let options = LoadOptions::for_period(Period::Day, today).unwrap();
    loader.load(&options).await.unwrap();

    assert_eq!(
        warehouse.schema_updates(),
        vec![
            ("raw_ndt".to_string(), "ndt7".to_string()),
            ("ndt_raw".to_string(), "ndt7".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_stale_table_without_view() {
    let today = NaiveDate::from_ymd_opt(2023, 3, 20).unwrap();
    let storage = bucket(
        "archive-mlab-sandbox",
        &[("autoload/v1/tables/ndt/ndt7.table.json", SCHEMA)],
    )
    .await;
    let warehouse = FakeWarehouse::new("mlab-sandbox");
    let stale = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
    warehouse.add_table("raw_ndt", "ndt7", stale);
    warehouse.add_dataset("ndt_raw");
    let loader = loader(
        vec![source(storage, Layout::V1)],
        warehouse.clone(),
        Arc::new(RecordingSink::default()),
    );

    let options = LoadOptions::for_period(Period::Day, today).unwrap();
    loader.load(&options).await.unwrap();

    assert_eq!(
        warehouse.schema_updates(),
        vec![("raw_ndt".to_string(), "ndt7".to_string())]
    );
}

#[tokio::test]
async fn test_create_table_failure_skips_load() {
    let today = NaiveDate::from_ymd_opt(2023, 3, 20).unwrap();
    let storage = bucket(
        "archive-mlab-sandbox",
        &[
            ("autoload/v1/tables/ndt/ndt7.table.json", SCHEMA),
            ("autoload/v1/ndt/ndt7/2023/03/19/a.json", "{}"),
        ],
    )
    .await;
    let warehouse = FakeWarehouse::new("mlab-sandbox");
    warehouse.fail_create_table();
    let loader = loader(
        vec![source(storage, Layout::V1)],
        warehouse.clone(),
        Arc::new(RecordingSink::default()),
    );

    let options = LoadOptions::for_period(Period::Day, today).unwrap();
    let err = loader.load(&options).await.unwrap_err();

    assert!(err.to_string().contains("raw_ndt.ndt7"), "{err}");
    assert_eq!(warehouse.created_datasets(), vec!["raw_ndt"]);
    assert!(!warehouse.has_table("raw_ndt", "ndt7"));
    assert!(warehouse.loads().is_empty());
}

#[tokio::test]
async fn test_invalid_schema_fails_datatype() {
    let today = NaiveDate::from_ymd_opt(2023, 3, 20).unwrap();
    let storage = bucket(
        "archive-mlab-sandbox",
        &[
            ("autoload/v1/tables/ndt/ndt7.table.json", "not json"),
            ("autoload/v1/tables/ndt/ndt5.table.json", SCHEMA),
        ],
    )
    .await;
    let warehouse = FakeWarehouse::new("mlab-sandbox");
    let loader = loader(
        vec![source(storage, Layout::V1)],
        warehouse.clone(),
        Arc::new(RecordingSink::default()),
    );

    let options = LoadOptions::for_period(Period::Day, today).unwrap();
    let LoadError::Datatypes { failures } = loader.load(&options).await.unwrap_err();

    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("raw_ndt.ndt7"), "{}", failures[0]);
    assert!(warehouse.has_table("raw_ndt", "ndt5"));
    assert!(!warehouse.has_table("raw_ndt", "ndt7"));
}

#[tokio::test]
async fn test_concurrent_datatypes_share_one_dataset() {
    let today = NaiveDate::from_ymd_opt(2023, 3, 20).unwrap();
    let storage = bucket(
        "archive-mlab-sandbox",
        &[
            ("autoload/v1/tables/ndt/ndt7.table.json", SCHEMA),
            ("autoload/v1/tables/ndt/ndt5.table.json", SCHEMA),
            ("autoload/v1/tables/ndt/scamper1.table.json", SCHEMA),
            ("autoload/v1/ndt/ndt7/2023/03/19/a.json", "{}"),
            ("autoload/v1/ndt/ndt5/2023/03/19/a.json", "{}"),
            ("autoload/v1/ndt/scamper1/2023/03/19/a.json", "{}"),
        ],
    )
    .await;
    let warehouse = FakeWarehouse::new("mlab-sandbox");
    let loader = loader_with_concurrency(
        vec![source(storage, Layout::V1)],
        warehouse.clone(),
        Arc::new(RecordingSink::default()),
        4,
    );

    let options = LoadOptions::for_period(Period::Day, today).unwrap();
    let report = loader.load(&options).await.unwrap();

    assert_eq!(report.datatypes, 3);
    assert_eq!(report.partitions, 3);
    assert_eq!(warehouse.create_dataset_calls(), 1);
    assert_eq!(warehouse.created_datasets(), vec!["raw_ndt"]);

    let tables: HashSet<String> = warehouse
        .created_tables()
        .into_iter()
        .map(|(dataset, table)| format!("{dataset}.{table}"))
        .collect();
    assert_eq!(
        tables,
        set(&["raw_ndt.ndt7", "raw_ndt.ndt5", "raw_ndt.scamper1"])
    );
}

#[tokio::test]
async fn test_loaded_dates_are_per_organization() {
    let today = NaiveDate::from_ymd_opt(2023, 3, 20).unwrap();
    let storage = bucket(
        "archive-mlab-autojoin",
        &[
            ("autoload/v2/tables/ndt/ndt7.table.json", SCHEMA),
            ("autoload/v2/mlab/ndt/ndt7/2023/03/19/a.json", "{}"),
            ("autoload/v2/rnp/ndt/ndt7/2023/03/18/a.json", "{}"),
        ],
    )
    .await;
    let warehouse = FakeWarehouse::new("mlab-autojoin");
    let sink = Arc::new(RecordingSink::default());
    let loader = loader(
        vec![source(storage, Layout::V2)],
        warehouse.clone(),
        sink.clone(),
    );

    let options = LoadOptions::for_period(Period::Day, today).unwrap();
    loader.load(&options).await.unwrap();

    assert_eq!(
        partitions(&warehouse),
        set(&[
            "autoload_v2_mlab_ndt.ndt7_raw$20230319",
            "autoload_v2_rnp_ndt.ndt7_raw$20230318",
        ])
    );

    let ts = |d: u32| {
        Utc.with_ymd_and_hms(2023, 3, d, 0, 0, 0)
            .unwrap()
            .timestamp() as f64
    };
    let gauges: HashSet<(String, i64)> = sink
        .gauges(LOADED_DATES)
        .into_iter()
        .map(|(labels, value)| {
            assert_eq!(label(&labels, "datatype"), Some("ndt7"));
            (
                label(&labels, "organization").unwrap().to_string(),
                value as i64,
            )
        })
        .collect();
    assert_eq!(
        gauges,
        [
            ("mlab".to_string(), ts(19) as i64),
            ("rnp".to_string(), ts(18) as i64),
        ]
        .into_iter()
        .collect()
    );

    let organizations: HashSet<String> = sink
        .durations(AUTOLOAD_DURATION)
        .iter()
        .filter_map(|labels| label(labels, "organization").map(str::to_string))
        .collect();
    assert_eq!(organizations, set(&["mlab", "rnp"]));
}
