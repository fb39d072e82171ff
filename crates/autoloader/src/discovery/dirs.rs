//! Enumeration of dated data directories.

use autoloader_core::StorageError;
use chrono::NaiveDate;
use futures::StreamExt;
use regex::Regex;
use std::collections::HashSet;
use std::pin::pin;
use std::sync::OnceLock;
use tracing::debug;

use crate::datatype::Datatype;

/// Path date format (`YYYY/MM/DD`).
pub const DATE_FORMAT: &str = "%Y/%m/%d";

fn date_dir() -> &'static Regex {
    static DATE_DIR: OnceLock<Regex> = OnceLock::new();
    DATE_DIR.get_or_init(|| Regex::new(r"^(\d{4}/[01]\d/[0-3]\d)/").expect("valid date pattern"))
}

/// A dated data directory, ready to hand to a bulk loader.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dir {
    /// `<scheme>://<bucket>/<prefix>/YYYY/MM/DD/*`
    pub path: String,
    pub date: NaiveDate,
}

/// List the distinct dated directories of a datatype within `[start, end)`.
///
/// `start` and `end` are `YYYY/MM/DD` strings. Objects outside a dated
/// directory are ignored. A listing failure discards everything found so far.
pub async fn enumerate_dirs(
    datatype: &Datatype,
    start: &str,
    end: &str,
) -> Result<Vec<Dir>, StorageError> {
    let prefix = datatype.data_prefix();
    let storage = &datatype.bucket;

    let mut objects = pin!(storage.list_range(
        &prefix,
        &format!("{prefix}/{start}"),
        &format!("{prefix}/{end}"),
    ));

    let mut seen = HashSet::new();
    let mut dirs = Vec::new();
    while let Some(object) = objects.next().await {
        let object = object?;

        let Some(rest) = object
            .name
            .strip_prefix(prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
        else {
            continue;
        };
        let Some(caps) = date_dir().captures(rest) else {
            continue;
        };
        let day = &caps[1];
        if day < start || day >= end || !seen.insert(day.to_string()) {
            continue;
        }
        let Ok(date) = NaiveDate::parse_from_str(day, DATE_FORMAT) else {
            continue;
        };

        dirs.push(Dir {
            path: storage.uri(&format!("{prefix}/{day}/*")),
            date,
        });
    }

    debug!(
        datatype = %datatype,
        start,
        end,
        count = dirs.len(),
        "Enumerated directories"
    );
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::{DatatypeOpts, Layout, Scheme};
    use autoloader_core::StorageProvider;
    use bytes::Bytes;
    use chrono::Utc;
    use std::sync::Arc;

    async fn datatype(objects: &[&str]) -> Datatype {
        let storage = StorageProvider::in_memory("archive-mlab-sandbox", "US");
        for name in objects {
            storage.put(name, b"{}".to_vec()).await.unwrap();
        }
        Datatype::new(
            DatatypeOpts {
                name: "ndt7".into(),
                experiment: "ndt".into(),
                organization: String::new(),
                layout: Layout::V1,
                location: "US".into(),
                schema: Bytes::from_static(b"[]"),
                updated_time: Utc::now(),
                schema_path: "autoload/v1/tables/ndt/ndt7.table.json".into(),
                bucket: Arc::new(storage),
            },
            &Scheme::FirstParty,
        )
    }

    fn paths(dirs: &[Dir]) -> HashSet<String> {
        dirs.iter().map(|d| d.path.clone()).collect()
    }

    #[tokio::test]
    async fn test_dedupes_directories() {
        let dt = datatype(&[
            "autoload/v1/ndt/ndt7/2023/03/06/a.json",
            "autoload/v1/ndt/ndt7/2023/03/06/b.json",
            "autoload/v1/ndt/ndt7/2023/03/06/nested/c.json",
            "autoload/v1/ndt/ndt7/2023/03/07/a.json",
        ])
        .await;

        let dirs = enumerate_dirs(&dt, "0000/00/00", "9999/12/31").await.unwrap();

        assert_eq!(dirs.len(), 2);
        assert_eq!(
            paths(&dirs),
            HashSet::from([
                "memory://archive-mlab-sandbox/autoload/v1/ndt/ndt7/2023/03/06/*".to_string(),
                "memory://archive-mlab-sandbox/autoload/v1/ndt/ndt7/2023/03/07/*".to_string(),
            ])
        );
    }

    #[tokio::test]
    async fn test_window_is_half_open() {
        let dt = datatype(&[
            "autoload/v1/ndt/ndt7/2023/03/05/a.json",
            "autoload/v1/ndt/ndt7/2023/03/06/a.json",
            "autoload/v1/ndt/ndt7/2023/03/07/a.json",
            "autoload/v1/ndt/ndt7/2023/03/08/a.json",
        ])
        .await;

        let dirs = enumerate_dirs(&dt, "2023/03/06", "2023/03/08").await.unwrap();

        let dates: HashSet<NaiveDate> = dirs.iter().map(|d| d.date).collect();
        assert_eq!(
            dates,
            HashSet::from([
                NaiveDate::from_ymd_opt(2023, 3, 6).unwrap(),
                NaiveDate::from_ymd_opt(2023, 3, 7).unwrap(),
            ])
        );
    }

    #[tokio::test]
    async fn test_ignores_undated_objects() {
        let dt = datatype(&[
            "autoload/v1/ndt/ndt7/README",
            "autoload/v1/ndt/ndt7/2023/13/99/a.json",
            "autoload/v1/ndt/ndt7/latest/a.json",
            "autoload/v1/ndt/ndt7x/2023/03/06/a.json",
            "autoload/v1/ndt/ndt7/2023/03/06/a.json",
        ])
        .await;

        let dirs = enumerate_dirs(&dt, "0000/00/00", "9999/12/31").await.unwrap();

        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].date, NaiveDate::from_ymd_opt(2023, 3, 6).unwrap());
    }

    #[tokio::test]
    async fn test_empty_window_returns_nothing() {
        let dt = datatype(&["autoload/v1/ndt/ndt7/2023/03/06/a.json"]).await;

        let dirs = enumerate_dirs(&dt, "2023/03/07", "2023/03/07").await.unwrap();

        assert!(dirs.is_empty());
    }
}
