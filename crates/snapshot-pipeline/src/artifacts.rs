//! Snapshot files on disk: the raw fetch output, the published daily files
//! and their retention.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{Duration, NaiveDate};
use market_core::MarketSnapshot;
use regex::Regex;
use serde::Serialize;

use crate::error::ArtifactError;

pub const RAW_FILE: &str = "data_raw.json";
pub const LATEST_FILE: &str = "data.json";

static DATED_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^data_(\d{4}-\d{2}-\d{2})\.json$").expect("dated file pattern"));

/// Date embedded in a `data_YYYY-MM-DD.json` file name.
pub fn artifact_date(file_name: &str) -> Option<NaiveDate> {
    let caps = DATED_FILE.captures(file_name)?;
    NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()
}

pub fn dated_file_name(date: NaiveDate) -> String {
    format!("data_{}.json", date.format("%Y-%m-%d"))
}

/// Newest dated snapshot in `dir` by file name, else `data.json` if present.
pub fn latest_artifact(dir: &Path) -> Option<PathBuf> {
    let newest = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| artifact_date(name).is_some())
        .max();

    match newest {
        Some(name) => Some(dir.join(name)),
        None => {
            let fallback = dir.join(LATEST_FILE);
            fallback.is_file().then_some(fallback)
        }
    }
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub deleted: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

pub struct ArtifactStore {
    dir: PathBuf,
    retention_days: i64,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, retention_days: i64) -> Self {
        Self {
            dir: dir.into(),
            retention_days,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn raw_path(&self) -> PathBuf {
        self.dir.join(RAW_FILE)
    }

    pub fn ensure_dir(&self) -> Result<(), ArtifactError> {
        fs::create_dir_all(&self.dir).map_err(|source| ArtifactError::CreateDir {
            path: self.dir.clone(),
            source,
        })
    }

    pub fn write_raw<T: Serialize + ?Sized>(&self, snapshot: &T) -> Result<PathBuf, ArtifactError> {
        self.ensure_dir()?;
        let path = self.raw_path();
        write_json(&path, snapshot)?;
        Ok(path)
    }

    pub fn read_raw(&self) -> Result<MarketSnapshot, ArtifactError> {
        let path = self.raw_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(ArtifactError::Missing(path)),
            Err(source) => return Err(ArtifactError::Read { path, source }),
        };
        serde_json::from_str(&content).map_err(|source| ArtifactError::Parse { path, source })
    }

    /// Write the dated file and overwrite `data.json` with the same content.
    pub fn publish<T: Serialize + ?Sized>(&self, snapshot: &T, date: NaiveDate) -> Result<PathBuf, ArtifactError> {
        self.ensure_dir()?;
        let dated = self.dir.join(dated_file_name(date));
        write_json(&dated, snapshot)?;
        write_json(&self.dir.join(LATEST_FILE), snapshot)?;
        Ok(dated)
    }

    /// Delete dated snapshots older than the retention period. A file dated
    /// exactly `retention_days` ago is kept. Other files are never touched.
    pub fn cleanup(&self, today: NaiveDate) -> CleanupReport {
        let mut report = CleanupReport::default();
        let cutoff = today - Duration::days(self.retention_days);

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Error during data cleanup of {}: {}", self.dir.display(), e);
                return report;
            }
        };

        for entry in entries.filter_map(|e| e.ok()) {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let Some(date) = artifact_date(&name) else {
                continue;
            };
            if date >= cutoff {
                continue;
            }

            let path = entry.path();
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!("Deleted old data file: {}", name);
                    report.deleted.push(path);
                }
                Err(e) => {
                    tracing::error!("Failed to delete {}: {}", path.display(), e);
                    report.failed.push((path, e.to_string()));
                }
            }
        }
        report
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let write_err = |source| ArtifactError::Write {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(write_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "{}").unwrap();
    }

    #[test]
    fn test_artifact_date() {
        assert_eq!(artifact_date("data_2024-05-10.json"), Some(day(2024, 5, 10)));
        assert_eq!(artifact_date("data_raw.json"), None);
        assert_eq!(artifact_date("data_2024-13-40.json"), None);
        assert_eq!(artifact_date("xdata_2024-05-10.json"), None);
    }

    #[test]
    fn test_cleanup_retention_boundary() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path(), 7);
        let today = day(2024, 5, 10);
        for name in [
            "data_2024-05-02.json",
            "data_2024-05-03.json",
            "data_2024-05-04.json",
            "data.json",
            "data_raw.json",
            "notes.txt",
        ] {
            touch(tmp.path(), name);
        }

        let report = store.cleanup(today);

        assert_eq!(report.deleted, vec![tmp.path().join("data_2024-05-02.json")]);
        assert!(tmp.path().join("data_2024-05-03.json").exists());
        assert!(tmp.path().join("data_2024-05-04.json").exists());
        assert!(tmp.path().join("data.json").exists());
        assert!(tmp.path().join("data_raw.json").exists());
        assert!(tmp.path().join("notes.txt").exists());
    }

    #[test]
    fn test_cleanup_missing_dir_is_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("absent"), 7);
        let report = store.cleanup(day(2024, 5, 10));
        assert!(report.deleted.is_empty());
    }

    #[test]
    fn test_publish_writes_dated_and_latest() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("data"), 7);
        let value = json!({"date": "2024-05-10", "note": "日本語"});

        let dated = store.publish(&value, day(2024, 5, 10)).unwrap();

        assert_eq!(dated, tmp.path().join("data").join("data_2024-05-10.json"));
        let written = fs::read_to_string(&dated).unwrap();
        assert!(written.contains("日本語"));
        assert!(written.contains("\n  \"date\""));
        let latest = fs::read_to_string(tmp.path().join("data").join(LATEST_FILE)).unwrap();
        assert_eq!(latest, written);
    }

    #[test]
    fn test_read_raw_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path(), 7);
        assert!(matches!(store.read_raw(), Err(ArtifactError::Missing(_))));
    }

    #[test]
    fn test_raw_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path(), 7);
        let mut snapshot = MarketSnapshot::default();
        snapshot.market.vix.current = Some(14.2);

        store.write_raw(&snapshot).unwrap();
        assert_eq!(store.read_raw().unwrap(), snapshot);
    }

    #[test]
    fn test_latest_artifact_prefers_newest_dated() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(latest_artifact(tmp.path()), None);

        touch(tmp.path(), LATEST_FILE);
        assert_eq!(latest_artifact(tmp.path()), Some(tmp.path().join(LATEST_FILE)));

        touch(tmp.path(), "data_2024-05-09.json");
        touch(tmp.path(), "data_2024-05-10.json");
        touch(tmp.path(), "data_raw.json");
        assert_eq!(
            latest_artifact(tmp.path()),
            Some(tmp.path().join("data_2024-05-10.json"))
        );
    }
}
