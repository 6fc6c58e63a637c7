//! Durable queue state
//!
//! The checkpoint is one JSON document holding the merged record queue at the
//! end of a run. It is replaced atomically, so a crash during the write leaves
//! the previous checkpoint intact.

use crate::error::{IngestError, Result};
use chrono::{DateTime, Utc};
use histdata_common::persist::{read_json, write_json_atomic};
use histdata_common::record::INFO_FILENAME;
use histdata_common::Record;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Checkpoint format version
pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: u32,
    pub written_at: DateTime<Utc>,
    pub records: Vec<Record>,
}

impl Checkpoint {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            written_at: Utc::now(),
            records,
        }
    }

    pub fn write(&self, path: &Path) -> histdata_common::Result<()> {
        write_json_atomic(path, self)
    }

    /// Read a checkpoint; `Ok(None)` when there is none yet
    pub fn read(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let checkpoint: Checkpoint =
            read_json(path).map_err(|e| IngestError::checkpoint(path, e))?;

        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(IngestError::config(format!(
                "checkpoint '{}' has version {}, expected {}",
                path.display(),
                checkpoint.version,
                CHECKPOINT_VERSION
            )));
        }

        Ok(Some(checkpoint))
    }
}

/// Find records ready for import by walking status files under `data_dir`
///
/// Records for which `is_known` returns true are skipped, as are status files
/// that cannot be read.
pub fn rescan(data_dir: &Path, is_known: impl Fn(&str) -> bool) -> Vec<Record> {
    let mut found = Vec::new();

    for entry in WalkDir::new(data_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == INFO_FILENAME)
    {
        let record = match Record::read_info_file(entry.path()) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Skipping unreadable status file");
                continue;
            },
        };

        if is_known(&record.url) || !record.has_clean_csv() {
            continue;
        }

        debug!(record = %record.url, "Rediscovered record from status file");
        found.push(record);
    }

    found.sort_by(|a, b| a.url.cmp(&b.url));
    found
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use histdata_common::RecordStatus;

    #[test]
    fn test_read_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Checkpoint::read(&dir.path().join(".queue")).unwrap().is_none());
    }

    #[test]
    fn test_read_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".queue");
        let mut checkpoint = Checkpoint::new(Vec::new());
        checkpoint.version = 99;
        checkpoint.write(&path).unwrap();

        assert!(Checkpoint::read(&path).is_err());
    }

    #[test]
    fn test_read_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".queue");
        std::fs::write(&path, "not json").unwrap();

        let err = Checkpoint::read(&path).unwrap_err();
        assert!(matches!(err, IngestError::Checkpoint { .. }));
    }

    #[test]
    fn test_rescan_finds_clean_records() {
        let dir = tempfile::tempdir().unwrap();

        let mut clean = Record::new(
            "http://histdata.test/clean",
            dir.path().join("eurusd/202301"),
            "clean.csv",
            RecordStatus::CsvClean,
        );
        std::fs::create_dir_all(&clean.data_dir).unwrap();
        std::fs::write(clean.csv_path(), "Instrument\n").unwrap();
        clean.write_info_file().unwrap();

        let mut done = Record::new(
            "http://histdata.test/done",
            dir.path().join("gbpusd/202301"),
            "done.csv",
            RecordStatus::InfluxUpload,
        );
        done.write_info_file().unwrap();

        let mut known = Record::new(
            "http://histdata.test/known",
            dir.path().join("usdjpy/202301"),
            "known.csv",
            RecordStatus::CsvClean,
        );
        std::fs::create_dir_all(&known.data_dir).unwrap();
        std::fs::write(known.csv_path(), "Instrument\n").unwrap();
        known.write_info_file().unwrap();

        let found = rescan(dir.path(), |url| url == known.url);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "http://histdata.test/clean");
    }
}
