//! Record: one source CSV file and its processing status
//!
//! A record is a value-like unit of work. It is moved between queues and is only
//! ever mutated by the single worker currently holding it. Every status change is
//! mirrored into a status file (`.info.json`) next to the CSV so a later run can
//! rediscover records that never reached a checkpoint.

use crate::error::{HistdataError, Result};
use crate::persist::{read_json, write_json_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the per-record status file inside the record's data directory
pub const INFO_FILENAME: &str = ".info.json";

/// Processing status of a record
///
/// The set is closed. `UrlValid` and `CsvZip` belong to the download stage and
/// are carried through the import pipeline untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    /// Source URL resolved, nothing downloaded yet
    UrlValid,
    /// Zip archive downloaded, not yet extracted
    CsvZip,
    /// Extracted CSV present, not yet validated
    RawCsvAvailable,
    /// Validated CSV ready for import
    CsvClean,
    /// All rows handed to the store and the CSV removed
    InfluxUpload,
    /// Import failed; backing file removed
    Deleted,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::UrlValid => "URL_VALID",
            RecordStatus::CsvZip => "CSV_ZIP",
            RecordStatus::RawCsvAvailable => "RAW_CSV_AVAILABLE",
            RecordStatus::CsvClean => "CSV_CLEAN",
            RecordStatus::InfluxUpload => "INFLUX_UPLOAD",
            RecordStatus::Deleted => "DELETED",
        }
    }

    /// Every status, in lifecycle order
    pub fn all() -> [RecordStatus; 6] {
        [
            RecordStatus::UrlValid,
            RecordStatus::CsvZip,
            RecordStatus::RawCsvAvailable,
            RecordStatus::CsvClean,
            RecordStatus::InfluxUpload,
            RecordStatus::Deleted,
        ]
    }
}

impl std::str::FromStr for RecordStatus {
    type Err = HistdataError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        RecordStatus::all()
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| HistdataError::UnknownStatus(s.to_string()))
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Series metadata describing what a record's CSV contains
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesTags {
    /// Currency pair, e.g. "EURUSD"
    #[serde(default)]
    pub instrument: String,
    /// Trading platform / data format, e.g. "ASCII"
    #[serde(default)]
    pub platform: String,
    /// Bar timeframe, e.g. "M1" or "T"
    #[serde(default)]
    pub timeframe: String,
    /// Year and month covered by the file, e.g. "202301"
    #[serde(default)]
    pub datemonth: Option<String>,
}

/// A unit of work: one CSV file plus its status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Unique source identifier (the page the file was downloaded from)
    pub url: String,

    /// Current processing status
    pub status: RecordStatus,

    /// Directory holding the CSV and the status file
    pub data_dir: PathBuf,

    /// CSV file name inside `data_dir`
    pub csv_filename: String,

    /// Series metadata
    #[serde(default)]
    pub tags: SeriesTags,

    /// Last time the status file was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record {
    pub fn new(
        url: impl Into<String>,
        data_dir: impl Into<PathBuf>,
        csv_filename: impl Into<String>,
        status: RecordStatus,
    ) -> Self {
        Self {
            url: url.into(),
            status,
            data_dir: data_dir.into(),
            csv_filename: csv_filename.into(),
            tags: SeriesTags::default(),
            updated_at: None,
        }
    }

    pub fn with_tags(mut self, tags: SeriesTags) -> Self {
        self.tags = tags;
        self
    }

    /// Full path of the backing CSV file
    pub fn csv_path(&self) -> PathBuf {
        self.data_dir.join(&self.csv_filename)
    }

    /// Full path of the status file
    pub fn info_path(&self) -> PathBuf {
        self.data_dir.join(INFO_FILENAME)
    }

    /// Whether this record is ready for import and its file exists
    pub fn has_clean_csv(&self) -> bool {
        self.status == RecordStatus::CsvClean && self.csv_path().is_file()
    }

    /// Persist the record into its status file
    pub fn write_info_file(&mut self) -> Result<()> {
        self.updated_at = Some(Utc::now());
        let path = self.info_path();
        write_json_atomic(&path, self)?;
        debug!(record = %self.url, status = %self.status, path = %path.display(), "Status file written");
        Ok(())
    }

    /// Load a record from a status file
    pub fn read_info_file(path: &Path) -> Result<Self> {
        read_json(path)
    }

    /// Remove the CSV file if it is still present
    pub fn remove_csv(&self) -> Result<()> {
        match std::fs::remove_file(self.csv_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Discard the record: remove its CSV and persist it as `DELETED`
    pub fn delete_into_file(&mut self) -> Result<()> {
        self.remove_csv()?;
        self.status = RecordStatus::Deleted;
        self.write_info_file()
    }
}
