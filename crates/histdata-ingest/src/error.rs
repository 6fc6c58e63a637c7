//! Error types for the import pipeline
//!
//! Messages are operator-facing: configuration errors say how to fix the setup,
//! record errors name the file involved.

use histdata_common::HistdataError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// `influxdb.yaml` is not where it was expected
    #[error("No InfluxDB settings at '{0}'. Importing requires an influxdb.yaml with url, token, org and bucket under an 'influxdb' key. Did you forget to set it up?")]
    MissingInfluxConfig(PathBuf),

    /// Settings are present but unusable
    #[error("Configuration error: {0}. Check influxdb.yaml and the INFLUX_* environment variables.")]
    Config(String),

    /// YAML settings could not be parsed
    #[error("Failed to parse YAML: {0}. Check the file syntax at the indicated line/column.")]
    YamlParse(#[from] serde_yaml::Error),

    /// A record's CSV could not be read or has the wrong shape
    #[error("Failed to parse '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// The CSV header lacks columns the line transform needs
    #[error("'{path}' is missing required columns: {}", columns.join(", "))]
    MissingColumns {
        path: PathBuf,
        columns: Vec<&'static str>,
    },

    /// The store refused a write
    #[error("InfluxDB rejected write ({status}): {body}")]
    WriteRejected { status: u16, body: String },

    /// HTTP transport to the store failed
    #[error("Network request to InfluxDB failed: {0}. Check the url in influxdb.yaml and that the server is reachable.")]
    Http(#[from] reqwest::Error),

    /// A batch was pushed after the writer was told to stop or after it died
    #[error("Chunk channel is closed; the batch writer is no longer accepting batches")]
    ChunkChannelClosed,

    /// The batch writer task ended abnormally
    #[error("Batch writer failed: {0}")]
    Writer(String),

    /// A parser worker panicked or was cancelled
    #[error("Parser worker failed: {0}")]
    Worker(String),

    /// Checkpoint could not be read or written
    #[error("Checkpoint error at '{path}': {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: HistdataError,
    },

    #[error(transparent)]
    Common(#[from] HistdataError),

    #[error("File operation failed: {0}. Check file permissions and disk space.")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }

    pub fn checkpoint(path: impl Into<PathBuf>, source: HistdataError) -> Self {
        Self::Checkpoint {
            path: path.into(),
            source,
        }
    }

    /// Whether a store write may succeed if attempted again: transport
    /// failures, throttling and server-side errors
    pub fn is_transient(&self) -> bool {
        match self {
            IngestError::Http(_) => true,
            IngestError::WriteRejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether this error means the write side is gone rather than the input
    /// being bad. Such failures must not cost the record its file.
    pub fn is_writer_side(&self) -> bool {
        matches!(
            self,
            IngestError::ChunkChannelClosed
                | IngestError::Writer(_)
                | IngestError::WriteRejected { .. }
                | IngestError::Http(_)
        )
    }
}
