//! Error types shared across histdata crates

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for histdata operations
pub type Result<T> = std::result::Result<T, HistdataError>;

/// Main error type for shared histdata functionality
#[derive(Error, Debug)]
pub enum HistdataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown record status: {0}")]
    UnknownStatus(String),
}
