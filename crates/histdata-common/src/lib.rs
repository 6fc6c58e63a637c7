//! histdata Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the histdata workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`HistdataError`] and the [`Result`] alias
//! - **Logging**: tracing subscriber setup driven by [`logging::LogConfig`]
//! - **Records**: the [`Record`] unit of work and its [`RecordStatus`] state machine
//! - **Persistence**: atomic JSON file replacement used for status files and checkpoints
//!
//! # Example
//!
//! ```no_run
//! use histdata_common::{Record, RecordStatus, Result};
//!
//! fn advance(record: &mut Record) -> Result<()> {
//!     record.status = RecordStatus::InfluxUpload;
//!     record.write_info_file()
//! }
//! ```

pub mod error;
pub mod logging;
pub mod persist;
pub mod record;

// Re-export commonly used types
pub use error::{HistdataError, Result};
pub use record::{Record, RecordStatus, SeriesTags};
