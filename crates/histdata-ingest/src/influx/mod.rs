//! InfluxDB v2 destination
//!
//! - [`line_protocol`]: CSV row to line protocol
//! - [`client`]: the [`LineSink`] write seam and its HTTP implementation
//! - [`writer`]: the single batch writer draining the chunk channel

pub mod client;
pub mod line_protocol;
pub mod writer;

pub use client::{InfluxClient, LineSink, Precision};
pub use line_protocol::{missing_columns, QuoteRow, REQUIRED_COLUMNS};
pub use writer::{BatchWriter, WriteOptions, WriterStats};
