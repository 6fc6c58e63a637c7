//! histdata Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Bulk import of histdata.com quote CSVs into InfluxDB v2.
//!
//! # Pipeline
//!
//! - **Queues**: [`queue::RecordQueue`] holds records to process ("current")
//!   and finished ones ("next"); [`checkpoint`] persists the merged queue
//! - **Workers**: a bounded pool of blocking parsers, see [`pipeline::worker`]
//! - **Writer**: one [`influx::BatchWriter`] draining the chunk channel
//! - **Orchestrator**: [`pipeline::Pipeline`] wires it together
//!
//! # Example
//!
//! ```no_run
//! use histdata_ingest::config::{InfluxConfig, PipelineConfig};
//! use histdata_ingest::influx::InfluxClient;
//! use histdata_ingest::pipeline::Pipeline;
//! use histdata_ingest::queue::RecordQueue;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = InfluxClient::new(&InfluxConfig::load("influxdb.yaml")?)?;
//!     let pipeline = Pipeline::new(PipelineConfig::new());
//!     let current = pipeline.load_queue(false)?;
//!     let next = Arc::new(RecordQueue::new("next"));
//!     pipeline.run(current, next, client).await?;
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod influx;
pub mod pipeline;
pub mod progress;
pub mod queue;

pub use error::{IngestError, Result};
