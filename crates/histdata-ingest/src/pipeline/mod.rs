//! Import pipeline
//!
//! Records flow from the "current" queue through a pool of blocking parser
//! workers into the chunk channel, where a single [`BatchWriter`] drains them
//! into the store. Finished records land on the "next" queue, which is merged
//! back into "current" and checkpointed once the run has drained.
//!
//! [`BatchWriter`]: crate::influx::BatchWriter

pub mod batch;
pub mod channel;
pub mod orchestrator;
pub mod worker;

pub use batch::BatchAccumulator;
pub use channel::{chunk_channel, ChunkMessage, ChunkReceiver, ChunkSender};
pub use orchestrator::{DrainReport, Pipeline, RecordFailure, RunSummary};
pub use worker::{ImportOutcome, ImportStats, WorkerContext};
