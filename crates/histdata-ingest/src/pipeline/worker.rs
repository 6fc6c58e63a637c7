//! CSV parser worker
//!
//! Workers run on blocking threads. Each call imports exactly one record:
//! it streams the CSV row by row, turns every row into a line entry and
//! pushes full batches onto the chunk channel, blocking while the channel is
//! full. Row order within a file is preserved.
//!
//! Outcomes per record:
//! - not `CSV_CLEAN`: forwarded to "next" untouched
//! - imported: CSV removed, status `INFLUX_UPLOAD` persisted, put on "next"
//! - bad input: CSV removed, status `DELETED` persisted, record dropped
//! - writer gone: record dropped with its CSV kept for a later rescan
//!
//! Every record taken from "current" is acknowledged there exactly once.

use super::batch::BatchAccumulator;
use super::channel::ChunkSender;
use crate::error::{IngestError, Result};
use crate::influx::line_protocol::{missing_columns, QuoteRow};
use crate::queue::RecordQueue;
use histdata_common::{Record, RecordStatus};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};

/// Rows and batches produced from one record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub rows: usize,
    pub batches: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The CSV was fully emitted and the record advanced
    Imported(ImportStats),
    /// The record was not ready and went to "next" unchanged
    Forwarded,
}

/// Handles shared by every worker of one pool
#[derive(Debug)]
pub struct WorkerContext {
    current: Arc<RecordQueue>,
    next: Arc<RecordQueue>,
    chunks: ChunkSender,
    batch_size: usize,
}

impl WorkerContext {
    pub fn new(
        current: Arc<RecordQueue>,
        next: Arc<RecordQueue>,
        chunks: ChunkSender,
        batch_size: usize,
    ) -> Self {
        Self {
            current,
            next,
            chunks,
            batch_size: batch_size.max(1),
        }
    }

    pub fn current(&self) -> &Arc<RecordQueue> {
        &self.current
    }

    pub fn next(&self) -> &Arc<RecordQueue> {
        &self.next
    }

    /// Import one record taken from "current"
    ///
    /// Blocks on the chunk channel; call from a blocking thread.
    pub fn import_file(&self, mut record: Record) -> Result<ImportOutcome> {
        let _ack = self.current.task_guard();
        let span = info_span!("import", record = %record.url);
        let _enter = span.enter();

        if record.status != RecordStatus::CsvClean {
            debug!(status = %record.status, "Not ready for import, forwarding");
            self.next.put(record);
            return Ok(ImportOutcome::Forwarded);
        }

        let result = if self.chunks.is_closed() {
            Err(IngestError::ChunkChannelClosed)
        } else {
            self.import_csv(&record)
        };

        let stats = match result {
            Ok(stats) => stats,
            Err(e) if e.is_writer_side() => {
                warn!(error = %e, path = %record.csv_path().display(), "Writer unavailable, keeping file for a later run");
                return Err(e);
            },
            Err(e) => {
                error!(error = %e, path = %record.csv_path().display(), "Import failed, deleting record");
                if let Err(delete_err) = record.delete_into_file() {
                    warn!(error = %delete_err, "Failed to mark record as deleted");
                }
                return Err(e);
            },
        };

        // All rows are with the writer; cleanup failures must not drop the record.
        if let Err(e) = record.remove_csv() {
            warn!(error = %e, path = %record.csv_path().display(), "Failed to remove imported CSV");
        }
        record.status = RecordStatus::InfluxUpload;
        if let Err(e) = record.write_info_file() {
            warn!(error = %e, path = %record.info_path().display(), "Failed to persist status file");
        }
        info!(rows = stats.rows, batches = stats.batches, "Record imported");
        self.next.put(record);

        Ok(ImportOutcome::Imported(stats))
    }

    /// Stream one CSV into the chunk channel
    fn import_csv(&self, record: &Record) -> Result<ImportStats> {
        let path = record.csv_path();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .map_err(|e| IngestError::csv(&path, e))?;

        let headers = reader
            .headers()
            .map_err(|e| IngestError::csv(&path, e))?
            .clone();
        let missing = missing_columns(&headers);
        if !missing.is_empty() {
            return Err(IngestError::MissingColumns {
                path,
                columns: missing,
            });
        }

        let mut batches = BatchAccumulator::new(self.batch_size);
        let mut stats = ImportStats::default();

        for row in reader.deserialize::<QuoteRow>() {
            let row = row.map_err(|e| IngestError::csv(&path, e))?;
            stats.rows += 1;
            if let Some(batch) = batches.push(row.to_line()) {
                self.chunks.blocking_send(batch)?;
                stats.batches += 1;
            }
        }

        if let Some(batch) = batches.finish() {
            self.chunks.blocking_send(batch)?;
            stats.batches += 1;
        }

        Ok(stats)
    }
}
