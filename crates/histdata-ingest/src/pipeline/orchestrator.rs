// Import run orchestration
//
// Starts the batch writer, feeds records from "current" to a bounded pool of
// blocking parser workers, waits until every dispatched record has been
// acknowledged, stops the writer through the sentinel and checkpoints the
// merged queue.
//
// Worker slots are bounded with buffer_unordered; records are dequeued only
// when a slot is free, so at most `pool_size` files are open at once.

use super::channel::chunk_channel;
use super::worker::{ImportOutcome, WorkerContext};
use crate::checkpoint::rescan;
use crate::config::PipelineConfig;
use crate::error::{IngestError, Result};
use crate::influx::{BatchWriter, LineSink, WriteOptions, WriterStats};
use crate::progress::{NoProgress, ProgressReporter};
use crate::queue::RecordQueue;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// A record the pipeline gave up on
#[derive(Debug)]
pub struct RecordFailure {
    pub url: String,
    pub error: IngestError,
}

/// Per-record outcomes of one drain of "current"
#[derive(Debug, Default)]
pub struct DrainReport {
    pub dispatched: usize,
    pub imported: usize,
    pub forwarded: usize,
    pub rows: usize,
    pub batches: usize,
    pub failures: Vec<RecordFailure>,
}

impl DrainReport {
    fn account(&mut self, url: String, outcome: Result<ImportOutcome>) {
        match outcome {
            Ok(ImportOutcome::Imported(stats)) => {
                self.imported += 1;
                self.rows += stats.rows;
                self.batches += stats.batches;
            },
            Ok(ImportOutcome::Forwarded) => self.forwarded += 1,
            Err(error) => self.failures.push(RecordFailure { url, error }),
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Result of a completed run
#[derive(Debug)]
pub struct RunSummary {
    pub drain: DrainReport,
    pub writer: WriterStats,
    /// Records in the checkpoint written at the end of the run
    pub checkpointed: usize,
    pub duration_seconds: f64,
}

pub struct Pipeline {
    config: PipelineConfig,
    progress: Arc<dyn ProgressReporter>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Build the "current" queue from the checkpoint
    ///
    /// With `rescan`, status files under the data directory are searched for
    /// `CSV_CLEAN` records the checkpoint does not know about.
    pub fn load_queue(&self, rescan_data_dir: bool) -> Result<Arc<RecordQueue>> {
        let current = RecordQueue::load_checkpoint("current", &self.config.checkpoint_path())?;

        if rescan_data_dir {
            let found = rescan(&self.config.data_directory, |url| current.contains_url(url));
            info!(
                data_directory = %self.config.data_directory.display(),
                found = found.len(),
                "Rescan complete"
            );
            for record in found {
                current.put(record);
            }
        }

        Ok(Arc::new(current))
    }

    /// Import every record on `current`, writing through `sink`
    ///
    /// On success "next" has been merged into `current` and the checkpoint
    /// replaced. A writer failure is returned as the run's error and leaves
    /// the previous checkpoint in place.
    pub async fn run<S>(
        &self,
        current: Arc<RecordQueue>,
        next: Arc<RecordQueue>,
        sink: S,
    ) -> Result<RunSummary>
    where
        S: LineSink + 'static,
    {
        self.config.validate()?;
        let start_time = Instant::now();

        let (chunks, receiver) = chunk_channel(self.config.channel_capacity);
        let writer = tokio::spawn(
            BatchWriter::new(sink, WriteOptions::from(&self.config)).run(receiver),
        );

        info!(
            queue = current.name(),
            records = current.len(),
            pool_size = self.config.pool_size,
            channel_capacity = self.config.channel_capacity,
            "Starting import"
        );
        self.progress.start(current.len());

        let ctx = Arc::new(WorkerContext::new(
            Arc::clone(&current),
            Arc::clone(&next),
            chunks.clone(),
            self.config.batch_size,
        ));
        let drain = self.drain(&ctx).await;
        current.join().await;
        drop(ctx);

        // Workers are done; the sentinel is the last message the writer sees.
        let closed = chunks.close().await;
        let writer_stats = match writer.await {
            Ok(Ok(stats)) => stats,
            Ok(Err(e)) => {
                error!(error = %e, "Batch writer failed, checkpoint not updated");
                self.progress.finish();
                return Err(e);
            },
            Err(e) => {
                self.progress.finish();
                return Err(IngestError::Writer(e.to_string()));
            },
        };
        closed?;
        self.progress.finish();

        next.dump_to_queue(&current);
        current.write_checkpoint(&self.config.checkpoint_path())?;

        let summary = RunSummary {
            checkpointed: current.len(),
            drain,
            writer: writer_stats,
            duration_seconds: start_time.elapsed().as_secs_f64(),
        };

        info!(
            imported = summary.drain.imported,
            forwarded = summary.drain.forwarded,
            failed = summary.drain.failed(),
            rows = summary.drain.rows,
            lines_written = summary.writer.lines_written,
            flushes = summary.writer.flushes,
            checkpointed = summary.checkpointed,
            duration_seconds = summary.duration_seconds,
            "Import finished"
        );

        Ok(summary)
    }

    /// Dispatch records from "current" until it is empty
    async fn drain(&self, ctx: &Arc<WorkerContext>) -> DrainReport {
        let current = Arc::clone(ctx.current());
        let records = stream::iter(std::iter::from_fn(move || current.get()));

        records
            .map(|record| {
                let ctx = Arc::clone(ctx);
                let progress = Arc::clone(&self.progress);
                let url = record.url.clone();
                progress.record_dispatched(&url);

                async move {
                    let outcome =
                        match tokio::task::spawn_blocking(move || ctx.import_file(record)).await {
                            Ok(outcome) => outcome,
                            Err(e) => {
                                warn!(record = %url, error = %e, "Parser worker did not finish");
                                Err(IngestError::Worker(e.to_string()))
                            },
                        };
                    progress.record_completed(&url);
                    (url, outcome)
                }
            })
            .buffer_unordered(self.config.pool_size.max(1))
            .fold(DrainReport::default(), |mut report, (url, outcome)| async move {
                report.dispatched += 1;
                report.account(url, outcome);
                report
            })
            .await
    }
}
