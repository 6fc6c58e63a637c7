//! Single batch writer
//!
//! Exactly one writer runs per import. It owns the store client, drains the
//! chunk channel in arrival order and submits lines through a buffer that is
//! flushed when it reaches `batch_size` lines or when `flush_interval` passes,
//! whichever comes first. The sentinel flushes what is left, releases the
//! client and ends the task; the task's return value is the acknowledgment.
//!
//! Transient write failures are retried with exponential backoff. A write that
//! still fails ends the task with the error; dropping the receiver then makes
//! every further push on the chunk channel fail.

use super::client::{LineSink, Precision};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::channel::{ChunkMessage, ChunkReceiver};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 125_000;

/// Buffering behavior of the store write path
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub precision: Precision,
    /// Extra attempts for a write that failed transiently
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further attempt
    pub retry_interval: Duration,
    pub max_retry_delay: Duration,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            batch_size: crate::config::DEFAULT_BATCH_SIZE,
            flush_interval: Duration::from_millis(crate::config::DEFAULT_FLUSH_INTERVAL_MS),
            precision: Precision::Milliseconds,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_interval: Duration::from_millis(DEFAULT_RETRY_INTERVAL_MS),
            max_retry_delay: Duration::from_millis(DEFAULT_MAX_RETRY_DELAY_MS),
        }
    }
}

impl From<&PipelineConfig> for WriteOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            flush_interval: config.flush_interval,
            ..Self::default()
        }
    }
}

impl WriteOptions {
    /// Delay before retry number `attempt` (1-based)
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_interval
            .saturating_mul(factor)
            .min(self.max_retry_delay)
    }
}

/// What the writer did before it stopped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub batches_received: usize,
    pub lines_written: usize,
    pub flushes: usize,
    /// Flushes triggered by the interval rather than a full buffer
    pub timed_flushes: usize,
    /// Write attempts repeated after a transient failure
    pub retries: usize,
}

pub struct BatchWriter<S: LineSink> {
    sink: S,
    options: WriteOptions,
    buffer: Vec<String>,
    stats: WriterStats,
}

impl<S: LineSink> BatchWriter<S> {
    pub fn new(sink: S, options: WriteOptions) -> Self {
        let batch_size = options.batch_size.max(1);
        Self {
            sink,
            options: WriteOptions {
                batch_size,
                ..options
            },
            buffer: Vec::with_capacity(batch_size),
            stats: WriterStats::default(),
        }
    }

    /// Drain `chunks` until the sentinel arrives
    pub async fn run(mut self, mut chunks: ChunkReceiver) -> Result<WriterStats> {
        let mut ticker = tokio::time::interval(self.options.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        info!(
            batch_size = self.options.batch_size,
            flush_interval_ms = self.options.flush_interval.as_millis() as u64,
            "Batch writer started"
        );

        loop {
            tokio::select! {
                message = chunks.recv() => match message {
                    Some(ChunkMessage::Batch(lines)) => {
                        self.stats.batches_received += 1;
                        self.buffer.extend(lines);
                        while self.buffer.len() >= self.options.batch_size {
                            self.flush(self.options.batch_size).await?;
                        }
                    },
                    Some(ChunkMessage::Sentinel) => {
                        debug!("Sentinel received");
                        break;
                    },
                    None => {
                        warn!("All chunk senders dropped without a sentinel");
                        break;
                    },
                },
                _ = ticker.tick() => {
                    if !self.buffer.is_empty() {
                        self.flush(self.buffer.len()).await?;
                        self.stats.timed_flushes += 1;
                    }
                },
            }
        }

        chunks.close();
        if !self.buffer.is_empty() {
            self.flush(self.buffer.len()).await?;
        }
        self.sink.close().await?;

        info!(
            batches = self.stats.batches_received,
            lines = self.stats.lines_written,
            flushes = self.stats.flushes,
            "Batch writer stopped"
        );
        Ok(self.stats)
    }

    async fn flush(&mut self, count: usize) -> Result<()> {
        let count = count.min(self.buffer.len());
        let lines: Vec<String> = self.buffer.drain(..count).collect();
        self.write_with_retry(&lines).await?;
        self.stats.lines_written += lines.len();
        self.stats.flushes += 1;
        debug!(lines = lines.len(), pending = self.buffer.len(), "Flushed");
        Ok(())
    }

    async fn write_with_retry(&mut self, lines: &[String]) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.sink.write_lines(lines, self.options.precision).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.options.max_retries => {
                    attempt += 1;
                    let backoff = self.options.backoff(attempt);
                    warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Write failed, retrying..."
                    );
                    self.stats.retries += 1;
                    tokio::time::sleep(backoff).await;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use crate::pipeline::channel::chunk_channel;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct MemorySink {
        writes: Arc<Mutex<Vec<Vec<String>>>>,
        closed: Arc<Mutex<bool>>,
        attempts: Arc<AtomicUsize>,
        /// Writes answered with 503 before the sink starts accepting
        unavailable_for: usize,
        fail: bool,
    }

    #[async_trait]
    impl LineSink for MemorySink {
        async fn write_lines(&mut self, lines: &[String], precision: Precision) -> Result<()> {
            assert_eq!(precision, Precision::Milliseconds);
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.unavailable_for {
                return Err(IngestError::WriteRejected {
                    status: 503,
                    body: "service unavailable".to_string(),
                });
            }
            if self.fail {
                return Err(IngestError::WriteRejected {
                    status: 401,
                    body: "unauthorized".to_string(),
                });
            }
            self.writes.lock().unwrap().push(lines.to_vec());
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    fn lines(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}{}", prefix, i)).collect()
    }

    fn options(batch_size: usize, flush_ms: u64) -> WriteOptions {
        WriteOptions {
            batch_size,
            flush_interval: Duration::from_millis(flush_ms),
            retry_interval: Duration::from_millis(1),
            ..WriteOptions::default()
        }
    }

    #[tokio::test]
    async fn test_sentinel_flushes_and_closes() {
        let sink = MemorySink::default();
        let (tx, rx) = chunk_channel(4);
        let handle = tokio::spawn(BatchWriter::new(sink.clone(), options(10, 60_000)).run(rx));

        tx.send(lines("a", 3)).await.unwrap();
        tx.close().await.unwrap();
        let stats = handle.await.unwrap().unwrap();

        assert_eq!(stats.batches_received, 1);
        assert_eq!(stats.lines_written, 3);
        assert_eq!(*sink.writes.lock().unwrap(), vec![lines("a", 3)]);
        assert!(*sink.closed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_full_buffer_flushes_in_batch_size_writes() {
        let sink = MemorySink::default();
        let (tx, rx) = chunk_channel(4);
        let handle = tokio::spawn(BatchWriter::new(sink.clone(), options(4, 60_000)).run(rx));

        tx.send(lines("a", 3)).await.unwrap();
        tx.send(lines("b", 3)).await.unwrap();
        tx.close().await.unwrap();
        let stats = handle.await.unwrap().unwrap();

        let writes = sink.writes.lock().unwrap().clone();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], vec!["a0", "a1", "a2", "b0"]);
        assert_eq!(writes[1], vec!["b1", "b2"]);
        assert_eq!(stats.lines_written, 6);
        assert_eq!(stats.flushes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_flushes_partial_buffer() {
        let sink = MemorySink::default();
        let (tx, rx) = chunk_channel(4);
        let handle = tokio::spawn(BatchWriter::new(sink.clone(), options(100, 12_000)).run(rx));

        tx.send(lines("a", 5)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(12_500)).await;
        assert_eq!(sink.writes.lock().unwrap().len(), 1);

        tx.close().await.unwrap();
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.timed_flushes, 1);
        assert_eq!(stats.lines_written, 5);
    }

    #[tokio::test]
    async fn test_write_failure_ends_writer_and_closes_channel() {
        let sink = MemorySink {
            fail: true,
            ..MemorySink::default()
        };
        let (tx, rx) = chunk_channel(4);
        let handle = tokio::spawn(BatchWriter::new(sink, options(2, 60_000)).run(rx));

        tx.send(lines("a", 2)).await.unwrap();
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, IngestError::WriteRejected { status: 401, .. }));

        // Receiver is gone, so producers find out instead of hanging.
        assert!(tx.send(lines("b", 1)).await.is_err());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let sink = MemorySink {
            unavailable_for: 2,
            ..MemorySink::default()
        };
        let (tx, rx) = chunk_channel(4);
        let handle = tokio::spawn(BatchWriter::new(sink.clone(), options(2, 60_000)).run(rx));

        tx.send(lines("a", 2)).await.unwrap();
        tx.close().await.unwrap();
        let stats = handle.await.unwrap().unwrap();

        assert_eq!(stats.retries, 2);
        assert_eq!(stats.lines_written, 2);
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(*sink.writes.lock().unwrap(), vec![lines("a", 2)]);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let sink = MemorySink {
            unavailable_for: usize::MAX,
            ..MemorySink::default()
        };
        let (tx, rx) = chunk_channel(4);
        let handle = tokio::spawn(BatchWriter::new(sink.clone(), options(2, 60_000)).run(rx));

        tx.send(lines("a", 2)).await.unwrap();
        let err = handle.await.unwrap().unwrap_err();

        assert!(matches!(err, IngestError::WriteRejected { status: 503, .. }));
        assert_eq!(
            sink.attempts.load(Ordering::SeqCst),
            DEFAULT_MAX_RETRIES as usize + 1
        );
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let sink = MemorySink {
            fail: true,
            ..MemorySink::default()
        };
        let (tx, rx) = chunk_channel(4);
        let handle = tokio::spawn(BatchWriter::new(sink.clone(), options(1, 60_000)).run(rx));

        tx.send(lines("a", 1)).await.unwrap();
        assert!(handle.await.unwrap().is_err());
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let options = WriteOptions::default();
        let delays: Vec<u64> = (1..=7).map(|a| options.backoff(a).as_secs()).collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 80, 125, 125]);
    }

    #[test]
    fn test_transient_classification() {
        let rejected = |status| IngestError::WriteRejected {
            status,
            body: String::new(),
        };
        assert!(rejected(500).is_transient());
        assert!(rejected(429).is_transient());
        assert!(!rejected(400).is_transient());
        assert!(!rejected(401).is_transient());
        assert!(!IngestError::ChunkChannelClosed.is_transient());
    }

    #[tokio::test]
    async fn test_late_push_after_sentinel_is_rejected() {
        let sink = MemorySink::default();
        let (tx, rx) = chunk_channel(4);
        let handle = tokio::spawn(BatchWriter::new(sink.clone(), options(10, 60_000)).run(rx));

        tx.close().await.unwrap();
        handle.await.unwrap().unwrap();

        let err = tx.send(lines("late", 1)).await.unwrap_err();
        assert!(matches!(err, IngestError::ChunkChannelClosed));
        assert!(sink.writes.lock().unwrap().is_empty());
    }
}
