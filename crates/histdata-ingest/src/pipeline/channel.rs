//! Chunk channel between parser workers and the batch writer
//!
//! A bounded multi-producer, single-consumer channel of line batches. Its
//! capacity is the only throttle between parsing and writing: a worker pushing
//! into a full channel blocks until the writer catches up.
//!
//! Shutdown is explicit. [`ChunkSender::close`] enqueues a sentinel behind any
//! pending batches and marks the channel closed for every sender clone; pushing
//! afterwards is an error rather than a silent no-op.

use crate::error::{IngestError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One message on the chunk channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkMessage {
    /// Ordered, pre-serialized line entries from one record
    Batch(Vec<String>),
    /// No more batches will follow
    Sentinel,
}

/// Create a chunk channel holding at most `capacity` messages
pub fn chunk_channel(capacity: usize) -> (ChunkSender, ChunkReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ChunkSender {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        },
        ChunkReceiver { rx },
    )
}

#[derive(Debug, Clone)]
pub struct ChunkSender {
    tx: mpsc::Sender<ChunkMessage>,
    closed: Arc<AtomicBool>,
}

impl ChunkSender {
    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(IngestError::ChunkChannelClosed);
        }
        Ok(())
    }

    /// Push a batch from a worker thread, blocking while the channel is full
    ///
    /// Must not be called from inside an async context.
    pub fn blocking_send(&self, batch: Vec<String>) -> Result<()> {
        self.check_open()?;
        self.tx
            .blocking_send(ChunkMessage::Batch(batch))
            .map_err(|_| IngestError::ChunkChannelClosed)
    }

    /// Push a batch from async code, waiting while the channel is full
    pub async fn send(&self, batch: Vec<String>) -> Result<()> {
        self.check_open()?;
        self.tx
            .send(ChunkMessage::Batch(batch))
            .await
            .map_err(|_| IngestError::ChunkChannelClosed)
    }

    /// Enqueue the sentinel; later pushes on any clone fail
    ///
    /// Closing twice is an error, as is closing after the writer went away.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(IngestError::ChunkChannelClosed);
        }
        self.tx
            .send(ChunkMessage::Sentinel)
            .await
            .map_err(|_| IngestError::ChunkChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }
}

#[derive(Debug)]
pub struct ChunkReceiver {
    rx: mpsc::Receiver<ChunkMessage>,
}

impl ChunkReceiver {
    pub async fn recv(&mut self) -> Option<ChunkMessage> {
        self.rx.recv().await
    }

    /// Blocking receive for consumers running outside the runtime
    pub fn blocking_recv(&mut self) -> Option<ChunkMessage> {
        self.rx.blocking_recv()
    }

    /// Stop accepting messages; buffered ones can still be received
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_batches_then_sentinel_in_order() {
        let (tx, mut rx) = chunk_channel(4);
        tx.send(vec!["a".to_string()]).await.unwrap();
        tx.send(vec!["b".to_string()]).await.unwrap();
        tx.close().await.unwrap();

        assert_eq!(rx.recv().await, Some(ChunkMessage::Batch(vec!["a".to_string()])));
        assert_eq!(rx.recv().await, Some(ChunkMessage::Batch(vec!["b".to_string()])));
        assert_eq!(rx.recv().await, Some(ChunkMessage::Sentinel));
    }

    #[tokio::test]
    async fn test_send_after_close_is_rejected_on_every_clone() {
        let (tx, _rx) = chunk_channel(4);
        let worker_tx = tx.clone();
        tx.close().await.unwrap();

        assert!(worker_tx.is_closed());
        let err = worker_tx.send(vec!["late".to_string()]).await.unwrap_err();
        assert!(matches!(err, IngestError::ChunkChannelClosed));
    }

    #[tokio::test]
    async fn test_double_close_is_rejected() {
        let (tx, _rx) = chunk_channel(4);
        tx.close().await.unwrap();
        assert!(tx.close().await.is_err());
    }

    #[tokio::test]
    async fn test_send_fails_when_receiver_dropped() {
        let (tx, rx) = chunk_channel(4);
        drop(rx);
        assert!(tx.send(vec!["x".to_string()]).await.is_err());
        assert!(tx.is_closed());
    }

    #[test]
    fn test_blocking_send_from_plain_thread() {
        let (tx, mut rx) = chunk_channel(1);
        let producer = std::thread::spawn(move || {
            for i in 0..3 {
                tx.blocking_send(vec![i.to_string()]).unwrap();
            }
        });

        let mut received = Vec::new();
        for _ in 0..3 {
            match rx.blocking_recv().unwrap() {
                ChunkMessage::Batch(lines) => received.extend(lines),
                ChunkMessage::Sentinel => panic!("unexpected sentinel"),
            }
        }
        producer.join().unwrap();
        assert_eq!(received, vec!["0", "1", "2"]);
    }
}
