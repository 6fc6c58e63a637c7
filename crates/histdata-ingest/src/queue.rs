//! Work queues with join semantics
//!
//! A [`RecordQueue`] is an ordered, shared collection of records. Besides
//! holding items it counts unfinished work: every `put` adds one, every
//! `task_done` removes one, and [`RecordQueue::join`] resolves once the count
//! reaches zero. Taking an item off the queue does not finish it; the worker
//! that processed it acknowledges it, normally through a [`TaskGuard`].

use crate::checkpoint::Checkpoint;
use crate::error::{IngestError, Result};
use histdata_common::{Record, RecordStatus};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct RecordQueue {
    name: &'static str,
    items: Mutex<VecDeque<Record>>,
    unfinished: watch::Sender<usize>,
}

impl RecordQueue {
    pub fn new(name: &'static str) -> Self {
        let (unfinished, _) = watch::channel(0);
        Self {
            name,
            items: Mutex::new(VecDeque::new()),
            unfinished,
        }
    }

    pub fn from_records(name: &'static str, records: impl IntoIterator<Item = Record>) -> Self {
        let queue = Self::new(name);
        for record in records {
            queue.put(record);
        }
        queue
    }

    /// Load a queue from a checkpoint file; a missing file yields an empty queue
    pub fn load_checkpoint(name: &'static str, path: &Path) -> Result<Self> {
        let records = match Checkpoint::read(path)? {
            Some(checkpoint) => {
                info!(
                    queue = name,
                    path = %path.display(),
                    records = checkpoint.records.len(),
                    written_at = %checkpoint.written_at,
                    "Checkpoint loaded"
                );
                checkpoint.records
            },
            None => {
                debug!(queue = name, path = %path.display(), "No checkpoint, starting empty");
                Vec::new()
            },
        };
        Ok(Self::from_records(name, records))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Record>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a record; it counts as unfinished until acknowledged
    pub fn put(&self, record: Record) {
        let mut items = self.lock();
        // Counted before it is visible, so a consumer cannot acknowledge it first.
        self.unfinished.send_modify(|n| *n += 1);
        items.push_back(record);
    }

    /// Take the oldest record, if any
    pub fn get(&self) -> Option<Record> {
        self.lock().pop_front()
    }

    /// Acknowledge one record taken with [`RecordQueue::get`]
    pub fn task_done(&self) {
        self.unfinished.send_modify(|n| {
            if *n == 0 {
                warn!(queue = self.name, "task_done called more times than items were put");
            } else {
                *n -= 1;
            }
        });
    }

    /// Guard that acknowledges one record when dropped, on every exit path
    pub fn task_guard(self: &Arc<Self>) -> TaskGuard {
        TaskGuard {
            queue: Arc::clone(self),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Records put but not yet acknowledged
    pub fn unfinished(&self) -> usize {
        *self.unfinished.borrow()
    }

    /// Wait until every record ever put has been acknowledged
    pub async fn join(&self) {
        let mut rx = self.unfinished.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Move every record into `other`, acknowledging them here
    pub fn dump_to_queue(&self, other: &RecordQueue) -> usize {
        let mut moved = 0;
        while let Some(record) = self.get() {
            other.put(record);
            self.task_done();
            moved += 1;
        }
        debug!(from = self.name, to = other.name, moved, "Queue merged");
        moved
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.lock().iter().any(|r| r.url == url)
    }

    /// Copy of the queued records, front first
    pub fn snapshot(&self) -> Vec<Record> {
        self.lock().iter().cloned().collect()
    }

    /// Queued records per status
    pub fn status_counts(&self) -> BTreeMap<RecordStatus, usize> {
        let mut counts = BTreeMap::new();
        for record in self.lock().iter() {
            *counts.entry(record.status).or_insert(0) += 1;
        }
        counts
    }

    /// Atomically replace the checkpoint at `path` with this queue's contents
    pub fn write_checkpoint(&self, path: &Path) -> Result<()> {
        let checkpoint = Checkpoint::new(self.snapshot());
        checkpoint
            .write(path)
            .map_err(|e| IngestError::checkpoint(path, e))?;
        info!(
            queue = self.name,
            path = %path.display(),
            records = checkpoint.records.len(),
            "Checkpoint written"
        );
        Ok(())
    }
}

impl std::fmt::Debug for RecordQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordQueue")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("unfinished", &self.unfinished())
            .finish()
    }
}

/// Acknowledges one record on its queue when dropped
#[must_use = "dropping the guard acknowledges the record immediately"]
pub struct TaskGuard {
    queue: Arc<RecordQueue>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.queue.task_done();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record(n: usize, status: RecordStatus) -> Record {
        Record::new(
            format!("http://histdata.test/{}", n),
            format!("/data/{}", n),
            format!("file_{}.csv", n),
            status,
        )
    }

    #[test]
    fn test_fifo_order() {
        let queue = RecordQueue::from_records(
            "current",
            (0..3).map(|n| record(n, RecordStatus::CsvClean)),
        );
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.get().unwrap().url, "http://histdata.test/0");
        assert_eq!(queue.get().unwrap().url, "http://histdata.test/1");
        assert_eq!(queue.get().unwrap().url, "http://histdata.test/2");
        assert!(queue.get().is_none());
    }

    #[test]
    fn test_get_does_not_finish() {
        let queue = RecordQueue::from_records("current", [record(0, RecordStatus::CsvClean)]);
        queue.get().unwrap();
        assert!(queue.is_empty());
        assert_eq!(queue.unfinished(), 1);
        queue.task_done();
        assert_eq!(queue.unfinished(), 0);
    }

    #[test]
    fn test_extra_task_done_saturates() {
        let queue = RecordQueue::new("current");
        queue.task_done();
        assert_eq!(queue.unfinished(), 0);
    }

    #[test]
    fn test_guard_acknowledges_on_drop() {
        let queue = Arc::new(RecordQueue::from_records(
            "current",
            [record(0, RecordStatus::CsvClean)],
        ));
        queue.get().unwrap();
        {
            let _guard = queue.task_guard();
            assert_eq!(queue.unfinished(), 1);
        }
        assert_eq!(queue.unfinished(), 0);
    }

    #[tokio::test]
    async fn test_join_waits_for_acknowledgement() {
        let queue = Arc::new(RecordQueue::from_records(
            "current",
            (0..2).map(|n| record(n, RecordStatus::CsvClean)),
        ));

        let worker_queue = Arc::clone(&queue);
        let worker = tokio::spawn(async move {
            while let Some(_record) = worker_queue.get() {
                let _guard = worker_queue.task_guard();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        tokio::time::timeout(Duration::from_secs(5), queue.join())
            .await
            .expect("join should resolve once both records are acknowledged");
        assert_eq!(queue.unfinished(), 0);
        worker.await.unwrap();
    }

    #[test]
    fn test_concurrent_put_and_acknowledge_balance() {
        for _ in 0..20 {
            let queue = Arc::new(RecordQueue::new("current"));
            let taken = Arc::new(std::sync::atomic::AtomicUsize::new(0));
            let total = 2_000;

            let consumers: Vec<_> = (0..3)
                .map(|_| {
                    let queue = Arc::clone(&queue);
                    let taken = Arc::clone(&taken);
                    std::thread::spawn(move || {
                        while taken.load(std::sync::atomic::Ordering::SeqCst) < total {
                            if queue.get().is_some() {
                                queue.task_done();
                                taken.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                            } else {
                                std::thread::yield_now();
                            }
                        }
                    })
                })
                .collect();

            for n in 0..total {
                queue.put(record(n, RecordStatus::CsvClean));
            }
            for consumer in consumers {
                consumer.join().unwrap();
            }

            assert!(queue.is_empty());
            assert_eq!(queue.unfinished(), 0);
        }
    }

    #[tokio::test]
    async fn test_join_on_empty_queue_returns() {
        let queue = RecordQueue::new("current");
        tokio::time::timeout(Duration::from_millis(100), queue.join())
            .await
            .unwrap();
    }

    #[test]
    fn test_dump_to_queue() {
        let current = RecordQueue::new("current");
        let next = RecordQueue::from_records(
            "next",
            (0..3).map(|n| record(n, RecordStatus::InfluxUpload)),
        );

        let moved = next.dump_to_queue(&current);

        assert_eq!(moved, 3);
        assert!(next.is_empty());
        assert_eq!(next.unfinished(), 0);
        assert_eq!(current.len(), 3);
        assert_eq!(current.snapshot()[0].url, "http://histdata.test/0");
    }

    #[test]
    fn test_status_counts() {
        let queue = RecordQueue::from_records(
            "current",
            [
                record(0, RecordStatus::CsvClean),
                record(1, RecordStatus::CsvClean),
                record(2, RecordStatus::InfluxUpload),
            ],
        );
        let counts = queue.status_counts();
        assert_eq!(counts[&RecordStatus::CsvClean], 2);
        assert_eq!(counts[&RecordStatus::InfluxUpload], 1);
        assert!(queue.contains_url("http://histdata.test/2"));
        assert!(!queue.contains_url("http://histdata.test/9"));
    }
}
