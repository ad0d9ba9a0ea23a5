//! Commit log write path
//!
//! Many concurrent callers converge on a single mutex-guarded batch; one
//! flush worker per log drains the batch to disk on a timer, a size
//! signal, or shutdown. Critical sections on the hot path are bounded:
//! validate, append to the batch, release.
//!
//! Write strategies:
//! - **write-wait**: the call parks on a per-batch completion signal and
//!   returns once its record is durable.
//! - **write-behind**: the call returns as soon as the record is enqueued;
//!   the flush worker makes it durable. `close` drains everything that was
//!   accepted.

use crate::commitlog::encoding::RecordEncoder;
use crate::commitlog::error::{CommitLogError, CommitLogResult};
use crate::commitlog::options::{CommitLogOptions, Strategy};
use crate::commitlog::writer::LogWriter;
use crate::types::{Annotation, CommitLogEntry, Datapoint, Series, TimeUnit};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    NotOpen,
    Open,
    Closed,
}

type FlushWaiter = oneshot::Sender<Result<(), String>>;

#[derive(Default)]
struct Batch {
    entries: Vec<CommitLogEntry>,
    bytes: usize,
    waiters: Vec<FlushWaiter>,
}

struct Shared {
    status: Status,
    batch: Batch,
    /// Last flush failure, replayed to the next writer until a flush
    /// succeeds.
    retained_error: Option<String>,
}

/// An append-only, time-bucketed, batched durable log of writes.
pub struct CommitLog {
    opts: CommitLogOptions,
    shared: Arc<Mutex<Shared>>,
    flush_signal: Arc<Notify>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    worker: Mutex<Option<JoinHandle<CommitLogResult<()>>>>,
    error_tx: mpsc::UnboundedSender<CommitLogError>,
    error_rx: Mutex<Option<mpsc::UnboundedReceiver<CommitLogError>>>,
}

impl CommitLog {
    /// Create a new commit log. No I/O happens until `open`.
    pub fn new(opts: CommitLogOptions) -> Self {
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        Self {
            opts,
            shared: Arc::new(Mutex::new(Shared {
                status: Status::NotOpen,
                batch: Batch::default(),
                retained_error: None,
            })),
            flush_signal: Arc::new(Notify::new()),
            shutdown: Mutex::new(None),
            worker: Mutex::new(None),
            error_tx,
            error_rx: Mutex::new(None),
        }
    }

    /// Prepare the log directory, open the first file, and start the
    /// flush worker.
    pub async fn open(&self) -> CommitLogResult<()> {
        let timeout = self.opts.open_timeout;
        tokio::time::timeout(timeout, self.open_inner())
            .await
            .map_err(|_| CommitLogError::Timeout(timeout))?
    }

    async fn open_inner(&self) -> CommitLogResult<()> {
        let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        match shared.status {
            Status::Open => return Err(CommitLogError::AlreadyOpen),
            Status::Closed => return Err(CommitLogError::Closed),
            Status::NotOpen => {}
        }

        let mut writer = LogWriter::new(self.opts.clone());
        writer.open_initial()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = FlushWorker {
            shared: Arc::clone(&self.shared),
            signal: Arc::clone(&self.flush_signal),
            shutdown: shutdown_rx,
            writer,
            retained: Vec::new(),
            error_tx: self.error_tx.clone(),
            flush_interval: self.opts.flush_interval,
        };
        let handle = tokio::spawn(worker.run());

        *self.shutdown.lock().unwrap_or_else(|e| e.into_inner()) = Some(shutdown_tx);
        *self.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        shared.status = Status::Open;
        Ok(())
    }

    /// Write a single datapoint for a series.
    pub async fn write(
        &self,
        series: Series,
        datapoint: Datapoint,
        unit: TimeUnit,
        annotation: Annotation,
    ) -> CommitLogResult<()> {
        self.write_batch(vec![CommitLogEntry::new(series, datapoint, unit, annotation)])
            .await
    }

    /// Write a batch of datapoints, enqueued atomically in order.
    pub async fn write_batch(&self, entries: Vec<CommitLogEntry>) -> CommitLogResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        for entry in &entries {
            if entry.annotation.len() > self.opts.max_annotation_len {
                return Err(CommitLogError::Encoding(format!(
                    "annotation length {} exceeds configured max {}",
                    entry.annotation.len(),
                    self.opts.max_annotation_len
                )));
            }
        }

        let write_wait = self.opts.strategy == Strategy::WriteWait;
        let (waiter_rx, over_threshold) = {
            let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
            if shared.status != Status::Open {
                return Err(CommitLogError::Closed);
            }
            if let Some(msg) = shared.retained_error.take() {
                return Err(CommitLogError::FlushIo(msg));
            }

            for entry in entries {
                shared.batch.bytes += RecordEncoder::estimated_size(&entry);
                shared.batch.entries.push(entry);
            }

            let rx = if write_wait {
                let (tx, rx) = oneshot::channel();
                shared.batch.waiters.push(tx);
                Some(rx)
            } else {
                None
            };
            (rx, shared.batch.bytes >= self.opts.flush_size_bytes)
        };

        if over_threshold || write_wait {
            self.flush_signal.notify_one();
        }

        match waiter_rx {
            None => Ok(()),
            Some(rx) => match rx.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(msg)) => Err(CommitLogError::FlushIo(msg)),
                // Worker went away without completing the batch
                Err(_) => Err(CommitLogError::Cancelled),
            },
        }
    }

    /// Drain all accepted writes to stable storage and release resources.
    pub async fn close(&self) -> CommitLogResult<()> {
        let timeout = self.opts.close_timeout;
        tokio::time::timeout(timeout, self.close_inner())
            .await
            .map_err(|_| CommitLogError::Timeout(timeout))?
    }

    async fn close_inner(&self) -> CommitLogResult<()> {
        {
            let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
            if shared.status != Status::Open {
                return Err(CommitLogError::Closed);
            }
            shared.status = Status::Closed;
        }

        if let Some(tx) = self
            .shutdown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            let _ = tx.send(true);
        }

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match handle {
            None => Ok(()),
            Some(handle) => handle
                .await
                .map_err(|e| CommitLogError::FlushIo(format!("flush worker failed: {}", e)))?,
        }
    }

    /// Take the async error channel. Write-behind flush failures surface
    /// here; the receiver can be taken once.
    pub fn error_receiver(&self) -> Option<mpsc::UnboundedReceiver<CommitLogError>> {
        self.error_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Options the log was constructed with.
    pub fn options(&self) -> &CommitLogOptions {
        &self.opts
    }
}

impl std::fmt::Debug for CommitLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitLog")
            .field("path", &self.opts.filesystem.file_path_prefix)
            .field("strategy", &self.opts.strategy)
            .finish()
    }
}

/// One flush worker per log instance. Owns the file writer; all disk I/O
/// happens here, after the batch mutex has been released.
struct FlushWorker {
    shared: Arc<Mutex<Shared>>,
    signal: Arc<Notify>,
    shutdown: watch::Receiver<bool>,
    writer: LogWriter,
    /// Writes from a failed flush, reattempted on the next trigger ahead
    /// of newer entries so per-series order holds.
    retained: Vec<CommitLogEntry>,
    error_tx: mpsc::UnboundedSender<CommitLogError>,
    flush_interval: Duration,
}

impl FlushWorker {
    async fn run(mut self) -> CommitLogResult<()> {
        let mut ticker = tokio::time::interval(self.flush_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.signal.notified() => {}
                _ = self.shutdown.changed() => break,
            }
            let _ = self.flush_once();
        }

        // Final drain: everything accepted before close must be durable
        let result = self.flush_once();
        let close_result = self.writer.close().map_err(CommitLogError::from);
        result.map_err(CommitLogError::FlushIo)?;
        close_result
    }

    fn flush_once(&mut self) -> Result<(), String> {
        let (new_entries, waiters) = {
            let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
            let batch = std::mem::take(&mut shared.batch);
            (batch.entries, batch.waiters)
        };

        let mut entries = std::mem::take(&mut self.retained);
        entries.extend(new_entries);

        if entries.is_empty() {
            for waiter in waiters {
                let _ = waiter.send(Ok(()));
            }
            return Ok(());
        }

        tracing::debug!("flushing {} commit log writes", entries.len());

        match self.writer.append_batch(&entries) {
            Ok(()) => {
                let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
                shared.retained_error = None;
                drop(shared);
                for waiter in waiters {
                    let _ = waiter.send(Ok(()));
                }
                Ok(())
            }
            Err(e) => {
                let msg = e.to_string();
                tracing::error!("commit log flush failed: {}", msg);
                self.retained = entries;
                {
                    let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
                    shared.retained_error = Some(msg.clone());
                }
                for waiter in waiters {
                    let _ = waiter.send(Err(msg.clone()));
                }
                let _ = self.error_tx.send(CommitLogError::FlushIo(msg.clone()));
                Err(msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitlog::file::list_log_files;
    use crate::commitlog::iterator::{
        read_all_file_predicate, read_all_series_predicate, CommitLogIterator, IteratorOpts,
    };
    use crate::commitlog::options::SyncMode;
    use crate::types::test_support::ManualClock;
    use crate::types::UniqueIndexRegistry;
    use rand::Rng;
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::tempdir;

    const HOUR: i64 = 3_600_000_000_000;
    const MINUTE: i64 = 60_000_000_000;

    fn test_options(dir: &Path, now: i64) -> CommitLogOptions {
        CommitLogOptions::new(dir)
            .with_block_size(Duration::from_secs(3600))
            .with_flush_interval(Duration::from_millis(1))
            .with_sync(SyncMode::Fsync)
            .with_clock(Arc::new(ManualClock::at(now)))
    }

    fn replay_all(opts: &CommitLogOptions) -> Vec<CommitLogEntry> {
        let iter = CommitLogIterator::new(IteratorOpts {
            commit_log_options: opts.clone(),
            file_filter: read_all_file_predicate(),
            series_filter: read_all_series_predicate(),
        })
        .unwrap();
        iter.map(|r| r.unwrap()).collect()
    }

    #[tokio::test]
    async fn test_write_before_open_fails() {
        let dir = tempdir().unwrap();
        let log = CommitLog::new(test_options(dir.path(), 0));

        let registry = UniqueIndexRegistry::new();
        let series = registry.series(b"ns".to_vec(), b"cpu".to_vec(), 0);
        let err = log
            .write(series, Datapoint::new(1, 1.0), TimeUnit::Nanoseconds, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, CommitLogError::Closed));
    }

    #[tokio::test]
    async fn test_open_twice_fails() {
        let dir = tempdir().unwrap();
        let log = CommitLog::new(test_options(dir.path(), 0));

        log.open().await.unwrap();
        let err = log.open().await.unwrap_err();
        assert!(matches!(err, CommitLogError::AlreadyOpen));
        log.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_twice_fails() {
        let dir = tempdir().unwrap();
        let log = CommitLog::new(test_options(dir.path(), 0));

        log.open().await.unwrap();
        log.close().await.unwrap();
        let err = log.close().await.unwrap_err();
        assert!(matches!(err, CommitLogError::Closed));
    }

    #[tokio::test]
    async fn test_oversized_annotation_fails_encoding() {
        let dir = tempdir().unwrap();
        let mut opts = test_options(dir.path(), 0);
        opts.max_annotation_len = 8;
        let log = CommitLog::new(opts);
        log.open().await.unwrap();

        let registry = UniqueIndexRegistry::new();
        let series = registry.series(b"ns".to_vec(), b"cpu".to_vec(), 0);
        let err = log
            .write(
                series.clone(),
                Datapoint::new(1, 1.0),
                TimeUnit::Nanoseconds,
                vec![0u8; 9],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CommitLogError::Encoding(_)));

        // Other writes are unaffected
        log.write(series, Datapoint::new(2, 2.0), TimeUnit::Nanoseconds, vec![])
            .await
            .unwrap();
        log.close().await.unwrap();
    }

    // Round-trip: random writes within a 15 minute window all come back,
    // and each series' subsequence preserves write order.
    #[tokio::test]
    async fn test_round_trip_preserves_per_series_order() {
        let dir = tempdir().unwrap();
        let base = 1_000 * HOUR;
        let opts = test_options(dir.path(), base);
        let log = CommitLog::new(opts.clone());
        log.open().await.unwrap();

        let registry = UniqueIndexRegistry::new();
        let mut rng = rand::thread_rng();
        let mut written: Vec<CommitLogEntry> = Vec::new();

        for _ in 0..100 {
            let series_id = format!("series-{}", rng.gen_range(0..10));
            let shard = rng.gen_range(0..4u32);
            let series = registry.series(b"metrics".to_vec(), series_id.into_bytes(), shard);
            let ts = base + rng.gen_range(0..15 * MINUTE);
            let value: f64 = rng.gen();

            let entry =
                CommitLogEntry::new(series, Datapoint::new(ts, value), TimeUnit::Nanoseconds, vec![]);
            written.push(entry.clone());
            log.write_batch(vec![entry]).await.unwrap();
        }

        log.close().await.unwrap();

        let replayed = replay_all(&opts);
        assert_eq!(replayed.len(), written.len());

        let mut expected: HashMap<Vec<u8>, Vec<CommitLogEntry>> = HashMap::new();
        for entry in &written {
            expected
                .entry(entry.series.id.clone())
                .or_default()
                .push(entry.clone());
        }
        let mut observed: HashMap<Vec<u8>, Vec<CommitLogEntry>> = HashMap::new();
        for entry in &replayed {
            observed
                .entry(entry.series.id.clone())
                .or_default()
                .push(entry.clone());
        }
        assert_eq!(observed, expected);
    }

    // Rotation: writes an hour apart land in two files with distinct
    // block starts, and no file holds a record outside its window.
    #[tokio::test]
    async fn test_rotation_creates_distinct_block_files() {
        let dir = tempdir().unwrap();
        let base = 500 * HOUR;
        let opts = test_options(dir.path(), base);
        let log = CommitLog::new(opts.clone());
        log.open().await.unwrap();

        let registry = UniqueIndexRegistry::new();
        let series = registry.series(b"ns".to_vec(), b"cpu".to_vec(), 0);

        log.write(
            series.clone(),
            Datapoint::new(base, 1.0),
            TimeUnit::Nanoseconds,
            vec![],
        )
        .await
        .unwrap();
        log.write(
            series,
            Datapoint::new(base + HOUR + 1, 2.0),
            TimeUnit::Nanoseconds,
            vec![],
        )
        .await
        .unwrap();

        log.close().await.unwrap();

        let (files, _) = list_log_files(dir.path()).unwrap();
        let mut starts: Vec<i64> = files.iter().map(|f| f.header.block_start).collect();
        starts.sort_unstable();
        starts.dedup();
        assert!(starts.contains(&base));
        assert!(starts.contains(&(base + HOUR)));

        // Every replayed record falls inside its file's window
        for info in &files {
            let iter = CommitLogIterator::new(IteratorOpts {
                commit_log_options: opts.clone(),
                file_filter: {
                    let path = info.path.clone();
                    Arc::new(move |f: &crate::commitlog::file::LogFileInfo| f.path == path)
                },
                series_filter: read_all_series_predicate(),
            })
            .unwrap();
            for entry in iter {
                let entry = entry.unwrap();
                assert!(info.header.window_contains(entry.datapoint.timestamp_nanos));
            }
        }
    }

    // Write-behind durability: a huge flush interval means nothing is
    // flushed by timer; close must still drain all 50 writes.
    #[tokio::test]
    async fn test_write_behind_close_drains_all() {
        let dir = tempdir().unwrap();
        let base = 42 * HOUR;
        let mut opts = test_options(dir.path(), base);
        opts.flush_interval = Duration::from_secs(3600);
        opts.strategy = Strategy::WriteBehind;
        let log = CommitLog::new(opts.clone());
        log.open().await.unwrap();

        let registry = UniqueIndexRegistry::new();
        for i in 0..50 {
            let series = registry.series(b"ns".to_vec(), format!("s-{}", i % 5).into_bytes(), 0);
            log.write(
                series,
                Datapoint::new(base + i, i as f64),
                TimeUnit::Nanoseconds,
                vec![],
            )
            .await
            .unwrap();
        }

        log.close().await.unwrap();

        let replayed = replay_all(&opts);
        assert_eq!(replayed.len(), 50);
    }

    #[tokio::test]
    async fn test_write_wait_is_durable_without_close() {
        let dir = tempdir().unwrap();
        let base = 7 * HOUR;
        let mut opts = test_options(dir.path(), base);
        opts.strategy = Strategy::WriteWait;
        opts.flush_interval = Duration::from_secs(3600);
        let log = CommitLog::new(opts.clone());
        log.open().await.unwrap();

        let registry = UniqueIndexRegistry::new();
        let series = registry.series(b"ns".to_vec(), b"cpu".to_vec(), 1);
        log.write(
            series,
            Datapoint::new(base + 5, 9.5),
            TimeUnit::Seconds,
            b"note".to_vec(),
        )
        .await
        .unwrap();

        // The write returned, so it must already be on disk
        let replayed = replay_all(&opts);
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].datapoint.value, 9.5);
        assert_eq!(replayed[0].unit, TimeUnit::Seconds);
        assert_eq!(replayed[0].annotation, b"note".to_vec());

        log.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_writers_all_land() {
        let dir = tempdir().unwrap();
        let base = 11 * HOUR;
        let opts = test_options(dir.path(), base);
        let log = Arc::new(CommitLog::new(opts.clone()));
        log.open().await.unwrap();

        let registry = Arc::new(UniqueIndexRegistry::new());
        let mut handles = Vec::new();
        for task in 0..8 {
            let log = Arc::clone(&log);
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    let series = registry.series(
                        b"ns".to_vec(),
                        format!("writer-{}", task).into_bytes(),
                        task as u32,
                    );
                    log.write(
                        series,
                        Datapoint::new(base + i, i as f64),
                        TimeUnit::Nanoseconds,
                        vec![],
                    )
                    .await
                    .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        log.close().await.unwrap();

        let replayed = replay_all(&opts);
        assert_eq!(replayed.len(), 8 * 25);

        // Per-writer (per-series) order: values ascend
        let mut per_series: HashMap<Vec<u8>, Vec<f64>> = HashMap::new();
        for entry in replayed {
            per_series
                .entry(entry.series.id.clone())
                .or_default()
                .push(entry.datapoint.value);
        }
        assert_eq!(per_series.len(), 8);
        for values in per_series.values() {
            let mut sorted = values.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            assert_eq!(*values, sorted);
        }
    }
}
