//! Commit log configuration options
//!
//! Options are fixed at construction; the log never re-reads them after
//! `open`.

use crate::types::{Clock, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Durability strategy for accepted writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// The call blocks until the record is durably flushed. Strongest
    /// guarantee; lowest throughput.
    WriteWait,
    /// The call blocks only until the record is enqueued into the current
    /// batch; the flush worker makes it durable on a timer or size
    /// threshold. A crash between enqueue and flush loses those records.
    #[default]
    WriteBehind,
}

/// How flushed bytes are forced to stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// fsync after each flush (default, highest durability).
    #[default]
    Fsync,
    /// fdatasync (skips metadata update, faster).
    Fdatasync,
    /// No sync, rely on the OS (fastest, lowest durability).
    None,
}

/// Filesystem collaborator options.
#[derive(Debug, Clone)]
pub struct FilesystemOptions {
    /// Directory log files are created in.
    pub file_path_prefix: PathBuf,
    /// Sync policy applied on flush.
    pub sync: SyncMode,
    /// Preallocate new log files to this size; 0 disables preallocation.
    pub preallocate_bytes: u64,
}

impl Default for FilesystemOptions {
    fn default() -> Self {
        Self {
            file_path_prefix: PathBuf::from("meridian_commitlog"),
            sync: SyncMode::default(),
            preallocate_bytes: 0,
        }
    }
}

/// Options for a commit log instance. Immutable after construction.
#[derive(Debug, Clone)]
pub struct CommitLogOptions {
    pub filesystem: FilesystemOptions,
    pub strategy: Strategy,
    /// Logical time window covered by a single log file.
    pub block_size: Duration,
    /// Maximum time a non-empty batch waits before being flushed.
    pub flush_interval: Duration,
    /// Flush as soon as the pending batch exceeds this many encoded bytes.
    pub flush_size_bytes: usize,
    /// Writes with annotations longer than this fail with `Encoding`.
    pub max_annotation_len: usize,
    /// Total-duration bound on `open`.
    pub open_timeout: Duration,
    /// Total-duration bound on `close`, including the final drain.
    pub close_timeout: Duration,
    pub clock: Arc<dyn Clock>,
}

impl Default for CommitLogOptions {
    fn default() -> Self {
        Self {
            filesystem: FilesystemOptions::default(),
            strategy: Strategy::default(),
            block_size: Duration::from_secs(15 * 60),
            flush_interval: Duration::from_secs(1),
            flush_size_bytes: 64 * 1024,
            max_annotation_len: 16 * 1024,
            open_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(30),
            clock: Arc::new(SystemClock),
        }
    }
}

impl CommitLogOptions {
    pub fn new(file_path_prefix: impl Into<PathBuf>) -> Self {
        Self {
            filesystem: FilesystemOptions {
                file_path_prefix: file_path_prefix.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Builder: set the durability strategy.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Builder: set the logical block size.
    pub fn with_block_size(mut self, block_size: Duration) -> Self {
        self.block_size = block_size;
        self
    }

    /// Builder: set the flush interval.
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Builder: set the flush size threshold.
    pub fn with_flush_size_bytes(mut self, flush_size_bytes: usize) -> Self {
        self.flush_size_bytes = flush_size_bytes;
        self
    }

    /// Builder: set the sync mode.
    pub fn with_sync(mut self, sync: SyncMode) -> Self {
        self.filesystem.sync = sync;
        self
    }

    /// Builder: set the clock source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Block size in nanoseconds.
    pub fn block_size_nanos(&self) -> i64 {
        self.block_size.as_nanos() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = CommitLogOptions::default();
        assert_eq!(opts.strategy, Strategy::WriteBehind);
        assert_eq!(opts.filesystem.sync, SyncMode::Fsync);
        assert_eq!(opts.flush_size_bytes, 64 * 1024);
        assert!(opts.block_size_nanos() > 0);
    }

    #[test]
    fn test_builder() {
        let opts = CommitLogOptions::new("/tmp/cl")
            .with_strategy(Strategy::WriteWait)
            .with_block_size(Duration::from_secs(3600))
            .with_flush_interval(Duration::from_millis(1))
            .with_sync(SyncMode::None);

        assert_eq!(opts.strategy, Strategy::WriteWait);
        assert_eq!(opts.block_size_nanos(), 3_600_000_000_000);
        assert_eq!(opts.filesystem.sync, SyncMode::None);
        assert_eq!(
            opts.filesystem.file_path_prefix,
            PathBuf::from("/tmp/cl")
        );
    }
}
