//! Active log file writer
//!
//! `LogWriter` owns the active file handle and is driven only by the flush
//! worker, so all file I/O happens on one task with no lock held. Writers
//! on the hot path never touch it; they append to the shared batch and the
//! worker hands drained batches here.

use crate::commitlog::encoding::{BufferPool, RecordEncoder};
use crate::commitlog::file::{self, LogFileHeader};
use crate::commitlog::options::{CommitLogOptions, SyncMode};
use crate::time::{truncate_to_block, UnixNanos};
use crate::types::CommitLogEntry;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

struct ActiveFile {
    file: File,
    path: PathBuf,
    header: LogFileHeader,
    encoder: RecordEncoder,
}

/// Writes encoded records into time-bucketed log files, rotating when a
/// record's timestamp falls outside the active file's window.
pub(crate) struct LogWriter {
    opts: CommitLogOptions,
    pool: BufferPool,
    active: Option<ActiveFile>,
}

impl LogWriter {
    pub fn new(opts: CommitLogOptions) -> Self {
        Self {
            opts,
            pool: BufferPool::new(),
            active: None,
        }
    }

    /// Create the log directory and open the file whose window contains
    /// the current instant.
    pub fn open_initial(&mut self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.opts.filesystem.file_path_prefix)?;
        let now = self.opts.clock.now_nanos();
        self.open_file_for(now)
    }

    /// Append a drained batch, rotating between files as timestamps
    /// require. The active file is synced before control returns.
    pub fn append_batch(&mut self, entries: &[CommitLogEntry]) -> std::io::Result<()> {
        let mut buf = self.pool.get(entries.len() * 64);

        for entry in entries {
            let ts = entry.datapoint.timestamp_nanos;
            let in_window = self
                .active
                .as_ref()
                .is_some_and(|a| a.header.window_contains(ts));
            if !in_window {
                // Finalize the outgoing file before switching windows
                self.write_out(&mut buf)?;
                self.sync()?;
                self.open_file_for(ts)?;
            }
            if let Some(active) = self.active.as_mut() {
                active.encoder.encode(entry, &mut buf);
            }
        }

        self.write_out(&mut buf)?;
        self.sync()?;
        self.pool.put(buf);
        Ok(())
    }

    /// Sync and release the active file. Idempotent.
    pub fn close(&mut self) -> std::io::Result<()> {
        if self.active.is_some() {
            self.sync()?;
            self.active = None;
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn active_block_start(&self) -> Option<UnixNanos> {
        self.active.as_ref().map(|a| a.header.block_start)
    }

    fn write_out(&mut self, buf: &mut Vec<u8>) -> std::io::Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        if let Some(active) = self.active.as_mut() {
            active.file.write_all(buf)?;
        }
        buf.clear();
        Ok(())
    }

    fn sync(&mut self) -> std::io::Result<()> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };
        match self.opts.filesystem.sync {
            SyncMode::Fsync => active.file.sync_all(),
            SyncMode::Fdatasync => active.file.sync_data(),
            SyncMode::None => Ok(()),
        }
    }

    fn open_file_for(&mut self, timestamp: UnixNanos) -> std::io::Result<()> {
        let dir = &self.opts.filesystem.file_path_prefix;
        let block_start = truncate_to_block(timestamp, self.opts.block_size_nanos());
        let file_index = file::next_file_index(dir, block_start)?;
        let path = dir.join(file::file_name(block_start, file_index));

        let creation = self.opts.clock.now_nanos();
        let header = LogFileHeader {
            creation_nanos: creation,
            block_start,
            block_size: self.opts.block_size_nanos(),
            index_id: creation as u64,
        };

        let mut f = OpenOptions::new().write(true).create_new(true).open(&path)?;

        let mut header_bytes = self.pool.get(64);
        header.write_to(&mut header_bytes);
        f.write_all(&header_bytes)?;

        let preallocate = self.opts.filesystem.preallocate_bytes;
        if preallocate > header_bytes.len() as u64 {
            // Zeroed tail; the decoder treats a zero length prefix as EOF
            f.set_len(preallocate)?;
        }
        self.pool.put(header_bytes);

        tracing::info!(
            "opened commit log file {:?} (block start {})",
            path,
            block_start
        );

        self.active = Some(ActiveFile {
            file: f,
            path,
            header,
            encoder: RecordEncoder::new(),
        });
        Ok(())
    }
}

impl std::fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriter")
            .field(
                "active",
                &self.active.as_ref().map(|a| a.path.display().to_string()),
            )
            .finish()
    }
}
