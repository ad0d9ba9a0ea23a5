//! Commit log replay iterator
//!
//! Enumerates the log directory, sorts files by creation instant, and
//! decodes records in order. Corruption is non-fatal: a bad checksum or
//! truncated record drops the remainder of that file, records a
//! diagnostic, and iteration continues with the next file. Within any one
//! series, records come back in the order the writer accepted them.

use crate::commitlog::encoding::RecordDecoder;
use crate::commitlog::error::{CommitLogError, CommitLogResult};
use crate::commitlog::file::{list_log_files, LogFileHeader, LogFileInfo};
use crate::commitlog::options::CommitLogOptions;
use crate::types::{CommitLogEntry, Series};
use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

/// Decides which log files are read at all.
pub type FileFilterPredicate = Arc<dyn Fn(&LogFileInfo) -> bool + Send + Sync>;

/// Decides which series' records are surfaced.
pub type SeriesFilterPredicate = Arc<dyn Fn(&Series) -> bool + Send + Sync>;

/// A predicate accepting every log file.
pub fn read_all_file_predicate() -> FileFilterPredicate {
    Arc::new(|_| true)
}

/// A predicate accepting every series.
pub fn read_all_series_predicate() -> SeriesFilterPredicate {
    Arc::new(|_| true)
}

/// Options for constructing a [`CommitLogIterator`].
pub struct IteratorOpts {
    /// The same options the log was written with, for directory layout
    /// and block size interpretation.
    pub commit_log_options: CommitLogOptions,
    pub file_filter: FileFilterPredicate,
    pub series_filter: SeriesFilterPredicate,
}

/// A non-fatal corruption observation made during iteration.
#[derive(Debug, Clone)]
pub struct CorruptionDiagnostic {
    pub file: PathBuf,
    pub reason: String,
}

struct OpenFile {
    reader: BufReader<File>,
    decoder: RecordDecoder,
    path: PathBuf,
}

/// Reads back commit log files in creation order.
pub struct CommitLogIterator {
    files: VecDeque<LogFileInfo>,
    series_filter: SeriesFilterPredicate,
    current: Option<OpenFile>,
    corruptions: Vec<CorruptionDiagnostic>,
    done: bool,
}

impl CommitLogIterator {
    /// Enumerate and filter the log directory. Fails only on directory
    /// enumeration errors; unreadable file headers become corruption
    /// diagnostics.
    pub fn new(opts: IteratorOpts) -> CommitLogResult<Self> {
        let dir = &opts.commit_log_options.filesystem.file_path_prefix;
        let (mut files, unreadable) = list_log_files(dir)?;

        let mut corruptions = Vec::new();
        for (path, reason) in unreadable {
            tracing::warn!("skipping unreadable commit log file {:?}: {}", path, reason);
            corruptions.push(CorruptionDiagnostic { file: path, reason });
        }

        files.retain(|info| (opts.file_filter)(info));

        Ok(Self {
            files: files.into(),
            series_filter: opts.series_filter,
            current: None,
            corruptions,
            done: false,
        })
    }

    /// Corruption diagnostics observed so far.
    pub fn corruptions(&self) -> &[CorruptionDiagnostic] {
        &self.corruptions
    }

    fn record_corruption(&mut self, path: PathBuf, reason: String) {
        tracing::warn!(
            "corrupt commit log record in {:?}, skipping rest of file: {}",
            path,
            reason
        );
        self.corruptions.push(CorruptionDiagnostic { file: path, reason });
    }

    /// Open the next filtered file and position the reader past its
    /// header. Returns Ok(false) when no files remain.
    fn advance_file(&mut self) -> CommitLogResult<bool> {
        loop {
            let Some(info) = self.files.pop_front() else {
                return Ok(false);
            };

            let file = match File::open(&info.path) {
                Ok(f) => f,
                Err(e) => return Err(CommitLogError::Io(e)),
            };
            let mut reader = BufReader::new(file);

            // Header was already parsed during enumeration; re-read it to
            // advance the reader to the first record.
            match LogFileHeader::read_from(&mut reader) {
                Ok(_) => {
                    self.current = Some(OpenFile {
                        reader,
                        decoder: RecordDecoder::new(),
                        path: info.path,
                    });
                    return Ok(true);
                }
                Err(e) => {
                    self.record_corruption(info.path, e.reason);
                    continue;
                }
            }
        }
    }
}

impl Iterator for CommitLogIterator {
    type Item = CommitLogResult<CommitLogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            if self.current.is_none() {
                match self.advance_file() {
                    Ok(true) => {}
                    Ok(false) => {
                        self.done = true;
                        return None;
                    }
                    Err(e) => {
                        // Fatal: surface once, then stop
                        self.done = true;
                        return Some(Err(e));
                    }
                }
            }

            let Some(open) = self.current.as_mut() else {
                continue;
            };

            match open.decoder.read_record(&mut open.reader) {
                Ok(Some(entry)) => {
                    if (self.series_filter)(&entry.series) {
                        return Some(Ok(entry));
                    }
                }
                Ok(None) => {
                    self.current = None;
                }
                Err(e) => {
                    let path = open.path.clone();
                    self.current = None;
                    self.record_corruption(path, e.reason);
                }
            }
        }
    }
}

impl std::fmt::Debug for CommitLogIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitLogIterator")
            .field("remaining_files", &self.files.len())
            .field("corruptions", &self.corruptions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitlog::encoding::RecordEncoder;
    use crate::commitlog::file::{file_name, LogFileHeader};
    use crate::types::test_support::ManualClock;
    use crate::types::{Datapoint, TimeUnit, UniqueIndexRegistry};
    use std::io::Write as _;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;

    const HOUR: i64 = 3_600_000_000_000;

    fn opts_for(dir: &Path) -> CommitLogOptions {
        CommitLogOptions::new(dir)
            .with_block_size(Duration::from_secs(3600))
            .with_clock(Arc::new(ManualClock::at(0)))
    }

    fn iter_opts(dir: &Path) -> IteratorOpts {
        IteratorOpts {
            commit_log_options: opts_for(dir),
            file_filter: read_all_file_predicate(),
            series_filter: read_all_series_predicate(),
        }
    }

    /// Write a log file by hand: header plus `entries` encoded records.
    fn write_file(
        dir: &Path,
        creation: i64,
        block_start: i64,
        index: u32,
        entries: &[CommitLogEntry],
    ) -> PathBuf {
        let header = LogFileHeader {
            creation_nanos: creation,
            block_start,
            block_size: HOUR,
            index_id: creation as u64,
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf);

        let mut encoder = RecordEncoder::new();
        for entry in entries {
            encoder.encode(entry, &mut buf);
        }

        let path = dir.join(file_name(block_start, index));
        let mut f = File::create(&path).unwrap();
        f.write_all(&buf).unwrap();
        path
    }

    fn entry(registry: &UniqueIndexRegistry, id: &str, shard: u32, ts: i64) -> CommitLogEntry {
        let series = registry.series(b"ns".to_vec(), id.as_bytes().to_vec(), shard);
        CommitLogEntry::new(
            series,
            Datapoint::new(ts, ts as f64),
            TimeUnit::Nanoseconds,
            vec![],
        )
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempdir().unwrap();
        let mut iter = CommitLogIterator::new(iter_opts(dir.path())).unwrap();
        assert!(iter.next().is_none());
        assert!(iter.corruptions().is_empty());
    }

    #[test]
    fn test_files_read_in_creation_order() {
        let dir = tempdir().unwrap();
        let registry = UniqueIndexRegistry::new();

        // Created second but in the earlier block
        write_file(dir.path(), 200, 0, 0, &[entry(&registry, "a", 0, 10)]);
        write_file(dir.path(), 100, HOUR, 0, &[entry(&registry, "a", 0, HOUR + 10)]);

        let iter = CommitLogIterator::new(iter_opts(dir.path())).unwrap();
        let timestamps: Vec<i64> = iter
            .map(|r| r.unwrap().datapoint.timestamp_nanos)
            .collect();
        assert_eq!(timestamps, vec![HOUR + 10, 10]);
    }

    #[test]
    fn test_series_filter_skips_without_surfacing() {
        let dir = tempdir().unwrap();
        let registry = UniqueIndexRegistry::new();

        write_file(
            dir.path(),
            100,
            0,
            0,
            &[
                entry(&registry, "keep", 0, 1),
                entry(&registry, "drop", 0, 2),
                entry(&registry, "keep", 0, 3),
            ],
        );

        let opts = IteratorOpts {
            commit_log_options: opts_for(dir.path()),
            file_filter: read_all_file_predicate(),
            series_filter: Arc::new(|series: &Series| series.id == b"keep".to_vec()),
        };
        let iter = CommitLogIterator::new(opts).unwrap();
        let timestamps: Vec<i64> = iter
            .map(|r| r.unwrap().datapoint.timestamp_nanos)
            .collect();
        assert_eq!(timestamps, vec![1, 3]);
    }

    #[test]
    fn test_file_filter_drops_whole_file() {
        let dir = tempdir().unwrap();
        let registry = UniqueIndexRegistry::new();

        write_file(dir.path(), 100, 0, 0, &[entry(&registry, "a", 0, 1)]);
        write_file(dir.path(), 200, HOUR, 0, &[entry(&registry, "a", 0, HOUR + 1)]);

        let opts = IteratorOpts {
            commit_log_options: opts_for(dir.path()),
            file_filter: Arc::new(|info: &LogFileInfo| info.header.block_start == 0),
            series_filter: read_all_series_predicate(),
        };
        let iter = CommitLogIterator::new(opts).unwrap();
        let timestamps: Vec<i64> = iter
            .map(|r| r.unwrap().datapoint.timestamp_nanos)
            .collect();
        assert_eq!(timestamps, vec![1]);
    }

    // Corruption tolerance: flip a byte in the 5th record of 10; the
    // first 4 surface, the rest of the file is dropped, no fatal error.
    #[test]
    fn test_corruption_truncates_file_but_is_not_fatal() {
        let dir = tempdir().unwrap();
        let registry = UniqueIndexRegistry::new();

        let entries: Vec<CommitLogEntry> =
            (0..10).map(|i| entry(&registry, "s", 0, i)).collect();
        let path = write_file(dir.path(), 100, 0, 0, &entries);

        // Find the byte offset of the 5th record and flip a body byte
        let mut header_buf = Vec::new();
        LogFileHeader {
            creation_nanos: 100,
            block_start: 0,
            block_size: HOUR,
            index_id: 100,
        }
        .write_to(&mut header_buf);
        let mut encoder = RecordEncoder::new();
        let mut offset = header_buf.len();
        for e in entries.iter().take(4) {
            let mut buf = Vec::new();
            encoder.encode(e, &mut buf);
            offset += buf.len();
        }

        let mut bytes = std::fs::read(&path).unwrap();
        // Flip a byte inside the 5th record's body, past the frame
        bytes[offset + 6] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let mut iter = CommitLogIterator::new(iter_opts(dir.path())).unwrap();
        let mut surfaced = Vec::new();
        for item in iter.by_ref() {
            surfaced.push(item.unwrap());
        }

        assert_eq!(surfaced.len(), 4);
        assert_eq!(iter.corruptions().len(), 1);
        assert!(iter.corruptions()[0].reason.contains("checksum mismatch"));
    }

    // Corruption in one file does not stop later files from being read.
    #[test]
    fn test_corruption_continues_to_next_file() {
        let dir = tempdir().unwrap();
        let registry = UniqueIndexRegistry::new();

        let path = write_file(dir.path(), 100, 0, 0, &[entry(&registry, "a", 0, 1)]);
        write_file(dir.path(), 200, HOUR, 0, &[entry(&registry, "b", 0, HOUR + 1)]);

        // Corrupt the first file's record frame
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let mut iter = CommitLogIterator::new(iter_opts(dir.path())).unwrap();
        let mut surfaced = Vec::new();
        for item in iter.by_ref() {
            surfaced.push(item.unwrap());
        }

        assert_eq!(surfaced.len(), 1);
        assert_eq!(surfaced[0].series.id, b"b".to_vec());
        assert_eq!(iter.corruptions().len(), 1);
    }

    #[test]
    fn test_unparseable_header_is_diagnostic_not_fatal() {
        let dir = tempdir().unwrap();
        let registry = UniqueIndexRegistry::new();

        write_file(dir.path(), 100, 0, 0, &[entry(&registry, "a", 0, 1)]);
        std::fs::write(dir.path().join(file_name(HOUR, 0)), b"garbage").unwrap();

        let mut iter = CommitLogIterator::new(iter_opts(dir.path())).unwrap();
        let surfaced: Vec<_> = iter.by_ref().map(|r| r.unwrap()).collect();
        assert_eq!(surfaced.len(), 1);
        assert_eq!(iter.corruptions().len(), 1);
    }
}
