//! Commit log file format and directory layout
//!
//! Files live flat under the filesystem prefix, named
//! `commitlog-<block-start-ns>-<file-index>.db`. The file index ascends
//! within a block so a log reopened into the same logical window never
//! clobbers an earlier file.
//!
//! Layout:
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ HEADER                                   │
//! │   magic: [u8; 4] = "MCLG"                │
//! │   version: varint                        │
//! │   creation: i64 LE (unix nanos)          │
//! │   block_start: i64 LE (unix nanos)       │
//! │   block_size: i64 LE (nanos)             │
//! │   index_id: u64 LE (opaque)              │
//! ├──────────────────────────────────────────┤
//! │ RECORDS (see encoding)                   │
//! └──────────────────────────────────────────┘
//! ```

use crate::commitlog::encoding::{
    read_i64, read_u64, read_var_u64, write_i64, write_u64, write_var_u64, DecodeError,
};
use crate::time::UnixNanos;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Magic bytes identifying a commit log file.
pub(crate) const LOG_FILE_MAGIC: [u8; 4] = *b"MCLG";

/// Current log file format version.
pub(crate) const LOG_FILE_VERSION: u64 = 1;

const FILE_PREFIX: &str = "commitlog";
const FILE_EXTENSION: &str = "db";

/// Parsed commit log file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFileHeader {
    /// Instant the file was created.
    pub creation_nanos: UnixNanos,
    /// Start of the logical block window this file covers.
    pub block_start: UnixNanos,
    /// Duration of the block window in nanoseconds.
    pub block_size: i64,
    /// Opaque index identifier.
    pub index_id: u64,
}

impl LogFileHeader {
    /// Serialize the header, appending to `out`.
    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&LOG_FILE_MAGIC);
        write_var_u64(out, LOG_FILE_VERSION);
        write_i64(out, self.creation_nanos);
        write_i64(out, self.block_start);
        write_i64(out, self.block_size);
        write_u64(out, self.index_id);
    }

    /// Parse a header from the front of a file.
    pub(crate) fn read_from<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)
            .map_err(|e| DecodeError {
                reason: format!("truncated magic: {}", e),
            })?;
        if magic != LOG_FILE_MAGIC {
            return Err(DecodeError {
                reason: format!("invalid magic: {:?}", magic),
            });
        }

        let version = read_var_u64(r)?;
        if version > LOG_FILE_VERSION {
            return Err(DecodeError {
                reason: format!("unsupported version: {}", version),
            });
        }

        let creation_nanos = read_i64(r)?;
        let block_start = read_i64(r)?;
        let block_size = read_i64(r)?;
        if block_size <= 0 {
            return Err(DecodeError {
                reason: format!("non-positive block size: {}", block_size),
            });
        }
        let index_id = read_u64(r)?;

        Ok(Self {
            creation_nanos,
            block_start,
            block_size,
            index_id,
        })
    }

    /// The logical window `[block_start, block_start + block_size)`.
    pub fn window_contains(&self, timestamp: UnixNanos) -> bool {
        timestamp >= self.block_start && timestamp < self.block_start + self.block_size
    }
}

/// Metadata for one log file, handed to file-filter predicates.
#[derive(Debug, Clone)]
pub struct LogFileInfo {
    pub path: PathBuf,
    /// Index disambiguating files that share a block start.
    pub file_index: u32,
    pub header: LogFileHeader,
}

/// Build the file name for a (block start, file index) pair.
pub(crate) fn file_name(block_start: UnixNanos, file_index: u32) -> String {
    format!(
        "{}-{}-{}.{}",
        FILE_PREFIX, block_start, file_index, FILE_EXTENSION
    )
}

/// Parse `(block_start, file_index)` out of a log file name.
pub(crate) fn parse_file_name(name: &str) -> Option<(UnixNanos, u32)> {
    let stem = name.strip_suffix(&format!(".{}", FILE_EXTENSION))?;
    let rest = stem.strip_prefix(&format!("{}-", FILE_PREFIX))?;
    // Block start may be negative, so split at the final '-'
    let (block_start, file_index) = rest.rsplit_once('-')?;
    Some((block_start.parse().ok()?, file_index.parse().ok()?))
}

/// Next free file index within a block, scanning the directory.
pub(crate) fn next_file_index(dir: &Path, block_start: UnixNanos) -> std::io::Result<u32> {
    let mut next = 0u32;
    if !dir.exists() {
        return Ok(next);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some((start, index)) = parse_file_name(name) {
            if start == block_start {
                next = next.max(index + 1);
            }
        }
    }
    Ok(next)
}

/// Enumerate log files under `dir`, sorted by creation instant.
///
/// Files whose header cannot be parsed are skipped; they come back in the
/// second element so the caller can surface corruption diagnostics.
pub(crate) fn list_log_files(
    dir: &Path,
) -> std::io::Result<(Vec<LogFileInfo>, Vec<(PathBuf, String)>)> {
    let mut files = Vec::new();
    let mut unreadable = Vec::new();

    if !dir.exists() {
        return Ok((files, unreadable));
    }

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((_, file_index)) = parse_file_name(name) else {
            continue;
        };

        let mut file = match std::fs::File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                unreadable.push((path, e.to_string()));
                continue;
            }
        };
        match LogFileHeader::read_from(&mut file) {
            Ok(header) => files.push(LogFileInfo {
                path,
                file_index,
                header,
            }),
            Err(e) => unreadable.push((path, e.reason)),
        }
    }

    files.sort_by_key(|f| (f.header.creation_nanos, f.header.block_start, f.file_index));
    Ok((files, unreadable))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_header_round_trip() {
        let header = LogFileHeader {
            creation_nanos: 1_700_000_000_000_000_000,
            block_start: 1_699_999_200_000_000_000,
            block_size: 3_600_000_000_000,
            index_id: 42,
        };

        let mut buf = Vec::new();
        header.write_to(&mut buf);

        let mut r = buf.as_slice();
        let parsed = LogFileHeader::read_from(&mut r).unwrap();
        assert_eq!(parsed, header);
        assert!(r.is_empty());
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let mut buf = Vec::new();
        LogFileHeader {
            creation_nanos: 0,
            block_start: 0,
            block_size: 1,
            index_id: 0,
        }
        .write_to(&mut buf);
        buf[0] = b'X';

        let err = LogFileHeader::read_from(&mut buf.as_slice()).unwrap_err();
        assert!(err.reason.contains("invalid magic"));
    }

    #[test]
    fn test_window_contains() {
        let header = LogFileHeader {
            creation_nanos: 0,
            block_start: 1000,
            block_size: 100,
            index_id: 0,
        };

        assert!(!header.window_contains(999));
        assert!(header.window_contains(1000));
        assert!(header.window_contains(1099));
        assert!(!header.window_contains(1100));
    }

    #[test]
    fn test_file_name_round_trip() {
        let name = file_name(1_699_999_200_000_000_000, 3);
        assert_eq!(name, "commitlog-1699999200000000000-3.db");
        assert_eq!(
            parse_file_name(&name),
            Some((1_699_999_200_000_000_000, 3))
        );

        // Negative block starts parse too
        let name = file_name(-3_600_000_000_000, 0);
        assert_eq!(parse_file_name(&name), Some((-3_600_000_000_000, 0)));

        assert_eq!(parse_file_name("segment_000001.dat"), None);
        assert_eq!(parse_file_name("commitlog-nonsense.db"), None);
    }

    #[test]
    fn test_next_file_index() {
        let dir = tempdir().unwrap();

        assert_eq!(next_file_index(dir.path(), 100).unwrap(), 0);

        std::fs::write(dir.path().join(file_name(100, 0)), b"").unwrap();
        std::fs::write(dir.path().join(file_name(100, 1)), b"").unwrap();
        std::fs::write(dir.path().join(file_name(200, 5)), b"").unwrap();

        assert_eq!(next_file_index(dir.path(), 100).unwrap(), 2);
        assert_eq!(next_file_index(dir.path(), 200).unwrap(), 6);
        assert_eq!(next_file_index(dir.path(), 300).unwrap(), 0);
    }

    #[test]
    fn test_list_log_files_sorted_by_creation() {
        let dir = tempdir().unwrap();

        for (creation, block_start, index) in [(300i64, 200i64, 0u32), (100, 0, 0), (200, 0, 1)] {
            let header = LogFileHeader {
                creation_nanos: creation,
                block_start,
                block_size: 200,
                index_id: creation as u64,
            };
            let mut buf = Vec::new();
            header.write_to(&mut buf);
            std::fs::write(dir.path().join(file_name(block_start, index)), &buf).unwrap();
        }

        // A file with garbage where the header should be
        std::fs::write(dir.path().join(file_name(999, 0)), b"not a header").unwrap();

        let (files, unreadable) = list_log_files(dir.path()).unwrap();
        let creations: Vec<i64> = files.iter().map(|f| f.header.creation_nanos).collect();
        assert_eq!(creations, vec![100, 200, 300]);
        assert_eq!(unreadable.len(), 1);
    }
}
