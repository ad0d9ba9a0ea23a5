//! Commit log error types

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the commit log write and read paths.
#[derive(Error, Debug)]
pub enum CommitLogError {
    /// Operation on a closed or not-yet-opened log.
    #[error("commit log is closed")]
    Closed,

    /// Redundant open.
    #[error("commit log is already open")]
    AlreadyOpen,

    /// A record could not be encoded.
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// Durable storage rejected a flush. Retryable; for write-behind
    /// callers this also surfaces on the async error channel.
    #[error("flush to stable storage failed: {0}")]
    FlushIo(String),

    /// The iterator observed a checksum or length mismatch. Non-fatal:
    /// the remainder of the affected file is skipped and iteration
    /// continues with the next file.
    #[error("corrupt record in {file}: {reason}")]
    Corrupt { file: String, reason: String },

    /// The write ended before the record was enqueued, or the log shut
    /// down before a write-wait caller observed its flush.
    #[error("write was cancelled before completion")]
    Cancelled,

    /// Open or close exceeded its configured total duration.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for commit log operations.
pub type CommitLogResult<T> = Result<T, CommitLogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CommitLogError::Closed;
        assert_eq!(err.to_string(), "commit log is closed");

        let err = CommitLogError::Corrupt {
            file: "commitlog-0-0.db".to_string(),
            reason: "checksum mismatch".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "corrupt record in commitlog-0-0.db: checksum mismatch"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: CommitLogError = io_err.into();
        assert!(matches!(err, CommitLogError::Io(_)));
    }
}
