//! Meridian commit log
//!
//! An append-only, time-bucketed, batched durable log of datapoint
//! writes. This is the durability contract of the database: what a
//! successful write guarantees to survive a crash.
//!
//! - **options**: construction-time configuration (strategy, block size,
//!   flush triggers, filesystem collaborators)
//! - **encoding**: length-prefixed, checksummed record codec with
//!   per-file series-identity compression
//! - **file**: file header, naming, and directory enumeration
//! - **writer**: active-file owner; encodes batches and rotates on block
//!   window boundaries
//! - **log**: the public `CommitLog` (open/write/write_batch/close) and
//!   its flush worker
//! - **iterator**: replay in creation order with file and series
//!   predicates
//! - **error**: error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   write() → [batch mutex: validate + enqueue] → flush worker
//!           → encode → rotate? → write + fsync
//!
//! Read Path:
//!   iterator → enumerate files → sort by creation → decode records
//!            → file/series predicates → entries
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use meridian::commitlog::{CommitLog, CommitLogOptions, Strategy};
//! use meridian::types::{Datapoint, TimeUnit, UniqueIndexRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let opts = CommitLogOptions::new("./commitlog").with_strategy(Strategy::WriteBehind);
//!     let log = CommitLog::new(opts);
//!     log.open().await?;
//!
//!     let registry = UniqueIndexRegistry::new();
//!     let series = registry.series(b"metrics".to_vec(), b"cpu.user".to_vec(), 0);
//!     log.write(
//!         series,
//!         Datapoint::new(1_700_000_000_000_000_000, 0.42),
//!         TimeUnit::Nanoseconds,
//!         vec![],
//!     )
//!     .await?;
//!
//!     log.close().await?;
//!     Ok(())
//! }
//! ```

pub mod encoding;
pub mod error;
pub mod file;
pub mod iterator;
pub mod log;
pub mod options;

mod writer;

pub use encoding::BufferPool;
pub use error::{CommitLogError, CommitLogResult};
pub use file::{LogFileHeader, LogFileInfo};
pub use iterator::{
    read_all_file_predicate, read_all_series_predicate, CommitLogIterator, CorruptionDiagnostic,
    FileFilterPredicate, IteratorOpts, SeriesFilterPredicate,
};
pub use log::CommitLog;
pub use options::{CommitLogOptions, FilesystemOptions, Strategy, SyncMode};
