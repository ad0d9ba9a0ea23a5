//! # Meridian
//!
//! Storage-node core for a distributed time-series database: the
//! write-ahead commit log that defines the durability contract of recent
//! writes, and the bootstrap index-results accumulator that reassembles
//! on-disk index state during recovery.
//!
//! ## Features
//!
//! - **Durable writes**: append-only, time-bucketed commit log with
//!   write-wait and write-behind strategies
//! - **High-throughput ingest**: concurrent writers converge on one
//!   batched flush path
//! - **Crash recovery**: checksummed records, corruption-tolerant replay
//!   in creation order with per-series ordering guarantees
//! - **Bootstrap composition**: merge algebra over index blocks and
//!   shard/time ranges for concurrent recovery workers
//!
//! ## Modules
//!
//! - [`commitlog`]: the commit log writer, flusher, rotator, and iterator
//! - [`bootstrap`]: the index results accumulator and its merge algebra
//! - [`time`]: time range and shard range arithmetic
//! - [`types`]: shared series/datapoint data model
//! - [`config`]: TOML + environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meridian::commitlog::{CommitLog, CommitLogOptions};
//! use meridian::types::{Datapoint, TimeUnit, UniqueIndexRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let log = CommitLog::new(CommitLogOptions::new("./commitlog"));
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

pub mod bootstrap;
pub mod commitlog;
pub mod config;
pub mod time;
pub mod types;

// Re-export top-level types for convenience
pub use commitlog::{
    CommitLog, CommitLogError, CommitLogIterator, CommitLogOptions, CommitLogResult,
    IteratorOpts, Strategy, SyncMode,
};

pub use bootstrap::{
    merged_index_bootstrap_result, BootstrapError, BootstrapResult, IndexBlock,
    IndexBootstrapResult, IndexOptions, IndexResults, MutableSegment, ResultOptions, Segment,
};

pub use time::{ShardTimeRanges, TimeRange, UnixNanos};

pub use types::{
    Annotation, Clock, CommitLogEntry, Datapoint, Series, SystemClock, TimeUnit,
    UniqueIndexRegistry,
};

pub use config::{Config, ConfigError, LoggingConfig};
