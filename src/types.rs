//! Core data types shared by the commit log and bootstrap subsystems
//!
//! This module defines the data model the rest of the crate is built on:
//! - `Series`: identity of a time-series stream (namespace, id, shard)
//! - `Datapoint`: a single (timestamp, value) measurement
//! - `TimeUnit`: the resolution a caller recorded a datapoint at
//! - `CommitLogEntry`: one logged write, as accepted and as replayed
//! - `UniqueIndexRegistry`: dense integer aliases for series identities
//! - `Clock`: injectable time source

use chrono::Utc;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

/// Identity of a single time-series stream.
///
/// Two series are equal iff their namespace and id bytes compare equal.
/// The shard and unique-index are cached denormalizations: the shard is
/// assigned by placement, the unique-index by a [`UniqueIndexRegistry`],
/// and neither participates in equality.
#[derive(Debug, Clone)]
pub struct Series {
    /// Namespace the series belongs to.
    pub namespace: Vec<u8>,
    /// Series identifier, unique within its namespace.
    pub id: Vec<u8>,
    /// Shard the series is assigned to.
    pub shard: u32,
    /// Dense integer alias for (namespace, id), used for log compression.
    pub unique_index: u64,
}

impl Series {
    pub fn new(
        namespace: impl Into<Vec<u8>>,
        id: impl Into<Vec<u8>>,
        shard: u32,
        unique_index: u64,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
            shard,
            unique_index,
        }
    }
}

impl PartialEq for Series {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.id == other.id
    }
}

impl Eq for Series {}

impl Hash for Series {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.id.hash(state);
    }
}

/// A single time-series measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Datapoint {
    /// Unix timestamp in nanoseconds.
    pub timestamp_nanos: i64,
    /// The measured value.
    pub value: f64,
}

impl Datapoint {
    pub fn new(timestamp_nanos: i64, value: f64) -> Self {
        Self {
            timestamp_nanos,
            value,
        }
    }
}

/// Resolution a datapoint was recorded at.
///
/// Stored as a single byte on the log; the numeric codes are part of the
/// file format and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TimeUnit {
    #[default]
    None = 0,
    Nanoseconds = 1,
    Microseconds = 2,
    Milliseconds = 3,
    Seconds = 4,
    Minutes = 5,
    Hours = 6,
    Days = 7,
    Years = 8,
}

impl TryFrom<u8> for TimeUnit {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TimeUnit::None),
            1 => Ok(TimeUnit::Nanoseconds),
            2 => Ok(TimeUnit::Microseconds),
            3 => Ok(TimeUnit::Milliseconds),
            4 => Ok(TimeUnit::Seconds),
            5 => Ok(TimeUnit::Minutes),
            6 => Ok(TimeUnit::Hours),
            7 => Ok(TimeUnit::Days),
            8 => Ok(TimeUnit::Years),
            other => Err(other),
        }
    }
}

/// Opaque per-write annotation bytes; may be empty.
pub type Annotation = Vec<u8>;

/// One logged write: what `write` accepts and what the iterator replays.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitLogEntry {
    pub series: Arc<Series>,
    pub datapoint: Datapoint,
    pub unit: TimeUnit,
    pub annotation: Annotation,
}

impl CommitLogEntry {
    pub fn new(
        series: Series,
        datapoint: Datapoint,
        unit: TimeUnit,
        annotation: Annotation,
    ) -> Self {
        Self {
            series: Arc::new(series),
            datapoint,
            unit,
            annotation,
        }
    }
}

/// Assigns dense `u64` unique-indexes to (namespace, id) pairs.
///
/// Assignment is deterministic for the lifetime of the registry: repeated
/// lookups of the same pair return the same value. The registry is injected
/// wherever unique-indexes are needed rather than kept as process-global
/// state, so tests and independent log instances stay isolated.
#[derive(Debug, Default)]
pub struct UniqueIndexRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    next: u64,
    assigned: HashMap<(Vec<u8>, Vec<u8>), u64>,
}

impl UniqueIndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or assign the unique-index for (namespace, id).
    pub fn resolve(&self, namespace: &[u8], id: &[u8]) -> u64 {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(&idx) = inner.assigned.get(&(namespace.to_vec(), id.to_vec())) {
            return idx;
        }
        let idx = inner.next;
        inner.next += 1;
        inner.assigned.insert((namespace.to_vec(), id.to_vec()), idx);
        idx
    }

    /// Convenience: build a `Series` with its unique-index resolved.
    pub fn series(
        &self,
        namespace: impl Into<Vec<u8>>,
        id: impl Into<Vec<u8>>,
        shard: u32,
    ) -> Series {
        let namespace = namespace.into();
        let id = id.into();
        let unique_index = self.resolve(&namespace, &id);
        Series {
            namespace,
            id,
            shard,
            unique_index,
        }
    }
}

/// Source of the current instant, injectable for tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current Unix time in nanoseconds.
    fn now_nanos(&self) -> i64;
}

/// Wall clock backed by chrono.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_nanos(&self) -> i64 {
        // timestamp_nanos_opt is None past the year 2262; saturate there.
        Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
    }
}
