//! Index segments
//!
//! Bootstrap reassembles index state as lists of segments per block. A
//! segment is either mutable (open for writes during recovery) or
//! immutable (sealed, e.g. read back from disk). The two are one tagged
//! type so merge logic can match on the variant instead of downcasting.

use crate::bootstrap::error::BootstrapResult;
use std::sync::Arc;
use std::time::Duration;

/// An index segment open for writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutableSegment {
    docs: Vec<Vec<u8>>,
    size_bytes: u64,
}

impl MutableSegment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one indexed document (an encoded series key).
    pub fn insert(&mut self, doc: impl Into<Vec<u8>>) {
        let doc = doc.into();
        self.size_bytes += doc.len() as u64;
        self.docs.push(doc);
    }

    /// Number of documents held.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn size(&self) -> u64 {
        self.size_bytes
    }

    /// Seal into an immutable segment.
    pub fn seal(self) -> ImmutableSegment {
        ImmutableSegment {
            doc_count: self.docs.len(),
            size_bytes: self.size_bytes,
        }
    }
}

/// A sealed index segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImmutableSegment {
    doc_count: usize,
    size_bytes: u64,
}

impl ImmutableSegment {
    pub fn new(doc_count: usize, size_bytes: u64) -> Self {
        Self {
            doc_count,
            size_bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.doc_count
    }

    pub fn is_empty(&self) -> bool {
        self.doc_count == 0
    }

    pub fn size(&self) -> u64 {
        self.size_bytes
    }
}

/// A segment in either lifecycle state.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Mutable(MutableSegment),
    Immutable(ImmutableSegment),
}

impl Segment {
    pub fn is_mutable(&self) -> bool {
        matches!(self, Segment::Mutable(_))
    }

    pub fn size(&self) -> u64 {
        match self {
            Segment::Mutable(s) => s.size(),
            Segment::Immutable(s) => s.size(),
        }
    }
}

/// Produces a fresh writable segment when a block needs one.
pub type MutableSegmentAllocator =
    Arc<dyn Fn() -> BootstrapResult<MutableSegment> + Send + Sync>;

/// Default allocator: an empty in-memory mutable segment.
pub fn default_mutable_segment_allocator() -> MutableSegmentAllocator {
    Arc::new(|| Ok(MutableSegment::new()))
}

/// Options consumed by the bootstrap result accumulator.
#[derive(Clone)]
pub struct ResultOptions {
    pub allocator: MutableSegmentAllocator,
}

impl Default for ResultOptions {
    fn default() -> Self {
        Self {
            allocator: default_mutable_segment_allocator(),
        }
    }
}

impl std::fmt::Debug for ResultOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultOptions").finish_non_exhaustive()
    }
}

/// Namespace index options: how wide an index block is.
///
/// The index block size must be a positive integer multiple of the data
/// block size, so every data timestamp maps to exactly one index block.
#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
    pub block_size: Duration,
}

impl IndexOptions {
    pub fn new(block_size: Duration) -> Self {
        Self { block_size }
    }

    pub fn block_size_nanos(&self) -> i64 {
        self.block_size.as_nanos() as i64
    }
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            block_size: Duration::from_secs(3600),
        }
    }
}
