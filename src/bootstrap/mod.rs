//! Bootstrap index results
//!
//! Recovery reassembles on-disk index state into an in-memory accumulator
//! keyed by index block start: one or more segments per block plus the
//! shard/time ranges already fulfilled. Concurrent workers each build
//! their own result over a disjoint shard range; results merge at
//! worker-join points under single-threaded control, which is why nothing
//! here takes a lock.
//!
//! - **segment**: mutable/immutable index segments and the allocator hook
//! - **result**: the `IndexResults` accumulator and its merge algebra
//! - **error**: error types

pub mod error;
pub mod result;
pub mod segment;

pub use error::{BootstrapError, BootstrapResult};
pub use result::{
    merged_index_bootstrap_result, IndexBlock, IndexBootstrapResult, IndexResults,
};
pub use segment::{
    default_mutable_segment_allocator, ImmutableSegment, IndexOptions, MutableSegment,
    MutableSegmentAllocator, ResultOptions, Segment,
};
