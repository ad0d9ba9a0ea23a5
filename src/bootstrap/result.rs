//! Bootstrap index results accumulator
//!
//! During recovery each worker owns a disjoint shard range and builds its
//! own result; results are folded together at worker-join points. The
//! accumulator is therefore deliberately not thread-safe: callers
//! serialize access or shard by block start.

use crate::bootstrap::error::{BootstrapError, BootstrapResult};
use crate::bootstrap::segment::{IndexOptions, MutableSegment, ResultOptions, Segment};
use crate::time::{truncate_to_block, ShardTimeRanges, UnixNanos};
use std::collections::BTreeMap;

/// One index block's worth of reassembled state: the segments recovered
/// for the block and the shard/time ranges they fulfill.
#[derive(Debug, Clone, Default)]
pub struct IndexBlock {
    block_start: UnixNanos,
    segments: Vec<Segment>,
    fulfilled: ShardTimeRanges,
}

impl IndexBlock {
    pub fn new(
        block_start: UnixNanos,
        segments: Vec<Segment>,
        fulfilled: ShardTimeRanges,
    ) -> Self {
        Self {
            block_start,
            segments,
            fulfilled,
        }
    }

    pub fn block_start(&self) -> UnixNanos {
        self.block_start
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn fulfilled(&self) -> &ShardTimeRanges {
        &self.fulfilled
    }

    /// Merge another block into this one: segments append in order
    /// (duplicates are the caller's concern to consolidate downstream),
    /// fulfilled ranges union. Both blocks must share a block start.
    pub fn merged(mut self, other: IndexBlock) -> IndexBlock {
        debug_assert_eq!(
            self.block_start, other.block_start,
            "merged blocks must share a block start"
        );
        self.segments.extend(other.segments);
        self.fulfilled.add_ranges(&other.fulfilled);
        self
    }
}

/// Accumulated index blocks keyed by aligned block start.
#[derive(Debug, Default)]
pub struct IndexResults {
    blocks: BTreeMap<UnixNanos, IndexBlock>,
    /// Count of merges that left more than one segment in a block.
    /// Multiple segments per block are legal; downstream consolidation
    /// owns collapsing them, this just makes the volume observable.
    multi_segment_merges: u64,
}

impl IndexResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a block into the entry at its block start, creating the
    /// entry if absent. Blocks with a zero block start are dropped.
    pub fn add(&mut self, block: IndexBlock) {
        if block.block_start == 0 {
            return;
        }
        // An empty block is indistinguishable from absence
        if block.segments.is_empty() && block.fulfilled.is_empty() {
            return;
        }

        let block_start = block.block_start;
        let merged = match self.blocks.remove(&block_start) {
            None => block,
            Some(existing) => existing.merged(block),
        };
        if merged.segments.len() > 1 {
            self.multi_segment_merges += 1;
            tracing::debug!(
                "index block {} holds {} segments after merge",
                block_start,
                merged.segments.len()
            );
        }
        self.blocks.insert(block_start, merged);
    }

    /// Merge every block of another result set into this one.
    pub fn add_results(&mut self, other: IndexResults) {
        self.multi_segment_merges += other.multi_segment_merges;
        for (_, block) in other.blocks {
            self.add(block);
        }
    }

    /// Return the block's first mutable segment, allocating and appending
    /// a fresh one (preserving existing immutable segments) if the block
    /// has none.
    ///
    /// Alignment by the index block size guarantees one entry per input
    /// instant: index blocks are a positive multiple of the data block
    /// size, so a data timestamp maps to exactly one index block.
    pub fn get_or_add_segment(
        &mut self,
        t: UnixNanos,
        idx_opts: &IndexOptions,
        opts: &ResultOptions,
    ) -> BootstrapResult<&mut MutableSegment> {
        let block_start = truncate_to_block(t, idx_opts.block_size_nanos());
        let block = self
            .blocks
            .entry(block_start)
            .or_insert_with(|| IndexBlock::new(block_start, Vec::new(), ShardTimeRanges::new()));

        let pos = match block.segments.iter().position(Segment::is_mutable) {
            Some(pos) => pos,
            None => {
                if !block.segments.is_empty() {
                    tracing::debug!(
                        "index block {} has only immutable segments, allocating a mutable one",
                        block_start
                    );
                }
                let segment = (opts.allocator)()?;
                block.segments.push(Segment::Mutable(segment));
                block.segments.len() - 1
            }
        };

        match block.segments.get_mut(pos) {
            Some(Segment::Mutable(segment)) => Ok(segment),
            _ => Err(BootstrapError::SegmentAllocation(
                "mutable segment position no longer valid".to_string(),
            )),
        }
    }

    /// Mark part of an index block as fulfilled. The fulfilled ranges
    /// must lie within the aligned block's window.
    pub fn mark_fulfilled(
        &mut self,
        t: UnixNanos,
        fulfilled: ShardTimeRanges,
        idx_opts: &IndexOptions,
    ) -> BootstrapResult<()> {
        let block_size = idx_opts.block_size_nanos();
        let block_start = truncate_to_block(t, block_size);
        let block_end = block_start + block_size;

        let Some((min, max)) = fulfilled.min_max() else {
            return Ok(());
        };
        if min < block_start || max > block_end {
            return Err(BootstrapError::RangeOutOfBlock {
                summary: fulfilled.summary_string(),
                block_start,
                block_end,
            });
        }

        self.blocks
            .entry(block_start)
            .or_insert_with(|| IndexBlock::new(block_start, Vec::new(), ShardTimeRanges::new()))
            .fulfilled
            .add_ranges(&fulfilled);
        Ok(())
    }

    pub fn get(&self, block_start: UnixNanos) -> Option<&IndexBlock> {
        self.blocks.get(&block_start)
    }

    pub fn iter(&self) -> impl Iterator<Item = (UnixNanos, &IndexBlock)> {
        self.blocks.iter().map(|(&start, block)| (start, block))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total segments across all blocks.
    pub fn total_segments(&self) -> usize {
        self.blocks.values().map(|b| b.segments.len()).sum()
    }

    /// Metric: merges that left a block with more than one segment.
    pub fn multi_segment_merges(&self) -> u64 {
        self.multi_segment_merges
    }
}

/// The result a bootstrap pass hands back for the index: accumulated
/// blocks plus the shard/time ranges still unfulfilled.
#[derive(Debug, Default)]
pub struct IndexBootstrapResult {
    results: IndexResults,
    unfulfilled: ShardTimeRanges,
}

impl IndexBootstrapResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index_results(&self) -> &IndexResults {
        &self.results
    }

    pub fn index_results_mut(&mut self) -> &mut IndexResults {
        &mut self.results
    }

    pub fn unfulfilled(&self) -> &ShardTimeRanges {
        &self.unfulfilled
    }

    pub fn set_unfulfilled(&mut self, unfulfilled: ShardTimeRanges) {
        self.unfulfilled = unfulfilled;
    }

    /// Add a block and fold its unfulfilled remainder in.
    pub fn add(&mut self, block: IndexBlock, unfulfilled: &ShardTimeRanges) {
        self.results.add(block);
        self.unfulfilled.add_ranges(unfulfilled);
    }
}

/// Merge two bootstrap results, folding the smaller (by total segment
/// count) into the larger to minimize per-segment move cost. Ties favor
/// the left operand; an absent operand yields the other.
pub fn merged_index_bootstrap_result(
    i: Option<IndexBootstrapResult>,
    j: Option<IndexBootstrapResult>,
) -> Option<IndexBootstrapResult> {
    match (i, j) {
        (None, j) => j,
        (i, None) => i,
        (Some(mut i), Some(mut j)) => {
            if i.results.total_segments() >= j.results.total_segments() {
                i.results.add_results(std::mem::take(&mut j.results));
                i.unfulfilled.add_ranges(&j.unfulfilled);
                Some(i)
            } else {
                j.results.add_results(std::mem::take(&mut i.results));
                j.unfulfilled.add_ranges(&i.unfulfilled);
                Some(j)
            }
        }
    }
}
