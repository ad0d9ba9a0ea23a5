//! Per-shard sets of disjoint time ranges
//!
//! Bootstrap workers track which (shard, interval) pairs they have
//! recovered with this structure; the commit log iterator's callers use it
//! to express what remains unfulfilled.

use super::{TimeRange, UnixNanos};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// A mapping from shard number to a set of disjoint half-open time ranges.
///
/// Invariant: after any operation, each shard's ranges are disjoint,
/// non-adjacent, and sorted by ascending start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardTimeRanges {
    shards: BTreeMap<u32, Vec<TimeRange>>,
}

impl ShardTimeRanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single range for a shard, coalescing with any ranges it
    /// overlaps or adjoins.
    pub fn add_range(&mut self, shard: u32, range: TimeRange) {
        let ranges = self.shards.entry(shard).or_default();

        let mut merged = range;
        let mut out = Vec::with_capacity(ranges.len() + 1);
        let mut placed = false;

        for existing in ranges.drain(..) {
            if existing.adjoins(&merged) {
                merged = merged.merge(&existing);
            } else if existing.start > merged.end {
                if !placed {
                    out.push(merged);
                    placed = true;
                }
                out.push(existing);
            } else {
                out.push(existing);
            }
        }
        if !placed {
            out.push(merged);
        }

        *ranges = out;
    }

    /// Union another set of ranges into this one, per shard.
    pub fn add_ranges(&mut self, other: &ShardTimeRanges) {
        for (&shard, ranges) in &other.shards {
            for &range in ranges {
                self.add_range(shard, range);
            }
        }
    }

    /// Earliest start and latest end across all shards.
    ///
    /// Returns None iff the structure is empty.
    pub fn min_max(&self) -> Option<(UnixNanos, UnixNanos)> {
        let mut result: Option<(UnixNanos, UnixNanos)> = None;
        for ranges in self.shards.values() {
            // Ranges are sorted, so only the ends matter
            let (Some(first), Some(last)) = (ranges.first(), ranges.last()) else {
                continue;
            };
            result = Some(match result {
                None => (first.start, last.end),
                Some((min, max)) => (min.min(first.start), max.max(last.end)),
            });
        }
        result
    }

    /// True iff no shard has any range.
    pub fn is_empty(&self) -> bool {
        self.shards.values().all(|ranges| ranges.is_empty())
    }

    /// Number of shards with at least one range.
    pub fn shard_count(&self) -> usize {
        self.shards
            .values()
            .filter(|ranges| !ranges.is_empty())
            .count()
    }

    /// Ranges for a single shard, if any.
    pub fn get(&self, shard: u32) -> Option<&[TimeRange]> {
        self.shards.get(&shard).map(|ranges| ranges.as_slice())
    }

    /// Iterate (shard, ranges) in ascending shard order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[TimeRange])> {
        self.shards
            .iter()
            .map(|(&shard, ranges)| (shard, ranges.as_slice()))
    }

    /// Stable, human-readable summary used in error messages.
    pub fn summary_string(&self) -> String {
        let mut out = String::from("{");
        let mut first = true;
        for (shard, ranges) in self.iter() {
            if ranges.is_empty() {
                continue;
            }
            if !first {
                out.push_str(", ");
            }
            first = false;
            let _ = write!(out, "{}: [", shard);
            for (i, range) in ranges.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{}", range);
            }
            out.push(']');
        }
        out.push('}');
        out
    }
}
