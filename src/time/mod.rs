//! Time and range utilities
//!
//! Shared by the commit log (file windows) and bootstrap (fulfilled ranges):
//!
//! - **range**: half-open nanosecond intervals
//! - **shard_ranges**: per-shard sets of disjoint intervals
//!
//! All instants in this crate are `i64` Unix nanoseconds.

mod range;
mod shard_ranges;

pub use range::TimeRange;
pub use shard_ranges::ShardTimeRanges;

/// Unix timestamp in nanoseconds.
pub type UnixNanos = i64;

/// Align a timestamp down to the start of its containing block.
///
/// Blocks are aligned to absolute time, so alignment is a floor division;
/// `rem_euclid` keeps it correct for pre-epoch timestamps.
pub fn truncate_to_block(timestamp: UnixNanos, block_size: UnixNanos) -> UnixNanos {
    debug_assert!(block_size > 0, "block size must be positive");
    timestamp - timestamp.rem_euclid(block_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_to_block() {
        let hour = 3_600_000_000_000i64;

        assert_eq!(truncate_to_block(0, hour), 0);
        assert_eq!(truncate_to_block(1, hour), 0);
        assert_eq!(truncate_to_block(hour - 1, hour), 0);
        assert_eq!(truncate_to_block(hour, hour), hour);
        assert_eq!(truncate_to_block(hour + 1, hour), hour);
        assert_eq!(truncate_to_block(3 * hour + 17, hour), 3 * hour);
    }

    #[test]
    fn test_truncate_to_block_negative() {
        let hour = 3_600_000_000_000i64;

        assert_eq!(truncate_to_block(-1, hour), -hour);
        assert_eq!(truncate_to_block(-hour, hour), -hour);
        assert_eq!(truncate_to_block(-hour - 1, hour), -2 * hour);
    }
}
