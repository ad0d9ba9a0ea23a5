//! Bootstrap error types

use thiserror::Error;

/// Errors surfaced by the bootstrap index accumulator.
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// `mark_fulfilled` received ranges crossing the aligned index block
    /// boundary. Fatal to the call, not to the accumulator.
    #[error("fulfilled ranges {summary} are outside of index block range [{block_start}, {block_end})")]
    RangeOutOfBlock {
        summary: String,
        block_start: i64,
        block_end: i64,
    },

    /// The injected mutable-segment allocator failed.
    #[error("mutable segment allocation failed: {0}")]
    SegmentAllocation(String),
}

/// Result type alias for bootstrap operations.
pub type BootstrapResult<T> = Result<T, BootstrapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BootstrapError::RangeOutOfBlock {
            summary: "{1: [[0, 10)]}".to_string(),
            block_start: 100,
            block_end: 200,
        };
        assert_eq!(
            err.to_string(),
            "fulfilled ranges {1: [[0, 10)]} are outside of index block range [100, 200)"
        );
    }
}
