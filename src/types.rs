/*!
 * Allocator Types
 * Common types for region allocation
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Address type naming the start of a region in a logical address space
pub type Address = usize;

/// Size type for region allocation
pub type Size = usize;

/// Allocation operation result
pub type AllocResult<T> = Result<T, AllocError>;

/// Allocation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("invalid address: 0x{0:x}")]
    InvalidAddress(Address),

    #[error("size mismatch: requested {requested} bytes, block size is {block_size} bytes")]
    SizeMismatch { requested: Size, block_size: Size },

    #[error("growth must increase capacity: new {new_capacity} <= old {old_capacity}")]
    InvalidGrowth {
        old_capacity: Size,
        new_capacity: Size,
    },

    #[error("{0} does not support content-preserving realloc")]
    UnsupportedRealloc(&'static str),

    #[error("allocator has been closed")]
    Closed,

    #[error("allocation of {0} bytes cannot be satisfied")]
    Exhausted(Size),
}

/// Immutable allocator state snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocStats {
    /// Number of backing heap regions currently held
    pub heap_regions: usize,
    /// Number of live allocations
    pub allocations: usize,
    /// Bytes handed out to live allocations
    pub allocated_space: Size,
    /// Total bytes of backing capacity
    pub total_space: Size,
}

impl AllocStats {
    /// Bytes of backing capacity not handed out to allocations
    pub fn free_space(&self) -> Size {
        self.total_space.saturating_sub(self.allocated_space)
    }

    /// Allocated fraction of the backing capacity, in percent
    pub fn usage_percentage(&self) -> f64 {
        if self.total_space == 0 {
            0.0
        } else {
            self.allocated_space as f64 / self.total_space as f64 * 100.0
        }
    }
}
