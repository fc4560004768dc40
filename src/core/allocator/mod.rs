//! Block allocation for the data region
//!
//! Every file occupies exactly one contiguous [`Extent`]. The bitmap
//! allocator finds runs first-fit and never splits a request across
//! several runs; fragmentation surfaces as `OutOfSpace`.

pub mod bitmap;
pub mod extent;

use crate::error::Result;
use extent::Extent;

/// Block allocator trait
///
/// Defines the interface for reserving and releasing contiguous runs of
/// blocks in the data region.
pub trait BlockAllocator {
    /// Reserve one contiguous run large enough for `byte_len` bytes
    fn reserve(&mut self, byte_len: u64) -> Result<Extent>;

    /// Release a previously reserved run
    fn release(&mut self, extent: Extent);

    /// Get total number of blocks managed
    fn total_blocks(&self) -> u64;

    /// Get number of free blocks available
    fn free_block_count(&self) -> u64;

    /// Get number of occupied blocks
    fn occupied_block_count(&self) -> u64 {
        self.total_blocks() - self.free_block_count()
    }

    /// Length of the longest free run, in blocks
    fn largest_free_run(&self) -> u64;

    /// Calculate fragmentation score (0.0 = all free space contiguous)
    fn fragmentation_score(&self) -> f64 {
        let free = self.free_block_count();
        if free == 0 {
            return 0.0;
        }
        1.0 - self.largest_free_run() as f64 / free as f64
    }
}
