//! Bitmap allocator for the data region
//!
//! One bit per block:
//! - 0 = free block
//! - 1 = occupied block
//!
//! Requests are served first-fit: block indices are scanned in increasing
//! order and the first run of enough consecutive free blocks wins. A single
//! occupied block breaks a run.

use crate::allocator::extent::Extent;
use crate::allocator::BlockAllocator;
use crate::error::{Result, VdiskError};

#[derive(Debug, Clone)]
pub struct BitmapAllocator {
    /// Bitmap words (each word = 64 bits = 64 blocks)
    bitmap: Vec<u64>,

    /// Block size in bytes
    block_size: u32,

    /// Total number of blocks tracked
    total_blocks: u64,

    /// Number of free blocks available
    free_blocks: u64,
}

impl BitmapAllocator {
    /// Create an allocator with every block free
    pub fn new(block_size: u32, total_blocks: u64) -> Self {
        let num_words = total_blocks.div_ceil(64) as usize;
        BitmapAllocator {
            bitmap: vec![0u64; num_words],
            block_size,
            total_blocks,
            free_blocks: total_blocks,
        }
    }

    /// Reserve `count` contiguous blocks, first-fit
    pub fn reserve_blocks(&mut self, count: u64) -> Result<Extent> {
        if count == 0 {
            return Ok(Extent::new(0, 0));
        }

        let requested = count * self.block_size as u64;
        let available = self.free_blocks * self.block_size as u64;

        if count > self.free_blocks {
            return Err(VdiskError::OutOfSpace {
                requested,
                available,
            });
        }

        let start = self.find_run(count).ok_or_else(|| {
            tracing::debug!(
                "No contiguous run of {} blocks ({} free, largest run {})",
                count,
                self.free_blocks,
                self.largest_free_run()
            );
            VdiskError::OutOfSpace {
                requested,
                available,
            }
        })?;

        let extent = Extent::new(start, count);
        self.set_range(extent);
        self.free_blocks -= count;

        Ok(extent)
    }

    /// Grow `extent` in place to `new_length` blocks
    ///
    /// Succeeds only when every block between the current end and the new end
    /// exists and is free. Returns the grown extent, or `None` with the bitmap
    /// untouched.
    pub fn try_extend(&mut self, extent: Extent, new_length: u64) -> Option<Extent> {
        if new_length <= extent.length {
            return Some(extent);
        }

        let tail = Extent::new(extent.end(), new_length - extent.length);
        if tail.end() > self.total_blocks {
            return None;
        }

        if (tail.start..tail.end()).any(|block| self.is_occupied(block)) {
            return None;
        }

        self.set_range(tail);
        self.free_blocks -= tail.length;

        Some(Extent::new(extent.start, new_length))
    }

    /// Mark an extent occupied while rebuilding from a persisted catalog
    pub fn mark_occupied(&mut self, extent: Extent) -> Result<()> {
        if extent.end() > self.total_blocks {
            return Err(VdiskError::Corruption(format!(
                "extent {}..{} beyond {} data blocks",
                extent.start,
                extent.end(),
                self.total_blocks
            )));
        }

        if let Some(block) = (extent.start..extent.end()).find(|&b| self.is_occupied(b)) {
            return Err(VdiskError::Corruption(format!(
                "block {} claimed by two extents",
                block
            )));
        }

        self.set_range(extent);
        self.free_blocks -= extent.length;

        Ok(())
    }

    /// Check if a specific block is occupied
    pub fn is_occupied(&self, block: u64) -> bool {
        if block >= self.total_blocks {
            return false;
        }

        let word_idx = (block / 64) as usize;
        let bit_idx = block % 64;

        (self.bitmap[word_idx] & (1u64 << bit_idx)) != 0
    }

    /// Count set bits directly from the bitmap
    pub fn count_occupied(&self) -> u64 {
        self.bitmap.iter().map(|w| w.count_ones() as u64).sum()
    }

    /// First block of the first free run of `count` blocks
    fn find_run(&self, count: u64) -> Option<u64> {
        let mut run_start = 0u64;
        let mut run_len = 0u64;
        let mut block = 0u64;

        while block < self.total_blocks {
            // Whole-word fast paths
            if block % 64 == 0 && block + 64 <= self.total_blocks {
                let word = self.bitmap[(block / 64) as usize];
                if word == u64::MAX {
                    run_len = 0;
                    block += 64;
                    continue;
                }
                if word == 0 {
                    if run_len == 0 {
                        run_start = block;
                    }
                    run_len += 64;
                    if run_len >= count {
                        return Some(run_start);
                    }
                    block += 64;
                    continue;
                }
            }

            if self.is_occupied(block) {
                run_len = 0;
            } else {
                if run_len == 0 {
                    run_start = block;
                }
                run_len += 1;
                if run_len >= count {
                    return Some(run_start);
                }
            }
            block += 1;
        }

        None
    }

    fn set_range(&mut self, extent: Extent) {
        for block in extent.start..extent.end() {
            self.bitmap[(block / 64) as usize] |= 1u64 << (block % 64);
        }
    }
}

impl BlockAllocator for BitmapAllocator {
    fn reserve(&mut self, byte_len: u64) -> Result<Extent> {
        self.reserve_blocks(Extent::blocks_for(byte_len, self.block_size))
    }

    fn release(&mut self, extent: Extent) {
        let mut freed = 0u64;

        for block in extent.start..extent.end().min(self.total_blocks) {
            let word_idx = (block / 64) as usize;
            let mask = 1u64 << (block % 64);

            if self.bitmap[word_idx] & mask == 0 {
                // Already free - this is a double-free bug in the caller
                tracing::warn!("Double-free detected for block {}", block);
                continue;
            }

            self.bitmap[word_idx] &= !mask;
            freed += 1;
        }

        self.free_blocks += freed;
    }

    fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    fn free_block_count(&self) -> u64 {
        self.free_blocks
    }

    fn largest_free_run(&self) -> u64 {
        let mut best = 0u64;
        let mut current = 0u64;

        for block in 0..self.total_blocks {
            if self.is_occupied(block) {
                current = 0;
            } else {
                current += 1;
                best = best.max(current);
            }
        }

        best
    }
}
