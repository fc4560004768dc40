//! Contiguous block runs

use serde::{Deserialize, Serialize};

/// An extent representing a contiguous range of blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extent {
    /// Starting block index
    pub start: u64,
    /// Number of contiguous blocks
    pub length: u64,
}

impl Extent {
    pub fn new(start: u64, length: u64) -> Self {
        Extent { start, length }
    }

    /// One past the last block
    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    /// Blocks needed to hold `byte_len` bytes
    pub fn blocks_for(byte_len: u64, block_size: u32) -> u64 {
        byte_len.div_ceil(block_size as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_end() {
        assert_eq!(Extent::new(10, 20).end(), 30);
        assert_eq!(Extent::new(7, 0).end(), 7);
    }

    #[test]
    fn test_blocks_for() {
        assert_eq!(Extent::blocks_for(0, 4096), 0);
        assert_eq!(Extent::blocks_for(1, 4096), 1);
        assert_eq!(Extent::blocks_for(4096, 4096), 1);
        assert_eq!(Extent::blocks_for(4097, 4096), 2);
    }
}
