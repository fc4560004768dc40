//! File entry stored in the catalog

use crate::allocator::extent::Extent;
use serde::{Deserialize, Serialize};

/// Size of one stored element (a 32-bit integer)
pub const ELEMENT_SIZE: u64 = 4;

/// A named file: its logical size and the extent holding its data
///
/// `size` is always a multiple of [`ELEMENT_SIZE`] and the extent is the
/// smallest run of blocks that fits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Unique file name
    pub name: String,

    /// File size in bytes
    pub size: u64,

    /// Blocks in the data region holding the content
    pub extent: Extent,

    /// Creation timestamp (Unix epoch seconds)
    pub created_at: u64,

    /// Last modified timestamp (Unix epoch seconds)
    pub modified_at: u64,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, size: u64, extent: Extent) -> Self {
        let now = unix_now();
        FileEntry {
            name: name.into(),
            size,
            extent,
            created_at: now,
            modified_at: now,
        }
    }

    /// Number of 32-bit integers in the file
    pub fn element_count(&self) -> u64 {
        self.size / ELEMENT_SIZE
    }

    /// Update the modification timestamp
    pub fn touch(&mut self) {
        self.modified_at = unix_now();
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
