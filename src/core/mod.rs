//! Virtual disk core
//!
//! - [`io`] - Backing store trait, file-backed and in-memory stores
//! - [`header`] - Superblock and region layout
//! - [`allocator`] - Bitmap first-fit allocation of contiguous extents
//! - [`catalog`] - Flat name -> extent catalog
//! - [`sort`] - Bounded-memory in-memory / external merge sort
//! - [`engine`] - The storage engine tying them together
//! - [`shell`] - Command parsing and rendering for the interactive front end

pub mod allocator;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod header;
pub mod io;
pub mod shell;
pub mod sort;
pub mod validation;

pub use allocator::{bitmap::BitmapAllocator, extent::Extent, BlockAllocator};
pub use catalog::{FileCatalog, FileEntry};
pub use config::EngineConfig;
pub use engine::{EngineStats, FileInfo, Listing, StorageEngine};
pub use error::{Result, VdiskError};
pub use header::{Layout, Superblock};
pub use io::{BackingStore, DiskStore, MemoryStore};
pub use sort::{BoundedSorter, SortReport, SortStrategy};
