//! # vdisk - Integer File Store on a Virtual Disk
//!
//! `vdisk-rs` emulates a single-volume file store inside one fixed-size
//! backing file. Files live in a flat namespace and hold arrays of 32-bit
//! integers. Supported operations:
//!
//! - **create** a file of pseudo-random integers
//! - **delete**, **list** and **read** a sub-range
//! - **concatenate** two files into the first
//! - **sort** a file in place, spilling to a swap region when it exceeds
//!   the memory budget
//!
//! Each file occupies one contiguous extent, found first-fit in a block
//! bitmap. The catalog is persisted in a reserved region after the
//! superblock, so files survive restarts.
//!
//! ## Quick Start
//!
//! ```rust
//! use vdisk_rs::{EngineConfig, MemoryStore, StorageEngine, Result};
//!
//! # fn main() -> Result<()> {
//! let config = EngineConfig::small();
//! let store = MemoryStore::new(config.capacity_bytes);
//! let mut engine = StorageEngine::with_store(store, config)?;
//!
//! engine.create_with_values("a", &[3, 1, 2])?;
//! engine.create_with_values("b", &[0])?;
//! engine.concatenate("a", "b")?;
//! engine.sort("a")?;
//!
//! assert_eq!(engine.read_range("a", 0, 3)?, vec![0, 1, 2, 3]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Disk-backed
//!
//! ```rust,no_run
//! use vdisk_rs::{EngineConfig, StorageEngine};
//!
//! # fn main() -> vdisk_rs::Result<()> {
//! // Creates a 1 GiB "disco_virtual.bin" on first use
//! let mut engine = StorageEngine::open(EngineConfig::default())?;
//! engine.create("numbers", 1_000_000)?;
//! engine.sort("numbers")?;
//! engine.close()?;
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use crate::core::{
    allocator, catalog, config, engine, error, header, io, shell, sort, validation,
};

pub use crate::core::{
    BackingStore, BitmapAllocator, BlockAllocator, BoundedSorter, DiskStore, EngineConfig,
    EngineStats, Extent, FileCatalog, FileEntry, FileInfo, Layout, Listing, MemoryStore, Result,
    SortReport, SortStrategy, StorageEngine, Superblock, VdiskError,
};
