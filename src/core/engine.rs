//! Storage engine
//!
//! Ties the backing store, the data-region allocator and the file catalog
//! together. Every public operation validates its arguments first and leaves
//! the allocator and catalog exactly as they were when it fails.

use crate::allocator::bitmap::BitmapAllocator;
use crate::allocator::extent::Extent;
use crate::allocator::BlockAllocator;
use crate::catalog::{FileCatalog, FileEntry, ELEMENT_SIZE};
use crate::config::EngineConfig;
use crate::error::{Result, VdiskError};
use crate::header::{Layout, Superblock};
use crate::io::{BackingStore, DiskStore};
use crate::sort::{self, BoundedSorter, SortReport};
use crate::validation::FileName;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Integers generated and written per batch by `create`
const GENERATE_BATCH: usize = 16 * 1024;

/// One row of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub elements: u64,
    pub modified_at: u64,
}

/// Result of [`StorageEngine::list`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub files: Vec<FileInfo>,

    /// Bytes files can occupy
    pub total_capacity: u64,

    /// Sum of logical file sizes
    pub used_bytes: u64,

    /// `total_capacity - used_bytes`, not block-rounded
    pub free_bytes: u64,

    /// Bytes in free blocks according to the allocator
    pub physical_free_bytes: u64,
}

/// Engine statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineStats {
    pub total_blocks: u64,
    pub free_blocks: u64,
    pub occupied_blocks: u64,
    pub largest_free_run: u64,
    pub fragmentation: f64,
    pub file_count: usize,
    pub sort_budget_bytes: u64,
    pub swap_bytes: u64,
}

/// Where a concatenated file ends up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// `first` grew into the free blocks after it
    InPlace,
    /// Both files copied to a fresh extent
    Relocated,
    /// Both files staged through swap into blocks that may include their own
    Staged,
}

/// Flat integer-file store inside a single backing store
pub struct StorageEngine<S: BackingStore = DiskStore> {
    store: S,
    allocator: BitmapAllocator,
    catalog: FileCatalog,
    config: EngineConfig,
    layout: Layout,
    superblock: Superblock,
    rng: StdRng,
}

impl StorageEngine<DiskStore> {
    /// Open the backing file named by `config.disk_path`, creating it if needed
    pub fn open(config: EngineConfig) -> Result<Self> {
        let layout = Layout::compute(&config)?;
        let store = DiskStore::open_or_create(&config.disk_path, layout.capacity())?;
        Self::with_store(store, config)
    }
}

impl<S: BackingStore> StorageEngine<S> {
    /// Build an engine over an already opened store
    ///
    /// A store without a superblock is formatted. When `persist_metadata` is
    /// set, an existing catalog is loaded and the bitmap rebuilt from it;
    /// otherwise the engine starts empty.
    pub fn with_store(mut store: S, config: EngineConfig) -> Result<Self> {
        let layout = Layout::compute(&config)?;

        if store.capacity() != layout.capacity() {
            return Err(VdiskError::CapacityMismatch {
                expected: layout.capacity(),
                actual: store.capacity(),
            });
        }

        let block0 = store.read(0, layout.block_size as usize)?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut engine = StorageEngine {
            store,
            allocator: BitmapAllocator::new(layout.block_size, layout.data_blocks),
            catalog: FileCatalog::new(config.max_files),
            superblock: Superblock::new(&layout),
            config,
            layout,
            rng,
        };

        if !Superblock::has_magic(&block0) {
            tracing::warn!("Backing store has no superblock, formatting");
            engine.write_metadata()?;
        } else if engine.config.persist_metadata {
            engine.load(&block0)?;
        } else {
            tracing::info!("Metadata persistence disabled, starting with an empty catalog");
            engine.write_metadata()?;
        }

        Ok(engine)
    }

    /// Create `count` pseudo-random integers under `name`
    pub fn create(&mut self, name: &str, count: i64) -> Result<()> {
        let count = Self::check_count(count)?;
        let extent = self.prepare(name, count)?;

        if let Err(e) = self.write_random(self.extent_offset(extent), count) {
            self.allocator.release(extent);
            return Err(e);
        }

        self.register(name, count * ELEMENT_SIZE, extent)
    }

    /// Create a file holding exactly `values`
    pub fn create_with_values(&mut self, name: &str, values: &[i32]) -> Result<()> {
        let count = Self::check_count(values.len() as i64)?;
        let extent = self.prepare(name, count)?;
        let offset = self.extent_offset(extent);

        if let Err(e) = sort::write_ints(&mut self.store, offset, values) {
            self.allocator.release(extent);
            return Err(e);
        }

        self.register(name, count * ELEMENT_SIZE, extent)
    }

    /// Remove a file, zeroing its bytes and releasing its blocks
    pub fn delete(&mut self, name: &str) -> Result<()> {
        let entry = self.catalog.find(name)?.clone();

        self.store.zero(self.extent_offset(entry.extent), entry.size)?;
        self.catalog.remove(name)?;
        self.allocator.release(entry.extent);
        self.persist_committed("delete");

        tracing::info!("Deleted '{}' ({} bytes)", name, entry.size);

        Ok(())
    }

    /// Every file with its size, plus capacity totals
    pub fn list(&self) -> Listing {
        let files = self
            .catalog
            .list()
            .iter()
            .map(|entry| FileInfo {
                name: entry.name.clone(),
                size: entry.size,
                elements: entry.element_count(),
                modified_at: entry.modified_at,
            })
            .collect();

        let used_bytes = self.catalog.total_bytes();

        Listing {
            files,
            total_capacity: self.total_capacity(),
            used_bytes,
            free_bytes: self.free_bytes(),
            physical_free_bytes: self.allocator.free_block_count() * self.layout.block_size as u64,
        }
    }

    /// Integers at positions `start..=end`
    pub fn read_range(&mut self, name: &str, start: i64, end: i64) -> Result<Vec<i32>> {
        let entry = self.catalog.find(name)?;
        let len = entry.element_count();

        if start < 0 || end < start || end as u64 >= len {
            return Err(VdiskError::InvalidRange { start, end, len });
        }

        let offset = self.extent_offset(entry.extent) + start as u64 * ELEMENT_SIZE;
        sort::read_ints(&mut self.store, offset, (end - start + 1) as u64)
    }

    /// Append `second`'s integers to `first`, then delete `second`
    ///
    /// `first` grows in place when its extent has slack or the blocks right
    /// after it are free. Otherwise it moves to a fresh extent large enough
    /// for both files. When no such extent exists while both files hold their
    /// blocks, their blocks are counted as free, both files are staged in the
    /// swap region and the combined content is written to the first run that
    /// fits.
    pub fn concatenate(&mut self, first: &str, second: &str) -> Result<()> {
        let head = self.catalog.find(first)?.clone();
        let tail = self.catalog.find(second)?.clone();

        if first == second {
            return Err(VdiskError::SameName(first.to_string()));
        }

        let new_size = head.size + tail.size;
        let new_blocks = Extent::blocks_for(new_size, self.layout.block_size);

        let (extent, placement) = self.place_concatenation(&head, &tail, new_blocks)?;

        if let Err(e) = self.move_concatenation(&head, &tail, extent, placement) {
            match placement {
                Placement::InPlace => self.allocator.release(Extent::new(
                    head.extent.end(),
                    extent.length - head.extent.length,
                )),
                Placement::Relocated => self.allocator.release(extent),
                Placement::Staged => {
                    self.allocator.release(extent);
                    self.allocator.mark_occupied(head.extent)?;
                    self.allocator.mark_occupied(tail.extent)?;
                }
            }
            return Err(e);
        }

        self.catalog.resize(first, new_size, extent)?;
        self.catalog.remove(second)?;

        match placement {
            Placement::InPlace => self.allocator.release(tail.extent),
            Placement::Relocated => {
                self.allocator.release(head.extent);
                self.allocator.release(tail.extent);
            }
            Placement::Staged => {}
        }
        self.persist_committed("concatenate");

        tracing::info!(
            "Concatenated '{}' onto '{}' ({} bytes, {:?})",
            second,
            first,
            new_size,
            placement
        );

        Ok(())
    }

    /// Sort a file's integers ascending, in place
    pub fn sort(&mut self, name: &str) -> Result<SortReport> {
        let entry = self.catalog.find(name)?.clone();
        let offset = self.extent_offset(entry.extent);

        let report = BoundedSorter::new(
            &mut self.store,
            self.config.sort_budget_elements(),
            self.layout.swap_offset(),
            self.layout.swap_capacity(),
        )
        .sort(offset, entry.element_count())?;

        self.catalog.touch(name)?;
        self.persist_committed("sort");

        tracing::info!(
            "Sorted '{}' ({} elements, {:?}, {} merge passes)",
            name,
            report.elements,
            report.strategy,
            report.merge_passes
        );

        Ok(report)
    }

    /// Catalog entry for `name`
    pub fn entry(&self, name: &str) -> Result<&FileEntry> {
        self.catalog.find(name)
    }

    /// Verify that the catalog and the allocator describe the same blocks
    pub fn check_consistency(&self) -> Result<()> {
        let block_size = self.layout.block_size;
        let mut claimed = BitmapAllocator::new(block_size, self.layout.data_blocks);

        for entry in self.catalog.list() {
            if entry.size % ELEMENT_SIZE != 0
                || entry.extent.length != Extent::blocks_for(entry.size, block_size)
            {
                return Err(VdiskError::Corruption(format!(
                    "'{}' has {} bytes in {} blocks",
                    entry.name, entry.size, entry.extent.length
                )));
            }

            claimed.mark_occupied(entry.extent)?;

            if let Some(block) =
                (entry.extent.start..entry.extent.end()).find(|&b| !self.allocator.is_occupied(b))
            {
                return Err(VdiskError::Corruption(format!(
                    "block {} of '{}' is marked free",
                    block, entry.name
                )));
            }
        }

        let occupied = self.allocator.count_occupied();
        if occupied != claimed.count_occupied() {
            return Err(VdiskError::Corruption(format!(
                "{} blocks occupied but catalog references {}",
                occupied,
                claimed.count_occupied()
            )));
        }

        if occupied + self.allocator.free_block_count() != self.allocator.total_blocks() {
            return Err(VdiskError::Corruption(format!(
                "free count {} disagrees with bitmap ({} of {} occupied)",
                self.allocator.free_block_count(),
                occupied,
                self.allocator.total_blocks()
            )));
        }

        Ok(())
    }

    /// Get engine statistics
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            total_blocks: self.allocator.total_blocks(),
            free_blocks: self.allocator.free_block_count(),
            occupied_blocks: self.allocator.occupied_block_count(),
            largest_free_run: self.allocator.largest_free_run(),
            fragmentation: self.allocator.fragmentation_score(),
            file_count: self.catalog.len(),
            sort_budget_bytes: self.config.sort_budget_bytes,
            swap_bytes: self.layout.swap_capacity(),
        }
    }

    /// Bytes files can occupy
    pub fn total_capacity(&self) -> u64 {
        self.layout.data_capacity()
    }

    /// Logical free space: capacity minus the sum of file sizes
    pub fn free_bytes(&self) -> u64 {
        self.catalog.total_free_bytes(self.total_capacity())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn allocator(&self) -> &BitmapAllocator {
        &self.allocator
    }

    pub fn catalog(&self) -> &FileCatalog {
        &self.catalog
    }

    /// Flush the backing store to stable storage
    pub fn sync(&mut self) -> Result<()> {
        self.store.sync()
    }

    /// Persist metadata, sync and release the store
    pub fn close(mut self) -> Result<()> {
        self.persist_catalog()?;
        self.store.sync()?;
        tracing::info!("Closed engine with {} files", self.catalog.len());
        Ok(())
    }

    /// Give back the underlying store
    pub fn into_store(self) -> S {
        self.store
    }

    fn check_count(count: i64) -> Result<u64> {
        if count <= 0 {
            return Err(VdiskError::InvalidCount(count));
        }
        Ok(count as u64)
    }

    /// Validate a new file and reserve its extent
    fn prepare(&mut self, name: &str, count: u64) -> Result<Extent> {
        FileName::validate(name, self.config.max_name_len)?;

        if self.catalog.contains(name) {
            return Err(VdiskError::DuplicateName(name.to_string()));
        }

        if self.catalog.len() >= self.catalog.max_entries() {
            return Err(VdiskError::CatalogFull(self.catalog.max_entries()));
        }

        let available = self.free_bytes();
        let byte_len = count.checked_mul(ELEMENT_SIZE).unwrap_or(u64::MAX);
        if byte_len > available {
            return Err(VdiskError::OutOfSpace {
                requested: byte_len,
                available,
            });
        }

        self.allocator.reserve(byte_len)
    }

    /// Insert a fully written file into the catalog
    fn register(&mut self, name: &str, size: u64, extent: Extent) -> Result<()> {
        if let Err(e) = self.catalog.insert(FileEntry::new(name, size, extent)) {
            self.allocator.release(extent);
            return Err(e);
        }

        if let Err(e) = self.persist_catalog() {
            self.catalog.remove(name)?;
            self.allocator.release(extent);
            return Err(e);
        }

        tracing::info!(
            "Created '{}' ({} bytes, blocks {}..{})",
            name,
            size,
            extent.start,
            extent.end()
        );

        Ok(())
    }

    fn write_random(&mut self, offset: u64, count: u64) -> Result<()> {
        let bound = self.config.value_upper_bound;
        let mut written = 0u64;

        while written < count {
            let n = (count - written).min(GENERATE_BATCH as u64) as usize;
            let values: Vec<i32> = (0..n).map(|_| self.rng.gen_range(0..bound)).collect();
            sort::write_ints(&mut self.store, offset + written * ELEMENT_SIZE, &values)?;
            written += n as u64;
        }

        Ok(())
    }

    /// Choose where the concatenation of `head` and `tail` will live
    fn place_concatenation(
        &mut self,
        head: &FileEntry,
        tail: &FileEntry,
        new_blocks: u64,
    ) -> Result<(Extent, Placement)> {
        if let Some(grown) = self.allocator.try_extend(head.extent, new_blocks) {
            return Ok((grown, Placement::InPlace));
        }

        if let Ok(fresh) = self.allocator.reserve_blocks(new_blocks) {
            return Ok((fresh, Placement::Relocated));
        }

        self.allocator.release(head.extent);
        self.allocator.release(tail.extent);

        match self.allocator.reserve_blocks(new_blocks) {
            Ok(extent) => Ok((extent, Placement::Staged)),
            Err(e) => {
                self.allocator.mark_occupied(head.extent)?;
                self.allocator.mark_occupied(tail.extent)?;
                Err(e)
            }
        }
    }

    /// Write the combined content into `extent` and zero the old tail bytes
    fn move_concatenation(
        &mut self,
        head: &FileEntry,
        tail: &FileEntry,
        extent: Extent,
        placement: Placement,
    ) -> Result<()> {
        let chunk = self.config.sort_budget_bytes as usize;
        let head_offset = self.extent_offset(head.extent);
        let tail_offset = self.extent_offset(tail.extent);
        let target = self.extent_offset(extent);

        match placement {
            Placement::InPlace => {
                self.store
                    .copy(tail_offset, head_offset + head.size, tail.size, chunk)?;
                self.store.zero(tail_offset, tail.size)
            }
            Placement::Relocated => {
                self.store.copy(head_offset, target, head.size, chunk)?;
                self.store
                    .copy(tail_offset, target + head.size, tail.size, chunk)?;
                self.store.zero(tail_offset, tail.size)
            }
            Placement::Staged => {
                // The target may overlap either source
                let swap = self.layout.swap_offset();
                self.store.copy(head_offset, swap, head.size, chunk)?;
                self.store.copy(tail_offset, swap + head.size, tail.size, chunk)?;
                self.store.zero(tail_offset, tail.size)?;
                self.store.copy(swap, target, head.size + tail.size, chunk)
            }
        }
    }

    /// Byte offset of a data-region extent in the store
    fn extent_offset(&self, extent: Extent) -> u64 {
        self.layout.data_offset() + extent.start * self.layout.block_size as u64
    }

    /// Persist metadata for a change that has already been applied
    ///
    /// A failure here leaves the in-memory state authoritative; the next
    /// successful write or `close` brings the disk up to date.
    fn persist_committed(&mut self, operation: &str) {
        if let Err(e) = self.persist_catalog() {
            tracing::warn!("{} applied but catalog not persisted: {}", operation, e);
        }
    }

    fn persist_catalog(&mut self) -> Result<()> {
        if !self.config.persist_metadata {
            return Ok(());
        }
        self.write_metadata()
    }

    /// Write the catalog region and then the superblock
    fn write_metadata(&mut self) -> Result<()> {
        let json = if self.config.persist_metadata {
            serde_json::to_vec(self.catalog.list())?
        } else {
            Vec::new()
        };

        if json.len() as u64 > self.layout.catalog_capacity() {
            return Err(VdiskError::Config(format!(
                "catalog needs {} bytes, region holds {}",
                json.len(),
                self.layout.catalog_capacity()
            )));
        }

        self.store.write(self.layout.catalog_offset(), &json)?;

        self.superblock.catalog_len = json.len() as u64;
        self.superblock.catalog_crc = crc32fast::hash(&json);
        self.superblock.file_count = if json.is_empty() {
            0
        } else {
            self.catalog.len() as u64
        };
        self.store.write(0, &self.superblock.to_bytes())?;

        Ok(())
    }

    /// Load a persisted catalog and rebuild the bitmap from its extents
    fn load(&mut self, block0: &[u8]) -> Result<()> {
        let superblock = Superblock::from_bytes(block0)?;
        superblock.check_layout(&self.layout)?;

        if superblock.catalog_len > self.layout.catalog_capacity() {
            return Err(VdiskError::Corruption(format!(
                "catalog length {} exceeds its region",
                superblock.catalog_len
            )));
        }

        let bytes = self.store.read(
            self.layout.catalog_offset(),
            superblock.catalog_len as usize,
        )?;

        if crc32fast::hash(&bytes) != superblock.catalog_crc {
            return Err(VdiskError::Corruption("catalog checksum mismatch".to_string()));
        }

        let entries: Vec<FileEntry> = if bytes.is_empty() {
            Vec::new()
        } else {
            serde_json::from_slice(&bytes)?
        };

        if entries.len() as u64 != superblock.file_count {
            return Err(VdiskError::Corruption(format!(
                "superblock records {} files, catalog holds {}",
                superblock.file_count,
                entries.len()
            )));
        }

        let catalog = FileCatalog::from_entries(entries, self.config.max_files)?;
        for entry in catalog.list() {
            if entry.extent.length != Extent::blocks_for(entry.size, self.layout.block_size) {
                return Err(VdiskError::Corruption(format!(
                    "'{}' has {} bytes in {} blocks",
                    entry.name, entry.size, entry.extent.length
                )));
            }
            self.allocator.mark_occupied(entry.extent)?;
        }

        tracing::info!(
            "Loaded {} files ({} blocks occupied)",
            catalog.len(),
            self.allocator.occupied_block_count()
        );

        self.catalog = catalog;
        self.superblock = superblock;

        Ok(())
    }
}
