//! Flat file catalog
//!
//! Maps names to [`FileEntry`] values. Entries keep insertion order for
//! listing; a hash index gives constant-time lookup by name.

pub mod entry;

pub use entry::{FileEntry, ELEMENT_SIZE};

use crate::allocator::extent::Extent;
use crate::error::{Result, VdiskError};
use ahash::AHashMap;

/// Catalog for managing file entries
///
/// Provides:
/// - Insert with duplicate-name and capacity checks
/// - Lookup and in-place resize by name
/// - Removal
/// - Ordered listing and space accounting
#[derive(Debug, Clone)]
pub struct FileCatalog {
    /// Entries in insertion order
    entries: Vec<FileEntry>,

    /// Name -> position in `entries`
    index: AHashMap<String, usize>,

    /// Maximum number of entries
    max_entries: usize,
}

impl FileCatalog {
    /// Create an empty catalog
    pub fn new(max_entries: usize) -> Self {
        FileCatalog {
            entries: Vec::new(),
            index: AHashMap::new(),
            max_entries,
        }
    }

    /// Rebuild a catalog from persisted entries
    pub fn from_entries(entries: Vec<FileEntry>, max_entries: usize) -> Result<Self> {
        let mut catalog = FileCatalog::new(max_entries);
        for entry in entries {
            catalog
                .insert(entry)
                .map_err(|e| VdiskError::Corruption(format!("persisted catalog: {}", e)))?;
        }
        Ok(catalog)
    }

    /// Add an entry
    pub fn insert(&mut self, entry: FileEntry) -> Result<()> {
        if self.index.contains_key(&entry.name) {
            return Err(VdiskError::DuplicateName(entry.name));
        }

        if self.entries.len() >= self.max_entries {
            return Err(VdiskError::CatalogFull(self.max_entries));
        }

        self.index.insert(entry.name.clone(), self.entries.len());
        self.entries.push(entry);

        Ok(())
    }

    /// Remove an entry, returning it
    pub fn remove(&mut self, name: &str) -> Result<FileEntry> {
        let position = self
            .index
            .remove(name)
            .ok_or_else(|| VdiskError::NotFound(name.to_string()))?;

        let entry = self.entries.remove(position);

        // Later entries shift down by one
        for later in &self.entries[position..] {
            if let Some(slot) = self.index.get_mut(&later.name) {
                *slot -= 1;
            }
        }

        Ok(entry)
    }

    /// Look up an entry by name
    pub fn find(&self, name: &str) -> Result<&FileEntry> {
        self.index
            .get(name)
            .map(|&position| &self.entries[position])
            .ok_or_else(|| VdiskError::NotFound(name.to_string()))
    }

    /// Check whether a name is taken
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Repoint an entry at a new size and extent
    pub fn resize(&mut self, name: &str, size: u64, extent: Extent) -> Result<()> {
        let position = *self
            .index
            .get(name)
            .ok_or_else(|| VdiskError::NotFound(name.to_string()))?;

        let entry = &mut self.entries[position];
        entry.size = size;
        entry.extent = extent;
        entry.touch();

        Ok(())
    }

    /// Mark an entry as modified without changing its layout
    pub fn touch(&mut self, name: &str) -> Result<()> {
        let position = *self
            .index
            .get(name)
            .ok_or_else(|| VdiskError::NotFound(name.to_string()))?;
        self.entries[position].touch();
        Ok(())
    }

    /// All entries in insertion order
    pub fn list(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Sum of logical file sizes in bytes
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// `capacity` minus logical bytes in use (not block-rounded)
    pub fn total_free_bytes(&self, capacity: u64) -> u64 {
        capacity.saturating_sub(self.total_bytes())
    }

    /// Sum of blocks referenced by all extents
    pub fn occupied_blocks(&self) -> u64 {
        self.entries.iter().map(|e| e.extent.length).sum()
    }
}
