//! Superblock (block 0) and disk geometry
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Block 0: Superblock                          │
//! │  - Magic "VDSK\x00\x01\x00\x00", version 1.0 │
//! │  - Region boundaries, catalog length + CRC   │
//! ├──────────────────────────────────────────────┤
//! │ Blocks 1..D: Catalog region (JSON entries)   │
//! ├──────────────────────────────────────────────┤
//! │ Blocks D..S: Data region (bitmap allocated)  │
//! ├──────────────────────────────────────────────┤
//! │ Blocks S..end: Swap region (external sort)   │
//! └──────────────────────────────────────────────┘
//! ```

use crate::config::EngineConfig;
use crate::error::{Result, VdiskError};

pub const MAGIC: [u8; 8] = *b"VDSK\x00\x01\x00\x00";
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;

/// Serialized superblock size before padding to a full block
pub const SUPERBLOCK_LEN: usize = 8 + 2 + 2 + 4 + 8 * 8 + 4 + 8;

/// Upper bound on JSON bytes a single catalog entry can take besides its name
const ENTRY_OVERHEAD: u64 = 192;

/// Region boundaries derived from an [`EngineConfig`], all in blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub block_size: u32,
    pub total_blocks: u64,
    pub catalog_start: u64,
    pub catalog_blocks: u64,
    pub data_start: u64,
    pub data_blocks: u64,
    pub swap_start: u64,
    pub swap_blocks: u64,
}

impl Layout {
    /// Compute the geometry for a configuration
    pub fn compute(config: &EngineConfig) -> Result<Self> {
        config.validate()?;

        let block_size = config.block_size as u64;
        let total_blocks = config.capacity_bytes / block_size;

        // Names may need \uXXXX escapes in JSON, hence the factor of 6
        let catalog_bytes =
            16 + config.max_files as u64 * (config.max_name_len as u64 * 6 + ENTRY_OVERHEAD);
        let catalog_blocks = catalog_bytes.div_ceil(block_size);
        let data_start = 1 + catalog_blocks;

        if data_start >= total_blocks {
            return Err(VdiskError::Config(format!(
                "{} metadata blocks leave no room out of {}",
                data_start, total_blocks
            )));
        }

        let remaining = total_blocks - data_start;
        let swap_blocks = match config.swap_bytes {
            Some(bytes) => bytes / block_size,
            None => remaining.div_ceil(2),
        };

        if swap_blocks >= remaining {
            return Err(VdiskError::Config(format!(
                "{} blocks of metadata and swap leave no data blocks out of {}",
                data_start + swap_blocks,
                total_blocks
            )));
        }

        let data_blocks = remaining - swap_blocks;

        // External sort stages a whole file in swap
        if data_blocks > swap_blocks {
            return Err(VdiskError::Config(format!(
                "swap of {} blocks cannot hold a file filling {} data blocks",
                swap_blocks, data_blocks
            )));
        }

        Ok(Layout {
            block_size: config.block_size,
            total_blocks,
            catalog_start: 1,
            catalog_blocks,
            data_start,
            data_blocks,
            swap_start: data_start + data_blocks,
            swap_blocks,
        })
    }

    pub fn capacity(&self) -> u64 {
        self.total_blocks * self.block_size as u64
    }

    pub fn catalog_offset(&self) -> u64 {
        self.catalog_start * self.block_size as u64
    }

    pub fn catalog_capacity(&self) -> u64 {
        self.catalog_blocks * self.block_size as u64
    }

    pub fn data_offset(&self) -> u64 {
        self.data_start * self.block_size as u64
    }

    /// Bytes files can occupy
    pub fn data_capacity(&self) -> u64 {
        self.data_blocks * self.block_size as u64
    }

    pub fn swap_offset(&self) -> u64 {
        self.swap_start * self.block_size as u64
    }

    pub fn swap_capacity(&self) -> u64 {
        self.swap_blocks * self.block_size as u64
    }
}

/// On-disk superblock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    pub magic: [u8; 8],
    pub version_major: u16,
    pub version_minor: u16,
    pub block_size: u32,
    pub total_blocks: u64,
    pub catalog_start: u64,
    pub catalog_blocks: u64,
    pub data_start: u64,
    pub data_blocks: u64,
    pub swap_start: u64,
    pub swap_blocks: u64,

    /// Length of the serialized catalog in bytes
    pub catalog_len: u64,

    /// CRC32 of the serialized catalog
    pub catalog_crc: u32,

    /// Number of entries in the catalog
    pub file_count: u64,
}

impl Superblock {
    /// Fresh superblock with an empty catalog
    pub fn new(layout: &Layout) -> Self {
        Superblock {
            magic: MAGIC,
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            block_size: layout.block_size,
            total_blocks: layout.total_blocks,
            catalog_start: layout.catalog_start,
            catalog_blocks: layout.catalog_blocks,
            data_start: layout.data_start,
            data_blocks: layout.data_blocks,
            swap_start: layout.swap_start,
            swap_blocks: layout.swap_blocks,
            catalog_len: 0,
            catalog_crc: 0,
            file_count: 0,
        }
    }

    /// Check whether raw block-0 bytes carry our magic at all
    pub fn has_magic(bytes: &[u8]) -> bool {
        bytes.len() >= MAGIC.len() && bytes[..MAGIC.len()] == MAGIC
    }

    /// Validate the magic and version
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(VdiskError::InvalidMagic);
        }

        if self.version_major != VERSION_MAJOR || self.version_minor != VERSION_MINOR {
            return Err(VdiskError::UnsupportedVersion {
                major: self.version_major,
                minor: self.version_minor,
            });
        }

        Ok(())
    }

    /// Ensure the stored geometry is the one the configuration expects
    pub fn check_layout(&self, layout: &Layout) -> Result<()> {
        let stored = (
            self.block_size,
            self.total_blocks,
            self.catalog_blocks,
            self.data_start,
            self.data_blocks,
            self.swap_blocks,
        );
        let expected = (
            layout.block_size,
            layout.total_blocks,
            layout.catalog_blocks,
            layout.data_start,
            layout.data_blocks,
            layout.swap_blocks,
        );

        if stored != expected {
            return Err(VdiskError::GeometryMismatch(format!(
                "disk has (block_size, total, catalog, data_start, data, swap) = {:?}, configuration expects {:?}",
                stored, expected
            )));
        }

        Ok(())
    }

    /// Serialize to exactly `block_size` bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.block_size as usize);

        bytes.extend_from_slice(&self.magic);
        bytes.extend_from_slice(&self.version_major.to_le_bytes());
        bytes.extend_from_slice(&self.version_minor.to_le_bytes());
        bytes.extend_from_slice(&self.block_size.to_le_bytes());
        bytes.extend_from_slice(&self.total_blocks.to_le_bytes());
        bytes.extend_from_slice(&self.catalog_start.to_le_bytes());
        bytes.extend_from_slice(&self.catalog_blocks.to_le_bytes());
        bytes.extend_from_slice(&self.data_start.to_le_bytes());
        bytes.extend_from_slice(&self.data_blocks.to_le_bytes());
        bytes.extend_from_slice(&self.swap_start.to_le_bytes());
        bytes.extend_from_slice(&self.swap_blocks.to_le_bytes());
        bytes.extend_from_slice(&self.catalog_len.to_le_bytes());
        bytes.extend_from_slice(&self.catalog_crc.to_le_bytes());
        bytes.extend_from_slice(&self.file_count.to_le_bytes());

        bytes.resize((self.block_size as usize).max(SUPERBLOCK_LEN), 0);

        bytes
    }

    /// Deserialize from block-0 bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SUPERBLOCK_LEN {
            return Err(VdiskError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Insufficient bytes for superblock",
            )));
        }

        let mut reader = FieldReader { bytes, offset: 0 };

        let mut magic = [0u8; 8];
        magic.copy_from_slice(reader.take(8));

        let superblock = Superblock {
            magic,
            version_major: reader.u16(),
            version_minor: reader.u16(),
            block_size: reader.u32(),
            total_blocks: reader.u64(),
            catalog_start: reader.u64(),
            catalog_blocks: reader.u64(),
            data_start: reader.u64(),
            data_blocks: reader.u64(),
            swap_start: reader.u64(),
            swap_blocks: reader.u64(),
            catalog_len: reader.u64(),
            catalog_crc: reader.u32(),
            file_count: reader.u64(),
        };

        superblock.validate()?;

        Ok(superblock)
    }
}

/// Sequential little-endian field reader over a length-checked buffer
struct FieldReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> FieldReader<'a> {
    fn take(&mut self, len: usize) -> &'a [u8] {
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        slice
    }

    fn u16(&mut self) -> u16 {
        let mut buf = [0u8; 2];
        buf.copy_from_slice(self.take(2));
        u16::from_le_bytes(buf)
    }

    fn u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4));
        u32::from_le_bytes(buf)
    }

    fn u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8));
        u64::from_le_bytes(buf)
    }
}
