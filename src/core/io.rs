//! Backing store: the fixed-capacity "virtual disk"
//!
//! A store is a flat byte range `[0, capacity)` with positioned reads and
//! writes. It knows nothing about blocks or files.

use crate::error::{Result, VdiskError};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Byte-addressable persistent region
pub trait BackingStore {
    /// Total size in bytes, fixed at creation
    fn capacity(&self) -> u64;

    /// Fill `buf` from `offset`
    fn read_into(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `data` at `offset`; visible to every later read once this returns
    fn write(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Force written data to stable storage
    fn sync(&mut self) -> Result<()>;

    /// Read `len` bytes starting at `offset`
    fn read(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_into(offset, &mut buf)?;
        Ok(buf)
    }

    /// Copy `len` bytes from `src` to `dst` through a buffer of at most
    /// `chunk_len` bytes; the two ranges must not overlap
    fn copy(&mut self, src: u64, dst: u64, len: u64, chunk_len: usize) -> Result<()> {
        let chunk_len = chunk_len.max(1) as u64;
        let mut buf = vec![0u8; chunk_len.min(len) as usize];
        let mut done = 0;
        while done < len {
            let n = chunk_len.min(len - done) as usize;
            self.read_into(src + done, &mut buf[..n])?;
            self.write(dst + done, &buf[..n])?;
            done += n as u64;
        }
        Ok(())
    }

    /// Overwrite `len` bytes at `offset` with zeros
    fn zero(&mut self, offset: u64, len: u64) -> Result<()> {
        const CHUNK: u64 = 64 * 1024;
        let zeros = vec![0u8; CHUNK.min(len) as usize];
        let mut done = 0;
        while done < len {
            let n = CHUNK.min(len - done) as usize;
            self.write(offset + done, &zeros[..n])?;
            done += n as u64;
        }
        Ok(())
    }
}

/// Reject requests that do not lie within `[0, capacity)`
pub fn check_bounds(offset: u64, len: u64, capacity: u64) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(VdiskError::OutOfRange {
            offset,
            len,
            capacity,
        }),
    }
}

/// File-backed store
pub struct DiskStore {
    file: File,
    capacity: u64,
}

impl DiskStore {
    /// Open the backing file, creating and sizing it when missing
    ///
    /// A new file is extended to exactly `capacity` bytes (sparse, reads as
    /// zeros). An existing file must already have that size.
    pub fn open_or_create<P: AsRef<Path>>(path: P, capacity: u64) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let store = Self::open(path)?;
            if store.capacity != capacity {
                return Err(VdiskError::CapacityMismatch {
                    expected: capacity,
                    actual: store.capacity,
                });
            }
            Ok(store)
        } else {
            Self::create(path, capacity)
        }
    }

    /// Create a new backing file of `capacity` bytes
    pub fn create<P: AsRef<Path>>(path: P, capacity: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        file.set_len(capacity)?;
        tracing::info!(
            "Allocated backing file {:?} ({} bytes)",
            path.as_ref(),
            capacity
        );

        Ok(DiskStore { file, capacity })
    }

    /// Open an existing backing file; its current length is the capacity
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let capacity = file.metadata()?.len();

        Ok(DiskStore { file, capacity })
    }
}

impl BackingStore for DiskStore {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn read_into(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_bounds(offset, buf.len() as u64, self.capacity)?;

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;

        Ok(())
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        check_bounds(offset, data.len() as u64, self.capacity)?;

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.file.flush()?;

        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// Heap-backed store for tests and throwaway disks
#[derive(Debug, Clone)]
pub struct MemoryStore {
    bytes: Vec<u8>,
}

impl MemoryStore {
    pub fn new(capacity: u64) -> Self {
        MemoryStore {
            bytes: vec![0u8; capacity as usize],
        }
    }
}

impl BackingStore for MemoryStore {
    fn capacity(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_into(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_bounds(offset, buf.len() as u64, self.capacity())?;
        let start = offset as usize;
        buf.copy_from_slice(&self.bytes[start..start + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        check_bounds(offset, data.len() as u64, self.capacity())?;
        let start = offset as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}
