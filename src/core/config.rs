//! Engine configuration
//!
//! Every tunable of the virtual disk lives here. Values come from the
//! defaults below, optionally overlaid by a TOML file, and finally by
//! command-line flags in the `vdisk` binary.

use crate::error::{Result, VdiskError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 1 GiB backing store
pub const DEFAULT_CAPACITY: u64 = 1024 * 1024 * 1024;

/// 4KB blocks
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// 2 MiB of memory for sorting
pub const DEFAULT_SORT_BUDGET: u64 = 2 * 1024 * 1024;

pub const DEFAULT_MAX_FILES: usize = 1000;
pub const DEFAULT_MAX_NAME_LEN: usize = 255;
pub const DEFAULT_VALUE_UPPER_BOUND: i32 = 1_000_000;
pub const DEFAULT_DISK_PATH: &str = "disco_virtual.bin";

/// Smallest sort budget accepted (16 integers)
const MIN_SORT_BUDGET: u64 = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Backing file location (ignored by in-memory stores)
    pub disk_path: PathBuf,

    /// Total size of the backing store in bytes
    pub capacity_bytes: u64,

    /// Allocation unit in bytes
    pub block_size: u32,

    /// Memory the sort operation may use, in bytes
    pub sort_budget_bytes: u64,

    /// Scratch region reserved for external sort runs; when unset the space
    /// after the catalog is split evenly between data and swap
    pub swap_bytes: Option<u64>,

    /// Maximum number of catalog entries
    pub max_files: usize,

    /// File names must be strictly shorter than this many bytes
    pub max_name_len: usize,

    /// Generated values are drawn from `[0, value_upper_bound)`
    pub value_upper_bound: i32,

    /// Persist the superblock and catalog so files survive restarts
    pub persist_metadata: bool,

    /// Fixed RNG seed; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            disk_path: PathBuf::from(DEFAULT_DISK_PATH),
            capacity_bytes: DEFAULT_CAPACITY,
            block_size: DEFAULT_BLOCK_SIZE,
            sort_budget_bytes: DEFAULT_SORT_BUDGET,
            swap_bytes: None,
            max_files: DEFAULT_MAX_FILES,
            max_name_len: DEFAULT_MAX_NAME_LEN,
            value_upper_bound: DEFAULT_VALUE_UPPER_BOUND,
            persist_metadata: true,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a TOML file, filling unset keys with defaults
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(text).map_err(|e| VdiskError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Small geometry for tests and experiments: 4 MiB store
    pub fn small() -> Self {
        EngineConfig {
            capacity_bytes: 4 * 1024 * 1024,
            sort_budget_bytes: 64 * 1024,
            max_files: 64,
            max_name_len: 64,
            ..Default::default()
        }
    }

    pub fn with_disk_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.disk_path = path.into();
        self
    }

    pub fn with_capacity(mut self, capacity_bytes: u64) -> Self {
        self.capacity_bytes = capacity_bytes;
        self
    }

    pub fn with_sort_budget(mut self, sort_budget_bytes: u64) -> Self {
        self.sort_budget_bytes = sort_budget_bytes;
        self
    }

    pub fn with_swap(mut self, swap_bytes: u64) -> Self {
        self.swap_bytes = Some(swap_bytes);
        self
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_persistence(mut self, persist: bool) -> Self {
        self.persist_metadata = persist;
        self
    }

    /// Sort budget expressed in 32-bit elements (M)
    pub fn sort_budget_elements(&self) -> usize {
        (self.sort_budget_bytes / 4) as usize
    }

    /// Check that the configuration describes a usable disk
    pub fn validate(&self) -> Result<()> {
        let block_size = self.block_size as u64;

        if block_size == 0 || block_size % 4 != 0 {
            return Err(VdiskError::Config(format!(
                "block_size {} must be a non-zero multiple of 4",
                self.block_size
            )));
        }

        if self.capacity_bytes == 0 || self.capacity_bytes % block_size != 0 {
            return Err(VdiskError::Config(format!(
                "capacity {} is not a multiple of block size {}",
                self.capacity_bytes, block_size
            )));
        }

        if let Some(swap_bytes) = self.swap_bytes {
            if swap_bytes % block_size != 0 {
                return Err(VdiskError::Config(format!(
                    "swap size {} is not a multiple of block size {}",
                    swap_bytes, block_size
                )));
            }
        }

        if self.sort_budget_bytes < MIN_SORT_BUDGET || self.sort_budget_bytes % 4 != 0 {
            return Err(VdiskError::Config(format!(
                "sort budget {} must be a multiple of 4 and at least {} bytes",
                self.sort_budget_bytes, MIN_SORT_BUDGET
            )));
        }

        if self.max_files == 0 || self.max_name_len < 2 {
            return Err(VdiskError::Config(
                "max_files must be positive and max_name_len at least 2".to_string(),
            ));
        }

        if self.value_upper_bound <= 0 {
            return Err(VdiskError::Config(format!(
                "value_upper_bound {} must be positive",
                self.value_upper_bound
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry() {
        let config = EngineConfig::default();
        assert_eq!(config.capacity_bytes, 1 << 30);
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.sort_budget_elements(), 512 * 1024);
        assert_eq!(config.swap_bytes, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            disk_path = "/tmp/disk.bin"
            sort_budget_bytes = 4096
            "#,
        )
        .unwrap();

        assert_eq!(config.disk_path, PathBuf::from("/tmp/disk.bin"));
        assert_eq!(config.sort_budget_bytes, 4096);
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(config.max_files, DEFAULT_MAX_FILES);
    }

    #[test]
    fn test_rejects_unaligned_capacity() {
        let config = EngineConfig::default().with_capacity(4097);
        assert!(matches!(config.validate(), Err(VdiskError::Config(_))));
    }

    #[test]
    fn test_rejects_tiny_sort_budget() {
        let config = EngineConfig::default().with_sort_budget(32);
        assert!(matches!(config.validate(), Err(VdiskError::Config(_))));

        let config = EngineConfig::default().with_sort_budget(66);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unaligned_swap() {
        let config = EngineConfig::small().with_swap(1000);
        assert!(matches!(config.validate(), Err(VdiskError::Config(_))));

        let config = EngineConfig::from_toml_str("swap_bytes = 2097152").unwrap();
        assert_eq!(config.swap_bytes, Some(2 * 1024 * 1024));
    }

    #[test]
    fn test_malformed_toml() {
        let result = EngineConfig::from_toml_str("capacity_bytes = \"lots\"");
        assert!(matches!(result, Err(VdiskError::Config(_))));
    }
}
