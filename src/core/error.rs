use thiserror::Error;

#[derive(Error, Debug)]
pub enum VdiskError {
    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("Invalid element count: {0} (must be greater than zero)")]
    InvalidCount(i64),

    #[error("Invalid range: {start}..={end} for a file of {len} elements")]
    InvalidRange { start: i64, end: i64, len: u64 },

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("File already exists: {0}")]
    DuplicateName(String),

    #[error("Cannot concatenate '{0}' with itself")]
    SameName(String),

    #[error("Catalog full: at most {0} files")]
    CatalogFull(usize),

    #[error("Out of space: requested {requested} bytes, {available} available")]
    OutOfSpace { requested: u64, available: u64 },

    #[error("Out of range: {len} bytes at offset {offset} exceed capacity {capacity}")]
    OutOfRange { offset: u64, len: u64, capacity: u64 },

    #[error("Swap area too small: sort needs {needed} bytes, swap holds {available}")]
    SwapExhausted { needed: u64, available: u64 },

    #[error("Invalid magic number in superblock")]
    InvalidMagic,

    #[error("Unsupported format version: {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("Disk geometry mismatch: {0}")]
    GeometryMismatch(String),

    #[error("Backing file is {actual} bytes, expected {expected}")]
    CapacityMismatch { expected: u64, actual: u64 },

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VdiskError {
    /// Errors caused by a malformed name, count or range argument
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            VdiskError::InvalidName(_)
                | VdiskError::InvalidCount(_)
                | VdiskError::InvalidRange { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, VdiskError>;
