//! Validation for file names
//!
//! The namespace is flat: a name is any non-empty run of printable,
//! non-whitespace characters shorter than the configured limit. Whitespace
//! is excluded because the command line splits on it.

use crate::error::{Result, VdiskError};
use regex::Regex;

/// A validated file name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileName(String);

impl FileName {
    /// Printable characters only, no whitespace
    const PATTERN: &'static str = r"^[^\s\p{Cc}]+$";

    /// Create a new validated name
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` if the name is empty, has `max_len` or more
    /// bytes, or contains whitespace or control characters.
    ///
    /// # Examples
    ///
    /// ```
    /// use vdisk_rs::validation::FileName;
    ///
    /// let name = FileName::new("numbers.dat", 255).unwrap();
    /// assert_eq!(name.as_str(), "numbers.dat");
    ///
    /// assert!(FileName::new("", 255).is_err());
    /// assert!(FileName::new("two words", 255).is_err());
    /// ```
    pub fn new(name: impl Into<String>, max_len: usize) -> Result<Self> {
        let name = name.into();
        Self::validate(&name, max_len)?;
        Ok(FileName(name))
    }

    /// Validate a name string
    pub fn validate(name: &str, max_len: usize) -> Result<()> {
        if name.is_empty() {
            return Err(VdiskError::InvalidName(
                "name cannot be empty".to_string(),
            ));
        }

        if name.len() >= max_len {
            return Err(VdiskError::InvalidName(format!(
                "name too long ({} bytes, limit {})",
                name.len(),
                max_len - 1
            )));
        }

        let re = Regex::new(Self::PATTERN).map_err(|e| VdiskError::Config(e.to_string()))?;
        if !re.is_match(name) {
            return Err(VdiskError::InvalidName(format!(
                "'{}' contains whitespace or control characters",
                name.escape_debug()
            )));
        }

        Ok(())
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for FileName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
