//! Run configuration.

use serde::Serialize;

use crate::{Error, Result};

/// Default upper bound for a rewritten data block (2 GiB).
pub const DEFAULT_MAX_BLOCK_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Upper bound for compressed blocks (4 MiB). Larger blocks are clamped.
pub const ZIP_MAX_BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// Whether data blocks end up compressed or plain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ZipDirection {
    Zip,
    #[default]
    Unzip,
}

/// Options for a single sorter run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortConfig {
    pub zip: ZipDirection,
    /// Largest data block written, in bytes.
    pub max_block_size: u64,
    /// Re-chunk data lists even when they already satisfy the limits.
    pub override_size: bool,
    pub verbose: bool,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            zip: ZipDirection::Unzip,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
            override_size: false,
            verbose: false,
        }
    }
}

impl SortConfig {
    pub fn with_zip(mut self, zip: ZipDirection) -> Self {
        self.zip = zip;
        self
    }

    pub fn with_max_block_size(mut self, max_block_size: u64) -> Self {
        self.max_block_size = max_block_size;
        self
    }

    pub fn with_override_size(mut self, override_size: bool) -> Self {
        self.override_size = override_size;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn is_zip(&self) -> bool {
        self.zip == ZipDirection::Zip
    }

    pub fn is_unzip(&self) -> bool {
        self.zip == ZipDirection::Unzip
    }

    /// Apply the limits of the chosen direction.
    ///
    /// Compressed blocks are capped at [`ZIP_MAX_BLOCK_SIZE`]; a larger
    /// request is lowered with a warning.
    pub fn normalized(mut self) -> Self {
        if self.is_zip() && self.max_block_size > ZIP_MAX_BLOCK_SIZE {
            tracing::warn!(
                requested = self.max_block_size,
                limit = ZIP_MAX_BLOCK_SIZE,
                "Maximum block size too large for zipped blocks, using 4MB"
            );
            self.max_block_size = ZIP_MAX_BLOCK_SIZE;
        }
        self
    }
}

/// Parse a block size such as `300`, `34k`, `3M` or `2G`.
///
/// Suffixes are binary multiples and case insensitive.
pub fn parse_size(text: &str) -> Result<u64> {
    let text = text.trim();
    let (digits, multiplier) = match text.char_indices().last() {
        Some((i, 'k' | 'K')) => (&text[..i], 1u64 << 10),
        Some((i, 'm' | 'M')) => (&text[..i], 1u64 << 20),
        Some((i, 'g' | 'G')) => (&text[..i], 1u64 << 30),
        Some(_) => (text, 1),
        None => return Err(Error::InvalidArgument("empty block size".to_string())),
    };

    let value: u64 = digits
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("invalid block size {:?}", text)))?;
    let size = value
        .checked_mul(multiplier)
        .ok_or_else(|| Error::InvalidArgument(format!("block size {:?} is too large", text)))?;
    if size == 0 {
        return Err(Error::InvalidArgument("block size must be positive".to_string()));
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_with_suffixes() {
        assert_eq!(parse_size("300").unwrap(), 300);
        assert_eq!(parse_size("34k").unwrap(), 34 * 1024);
        assert_eq!(parse_size("3M").unwrap(), 3 * 1024 * 1024);
        assert_eq!(parse_size("3000m").unwrap(), 3000 * 1024 * 1024);
        assert_eq!(parse_size("3G").unwrap(), 3 * 1024 * 1024 * 1024);
    }

    #[test]
    fn bad_sizes() {
        assert!(parse_size("").is_err());
        assert!(parse_size("k").is_err());
        assert!(parse_size("12x").is_err());
        assert!(parse_size("0").is_err());
        assert!(parse_size("99999999999999999999G").is_err());
    }

    #[test]
    fn zip_clamps_block_size() {
        let config = SortConfig::default().with_zip(ZipDirection::Zip).normalized();
        assert_eq!(config.max_block_size, ZIP_MAX_BLOCK_SIZE);

        let config = SortConfig::default()
            .with_zip(ZipDirection::Zip)
            .with_max_block_size(1024)
            .normalized();
        assert_eq!(config.max_block_size, 1024);

        let config = SortConfig::default().normalized();
        assert_eq!(config.max_block_size, DEFAULT_MAX_BLOCK_SIZE);
    }

    #[test]
    fn serializes_lowercase_direction() {
        let config = SortConfig::default().with_zip(ZipDirection::Zip);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["zip"], "zip");
        assert_eq!(json["max_block_size"], DEFAULT_MAX_BLOCK_SIZE);
    }
}
