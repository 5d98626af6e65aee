// identification_block.rs
use super::ID_BLOCK_SIZE;
use crate::{
    Error, Result,
    blocks::common::{ByteOrder, read_u16, validate_buffer_size},
};

/// Lowest supported version number (MDF 3.00).
pub const MIN_SUPPORTED_VERSION: u16 = 300;
/// Highest supported version number (MDF 4.11).
pub const MAX_SUPPORTED_VERSION: u16 = 411;
/// Version written when compressed blocks are introduced.
pub const ZIP_VERSION: u16 = 410;

/// Identification Block - file format identifier at the start of every MDF file.
///
/// The identification block is always located at file offset 0. The sorter
/// only needs the magic, the version number and, for 3.x files, the byte
/// order flag. The raw 64 bytes are kept so the block can be copied as-is.
#[derive(Debug, Clone)]
pub struct IdentificationBlock {
    /// File identifier string ("MDF     ").
    pub file_id: String,
    /// Format version string (e.g., "4.10    ").
    pub format_version: String,
    /// Program identifier string (tool that created the file).
    pub program_id: String,
    /// Numeric version (e.g., 410 for version 4.10).
    pub version_number: u16,
    /// Byte order of numeric fields. Always little endian for 4.x.
    pub byte_order: ByteOrder,
    raw: [u8; ID_BLOCK_SIZE],
}

impl IdentificationBlock {
    /// Parses and validates an identification block from a 64 byte slice.
    ///
    /// Fails with [`Error::FileIdentifierError`] for a wrong magic and
    /// [`Error::FileVersioningError`] for versions outside 300..=411.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        validate_buffer_size(bytes, ID_BLOCK_SIZE)?;

        let file_id = String::from_utf8_lossy(&bytes[0..8]).into_owned();
        if file_id != "MDF     " {
            return Err(Error::FileIdentifierError(file_id));
        }

        let version_number = read_u16(bytes, 28);
        if !(MIN_SUPPORTED_VERSION..=MAX_SUPPORTED_VERSION).contains(&version_number) {
            return Err(Error::FileVersioningError(version_number.to_string()));
        }

        // 3.x stores a byte order flag at 24; 4.x keeps that field reserved.
        let byte_order = if version_number < 400 && read_u16(bytes, 24) != 0 {
            ByteOrder::BigEndian
        } else {
            ByteOrder::LittleEndian
        };

        let mut raw = [0u8; ID_BLOCK_SIZE];
        raw.copy_from_slice(&bytes[..ID_BLOCK_SIZE]);

        Ok(Self {
            file_id,
            format_version: String::from_utf8_lossy(&bytes[8..16]).into_owned(),
            program_id: String::from_utf8_lossy(&bytes[16..24]).into_owned(),
            version_number,
            byte_order,
            raw,
        })
    }

    /// True for MDF 3.x files.
    pub fn is_mdf3(&self) -> bool {
        self.version_number < 400
    }

    /// Raise the version to 4.10 so readers accept DZ blocks.
    ///
    /// Only the version string and number change; all other bytes are kept.
    pub fn upgrade_for_zip(&mut self) {
        self.format_version = String::from("4.10    ");
        self.raw[8..16].copy_from_slice(self.format_version.as_bytes());
        self.raw[28..30].copy_from_slice(&ZIP_VERSION.to_le_bytes());
        self.version_number = ZIP_VERSION;
    }

    /// The 64 bytes to write at the start of the output file.
    pub fn to_bytes(&self) -> [u8; ID_BLOCK_SIZE] {
        self.raw
    }
}
