// blocks/common.rs
//! Common types, traits, and helper functions for block parsing.
//!
//! This module provides:
//! - [`BlockHeader`]: The 24-byte header present in all MDF 4.x blocks
//! - [`BlockParse`]: Trait for parsing MDF 4.x block views from bytes
//! - [`ByteOrder`]: Endian-aware accessors (MDF 3.x files may be big endian)
//! - Byte parsing helper functions to reduce code duplication

use crate::{Error, Result};

// ============================================================================
// Byte Parsing Helpers
// ============================================================================

/// Read a u64 from a byte slice at the given offset (little-endian).
///
/// # Panics
/// Panics if `offset + 8 > bytes.len()`. Callers validate the buffer first.
#[inline]
pub fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    ByteOrder::LittleEndian.read_u64(bytes, offset)
}

/// Read a u32 from a byte slice at the given offset (little-endian).
#[inline]
pub fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    ByteOrder::LittleEndian.read_u32(bytes, offset)
}

/// Read a u16 from a byte slice at the given offset (little-endian).
#[inline]
pub fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    ByteOrder::LittleEndian.read_u16(bytes, offset)
}

/// Read a u8 from a byte slice at the given offset.
#[inline]
pub fn read_u8(bytes: &[u8], offset: usize) -> u8 {
    bytes[offset]
}

/// Byte order of the numeric fields in a file.
///
/// MDF 4.x is always little endian; MDF 3.x declares its order in the
/// identification block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    #[inline]
    pub fn read_u16(self, bytes: &[u8], offset: usize) -> u16 {
        let raw = [bytes[offset], bytes[offset + 1]];
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(raw),
            ByteOrder::BigEndian => u16::from_be_bytes(raw),
        }
    }

    #[inline]
    pub fn read_u32(self, bytes: &[u8], offset: usize) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[offset..offset + 4]);
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(raw),
            ByteOrder::BigEndian => u32::from_be_bytes(raw),
        }
    }

    #[inline]
    pub fn read_u64(self, bytes: &[u8], offset: usize) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[offset..offset + 8]);
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(raw),
            ByteOrder::BigEndian => u64::from_be_bytes(raw),
        }
    }

    /// Store `value` at `offset`. Panics if the slice is too short.
    #[inline]
    pub fn put_u16(self, bytes: &mut [u8], offset: usize, value: u16) {
        let raw = match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        };
        bytes[offset..offset + 2].copy_from_slice(&raw);
    }

    #[inline]
    pub fn put_u32(self, bytes: &mut [u8], offset: usize, value: u32) {
        let raw = match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        };
        bytes[offset..offset + 4].copy_from_slice(&raw);
    }
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a buffer has at least `expected` bytes.
///
/// Returns `Err(TooShortBuffer)` if the buffer is too small.
#[inline]
pub fn validate_buffer_size(bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() < expected {
        return Err(Error::TooShortBuffer {
            actual: bytes.len(),
            expected,
            file: file!(),
            line: line!(),
        });
    }
    Ok(())
}

/// Debug check that a serialized MDF 4.x block keeps 8-byte alignment.
#[inline]
pub fn debug_assert_aligned(size: usize) {
    debug_assert_eq!(size % 8, 0, "Block size {} is not 8-byte aligned", size);
}

/// Size of the MDF 4.x block header.
pub const BLOCK_HEADER_SIZE: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// 4-byte block type identifier (e.g., "##HD", "##DG").
    pub id: String,
    /// Reserved field, always 0.
    pub reserved: u32,
    /// Total length of the block in bytes, including this header.
    pub length: u64,
    /// Number of link fields in this block.
    pub link_count: u64,
}

impl BlockHeader {
    pub fn new(id: &str, length: u64, link_count: u64) -> Self {
        Self {
            id: String::from(id),
            reserved: 0,
            length,
            link_count,
        }
    }

    /// Serializes the header: id (4), reserved (4), length (8), link count (8).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(BLOCK_HEADER_SIZE);

        let id_bytes = self.id.as_bytes();
        let mut id_field = [0u8; 4];
        let id_len = core::cmp::min(id_bytes.len(), 4);
        id_field[..id_len].copy_from_slice(&id_bytes[..id_len]);
        buffer.extend_from_slice(&id_field);

        buffer.extend_from_slice(&self.reserved.to_le_bytes());
        buffer.extend_from_slice(&self.length.to_le_bytes());
        buffer.extend_from_slice(&self.link_count.to_le_bytes());

        debug_assert_eq!(buffer.len(), BLOCK_HEADER_SIZE);
        buffer
    }

    /// Parse a block header from the first 24 bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        validate_buffer_size(bytes, BLOCK_HEADER_SIZE)?;

        let id = String::from_utf8_lossy(&bytes[0..4]).into_owned();

        Ok(Self {
            id,
            reserved: read_u32(bytes, 4),
            length: read_u64(bytes, 8),
            link_count: read_u64(bytes, 16),
        })
    }

    /// Offset of the first byte after the link section.
    pub fn body_offset(&self) -> usize {
        BLOCK_HEADER_SIZE + self.link_count as usize * 8
    }
}

/// Typed view over the bytes of an MDF 4.x block.
pub trait BlockParse: Sized {
    const ID: &'static str;

    fn parse_header(bytes: &[u8]) -> Result<BlockHeader> {
        let header = BlockHeader::from_bytes(bytes)?;
        if header.id != Self::ID {
            return Err(Error::BlockIDError {
                actual: header.id.clone(),
                expected: Self::ID.to_string(),
            });
        }
        Ok(header)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self>;
}
