//! Per-version block layout.
//!
//! The parser, the rewrite engine and the link patcher are written once and
//! consult a [`FormatSchema`] for everything that differs between MDF 3.x
//! and 4.x: header layout, link width, byte order, alignment, which blocks
//! carry the fields the sorter needs, and how new blocks look.

mod mdf3;
mod mdf4;

pub use mdf3::Mdf3Schema;
pub use mdf4::Mdf4Schema;

use core::fmt;

use crate::{
    Result,
    blocks::{ByteOrder, IdentificationBlock},
    graph::{BlockGraph, BlockKind},
};

/// Address of the header block in every version.
pub const ROOT_ADDRESS: u64 = 64;

/// Id, length and link count decoded from the first bytes of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHeader {
    pub tag: String,
    pub length: u64,
    /// For 3.x only the fixed links; counted links are found in the image.
    pub link_count: u64,
}

/// A block created by the rewrite, before it is added to the graph.
#[derive(Debug, Clone)]
pub struct NewBlock {
    pub tag: &'static str,
    pub image: Vec<u8>,
    pub link_offsets: Vec<u64>,
    pub kind: BlockKind,
}

pub trait FormatSchema: Send + Sync + fmt::Debug {
    fn version(&self) -> u16;

    fn is_mdf3(&self) -> bool;

    fn byte_order(&self) -> ByteOrder;

    /// Width of a link field in bytes.
    fn link_width(&self) -> usize;

    /// Output blocks start at multiples of this.
    fn alignment(&self) -> u64;

    /// Bytes needed to decode a block header.
    fn header_probe_len(&self) -> u64;

    fn decode_header(&self, probe: &[u8]) -> Result<RawHeader>;

    /// Bytes of a block kept in its node image.
    fn image_len(&self, header: &RawHeader) -> u64;

    /// Offsets of the link slots inside the block.
    fn link_offsets(&self, header: &RawHeader, image: &[u8]) -> Result<Vec<u64>>;

    fn read_link(&self, image: &[u8], offset: u64) -> u64 {
        let offset = offset as usize;
        match self.link_width() {
            4 => u64::from(self.byte_order().read_u32(image, offset)),
            _ => self.byte_order().read_u64(image, offset),
        }
    }

    fn encode_link(&self, value: u64) -> Result<Vec<u8>>;

    /// Parse the fields the sorter needs from a block image.
    fn specialize(&self, header: &RawHeader, image: &[u8]) -> Result<BlockKind>;

    /// Link slot that points at a data block without a header, if any.
    fn headerless_data_slot(&self, _tag: &str) -> Option<usize> {
        None
    }

    /// Fill in lengths that are not stored in the file.
    fn resolve_implicit_lengths(&self, _graph: &mut BlockGraph) -> Result<()> {
        Ok(())
    }

    /// Slot through which a block of type `parent_tag` references its data.
    fn data_link_slot(&self, parent_tag: &str) -> Option<usize>;

    /// Tag of a plain record data block.
    fn data_block_tag(&self) -> &'static str;

    /// Header bytes of a data block with `payload_len` bytes of content.
    fn data_block_header(&self, tag: &str, payload_len: u64) -> Vec<u8>;

    /// An empty sorted data group.
    fn new_data_group(&self) -> NewBlock;

    /// Rewrite a channel group image so it owns its data group alone.
    fn mark_channel_group_sorted(&self, image: &mut [u8]) -> Result<()>;

    /// Update the header block for `channel_groups` sorted data groups.
    /// Returns false when the header is copied unchanged.
    fn rewrite_header(&self, _image: &mut [u8], _channel_groups: u16) -> Result<bool> {
        Ok(false)
    }

    /// Decode a record id of `bytes.len()` bytes.
    fn decode_record_id(&self, bytes: &[u8]) -> Result<u64>;

    /// Largest block for records of `record_len` bytes.
    fn record_block_limit(&self, record_len: u64, max_block_size: u64) -> u64;

    /// Whether DL, HL and DZ blocks exist in this version.
    fn supports_data_lists(&self) -> bool;
}

/// Largest multiple of `record_len` not above `max`, or one record when a
/// single record is already larger.
pub fn record_aligned_max(record_len: u64, max: u64) -> u64 {
    if record_len == 0 {
        max
    } else if record_len > max {
        record_len
    } else {
        record_len * (max / record_len)
    }
}

/// Pick the schema for a parsed identification block.
pub fn schema_for(id: &IdentificationBlock) -> Box<dyn FormatSchema> {
    if id.is_mdf3() {
        Box::new(Mdf3Schema::new(id.version_number, id.byte_order))
    } else {
        Box::new(Mdf4Schema::new(id.version_number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_alignment() {
        assert_eq!(record_aligned_max(10, 105), 100);
        assert_eq!(record_aligned_max(200, 100), 200);
        assert_eq!(record_aligned_max(0, 100), 100);
        assert_eq!(record_aligned_max(8, 64), 64);
    }
}
