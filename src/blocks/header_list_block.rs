use super::HL_BLOCK_SIZE;
use crate::{
    Result,
    blocks::common::{BlockHeader, BlockParse, read_u8, read_u16, validate_buffer_size},
};

/// HLBLOCK: Header List Block. Sits in front of a DL chain whose blocks are
/// compressed; link 0 is the first DL.
#[derive(Debug, Clone)]
pub struct HeaderListBlock {
    pub header: BlockHeader,
    pub flags: u16,
    pub zip_type: u8,
}

impl HeaderListBlock {
    pub const LINK_FIRST_DL: usize = 0;

    /// Header list announcing equal-length deflate blocks.
    pub fn new() -> Self {
        Self {
            header: BlockHeader::new("##HL", HL_BLOCK_SIZE as u64, 1),
            flags: 1,
            zip_type: 0,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = self.header.to_bytes();
        buffer.resize(self.header.body_offset(), 0);
        buffer.extend_from_slice(&self.flags.to_le_bytes());
        buffer.push(self.zip_type);
        buffer.resize(HL_BLOCK_SIZE, 0);
        buffer
    }
}

impl Default for HeaderListBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockParse for HeaderListBlock {
    const ID: &'static str = "##HL";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        let body = header.body_offset();
        validate_buffer_size(bytes, body + 3)?;
        Ok(Self {
            flags: read_u16(bytes, body),
            zip_type: read_u8(bytes, body + 2),
            header,
        })
    }
}
