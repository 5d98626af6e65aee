use super::DG_BLOCK_SIZE;
use crate::{
    Result,
    blocks::common::{BlockHeader, BlockParse, read_u8, validate_buffer_size},
};

/// Data Group Block (##DG) - groups channel groups that share a data block.
///
/// Links: next DG, first CG, data section, comment. When more than one
/// channel group hangs below a data group every record starts with a record
/// id of `record_id_size` bytes.
#[derive(Debug, Clone)]
pub struct DataGroupBlock {
    pub header: BlockHeader,
    /// Size of record ID in bytes (0, 1, 2, 4, or 8).
    pub record_id_size: u8,
}

impl DataGroupBlock {
    pub const LINK_NEXT: usize = 0;
    pub const LINK_FIRST_CG: usize = 1;
    pub const LINK_DATA: usize = 2;

    /// A sorted data group with no record ids and all links null.
    pub fn new() -> Self {
        Self {
            header: BlockHeader::new("##DG", DG_BLOCK_SIZE as u64, 4),
            record_id_size: 0,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = self.header.to_bytes();
        buffer.resize(self.header.body_offset(), 0);
        buffer.push(self.record_id_size);
        buffer.resize(DG_BLOCK_SIZE, 0);
        buffer
    }
}

impl Default for DataGroupBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockParse for DataGroupBlock {
    const ID: &'static str = "##DG";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        let body = header.body_offset();
        validate_buffer_size(bytes, body + 1)?;

        Ok(Self {
            record_id_size: read_u8(bytes, body),
            header,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_data_group_layout() {
        let bytes = DataGroupBlock::new().to_bytes();
        assert_eq!(bytes.len(), 64);
        let parsed = DataGroupBlock::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.header.link_count, 4);
        assert_eq!(parsed.record_id_size, 0);
    }
}
