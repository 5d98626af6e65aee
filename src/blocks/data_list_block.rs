use crate::{
    Error, Result,
    blocks::common::{BlockHeader, BlockParse, debug_assert_aligned, read_u8, read_u32, read_u64, validate_buffer_size},
};

/// Flag bit: all referenced blocks share one payload length.
pub const DL_FLAG_EQUAL_LENGTH: u8 = 0x01;

/// DLBLOCK: Data List Block (ordered list of data blocks).
///
/// Link 0 chains to the next list, links 1..=count reference DT, SD, RD or
/// DZ blocks. The body declares either a single equal payload length or one
/// start offset per referenced block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataListBlock {
    pub header: BlockHeader,
    pub flags: u8,
    pub count: u32,
    pub equal_length: Option<u64>,
    pub offsets: Vec<u64>,
}

impl BlockParse for DataListBlock {
    const ID: &'static str = "##DL";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        if header.link_count == 0 {
            return Err(Error::BlockLinkError(
                "DL block without a next-list link".to_string(),
            ));
        }
        let body = header.body_offset();
        validate_buffer_size(bytes, body + 8)?;

        let flags = read_u8(bytes, body);
        let count = read_u32(bytes, body + 4);

        let (equal_length, offsets) = if flags & DL_FLAG_EQUAL_LENGTH != 0 {
            validate_buffer_size(bytes, body + 16)?;
            (Some(read_u64(bytes, body + 8)), Vec::new())
        } else {
            let n = count as usize;
            validate_buffer_size(bytes, body + 8 + n * 8)?;
            let offsets = (0..n).map(|i| read_u64(bytes, body + 8 + i * 8)).collect();
            (None, offsets)
        };

        Ok(Self {
            header,
            flags,
            count,
            equal_length,
            offsets,
        })
    }
}

impl DataListBlock {
    pub const LINK_NEXT: usize = 0;

    /// Create a list for `count` blocks of `data_block_len` payload bytes each.
    /// All links are left null and filled in when the output is patched.
    pub fn new_equal(count: u32, data_block_len: u64) -> Self {
        let link_count = u64::from(count) + 1;
        Self {
            header: BlockHeader::new("##DL", 24 + link_count * 8 + 16, link_count),
            flags: DL_FLAG_EQUAL_LENGTH,
            count,
            equal_length: Some(data_block_len),
            offsets: Vec::new(),
        }
    }

    /// Serialize with zeroed links.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = self.header.to_bytes();
        buffer.resize(self.header.body_offset(), 0);
        buffer.push(self.flags);
        buffer.extend_from_slice(&[0u8; 3]);
        buffer.extend_from_slice(&self.count.to_le_bytes());
        match self.equal_length {
            Some(len) => buffer.extend_from_slice(&len.to_le_bytes()),
            None => {
                for offset in &self.offsets {
                    buffer.extend_from_slice(&offset.to_le_bytes());
                }
            }
        }
        debug_assert_aligned(buffer.len());
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_length_list() {
        let dl = DataListBlock::new_equal(3, 1024);
        let bytes = dl.to_bytes();
        assert_eq!(bytes.len() as u64, dl.header.length);
        assert_eq!(bytes.len(), 24 + 4 * 8 + 16);

        let parsed = DataListBlock::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.count, 3);
        assert_eq!(parsed.equal_length, Some(1024));
    }

    #[test]
    fn offset_list() {
        let mut bytes = BlockHeader::new("##DL", 24 + 24 + 8 + 16, 3).to_bytes();
        bytes.resize(48, 0);
        bytes.push(0);
        bytes.extend_from_slice(&[0u8; 3]);
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&100u64.to_le_bytes());

        let parsed = DataListBlock::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.equal_length, None);
        assert_eq!(parsed.offsets, vec![0, 100]);
    }
}
