use crate::{
    Result,
    blocks::common::{BlockHeader, BlockParse, read_u16, read_u32, read_u64, validate_buffer_size},
};

/// Flag bit marking a channel group that holds variable length signal data.
pub const CG_FLAG_VLSD: u16 = 0x0001;

/// Channel Group Block (##CG).
///
/// Links: next CG, first CN, acquisition name, acquisition source, first
/// SR, comment.
#[derive(Debug, Clone)]
pub struct ChannelGroupBlock {
    pub header: BlockHeader,
    pub record_id: u64,
    pub cycle_count: u64,
    pub flags: u16,
    pub path_separator: u16,
    /// Data bytes per record, or the low half of the VLSD byte count.
    pub data_bytes: u32,
    /// Invalidation bytes per record, or the high half of the VLSD byte count.
    pub inval_bytes: u32,
}

impl ChannelGroupBlock {
    pub const LINK_NEXT: usize = 0;
    pub const LINK_FIRST_CN: usize = 1;

    // Field offsets relative to the body.
    const RECORD_ID: usize = 0;
    const CYCLES: usize = 8;
    const FLAGS: usize = 16;
    const DATA_BYTES: usize = 24;
    const INVAL_BYTES: usize = 28;
    const BODY_LEN: usize = 32;

    pub fn is_vlsd(&self) -> bool {
        self.flags & CG_FLAG_VLSD != 0
    }

    /// Total payload of a VLSD group, excluding the 4-byte length prefixes.
    pub fn vlsd_length(&self) -> u64 {
        u64::from(self.data_bytes) + (u64::from(self.inval_bytes) << 32)
    }

    /// Bytes of one record after the record id.
    pub fn record_length(&self) -> u64 {
        u64::from(self.data_bytes) + u64::from(self.inval_bytes)
    }

    /// Rewrite the block image for a group that owns its data group alone:
    /// record id 0 and VLSD flag cleared.
    pub fn mark_sorted(image: &mut [u8]) -> Result<()> {
        let header = Self::parse_header(image)?;
        let body = header.body_offset();
        validate_buffer_size(image, body + Self::BODY_LEN)?;

        image[body + Self::RECORD_ID..body + Self::RECORD_ID + 8].copy_from_slice(&0u64.to_le_bytes());
        let flags = read_u16(image, body + Self::FLAGS) & !CG_FLAG_VLSD;
        image[body + Self::FLAGS..body + Self::FLAGS + 2].copy_from_slice(&flags.to_le_bytes());
        Ok(())
    }
}

impl BlockParse for ChannelGroupBlock {
    const ID: &'static str = "##CG";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        let body = header.body_offset();
        validate_buffer_size(bytes, body + Self::BODY_LEN)?;

        Ok(Self {
            record_id: read_u64(bytes, body + Self::RECORD_ID),
            cycle_count: read_u64(bytes, body + Self::CYCLES),
            flags: read_u16(bytes, body + Self::FLAGS),
            path_separator: read_u16(bytes, body + Self::FLAGS + 2),
            data_bytes: read_u32(bytes, body + Self::DATA_BYTES),
            inval_bytes: read_u32(bytes, body + Self::INVAL_BYTES),
            header,
        })
    }
}
