use crate::{
    Result,
    blocks::common::{BlockHeader, BlockParse, read_u8, validate_buffer_size},
};

/// Channel type value of a variable length signal data channel.
pub const CN_TYPE_VLSD: u8 = 1;

/// Channel Block (##CN). Only the channel type is needed here; the data
/// link (slot 5) points to signal data or, in unsorted files, to a VLSD
/// channel group.
#[derive(Debug, Clone)]
pub struct ChannelBlock {
    pub header: BlockHeader,
    pub channel_type: u8,
}

impl ChannelBlock {
    pub const LINK_NEXT: usize = 0;
    pub const LINK_DATA: usize = 5;

    pub fn is_vlsd(&self) -> bool {
        self.channel_type == CN_TYPE_VLSD
    }
}

impl BlockParse for ChannelBlock {
    const ID: &'static str = "##CN";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        let body = header.body_offset();
        validate_buffer_size(bytes, body + 1)?;
        Ok(Self {
            channel_type: read_u8(bytes, body),
            header,
        })
    }
}
