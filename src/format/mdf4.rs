use super::{FormatSchema, NewBlock, RawHeader, record_aligned_max};
use crate::{
    Error, Result,
    blocks::{
        BlockHeader, BlockParse, ByteOrder, ChannelBlock, ChannelGroupBlock, DZ_HEADER_SIZE,
        DataGroupBlock, DataListBlock, DzBlock, HeaderListBlock, common::BLOCK_HEADER_SIZE,
    },
    graph::{BlockKind, ChannelGroupInfo, DataGroupInfo},
};

/// Layout of MDF 4.x: 24 byte headers, u64 little endian links, 8 byte
/// alignment.
#[derive(Debug, Clone, Copy)]
pub struct Mdf4Schema {
    version: u16,
}

impl Mdf4Schema {
    pub fn new(version: u16) -> Self {
        Self { version }
    }
}

/// Blocks whose body the sorter reads or rewrites.
fn keeps_body(tag: &str) -> bool {
    matches!(
        tag,
        "##HD" | "##DG" | "##CG" | "##CN" | "##DL" | "##HL" | "##FH"
    )
}

impl FormatSchema for Mdf4Schema {
    fn version(&self) -> u16 {
        self.version
    }

    fn is_mdf3(&self) -> bool {
        false
    }

    fn byte_order(&self) -> ByteOrder {
        ByteOrder::LittleEndian
    }

    fn link_width(&self) -> usize {
        8
    }

    fn alignment(&self) -> u64 {
        8
    }

    fn header_probe_len(&self) -> u64 {
        BLOCK_HEADER_SIZE as u64
    }

    fn decode_header(&self, probe: &[u8]) -> Result<RawHeader> {
        let header = BlockHeader::from_bytes(probe)?;
        if !header.id.starts_with("##") {
            return Err(Error::BlockIDError {
                actual: header.id,
                expected: "##..".to_string(),
            });
        }
        let links_end = header
            .link_count
            .checked_mul(8)
            .and_then(|links| links.checked_add(BLOCK_HEADER_SIZE as u64));
        if links_end.is_none_or(|end| header.length < end) {
            return Err(Error::BlockSerializationError(format!(
                "{} block of {} bytes declares {} links",
                header.id, header.length, header.link_count
            )));
        }
        Ok(RawHeader {
            tag: header.id,
            length: header.length,
            link_count: header.link_count,
        })
    }

    fn image_len(&self, header: &RawHeader) -> u64 {
        if keeps_body(&header.tag) {
            header.length
        } else if header.tag == "##DZ" {
            (DZ_HEADER_SIZE as u64).min(header.length)
        } else {
            BLOCK_HEADER_SIZE as u64 + header.link_count * 8
        }
    }

    fn link_offsets(&self, header: &RawHeader, _image: &[u8]) -> Result<Vec<u64>> {
        Ok((0..header.link_count)
            .map(|i| BLOCK_HEADER_SIZE as u64 + 8 * i)
            .collect())
    }

    fn encode_link(&self, value: u64) -> Result<Vec<u8>> {
        Ok(value.to_le_bytes().to_vec())
    }

    fn specialize(&self, header: &RawHeader, image: &[u8]) -> Result<BlockKind> {
        let kind = match header.tag.as_str() {
            "##HD" => BlockKind::Header,
            "##DG" => {
                let dg = DataGroupBlock::from_bytes(image)?;
                BlockKind::DataGroup(DataGroupInfo {
                    record_id_size: dg.record_id_size,
                    trailing_record_id: false,
                })
            }
            "##CG" => {
                let cg = ChannelGroupBlock::from_bytes(image)?;
                BlockKind::ChannelGroup(ChannelGroupInfo {
                    record_id: cg.record_id,
                    cycle_count: cg.cycle_count,
                    data_bytes: cg.data_bytes,
                    inval_bytes: cg.inval_bytes,
                    vlsd: cg.is_vlsd(),
                })
            }
            "##CN" => BlockKind::Channel {
                channel_type: ChannelBlock::from_bytes(image)?.channel_type,
            },
            "##DL" => BlockKind::DataList(DataListBlock::from_bytes(image)?),
            "##HL" => {
                HeaderListBlock::from_bytes(image)?;
                BlockKind::HeaderList
            }
            "##DT" | "##SD" | "##RD" => BlockKind::Data {
                header_len: BLOCK_HEADER_SIZE as u64,
            },
            "##DZ" => BlockKind::Zipped(DzBlock::from_bytes(image)?),
            "##FH" => BlockKind::FileHistory,
            _ => BlockKind::Generic,
        };
        Ok(kind)
    }

    fn data_link_slot(&self, parent_tag: &str) -> Option<usize> {
        match parent_tag {
            "##DG" => Some(DataGroupBlock::LINK_DATA),
            "##CN" => Some(ChannelBlock::LINK_DATA),
            "##SR" => Some(1),
            _ => None,
        }
    }

    fn data_block_tag(&self) -> &'static str {
        "##DT"
    }

    fn data_block_header(&self, tag: &str, payload_len: u64) -> Vec<u8> {
        BlockHeader::new(tag, BLOCK_HEADER_SIZE as u64 + payload_len, 0).to_bytes()
    }

    fn new_data_group(&self) -> NewBlock {
        NewBlock {
            tag: "##DG",
            image: DataGroupBlock::new().to_bytes(),
            link_offsets: (0..4).map(|i| BLOCK_HEADER_SIZE as u64 + 8 * i).collect(),
            kind: BlockKind::DataGroup(DataGroupInfo {
                record_id_size: 0,
                trailing_record_id: false,
            }),
        }
    }

    fn mark_channel_group_sorted(&self, image: &mut [u8]) -> Result<()> {
        ChannelGroupBlock::mark_sorted(image)
    }

    fn decode_record_id(&self, bytes: &[u8]) -> Result<u64> {
        let order = ByteOrder::LittleEndian;
        match bytes.len() {
            1 => Ok(u64::from(bytes[0])),
            2 => Ok(u64::from(order.read_u16(bytes, 0))),
            4 => Ok(u64::from(order.read_u32(bytes, 0))),
            8 => Ok(order.read_u64(bytes, 0)),
            n => Err(Error::BlockSerializationError(format!(
                "record id size {} is not 1, 2, 4 or 8",
                n
            ))),
        }
    }

    fn record_block_limit(&self, record_len: u64, max_block_size: u64) -> u64 {
        record_aligned_max(record_len, max_block_size)
    }

    fn supports_data_lists(&self) -> bool {
        true
    }
}
