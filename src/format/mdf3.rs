use super::{FormatSchema, NewBlock, RawHeader};
use crate::{
    Error, Result,
    blocks::{
        ByteOrder,
        v3::{self, ChannelGroup3, DataGroup3, HD_DG_COUNT_OFFSET, V3_HEADER_SIZE, V3Header},
    },
    graph::{BlockGraph, BlockKind, ChannelGroupInfo, DataGroupInfo},
};

/// Layout of MDF 3.x: 4 byte headers, u32 links in the file's byte order,
/// no alignment, headerless data blocks.
#[derive(Debug, Clone, Copy)]
pub struct Mdf3Schema {
    version: u16,
    order: ByteOrder,
}

impl Mdf3Schema {
    pub fn new(version: u16, order: ByteOrder) -> Self {
        Self { version, order }
    }
}

impl FormatSchema for Mdf3Schema {
    fn version(&self) -> u16 {
        self.version
    }

    fn is_mdf3(&self) -> bool {
        true
    }

    fn byte_order(&self) -> ByteOrder {
        self.order
    }

    fn link_width(&self) -> usize {
        4
    }

    fn alignment(&self) -> u64 {
        1
    }

    fn header_probe_len(&self) -> u64 {
        V3_HEADER_SIZE as u64
    }

    fn decode_header(&self, probe: &[u8]) -> Result<RawHeader> {
        let header = V3Header::from_bytes(probe, self.order)?;
        let link_count = v3::base_link_count(&header.id) as u64;
        if u64::from(header.length) < V3_HEADER_SIZE as u64 + 4 * link_count {
            return Err(Error::BlockSerializationError(format!(
                "{} block of {} bytes is too short for its links",
                header.id, header.length
            )));
        }
        Ok(RawHeader {
            tag: header.id,
            length: u64::from(header.length),
            link_count,
        })
    }

    fn image_len(&self, header: &RawHeader) -> u64 {
        header.length
    }

    fn link_offsets(&self, header: &RawHeader, image: &[u8]) -> Result<Vec<u64>> {
        v3::link_offsets(&header.tag, image, self.order)
    }

    fn encode_link(&self, value: u64) -> Result<Vec<u8>> {
        let value = u32::try_from(value).map_err(|_| {
            Error::BlockLinkError(format!("offset {} does not fit a 3.x link", value))
        })?;
        Ok(match self.order {
            ByteOrder::LittleEndian => value.to_le_bytes().to_vec(),
            ByteOrder::BigEndian => value.to_be_bytes().to_vec(),
        })
    }

    fn specialize(&self, header: &RawHeader, image: &[u8]) -> Result<BlockKind> {
        let kind = match header.tag.as_str() {
            "HD" => BlockKind::Header,
            "DG" => {
                let dg = DataGroup3::from_bytes(image, self.order)?;
                BlockKind::DataGroup(DataGroupInfo {
                    record_id_size: u8::from(dg.record_id_count > 0),
                    trailing_record_id: dg.record_id_count == 2,
                })
            }
            "CG" => {
                let cg = ChannelGroup3::from_bytes(image, self.order)?;
                BlockKind::ChannelGroup(ChannelGroupInfo {
                    record_id: u64::from(cg.record_id),
                    cycle_count: u64::from(cg.cycle_count),
                    data_bytes: u32::from(cg.record_size),
                    inval_bytes: 0,
                    vlsd: false,
                })
            }
            _ => BlockKind::Generic,
        };
        Ok(kind)
    }

    fn headerless_data_slot(&self, tag: &str) -> Option<usize> {
        (tag == "DG").then_some(DataGroup3::LINK_DATA)
    }

    fn resolve_implicit_lengths(&self, graph: &mut BlockGraph) -> Result<()> {
        for id in graph.input_order() {
            let info = match graph.node(id).kind {
                BlockKind::DataGroup(info) => info,
                _ => continue,
            };
            let Some(data) = graph.link(id, DataGroup3::LINK_DATA) else {
                continue;
            };
            let ids_per_record =
                u64::from(info.record_id_size) + u64::from(info.trailing_record_id);
            let first_cg = graph.link(id, DataGroup3::LINK_FIRST_CG);

            let mut length = 0u64;
            for cg in graph.chain(first_cg, ChannelGroup3::LINK_NEXT) {
                if let BlockKind::ChannelGroup(cg) = graph.node(cg).kind {
                    length += (u64::from(cg.data_bytes) + ids_per_record) * cg.cycle_count;
                }
            }

            let node = graph.node_mut(data);
            if matches!(node.kind, BlockKind::Data { header_len: 0 }) {
                node.length = length;
            }
        }
        Ok(())
    }

    fn data_link_slot(&self, parent_tag: &str) -> Option<usize> {
        (parent_tag == "DG").then_some(DataGroup3::LINK_DATA)
    }

    fn data_block_tag(&self) -> &'static str {
        "DT"
    }

    fn data_block_header(&self, _tag: &str, _payload_len: u64) -> Vec<u8> {
        Vec::new()
    }

    fn new_data_group(&self) -> NewBlock {
        NewBlock {
            tag: "DG",
            image: DataGroup3::new_sorted(self.order),
            link_offsets: vec![4, 8, 12, 16],
            kind: BlockKind::DataGroup(DataGroupInfo {
                record_id_size: 0,
                trailing_record_id: false,
            }),
        }
    }

    fn mark_channel_group_sorted(&self, image: &mut [u8]) -> Result<()> {
        ChannelGroup3::mark_sorted(image, self.order)
    }

    fn rewrite_header(&self, image: &mut [u8], channel_groups: u16) -> Result<bool> {
        crate::blocks::common::validate_buffer_size(image, HD_DG_COUNT_OFFSET + 2)?;
        self.order.put_u16(image, HD_DG_COUNT_OFFSET, channel_groups);
        Ok(true)
    }

    fn decode_record_id(&self, bytes: &[u8]) -> Result<u64> {
        match bytes {
            [id] => Ok(u64::from(*id)),
            _ => Err(Error::BlockSerializationError(format!(
                "3.x record ids are one byte, got {}",
                bytes.len()
            ))),
        }
    }

    fn record_block_limit(&self, _record_len: u64, _max_block_size: u64) -> u64 {
        u64::MAX
    }

    fn supports_data_lists(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_links() {
        let schema = Mdf3Schema::new(330, ByteOrder::BigEndian);
        assert_eq!(schema.encode_link(0x0102).unwrap(), vec![0, 0, 1, 2]);
        assert!(schema.encode_link(u64::from(u32::MAX) + 1).is_err());

        let mut image = vec![0u8; 8];
        image[4..8].copy_from_slice(&[0, 0, 0x10, 0]);
        assert_eq!(schema.read_link(&image, 4), 0x1000);
    }

    #[test]
    fn header_decoding() {
        let schema = Mdf3Schema::new(300, ByteOrder::LittleEndian);
        let mut probe = vec![0u8; 4];
        probe[0..2].copy_from_slice(b"CG");
        probe[2..4].copy_from_slice(&30u16.to_le_bytes());
        let header = schema.decode_header(&probe).unwrap();
        assert_eq!(header.tag, "CG");
        assert_eq!(header.link_count, 3);

        probe[2..4].copy_from_slice(&10u16.to_le_bytes());
        assert!(schema.decode_header(&probe).is_err());
    }

    #[test]
    fn header_count_rewrite() {
        let schema = Mdf3Schema::new(330, ByteOrder::LittleEndian);
        let mut image = vec![0u8; 208];
        assert!(schema.rewrite_header(&mut image, 3).unwrap());
        assert_eq!(ByteOrder::LittleEndian.read_u16(&image, 16), 3);
    }
}
