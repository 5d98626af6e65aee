//! MDF 3.x block layouts.
//!
//! 3.x blocks carry a 2 character id and a u16 length, followed by u32
//! links. Numeric fields use the byte order declared in the identification
//! block, so every accessor takes a [`ByteOrder`].

use crate::{
    Error, Result,
    blocks::common::{ByteOrder, validate_buffer_size},
};

/// Size of the id + length prefix.
pub const V3_HEADER_SIZE: usize = 4;
/// Size of a data group block written by the sorter.
pub const V3_DG_BLOCK_SIZE: usize = 28;

/// Leading id and length of a 3.x block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V3Header {
    pub id: String,
    pub length: u16,
}

impl V3Header {
    pub fn from_bytes(bytes: &[u8], order: ByteOrder) -> Result<Self> {
        validate_buffer_size(bytes, V3_HEADER_SIZE)?;
        Ok(Self {
            id: String::from_utf8_lossy(&bytes[0..2]).into_owned(),
            length: order.read_u16(bytes, 2),
        })
    }
}

/// Number of links every block of the given type starts with.
pub fn base_link_count(id: &str) -> usize {
    match id {
        "HD" => 3,
        "TR" => 1,
        "SR" => 2,
        "DG" => 4,
        "CG" => 3,
        "CN" => 5,
        _ => 0,
    }
}

/// Byte offsets of every link in a 3.x block image.
///
/// Besides the fixed links some block types carry optional or counted
/// links: a long CG has a sample reduction link, long CN blocks carry
/// extension links, tabular text conversions (type 12) link one text
/// block per entry and dependency blocks list their dependencies.
pub fn link_offsets(id: &str, image: &[u8], order: ByteOrder) -> Result<Vec<u64>> {
    let mut offsets: Vec<u64> = (0..base_link_count(id))
        .map(|i| (V3_HEADER_SIZE + 4 * i) as u64)
        .collect();
    let length = image.len();

    match id {
        "CG" if length >= 30 => offsets.push(26),
        "CN" => {
            if length > 218 {
                offsets.push(218);
            }
            if length > 222 {
                offsets.push(222);
            }
        }
        "CC" if length >= 46 && order.read_u16(image, 42) == 12 => {
            let count = usize::from(order.read_u16(image, 44));
            for i in 0..count {
                offsets.push((62 + 20 * i) as u64);
            }
        }
        "CD" if length >= 8 => {
            let deps = usize::from(order.read_u16(image, 6));
            for i in 0..2 * deps {
                offsets.push((8 + 4 * i) as u64);
            }
        }
        _ => {}
    }

    match offsets.last() {
        Some(&last) if last as usize + 4 > length => Err(Error::BlockLinkError(format!(
            "{} block of {} bytes cannot hold a link at {}",
            id, length, last
        ))),
        _ => Ok(offsets),
    }
}

/// Data group fields.
#[derive(Debug, Clone, Copy)]
pub struct DataGroup3 {
    pub channel_group_count: u16,
    pub record_id_count: u16,
}

impl DataGroup3 {
    pub const LINK_NEXT: usize = 0;
    pub const LINK_FIRST_CG: usize = 1;
    pub const LINK_DATA: usize = 3;

    pub fn from_bytes(bytes: &[u8], order: ByteOrder) -> Result<Self> {
        validate_buffer_size(bytes, 24)?;
        Ok(Self {
            channel_group_count: order.read_u16(bytes, 20),
            record_id_count: order.read_u16(bytes, 22),
        })
    }

    /// Image of a sorted data group holding one channel group.
    pub fn new_sorted(order: ByteOrder) -> Vec<u8> {
        let mut bytes = vec![0u8; V3_DG_BLOCK_SIZE];
        bytes[0..2].copy_from_slice(b"DG");
        order.put_u16(&mut bytes, 2, V3_DG_BLOCK_SIZE as u16);
        order.put_u16(&mut bytes, 20, 1);
        bytes
    }
}

/// Channel group fields.
#[derive(Debug, Clone, Copy)]
pub struct ChannelGroup3 {
    pub record_id: u16,
    pub channel_count: u16,
    pub record_size: u16,
    pub cycle_count: u32,
}

impl ChannelGroup3 {
    pub const LINK_NEXT: usize = 0;
    pub const LINK_FIRST_CN: usize = 1;

    pub fn from_bytes(bytes: &[u8], order: ByteOrder) -> Result<Self> {
        validate_buffer_size(bytes, 26)?;
        Ok(Self {
            record_id: order.read_u16(bytes, 16),
            channel_count: order.read_u16(bytes, 18),
            record_size: order.read_u16(bytes, 20),
            cycle_count: order.read_u32(bytes, 22),
        })
    }

    pub fn mark_sorted(image: &mut [u8], order: ByteOrder) -> Result<()> {
        validate_buffer_size(image, 18)?;
        order.put_u16(image, 16, 0);
        Ok(())
    }
}

/// Offset of the data group counter in the header block.
pub const HD_DG_COUNT_OFFSET: usize = 16;

#[cfg(test)]
mod tests {
    use super::*;

    fn block(id: &[u8; 2], len: usize, order: ByteOrder) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        bytes[0..2].copy_from_slice(id);
        order.put_u16(&mut bytes, 2, len as u16);
        bytes
    }

    #[test]
    fn fixed_links() {
        let dg = block(b"DG", 28, ByteOrder::LittleEndian);
        let offsets = link_offsets("DG", &dg, ByteOrder::LittleEndian).unwrap();
        assert_eq!(offsets, vec![4, 8, 12, 16]);
        assert!(link_offsets("TX", &block(b"TX", 10, ByteOrder::LittleEndian), ByteOrder::LittleEndian)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn optional_links() {
        let order = ByteOrder::BigEndian;
        let cg = block(b"CG", 30, order);
        assert_eq!(link_offsets("CG", &cg, order).unwrap().last(), Some(&26));

        let cn = block(b"CN", 228, order);
        let offsets = link_offsets("CN", &cn, order).unwrap();
        assert_eq!(&offsets[5..], &[218, 222]);
    }

    #[test]
    fn counted_links() {
        let order = ByteOrder::LittleEndian;
        let mut cc = block(b"CC", 62 + 40, order);
        order.put_u16(&mut cc, 42, 12);
        order.put_u16(&mut cc, 44, 2);
        assert_eq!(link_offsets("CC", &cc, order).unwrap(), vec![62, 82]);

        let mut cd = block(b"CD", 8 + 16, order);
        order.put_u16(&mut cd, 6, 2);
        assert_eq!(link_offsets("CD", &cd, order).unwrap(), vec![8, 12, 16, 20]);
    }

    #[test]
    fn truncated_block_is_rejected() {
        let order = ByteOrder::LittleEndian;
        let mut cd = block(b"CD", 12, order);
        order.put_u16(&mut cd, 6, 2);
        assert!(link_offsets("CD", &cd, order).is_err());
    }

    #[test]
    fn sorted_data_group() {
        let bytes = DataGroup3::new_sorted(ByteOrder::BigEndian);
        let dg = DataGroup3::from_bytes(&bytes, ByteOrder::BigEndian).unwrap();
        assert_eq!(dg.channel_group_count, 1);
        assert_eq!(dg.record_id_count, 0);
        assert_eq!(V3Header::from_bytes(&bytes, ByteOrder::BigEndian).unwrap().length, 28);
    }
}
