#![allow(dead_code)]

//! Builders for small synthetic MDF files and an independent reader for
//! checking what the sorter wrote.

use mdf_sorter::blocks::{BlockParse, DzBlock, compress};
use mdf_sorter::{Result, SliceReader, SortConfig, Sorter, VecWriter, sorter::ProcessSummary};

fn id_block(version: &str, number: u16, big_endian: bool) -> Vec<u8> {
    let mut bytes = vec![0u8; 64];
    bytes[0..8].copy_from_slice(b"MDF     ");
    bytes[8..16].copy_from_slice(version.as_bytes());
    bytes[16..24].copy_from_slice(b"test    ");
    if big_endian {
        bytes[24..26].copy_from_slice(&1u16.to_le_bytes());
    }
    bytes[28..30].copy_from_slice(&number.to_le_bytes());
    bytes
}

/// Lays out MDF 4.x blocks one after another, 8 byte aligned.
pub struct Mdf4Builder {
    bytes: Vec<u8>,
}

impl Mdf4Builder {
    pub fn new(version: u16) -> Self {
        let text = format!("{}.{:02}    ", version / 100, version % 100);
        Self {
            bytes: id_block(&text, version, false),
        }
    }

    /// Append a block and return its address.
    pub fn block(&mut self, tag: &str, links: &[u64], body: &[u8]) -> u64 {
        while self.bytes.len() % 8 != 0 {
            self.bytes.push(0);
        }
        let address = self.bytes.len() as u64;
        let length = 24 + 8 * links.len() + body.len();
        self.bytes.extend_from_slice(tag.as_bytes());
        self.bytes.extend_from_slice(&0u32.to_le_bytes());
        self.bytes.extend_from_slice(&(length as u64).to_le_bytes());
        self.bytes.extend_from_slice(&(links.len() as u64).to_le_bytes());
        for link in links {
            self.bytes.extend_from_slice(&link.to_le_bytes());
        }
        self.bytes.extend_from_slice(body);
        address
    }

    pub fn set_link(&mut self, block: u64, slot: usize, target: u64) {
        let at = block as usize + 24 + 8 * slot;
        self.bytes[at..at + 8].copy_from_slice(&target.to_le_bytes());
    }

    pub fn header(&mut self) -> u64 {
        self.block("##HD", &[0; 6], &[0u8; 32])
    }

    pub fn file_history(&mut self) -> u64 {
        self.block("##FH", &[0; 2], &[0u8; 16])
    }

    pub fn data_group(&mut self, record_id_size: u8) -> u64 {
        let mut body = [0u8; 8];
        body[0] = record_id_size;
        self.block("##DG", &[0; 4], &body)
    }

    pub fn channel_group(&mut self, record_id: u64, cycles: u64, data_bytes: u32, flags: u16) -> u64 {
        let mut body = Vec::new();
        body.extend_from_slice(&record_id.to_le_bytes());
        body.extend_from_slice(&cycles.to_le_bytes());
        body.extend_from_slice(&flags.to_le_bytes());
        body.extend_from_slice(&[0u8; 6]);
        body.extend_from_slice(&data_bytes.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        self.block("##CG", &[0; 6], &body)
    }

    pub fn channel(&mut self, channel_type: u8) -> u64 {
        let mut body = vec![0u8; 72];
        body[0] = channel_type;
        self.block("##CN", &[0; 8], &body)
    }

    pub fn data(&mut self, tag: &str, payload: &[u8]) -> u64 {
        self.block(tag, &[], payload)
    }

    pub fn zipped(&mut self, payload: &[u8]) -> u64 {
        let compressed = compress(payload);
        let mut body = Vec::new();
        body.extend_from_slice(b"DT");
        body.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        body.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        body.extend_from_slice(&(compressed.len() as u64).to_le_bytes());
        body.extend_from_slice(&compressed);
        self.block("##DZ", &[], &body)
    }

    /// DL with explicit offsets.
    pub fn data_list(&mut self, children: &[u64], offsets: &[u64]) -> u64 {
        let mut links = vec![0u64];
        links.extend_from_slice(children);
        let mut body = vec![0u8; 4];
        body.extend_from_slice(&(children.len() as u32).to_le_bytes());
        for offset in offsets {
            body.extend_from_slice(&offset.to_le_bytes());
        }
        self.block("##DL", &links, &body)
    }

    /// DL whose children all carry `length` payload bytes.
    pub fn equal_data_list(&mut self, children: &[u64], length: u64) -> u64 {
        let mut links = vec![0u64];
        links.extend_from_slice(children);
        let mut body = vec![1u8, 0, 0, 0];
        body.extend_from_slice(&(children.len() as u32).to_le_bytes());
        body.extend_from_slice(&length.to_le_bytes());
        self.block("##DL", &links, &body)
    }

    pub fn header_list(&mut self, first_list: u64) -> u64 {
        let mut body = vec![0u8; 8];
        body[0..2].copy_from_slice(&1u16.to_le_bytes());
        self.block("##HL", &[first_list], &body)
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Lays out MDF 3.x blocks without padding.
pub struct Mdf3Builder {
    bytes: Vec<u8>,
    big_endian: bool,
}

impl Mdf3Builder {
    pub fn new(big_endian: bool) -> Self {
        Self {
            bytes: id_block("3.30    ", 330, big_endian),
            big_endian,
        }
    }

    fn u16(&self, value: u16) -> [u8; 2] {
        if self.big_endian {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        }
    }

    fn u32(&self, value: u32) -> [u8; 4] {
        if self.big_endian {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        }
    }

    pub fn block(&mut self, tag: &str, links: &[u32], body: &[u8]) -> u64 {
        let address = self.bytes.len() as u64;
        let length = (4 + 4 * links.len() + body.len()) as u16;
        self.bytes.extend_from_slice(tag.as_bytes());
        let length = self.u16(length);
        self.bytes.extend_from_slice(&length);
        for &link in links {
            let link = self.u32(link);
            self.bytes.extend_from_slice(&link);
        }
        self.bytes.extend_from_slice(body);
        address
    }

    pub fn set_link(&mut self, block: u64, slot: usize, target: u64) {
        let at = block as usize + 4 + 4 * slot;
        let value = self.u32(target as u32);
        self.bytes[at..at + 4].copy_from_slice(&value);
    }

    /// HD with a data group count of `groups`.
    pub fn header(&mut self, groups: u16) -> u64 {
        let mut body = self.u16(groups).to_vec();
        body.resize(148, 0);
        self.block("HD", &[0; 3], &body)
    }

    pub fn data_group(&mut self, channel_groups: u16, record_ids: u16) -> u64 {
        let mut body = self.u16(channel_groups).to_vec();
        body.extend_from_slice(&self.u16(record_ids));
        body.extend_from_slice(&[0u8; 4]);
        self.block("DG", &[0; 4], &body)
    }

    pub fn channel_group(&mut self, record_id: u16, record_size: u16, cycles: u32) -> u64 {
        let mut body = self.u16(record_id).to_vec();
        body.extend_from_slice(&self.u16(1));
        body.extend_from_slice(&self.u16(record_size));
        body.extend_from_slice(&self.u32(cycles));
        self.block("CG", &[0; 3], &body)
    }

    /// Raw record bytes without any block header.
    pub fn raw(&mut self, payload: &[u8]) -> u64 {
        let address = self.bytes.len() as u64;
        self.bytes.extend_from_slice(payload);
        address
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Header and links of an MDF 4.x block in a finished file.
#[derive(Debug)]
pub struct Block4 {
    pub tag: String,
    pub length: u64,
    pub links: Vec<u64>,
}

pub fn block4(bytes: &[u8], address: u64) -> Block4 {
    let a = address as usize;
    let u64_at = |at: usize| u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap());
    let link_count = u64_at(a + 16) as usize;
    Block4 {
        tag: String::from_utf8_lossy(&bytes[a..a + 4]).into_owned(),
        length: u64_at(a + 8),
        links: (0..link_count).map(|i| u64_at(a + 24 + 8 * i)).collect(),
    }
}

/// Follow an MDF 4.x data link and return the logical section bytes.
pub fn section4(bytes: &[u8], address: u64) -> Vec<u8> {
    if address == 0 {
        return Vec::new();
    }
    let block = block4(bytes, address);
    let a = address as usize;
    match block.tag.as_str() {
        "##DT" | "##SD" | "##RD" => bytes[a + 24..a + block.length as usize].to_vec(),
        "##DZ" => {
            let dz = DzBlock::from_bytes(&bytes[a..a + 48]).unwrap();
            let end = a + 48 + dz.compressed_data_length as usize;
            dz.decompress(&bytes[a + 48..end]).unwrap()
        }
        "##HL" => section4(bytes, block.links[0]),
        "##DL" => {
            let mut out = Vec::new();
            let mut next = address;
            while next != 0 {
                let list = block4(bytes, next);
                for &child in &list.links[1..] {
                    out.extend(section4(bytes, child));
                }
                next = list.links[0];
            }
            out
        }
        other => panic!("{} is not a data block", other),
    }
}

/// Follow a link chain through `slot`.
pub fn chain4(bytes: &[u8], first: u64, slot: usize) -> Vec<u64> {
    let mut out = Vec::new();
    let mut next = first;
    while next != 0 {
        out.push(next);
        next = block4(bytes, next).links[slot];
    }
    out
}

/// Run the sorter fully in memory.
pub fn sort(input: Vec<u8>, config: SortConfig) -> Result<(Vec<u8>, ProcessSummary)> {
    let sorter = Sorter::from_reader(SliceReader::new(input), config)?;
    let (writer, summary) = sorter.write_to(VecWriter::new())?;
    Ok((writer.into_inner(), summary))
}

/// Whether the sorter would still change `bytes`.
pub fn needs_processing(bytes: Vec<u8>, config: SortConfig) -> Result<bool> {
    Ok(Sorter::from_reader(SliceReader::new(bytes), config)?.needs_processing())
}

/// Records of `size` bytes each, filled with their index.
pub fn records(count: usize, size: usize) -> Vec<u8> {
    (0..count).flat_map(|i| vec![i as u8; size]).collect()
}
