use std::collections::VecDeque;

use crate::{
    Result,
    blocks::{DZ_HEADER_SIZE, DzBlock},
    reader::ByteRangeReader,
};

/// Number of inflated blocks kept in memory.
pub const ZIP_CACHE_CAPACITY: usize = 3;

/// Inflated DZ payloads keyed by input address, oldest evicted first.
#[derive(Debug, Default)]
pub struct ZippedDataCache {
    entries: VecDeque<(u64, Vec<u8>)>,
    loads: usize,
}

impl ZippedDataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload of the DZ block at `address`, inflating it on a miss.
    pub fn get_or_load<R: ByteRangeReader + ?Sized>(
        &mut self,
        reader: &mut R,
        address: u64,
        dz: &DzBlock,
    ) -> Result<&[u8]> {
        let index = match self.entries.iter().position(|(a, _)| *a == address) {
            Some(index) => index,
            None => {
                let compressed =
                    reader.read_range(address + DZ_HEADER_SIZE as u64, dz.compressed_data_length)?;
                let data = dz.decompress(&compressed)?;
                if self.entries.len() == ZIP_CACHE_CAPACITY {
                    self.entries.pop_front();
                }
                self.entries.push_back((address, data));
                self.loads += 1;
                self.entries.len() - 1
            }
        };
        Ok(self.entries[index].1.as_slice())
    }

    /// How many times a block had to be inflated.
    pub fn loads(&self) -> usize {
        self.loads
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
