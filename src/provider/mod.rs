//! Flat, randomly readable view of a data section.
//!
//! A data section may be a single DT/SD/RD block, a DZ block, or a DL chain
//! (optionally behind an HL) of such blocks. [`DataProvider`] walks the
//! structure once and maps section offsets onto blocks, so the rewrite can
//! read any byte range without caring how the input was chunked.

mod read_cache;
pub mod zip_cache;

pub use read_cache::{READ_CACHE_SIZE, ReadDataCache};
pub use zip_cache::{ZIP_CACHE_CAPACITY, ZippedDataCache};

use crate::{
    Error, Result,
    blocks::{DataListBlock, DzBlock, HeaderListBlock},
    graph::{BlockGraph, BlockKind, NodeId},
    reader::ByteRangeReader,
};

#[derive(Debug, Clone)]
enum Source {
    /// Content stored verbatim at this input offset.
    Plain { offset: u64 },
    /// Content of the DZ block at this input address.
    Zipped { address: u64, dz: DzBlock },
    /// Content held by the provider itself.
    Memory,
}

#[derive(Debug, Clone)]
struct Segment {
    start: u64,
    len: u64,
    source: Source,
}

impl Segment {
    fn contains(&self, offset: u64) -> bool {
        offset >= self.start && offset - self.start < self.len
    }
}

#[derive(Debug, Default)]
pub struct DataProvider {
    segments: Vec<Segment>,
    length: u64,
    memory: Vec<u8>,
    last_segment: Option<usize>,
    zip_cache: ZippedDataCache,
    read_cache: ReadDataCache,
}

impl DataProvider {
    /// Section starting at `start`, which may be absent (empty section).
    pub fn new(graph: &BlockGraph, start: Option<NodeId>) -> Result<Self> {
        let mut provider = Self::default();
        let Some(start) = start else {
            return Ok(provider);
        };

        let head = match graph.node(start).kind {
            BlockKind::HeaderList => graph.link(start, HeaderListBlock::LINK_FIRST_DL),
            _ => Some(start),
        };
        let Some(head) = head else {
            return Ok(provider);
        };

        match graph.node(head).kind {
            BlockKind::DataList(_) => {
                for list in graph.chain(Some(head), DataListBlock::LINK_NEXT) {
                    for child in graph.node(list).links.iter().skip(1).flatten() {
                        provider.push_block(graph, *child)?;
                    }
                }
            }
            _ => provider.push_block(graph, head)?,
        }
        Ok(provider)
    }

    /// Section backed by an in-memory buffer.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let length = data.len() as u64;
        Self {
            segments: vec![Segment {
                start: 0,
                len: length,
                source: Source::Memory,
            }],
            length,
            memory: data,
            ..Self::default()
        }
    }

    fn push_block(&mut self, graph: &BlockGraph, id: NodeId) -> Result<()> {
        let node = graph.node(id);
        let source = match &node.kind {
            BlockKind::Data { header_len } => Source::Plain {
                offset: node.address + header_len,
            },
            BlockKind::Zipped(dz) => Source::Zipped {
                address: node.address,
                dz: dz.clone(),
            },
            _ => {
                return Err(Error::BlockLinkError(format!(
                    "{} block at {:#x} cannot hold section data",
                    node.tag, node.address
                )));
            }
        };
        let len = node.payload_len();
        if len > 0 {
            self.segments.push(Segment {
                start: self.length,
                len,
                source,
            });
            self.length += len;
        }
        Ok(())
    }

    /// Total section length in bytes.
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of blocks holding the section.
    pub fn block_count(&self) -> usize {
        self.segments.len()
    }

    /// Read `length` bytes at section offset `offset`, crossing block
    /// boundaries as needed.
    pub fn read<R: ByteRangeReader + ?Sized>(
        &mut self,
        reader: &mut R,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>> {
        self.check_bounds(offset, length)?;

        let mut out = Vec::with_capacity(length as usize);
        let mut position = offset;
        let end = offset + length;
        while position < end {
            let index = self.locate(position)?;
            let segment = &self.segments[index];
            let within = position - segment.start;
            let count = (end - position).min(segment.len - within);
            self.read_segment(reader, index, within, count, &mut out)?;
            position += count;
        }
        Ok(out)
    }

    /// Like [`read`](Self::read) but served from a 64 KiB read-ahead
    /// window. Requests of at least the window size bypass it.
    pub fn cached_read<R: ByteRangeReader + ?Sized>(
        &mut self,
        reader: &mut R,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>> {
        if length >= READ_CACHE_SIZE {
            return self.read(reader, offset, length);
        }
        self.check_bounds(offset, length)?;
        if let Some(bytes) = self.read_cache.get(offset, length) {
            return Ok(bytes.to_vec());
        }

        let window = READ_CACHE_SIZE.min(self.length - offset);
        let data = self.read(reader, offset, window)?;
        let bytes = data[..length as usize].to_vec();
        self.read_cache.fill(offset, data);
        Ok(bytes)
    }

    fn check_bounds(&self, offset: u64, length: u64) -> Result<()> {
        match offset.checked_add(length) {
            Some(end) if end <= self.length => Ok(()),
            _ => Err(Error::InvalidReadAccess {
                offset,
                length,
                section_length: self.length,
            }),
        }
    }

    /// Segment holding `offset`; the last hit is tried first.
    fn locate(&mut self, offset: u64) -> Result<usize> {
        if let Some(index) = self.last_segment {
            if self.segments[index].contains(offset) {
                return Ok(index);
            }
        }
        let index = self
            .segments
            .partition_point(|segment| segment.start + segment.len <= offset);
        if index >= self.segments.len() {
            return Err(Error::InvalidReadAccess {
                offset,
                length: 0,
                section_length: self.length,
            });
        }
        self.last_segment = Some(index);
        Ok(index)
    }

    fn read_segment<R: ByteRangeReader + ?Sized>(
        &mut self,
        reader: &mut R,
        index: usize,
        within: u64,
        count: u64,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let from = within as usize;
        let to = from + count as usize;
        match &self.segments[index].source {
            Source::Plain { offset } => {
                out.extend_from_slice(&reader.read_range(offset + within, count)?);
            }
            Source::Zipped { address, dz } => {
                let data = self.zip_cache.get_or_load(reader, *address, dz)?;
                out.extend_from_slice(&data[from..to]);
            }
            Source::Memory => out.extend_from_slice(&self.memory[from..to]),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::SliceReader;

    #[test]
    fn memory_section() -> Result<()> {
        let mut provider = DataProvider::from_bytes((0u8..100).collect());
        let mut reader = SliceReader::new(Vec::new());
        assert_eq!(provider.len(), 100);
        assert_eq!(provider.read(&mut reader, 10, 3)?, vec![10, 11, 12]);
        assert_eq!(provider.cached_read(&mut reader, 98, 2)?, vec![98, 99]);
        assert!(matches!(
            provider.read(&mut reader, 99, 2),
            Err(Error::InvalidReadAccess { section_length: 100, .. })
        ));
        Ok(())
    }

    #[test]
    fn empty_section() -> Result<()> {
        let graph = BlockGraph::new();
        let mut provider = DataProvider::new(&graph, None)?;
        let mut reader = SliceReader::new(Vec::new());
        assert!(provider.is_empty());
        assert_eq!(provider.read(&mut reader, 0, 0)?, Vec::<u8>::new());
        assert!(provider.read(&mut reader, 0, 1).is_err());
        Ok(())
    }

    #[test]
    fn reads_span_blocks() -> Result<()> {
        let mut graph = BlockGraph::new();
        let mut file = vec![0u8; 200];
        // Two headerless blocks at 10 and 100.
        file[10..15].copy_from_slice(&[1, 2, 3, 4, 5]);
        file[100..103].copy_from_slice(&[6, 7, 8]);

        let (a, _) = graph.get_or_insert(10);
        let (b, _) = graph.get_or_insert(100);
        let (dl, _) = graph.get_or_insert(150);
        for (id, len) in [(a, 5), (b, 3)] {
            let node = graph.node_mut(id);
            node.kind = BlockKind::Data { header_len: 0 };
            node.length = len;
        }
        graph.node_mut(dl).kind = BlockKind::DataList(DataListBlock::new_equal(2, 5));
        graph.set_link(dl, 0, None);
        graph.set_link(dl, 1, Some(a));
        graph.set_link(dl, 2, Some(b));

        let mut provider = DataProvider::new(&graph, Some(dl))?;
        let mut reader = SliceReader::new(file);
        assert_eq!(provider.len(), 8);
        assert_eq!(provider.block_count(), 2);
        assert_eq!(provider.read(&mut reader, 3, 4)?, vec![4, 5, 6, 7]);
        assert_eq!(provider.cached_read(&mut reader, 0, 8)?, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(provider.cached_read(&mut reader, 6, 2)?, vec![7, 8]);
        Ok(())
    }
}
