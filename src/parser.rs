//! Address ordered block graph parser.
//!
//! Blocks are parsed in ascending file order: pending addresses sit in a
//! min-heap and the lowest one is handled next. A link discovered after the
//! sweep already passed its target address is deferred to the next sweep, so
//! every sweep reads the file strictly forward. Sweeps repeat until one ends
//! without deferring anything.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use tracing::Span;

use crate::{
    Error, Result,
    format::{FormatSchema, ROOT_ADDRESS},
    graph::{BlockGraph, BlockKind, NodeId},
    reader::ByteRangeReader,
};

/// Counters reported after parsing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub runs: usize,
    pub blocks: usize,
}

pub struct Parser<'a, R: ByteRangeReader> {
    reader: &'a mut R,
    schema: &'a dyn FormatSchema,
    span: Span,
    graph: BlockGraph,
    queue: BinaryHeap<Reverse<u64>>,
    unfinished: HashSet<u64>,
    resolved: HashSet<u64>,
    stats: ParseStats,
}

impl<'a, R: ByteRangeReader> Parser<'a, R> {
    pub fn new(reader: &'a mut R, schema: &'a dyn FormatSchema, span: &Span) -> Self {
        Self {
            reader,
            schema,
            span: span.clone(),
            graph: BlockGraph::new(),
            queue: BinaryHeap::new(),
            unfinished: HashSet::new(),
            resolved: HashSet::new(),
            stats: ParseStats::default(),
        }
    }

    /// Parse every block reachable from the header block.
    pub fn parse(mut self) -> Result<(BlockGraph, ParseStats)> {
        let (root, _) = self.graph.get_or_insert(ROOT_ADDRESS);
        self.graph.set_root(root);
        self.enqueue(ROOT_ADDRESS);

        let mut deferred = Vec::new();
        loop {
            self.stats.runs += 1;
            let mut last_handled = 0u64;

            while let Some(Reverse(address)) = self.queue.pop() {
                if self.resolved.contains(&address) {
                    return Err(Error::DuplicateAddress(address));
                }
                if address < last_handled {
                    deferred.push(address);
                    continue;
                }
                self.parse_block(address)?;
                last_handled = address;
            }

            if deferred.is_empty() {
                break;
            }
            tracing::debug!(
                parent: &self.span,
                deferred = deferred.len(),
                "Sweep passed linked blocks, starting another"
            );
            for address in deferred.drain(..) {
                self.queue.push(Reverse(address));
            }
        }

        debug_assert!(self.unfinished.is_empty());
        let root_node = self.graph.node(root);
        if root_node.kind != BlockKind::Header {
            return Err(Error::BlockLinkError(format!(
                "expected a header block at {:#x}, found {:?}",
                ROOT_ADDRESS, root_node.tag
            )));
        }
        self.schema.resolve_implicit_lengths(&mut self.graph)?;
        self.stats.blocks = self.graph.len();

        tracing::info!(parent: &self.span, "Needed {} runs", self.stats.runs);
        tracing::info!(parent: &self.span, "Found {} blocks", self.stats.blocks);
        Ok((self.graph, self.stats))
    }

    fn enqueue(&mut self, address: u64) {
        self.unfinished.insert(address);
        self.queue.push(Reverse(address));
    }

    fn parse_block(&mut self, address: u64) -> Result<()> {
        let schema = self.schema;
        let probe = self.reader.read_range(address, schema.header_probe_len())?;
        let header = schema.decode_header(&probe)?;

        let image_len = schema.image_len(&header);
        let image = if image_len == probe.len() as u64 {
            probe
        } else {
            self.reader.read_range(address, image_len)?
        };

        let link_offsets = schema.link_offsets(&header, &image)?;
        let headerless = schema.headerless_data_slot(&header.tag);
        let mut links = Vec::with_capacity(link_offsets.len());
        for (slot, &offset) in link_offsets.iter().enumerate() {
            let target = schema.read_link(&image, offset);
            if target == 0 {
                links.push(None);
                continue;
            }
            if target >= self.reader.size() {
                return Err(Error::BlockLinkError(format!(
                    "{} block at {:#x} links past the end of the file ({:#x})",
                    header.tag, address, target
                )));
            }
            let id = if headerless == Some(slot) {
                self.headerless_data(target)?
            } else {
                let (id, created) = self.graph.get_or_insert(target);
                if created {
                    self.enqueue(target);
                } else if is_headerless(&self.graph, id) {
                    return Err(Error::DuplicateAddress(target));
                }
                id
            };
            links.push(Some(id));
        }

        let kind = schema.specialize(&header, &image)?;
        let (id, _) = self.graph.get_or_insert(address);
        let node = self.graph.node_mut(id);
        node.tag = header.tag;
        node.length = header.length;
        node.links = links;
        node.link_offsets = link_offsets;
        node.image = image;
        node.specialize(kind)?;

        self.unfinished.remove(&address);
        self.resolved.insert(address);
        Ok(())
    }

    /// Data without a block header is never read as a block; its node is
    /// complete as soon as it is discovered. The length is filled in later.
    /// An address that is also linked as a regular block is rejected.
    fn headerless_data(&mut self, address: u64) -> Result<NodeId> {
        let (id, created) = self.graph.get_or_insert(address);
        if created {
            let node = self.graph.node_mut(id);
            node.tag = self.schema.data_block_tag().to_string();
            node.kind = BlockKind::Data { header_len: 0 };
            self.resolved.insert(address);
        } else if !is_headerless(&self.graph, id) {
            return Err(Error::DuplicateAddress(address));
        }
        Ok(id)
    }
}

fn is_headerless(graph: &BlockGraph, id: NodeId) -> bool {
    matches!(graph.node(id).kind, BlockKind::Data { header_len: 0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BlockHeader, ByteOrder};
    use crate::format::{Mdf3Schema, Mdf4Schema};
    use crate::reader::SliceReader;

    fn block(tag: &str, links: &[u64], body: &[u8]) -> Vec<u8> {
        let length = 24 + links.len() * 8 + body.len();
        let mut bytes = BlockHeader::new(tag, length as u64, links.len() as u64).to_bytes();
        for link in links {
            bytes.extend_from_slice(&link.to_le_bytes());
        }
        bytes.extend_from_slice(body);
        bytes
    }

    fn place(file: &mut Vec<u8>, at: usize, bytes: &[u8]) {
        if file.len() < at + bytes.len() {
            file.resize(at + bytes.len(), 0);
        }
        file[at..at + bytes.len()].copy_from_slice(bytes);
    }

    #[test]
    fn backward_links_need_a_second_sweep() -> Result<()> {
        // HD -> DG (high) -> TX (low, behind the DG)
        let mut file = vec![0u8; 64];
        place(&mut file, 64, &block("##HD", &[512, 0], &[0u8; 8]));
        place(&mut file, 512, &block("##DG", &[0, 0, 0, 200], &[0u8; 8]));
        place(&mut file, 200, &block("##TX", &[], b"comment\0"));

        let schema = Mdf4Schema::new(410);
        let mut reader = SliceReader::new(file);
        let span = Span::none();
        let (graph, stats) = Parser::new(&mut reader, &schema, &span).parse()?;

        assert_eq!(stats.runs, 2);
        assert_eq!(stats.blocks, 3);
        let root = graph.root().unwrap();
        let dg = graph.link(root, 0).unwrap();
        let tx = graph.link(dg, 3).unwrap();
        assert_eq!(graph.node(tx).address, 200);
        assert_eq!(graph.node(tx).tag, "##TX");
        assert!(matches!(graph.node(dg).kind, BlockKind::DataGroup(_)));
        Ok(())
    }

    #[test]
    fn forward_file_needs_one_sweep() -> Result<()> {
        let mut file = vec![0u8; 64];
        place(&mut file, 64, &block("##HD", &[128], &[0u8; 8]));
        place(&mut file, 128, &block("##DT", &[], &[1, 2, 3, 4]));

        let schema = Mdf4Schema::new(410);
        let mut reader = SliceReader::new(file);
        let (graph, stats) = Parser::new(&mut reader, &schema, &Span::none()).parse()?;
        assert_eq!(stats.runs, 1);
        let dt = graph.lookup(128).unwrap();
        assert_eq!(graph.node(dt).payload_len(), 4);
        assert_eq!(graph.node(dt).image.len(), 24);
        Ok(())
    }

    #[test]
    fn link_past_end_is_rejected() {
        let mut file = vec![0u8; 64];
        place(&mut file, 64, &block("##HD", &[4096], &[0u8; 8]));
        let schema = Mdf4Schema::new(410);
        let mut reader = SliceReader::new(file);
        let result = Parser::new(&mut reader, &schema, &Span::none()).parse();
        assert!(matches!(result, Err(Error::BlockLinkError(_))));
    }

    #[test]
    fn root_must_be_a_header() {
        let mut file = vec![0u8; 64];
        place(&mut file, 64, &block("##DG", &[0, 0, 0, 0], &[0u8; 8]));
        let schema = Mdf4Schema::new(410);
        let mut reader = SliceReader::new(file);
        let result = Parser::new(&mut reader, &schema, &Span::none()).parse();
        assert!(matches!(result, Err(Error::BlockLinkError(_))));
    }

    /// 3.x block in little endian byte order.
    fn block3(tag: &str, links: &[u32], body: &[u8]) -> Vec<u8> {
        let length = (4 + links.len() * 4 + body.len()) as u16;
        let mut bytes = tag.as_bytes().to_vec();
        bytes.extend_from_slice(&length.to_le_bytes());
        for link in links {
            bytes.extend_from_slice(&link.to_le_bytes());
        }
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn block_reused_as_record_data_is_rejected() {
        // The DG's record data starts at its own channel group.
        let mut file = vec![0u8; 64];
        place(&mut file, 64, &block3("HD", &[100, 0, 0], &[1, 0]));
        place(&mut file, 100, &block3("DG", &[0, 200, 0, 200], &[1, 0, 0, 0, 0, 0, 0, 0]));
        place(&mut file, 200, &block3("CG", &[0, 0, 0], &[0; 10]));

        let schema = Mdf3Schema::new(330, ByteOrder::LittleEndian);
        let mut reader = SliceReader::new(file);
        let result = Parser::new(&mut reader, &schema, &Span::none()).parse();
        assert!(matches!(result, Err(Error::DuplicateAddress(200))));
    }
}
