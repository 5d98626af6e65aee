//! Re-chunking of data sections.
//!
//! A [`SplitMerger`] receives the bytes of one data section in order and
//! writes them as blocks of at most `max` bytes each. A section that fits
//! one block becomes a single DT/SD (or DZ) block. A larger one becomes a
//! chain of DL blocks with up to [`MAX_LIST_COUNT`] children each, behind an
//! HL block when compressing. Every block but the last carries exactly
//! `max` bytes.

use tracing::Span;

use crate::{
    Error, Result,
    blocks::{DataListBlock, DzBlock, HeaderListBlock, compress},
    format::FormatSchema,
    graph::{BlockGraph, BlockKind, NodeId},
    provider::DataProvider,
    reader::ByteRangeReader,
    writer::{MAX_OUTPUT_BLOCK_SIZE, MdfWrite, OutputWriter},
};

/// Most children one DL block references.
pub const MAX_LIST_COUNT: u64 = 2048;

/// Mutable state shared by everything that emits blocks.
pub struct Emitter<'a, W> {
    pub graph: &'a mut BlockGraph,
    pub out: &'a mut OutputWriter<W>,
    pub schema: &'a dyn FormatSchema,
}

#[derive(Debug)]
pub struct SplitMerger {
    tag: String,
    parent: NodeId,
    structural_root: Option<NodeId>,
    header_list: Option<NodeId>,
    parent_list: Option<NodeId>,
    current: Option<NodeId>,
    compress: bool,
    max: u64,
    total: u64,
    data_written: u64,
    block_end: u64,
    counter: u64,
    estimated: u64,
    pending: Vec<u8>,
    span: Span,
}

impl SplitMerger {
    /// Prepare to write `total` bytes of `tag` blocks below `parent`.
    pub fn new(
        tag: &str,
        parent: NodeId,
        total: u64,
        max: u64,
        compress: bool,
        schema: &dyn FormatSchema,
        span: &Span,
    ) -> Self {
        let max = if schema.supports_data_lists() {
            max.max(1)
        } else {
            u64::MAX
        };
        let estimated = if total > max { total.div_ceil(max) } else { 1 };
        tracing::debug!(
            parent: span,
            tag,
            total,
            max,
            compress,
            blocks = estimated,
            "Rewriting data section"
        );
        Self {
            tag: tag.to_string(),
            parent,
            structural_root: None,
            header_list: None,
            parent_list: None,
            current: None,
            compress,
            max,
            total,
            data_written: 0,
            block_end: 0,
            counter: 0,
            estimated,
            pending: Vec::new(),
            span: span.clone(),
        }
    }

    /// Bytes accepted so far.
    pub fn data_written(&self) -> u64 {
        self.data_written
    }

    /// Append the complete content of the data or DZ block `node`.
    pub fn append_block<W, R>(
        &mut self,
        sink: &mut Emitter<'_, W>,
        reader: &mut R,
        node: NodeId,
    ) -> Result<()>
    where
        W: MdfWrite + Send + 'static,
        R: ByteRangeReader + ?Sized,
    {
        let mut provider = DataProvider::new(sink.graph, Some(node))?;
        let length = provider.len();
        self.append_range(sink, &mut provider, reader, 0, length)
    }

    /// Append `length` bytes read from `provider` at `offset`.
    pub fn append_range<W, R>(
        &mut self,
        sink: &mut Emitter<'_, W>,
        provider: &mut DataProvider,
        reader: &mut R,
        offset: u64,
        length: u64,
    ) -> Result<()>
    where
        W: MdfWrite + Send + 'static,
        R: ByteRangeReader + ?Sized,
    {
        self.check_room(length)?;
        let mut copied = 0u64;
        while copied < length {
            let chunk = (length - copied).min(MAX_OUTPUT_BLOCK_SIZE as u64);
            let bytes = provider.cached_read(reader, offset + copied, chunk)?;
            if bytes.len() as u64 != chunk {
                return Err(Error::DataLengthMismatch {
                    expected: chunk,
                    actual: bytes.len() as u64,
                });
            }
            self.append_bytes(sink, &bytes)?;
            copied += chunk;
        }
        Ok(())
    }

    /// Append bytes already in memory.
    pub fn append_bytes<W: MdfWrite + Send + 'static>(
        &mut self,
        sink: &mut Emitter<'_, W>,
        bytes: &[u8],
    ) -> Result<()> {
        self.check_room(bytes.len() as u64)?;
        let mut rest = bytes;
        while !rest.is_empty() {
            if self.current.is_none() {
                self.create_block(sink)?;
            }
            let n = ((self.block_end - self.data_written) as usize).min(rest.len());
            if self.compress {
                self.pending.extend_from_slice(&rest[..n]);
            } else {
                sink.out.put(&rest[..n])?;
            }
            self.data_written += n as u64;
            rest = &rest[n..];
            if self.data_written == self.block_end {
                self.finalize_block(sink)?;
            }
        }
        Ok(())
    }

    fn check_room(&self, length: u64) -> Result<()> {
        let after = self.data_written.saturating_add(length);
        if after > self.total {
            return Err(Error::DataLengthMismatch {
                expected: self.total,
                actual: after,
            });
        }
        Ok(())
    }

    fn create_block<W: MdfWrite + Send + 'static>(&mut self, sink: &mut Emitter<'_, W>) -> Result<()> {
        let block_len = if self.total < (self.counter + 1).saturating_mul(self.max) {
            self.total - self.counter * self.max
        } else {
            self.max
        };

        if self.estimated != 1 && self.counter % MAX_LIST_COUNT == 0 {
            self.create_list(sink)?;
        }

        let node = if self.compress {
            let dz = DzBlock::new(self.original_type(), block_len, 0);
            self.pending = Vec::with_capacity(block_len as usize);
            sink.graph
                .add_output_node("##DZ", Vec::new(), Vec::new(), BlockKind::Zipped(dz))
        } else {
            let header = sink.schema.data_block_header(&self.tag, block_len);
            let header_len = header.len() as u64;
            let node = sink.graph.add_output_node(
                &self.tag,
                header,
                Vec::new(),
                BlockKind::Data { header_len },
            );
            sink.graph.node_mut(node).length = header_len + block_len;
            sink.out.write_header(sink.graph, node)?;
            node
        };

        match self.parent_list {
            Some(list) => {
                let slot = (self.counter % MAX_LIST_COUNT) as usize + 1;
                sink.graph.set_link(list, slot, Some(node));
            }
            None => self.structural_root = Some(node),
        }
        self.current = Some(node);
        self.block_end = self.data_written + block_len;
        self.counter += 1;
        Ok(())
    }

    fn create_list<W: MdfWrite + Send + 'static>(&mut self, sink: &mut Emitter<'_, W>) -> Result<()> {
        if self.counter == 0 && self.compress {
            let hl = HeaderListBlock::new();
            let node = sink.graph.add_output_node(
                "##HL",
                hl.to_bytes(),
                vec![24],
                BlockKind::HeaderList,
            );
            sink.out.write_node(sink.graph, node)?;
            self.header_list = Some(node);
            self.structural_root = Some(node);
        }

        let children = (self.estimated - self.counter).min(MAX_LIST_COUNT) as u32;
        let dl = DataListBlock::new_equal(children, self.max);
        let link_offsets = (0..dl.header.link_count).map(|i| 24 + 8 * i).collect();
        let image = dl.to_bytes();
        let node = sink
            .graph
            .add_output_node("##DL", image, link_offsets, BlockKind::DataList(dl));

        match (self.parent_list, self.header_list) {
            (Some(previous), _) => sink.graph.set_link(previous, DataListBlock::LINK_NEXT, Some(node)),
            (None, Some(hl)) => sink.graph.set_link(hl, HeaderListBlock::LINK_FIRST_DL, Some(node)),
            (None, None) => self.structural_root = Some(node),
        }
        sink.out.write_node(sink.graph, node)?;
        self.parent_list = Some(node);
        Ok(())
    }

    fn finalize_block<W: MdfWrite + Send + 'static>(&mut self, sink: &mut Emitter<'_, W>) -> Result<()> {
        let Some(node) = self.current.take() else {
            return Ok(());
        };
        if self.compress {
            let data = std::mem::take(&mut self.pending);
            let compressed = compress(&data);
            let dz = DzBlock::new(self.original_type(), data.len() as u64, compressed.len() as u64);
            let image = dz.to_bytes();
            {
                let block = sink.graph.node_mut(node);
                block.length = dz.header.length;
                block.image = image;
                block.kind = BlockKind::Zipped(dz);
            }
            sink.out.write_header(sink.graph, node)?;
            sink.out.put(&compressed)?;
        }
        sink.out.align()
    }

    fn original_type(&self) -> &str {
        self.tag.trim_start_matches('#')
    }

    /// Link the written structure below the parent, replacing `old`.
    ///
    /// Returns the new first block, `None` for an empty section.
    pub fn set_links<W>(self, sink: &mut Emitter<'_, W>, old: Option<NodeId>) -> Result<Option<NodeId>> {
        if self.data_written != self.total || self.current.is_some() {
            return Err(Error::DataLengthMismatch {
                expected: self.total,
                actual: self.data_written,
            });
        }
        tracing::debug!(parent: &self.span, tag = %self.tag, blocks = self.counter, "Data section written");
        relink(sink.graph, sink.schema, self.parent, old, self.structural_root)?;
        Ok(self.structural_root)
    }
}

/// Point the data link of `parent` at `new`.
///
/// A DL parent has the child slot that held `old` replaced; its next link is
/// never a data slot. Other parents use the data slot of their block type.
pub fn relink(
    graph: &mut BlockGraph,
    schema: &dyn FormatSchema,
    parent: NodeId,
    old: Option<NodeId>,
    new: Option<NodeId>,
) -> Result<()> {
    let tag = graph.node(parent).tag.clone();
    if tag == "##DL" {
        let old = old.ok_or_else(|| {
            Error::BlockLinkError("replacing a DL entry needs the old block".to_string())
        })?;
        if graph.link(parent, DataListBlock::LINK_NEXT) == Some(old) {
            return Err(Error::UnsupportedParent(format!("{} next link", tag)));
        }
        return graph.replace_link(parent, old, new);
    }
    match schema.data_link_slot(&tag) {
        Some(slot) => {
            graph.set_link(parent, slot, new);
            Ok(())
        }
        None => Err(Error::UnsupportedParent(tag)),
    }
}
