//! Output side of the sorter.
//!
//! Blocks are written strictly front to back through [`OutputWriter`], which
//! records where each block landed and feeds a [`WritePipeline`] running on
//! its own thread. Link fields are written with whatever the block held and
//! fixed afterwards by [`patch_links`], once every output offset is known.

mod cache;
mod patch;
mod pipeline;
mod traits;

pub use cache::WriteDataCache;
pub use patch::patch_links;
pub use pipeline::{MAX_OUTPUT_BLOCK_SIZE, QUEUE_DEPTH, WRITE_CACHE_SIZE, WritePipeline};
pub use traits::{FileWriter, MdfWrite, VecWriter};

use tracing::Span;

use crate::{
    Error, Result,
    graph::{BlockGraph, NodeId},
    reader::ByteRangeReader,
};

/// Sequential block writer that remembers output positions.
pub struct OutputWriter<W> {
    pipeline: WritePipeline<W>,
    position: u64,
    alignment: u64,
    written: Vec<NodeId>,
}

impl<W: MdfWrite + Send + 'static> OutputWriter<W> {
    pub fn new(writer: W, alignment: u64, span: &Span) -> Result<Self> {
        Ok(Self {
            pipeline: WritePipeline::spawn(writer, span)?,
            position: 0,
            alignment: alignment.max(1),
            written: Vec::new(),
        })
    }

    /// Offset the next byte will be written at.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn put(&mut self, bytes: &[u8]) -> Result<()> {
        self.pipeline.put(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// Pad with zeros up to the next block boundary.
    pub fn align(&mut self) -> Result<()> {
        let padding = (self.alignment - self.position % self.alignment) % self.alignment;
        if padding > 0 {
            self.put(&vec![0u8; padding as usize])?;
        }
        Ok(())
    }

    /// Record that `id` starts at the current position.
    pub fn begin_node(&mut self, graph: &mut BlockGraph, id: NodeId) {
        graph.node_mut(id).output_position = Some(self.position);
        self.written.push(id);
    }

    /// Start `id` with its image; the rest of the block follows via `put`.
    pub fn write_header(&mut self, graph: &mut BlockGraph, id: NodeId) -> Result<()> {
        self.begin_node(graph, id);
        let image = std::mem::take(&mut graph.node_mut(id).image);
        let result = self.put(&image);
        graph.node_mut(id).image = image;
        result
    }

    /// Write the image of `id` as a complete block.
    pub fn write_node(&mut self, graph: &mut BlockGraph, id: NodeId) -> Result<()> {
        self.write_header(graph, id)?;
        self.align()
    }

    /// Copy `id` byte for byte from the input.
    pub fn copy_node<R: ByteRangeReader + ?Sized>(
        &mut self,
        graph: &mut BlockGraph,
        id: NodeId,
        reader: &mut R,
    ) -> Result<()> {
        self.begin_node(graph, id);
        let (address, length) = {
            let node = graph.node(id);
            (node.address, node.length)
        };

        let mut copied = 0u64;
        while copied < length {
            let chunk = (length - copied).min(MAX_OUTPUT_BLOCK_SIZE as u64);
            let bytes = reader.read_range(address + copied, chunk)?;
            if bytes.len() as u64 != chunk {
                return Err(Error::DataLengthMismatch {
                    expected: chunk,
                    actual: bytes.len() as u64,
                });
            }
            self.put(&bytes)?;
            copied += chunk;
        }
        self.align()
    }

    /// Blocks in the order they were written.
    pub fn written(&self) -> &[NodeId] {
        &self.written
    }

    /// Stop the writer thread and return the sink, the written blocks and
    /// the number of bytes written.
    pub fn finish(self) -> Result<(W, Vec<NodeId>, u64)> {
        let writer = self.pipeline.finish()?;
        Ok((writer, self.written, self.position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::BlockKind;
    use crate::reader::SliceReader;

    #[test]
    fn nodes_are_aligned_and_recorded() -> Result<()> {
        let mut graph = BlockGraph::new();
        let a = graph.add_output_node("##AA", vec![1; 5], vec![], BlockKind::Generic);
        let (b, _) = graph.get_or_insert(3);
        graph.node_mut(b).length = 4;

        let mut reader = SliceReader::new(vec![0, 0, 0, 7, 7, 7, 7]);
        let mut out = OutputWriter::new(VecWriter::new(), 8, &Span::none())?;
        out.put(&[9; 3])?;
        out.align()?;
        out.write_node(&mut graph, a)?;
        out.copy_node(&mut graph, b, &mut reader)?;

        assert_eq!(graph.node(a).output_position, Some(8));
        assert_eq!(graph.node(b).output_position, Some(16));
        assert_eq!(out.written(), &[a, b]);

        let (writer, written, size) = out.finish()?;
        assert_eq!(size, 24);
        assert_eq!(written.len(), 2);
        let bytes = writer.into_inner();
        assert_eq!(&bytes[8..13], &[1; 5]);
        assert_eq!(&bytes[16..20], &[7; 4]);
        Ok(())
    }
}
