use tracing::Span;

use super::MdfWrite;
use crate::{
    Result,
    format::FormatSchema,
    graph::{BlockGraph, NodeId},
};

/// Rewrite every link field of the written blocks with output offsets.
///
/// Blocks are visited in write order. A link to a block that was never
/// written is stored as null. Returns the number of link fields written.
pub fn patch_links<W: MdfWrite + ?Sized>(
    writer: &mut W,
    graph: &BlockGraph,
    written: &[NodeId],
    schema: &dyn FormatSchema,
    span: &Span,
) -> Result<usize> {
    let mut patched = 0;
    for &id in written {
        let node = graph.node(id);
        let Some(position) = node.output_position else {
            continue;
        };
        for (slot, &offset) in node.link_offsets.iter().enumerate() {
            let value = match node.link(slot) {
                Some(target) => match graph.node(target).output_position {
                    Some(target_position) => target_position,
                    None => {
                        tracing::warn!(
                            parent: span,
                            tag = %node.tag,
                            slot,
                            target = %graph.node(target).tag,
                            target_address = graph.node(target).address,
                            "Link to a block that was not written, storing null"
                        );
                        0
                    }
                },
                None => 0,
            };
            writer.seek(position + offset)?;
            writer.write_all(&schema.encode_link(value)?)?;
            patched += 1;
        }
    }
    writer.flush()?;
    tracing::debug!(parent: span, patched, "Links patched");
    Ok(patched)
}
