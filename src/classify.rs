//! Decides which subtrees of the graph violate the sorted, uncompressed
//! subset and records one [`Problem`] per offending subtree.

use std::collections::HashSet;

use serde::Serialize;
use tracing::Span;

use crate::{
    Result,
    blocks::{ChannelGroupBlock, DataGroupBlock, DataListBlock, HeaderListBlock},
    config::SortConfig,
    format::FormatSchema,
    graph::{BlockGraph, BlockKind, NodeId, Problem, ProblemKind},
};

/// Number of problems found, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProblemCounts {
    pub unsorted_data: usize,
    pub zipped_data: usize,
    pub unzipped_data: usize,
    pub linked_data_list: usize,
}

impl ProblemCounts {
    pub fn total(&self) -> usize {
        self.unsorted_data + self.zipped_data + self.unzipped_data + self.linked_data_list
    }

    pub fn any(&self) -> bool {
        self.total() > 0
    }

    fn count(&mut self, kind: ProblemKind) {
        match kind {
            ProblemKind::UnsortedData => self.unsorted_data += 1,
            ProblemKind::ZippedData => self.zipped_data += 1,
            ProblemKind::UnzippedData => self.unzipped_data += 1,
            ProblemKind::LinkedDataList => self.linked_data_list += 1,
        }
    }
}

pub struct Classifier<'a> {
    schema: &'a dyn FormatSchema,
    config: &'a SortConfig,
    span: Span,
}

impl<'a> Classifier<'a> {
    pub fn new(schema: &'a dyn FormatSchema, config: &'a SortConfig, span: &Span) -> Self {
        Self {
            schema,
            config,
            span: span.clone(),
        }
    }

    /// Tag every node with at most one problem, then attach each problem's
    /// parent. Results of an earlier run are discarded first.
    pub fn classify(&self, graph: &mut BlockGraph) -> Result<ProblemCounts> {
        graph.clear_classification();
        let continued = continued_lists(graph);

        for id in graph.input_order() {
            if graph.node(id).touched {
                continue;
            }
            if self.schema.supports_data_lists() {
                self.check_mdf4(graph, id, &continued);
            }
            self.check_data_group(graph, id);
        }

        let mut counts = ProblemCounts::default();
        for parent in graph.ids().collect::<Vec<_>>() {
            let targets: Vec<NodeId> = graph.node(parent).links.iter().flatten().copied().collect();
            for target in targets {
                for problem in &mut graph.node_mut(target).problems {
                    problem.parent = Some(parent);
                }
            }
        }
        for id in graph.ids() {
            for problem in &graph.node(id).problems {
                counts.count(problem.kind);
                tracing::debug!(
                    parent: &self.span,
                    kind = ?problem.kind,
                    tag = %graph.node(id).tag,
                    address = graph.node(id).address,
                    "Problem found"
                );
            }
        }
        Ok(counts)
    }

    /// Lists reached through another list's next link are judged with the
    /// head of their chain and never carry a problem of their own.
    fn check_mdf4(&self, graph: &mut BlockGraph, id: NodeId, continued: &HashSet<NodeId>) {
        let kind = match &graph.node(id).kind {
            BlockKind::HeaderList => {
                let dl = graph.link(id, HeaderListBlock::LINK_FIRST_DL);
                let improvable = dl.is_some_and(|dl| self.chain_is_improvable(graph, dl));
                if !(improvable || self.config.is_unzip()) {
                    return;
                }
                graph.touch_subtree(id, false);
                ProblemKind::LinkedDataList
            }
            BlockKind::DataList(_) => {
                if continued.contains(&id) || !self.chain_is_improvable(graph, id) {
                    return;
                }
                graph.touch_subtree(id, false);
                ProblemKind::LinkedDataList
            }
            BlockKind::Zipped(_) if self.config.is_unzip() => ProblemKind::ZippedData,
            BlockKind::Data { .. } if self.config.is_zip() => ProblemKind::UnzippedData,
            _ => return,
        };
        add_problem(graph, id, kind);
    }

    fn check_data_group(&self, graph: &mut BlockGraph, id: NodeId) {
        if !matches!(graph.node(id).kind, BlockKind::DataGroup(_)) {
            return;
        }
        let first_cg = graph.link(id, DataGroupBlock::LINK_FIRST_CG);
        let groups = graph.chain(first_cg, ChannelGroupBlock::LINK_NEXT);
        if groups.len() <= 1 {
            return;
        }

        for cg in groups {
            graph.touch(cg);
        }
        let slot = self.schema.data_link_slot(&graph.node(id).tag);
        if let Some(data) = slot.and_then(|slot| graph.link(id, slot)) {
            graph.touch_subtree(data, true);
        }
        add_problem(graph, id, ProblemKind::UnsortedData);
    }

    /// Whether any list of the chain starting at `head` needs re-chunking.
    fn chain_is_improvable(&self, graph: &BlockGraph, head: NodeId) -> bool {
        graph
            .chain(Some(head), DataListBlock::LINK_NEXT)
            .into_iter()
            .any(|dl| self.is_improvable(graph, dl))
    }

    /// Whether re-chunking the list `dl` changes anything.
    fn is_improvable(&self, graph: &BlockGraph, dl: NodeId) -> bool {
        let BlockKind::DataList(list) = &graph.node(dl).kind else {
            return false;
        };
        let max = self.config.max_block_size;
        let children: Vec<NodeId> = graph.node(dl).links.iter().skip(1).flatten().copied().collect();

        if list.count == 0 || children.is_empty() {
            return true;
        }
        if list.count == 1 && graph.node(children[0]).length < max {
            return true;
        }
        if self.config.override_size {
            return true;
        }
        if self.config.is_zip() && self.chain_has_plain_data(graph, dl) {
            return true;
        }
        if let Some(equal_length) = list.equal_length {
            return equal_length < max;
        }
        if graph.link(dl, DataListBlock::LINK_NEXT).is_some() {
            return true;
        }

        let last = children[children.len() - 1];
        let last_offset = list.offsets.last().copied().unwrap_or(0);
        let needed = (last_offset + graph.node(last).payload_len()) / max + 1;
        needed < u64::from(list.count)
    }

    fn chain_has_plain_data(&self, graph: &BlockGraph, dl: NodeId) -> bool {
        graph
            .chain(Some(dl), DataListBlock::LINK_NEXT)
            .into_iter()
            .flat_map(|list| graph.node(list).links.iter().skip(1).flatten().copied())
            .any(|child| graph.node(child).is_data_block())
    }
}

/// Lists that are the next link of another list.
fn continued_lists(graph: &BlockGraph) -> HashSet<NodeId> {
    graph
        .ids()
        .filter(|&id| matches!(graph.node(id).kind, BlockKind::DataList(_)))
        .filter_map(|id| graph.link(id, DataListBlock::LINK_NEXT))
        .collect()
}

fn add_problem(graph: &mut BlockGraph, id: NodeId, kind: ProblemKind) {
    let node = graph.node_mut(id);
    if node.touched {
        return;
    }
    node.problems.push(Problem {
        kind,
        start: id,
        parent: None,
    });
}
