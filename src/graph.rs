//! Arena of parsed and generated blocks.
//!
//! Every block of the input becomes a [`Node`] owned by the [`BlockGraph`] and
//! addressed by a [`NodeId`]. Links are stored as node ids, never as file
//! offsets: output offsets are only known after writing and are patched in
//! a separate pass.

use std::collections::{BTreeMap, HashSet};

use crate::{
    Error, Result,
    blocks::{DataListBlock, DzBlock},
};

/// Index of a node inside its [`BlockGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Fields of a data group the rewrite needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataGroupInfo {
    /// Bytes in front of each record identifying its channel group.
    pub record_id_size: u8,
    /// 3.x only: records also end with a copy of the record id.
    pub trailing_record_id: bool,
}

/// Fields of a channel group the rewrite needs, unified across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelGroupInfo {
    pub record_id: u64,
    pub cycle_count: u64,
    pub data_bytes: u32,
    pub inval_bytes: u32,
    pub vlsd: bool,
}

impl ChannelGroupInfo {
    /// Bytes of one record after the record id.
    pub fn record_length(&self) -> u64 {
        u64::from(self.data_bytes) + u64::from(self.inval_bytes)
    }

    /// Payload bytes of a VLSD group without the length prefixes.
    pub fn vlsd_length(&self) -> u64 {
        u64::from(self.data_bytes) + (u64::from(self.inval_bytes) << 32)
    }
}

/// Type specific view of a node, set once by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    /// Discovered through a link but not parsed yet.
    Unresolved,
    /// Copied verbatim; only its links are followed.
    Generic,
    Header,
    DataGroup(DataGroupInfo),
    ChannelGroup(ChannelGroupInfo),
    Channel { channel_type: u8 },
    DataList(DataListBlock),
    HeaderList,
    /// DT, SD or RD. `header_len` is 0 for headerless 3.x data.
    Data { header_len: u64 },
    Zipped(DzBlock),
    FileHistory,
}

/// What is wrong with a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProblemKind {
    UnsortedData,
    ZippedData,
    UnzippedData,
    LinkedDataList,
}

/// A subtree that has to be rewritten. `parent` is the block linking to
/// `start` and is filled in by the second classification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Problem {
    pub kind: ProblemKind,
    pub start: NodeId,
    pub parent: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Node {
    /// Input offset; 0 for blocks created during the rewrite.
    pub address: u64,
    pub tag: String,
    pub length: u64,
    pub links: Vec<Option<NodeId>>,
    /// Byte offset of each link slot within the block.
    pub link_offsets: Vec<u64>,
    /// Bytes the rewrite may re-serialize. Header only for bulk data.
    pub image: Vec<u8>,
    pub kind: BlockKind,
    pub output_position: Option<u64>,
    pub problems: Vec<Problem>,
    pub touched: bool,
    /// Set on a data group replaced by sorted copies: the last copy.
    pub superseded_by: Option<NodeId>,
}

impl Node {
    fn placeholder(address: u64) -> Self {
        Self {
            address,
            tag: String::new(),
            length: 0,
            links: Vec::new(),
            link_offsets: Vec::new(),
            image: Vec::new(),
            kind: BlockKind::Unresolved,
            output_position: None,
            problems: Vec::new(),
            touched: false,
            superseded_by: None,
        }
    }

    /// Replace the `Unresolved` kind. A node is specialized only once.
    pub fn specialize(&mut self, kind: BlockKind) -> Result<()> {
        if self.kind != BlockKind::Unresolved {
            return Err(Error::DuplicateAddress(self.address));
        }
        self.kind = kind;
        Ok(())
    }

    pub fn link(&self, slot: usize) -> Option<NodeId> {
        self.links.get(slot).copied().flatten()
    }

    pub fn is_data_block(&self) -> bool {
        matches!(self.kind, BlockKind::Data { .. })
    }

    /// Uncompressed content length of a data, DZ block.
    pub fn payload_len(&self) -> u64 {
        match &self.kind {
            BlockKind::Data { header_len } => self.length.saturating_sub(*header_len),
            BlockKind::Zipped(dz) => dz.original_data_length,
            _ => 0,
        }
    }

    /// Block type as seen by a reader after inflation (`##DZ` reports the
    /// type it wraps).
    pub fn content_tag(&self) -> String {
        match &self.kind {
            BlockKind::Zipped(dz) => dz.original_tag(),
            _ => self.tag.clone(),
        }
    }
}

/// Arena of all nodes plus an address index of the input blocks.
#[derive(Debug, Default)]
pub struct BlockGraph {
    nodes: Vec<Node>,
    by_address: BTreeMap<u64, NodeId>,
    root: Option<NodeId>,
}

impl BlockGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn lookup(&self, address: u64) -> Option<NodeId> {
        self.by_address.get(&address).copied()
    }

    /// Node for an input address, creating an unresolved placeholder when
    /// the address is new. The flag reports whether it was created.
    pub fn get_or_insert(&mut self, address: u64) -> (NodeId, bool) {
        if let Some(id) = self.lookup(address) {
            return (id, false);
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::placeholder(address));
        self.by_address.insert(address, id);
        (id, true)
    }

    /// Add a block that only exists in the output.
    pub fn add_output_node(
        &mut self,
        tag: &str,
        image: Vec<u8>,
        link_offsets: Vec<u64>,
        kind: BlockKind,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            address: 0,
            tag: tag.to_string(),
            length: image.len() as u64,
            links: vec![None; link_offsets.len()],
            link_offsets,
            image,
            kind,
            output_position: None,
            problems: Vec::new(),
            touched: false,
            superseded_by: None,
        });
        id
    }

    /// Input nodes in ascending address order.
    pub fn input_order(&self) -> Vec<NodeId> {
        self.by_address.values().copied().collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn link(&self, id: NodeId, slot: usize) -> Option<NodeId> {
        self.node(id).link(slot)
    }

    /// Point `slot` of `id` at `target`, growing the slot list if needed.
    pub fn set_link(&mut self, id: NodeId, slot: usize, target: Option<NodeId>) {
        let links = &mut self.node_mut(id).links;
        if links.len() <= slot {
            links.resize(slot + 1, None);
        }
        links[slot] = target;
    }

    /// Redirect the first slot of `parent` that references `old`.
    pub fn replace_link(&mut self, parent: NodeId, old: NodeId, new: Option<NodeId>) -> Result<()> {
        let node = self.node_mut(parent);
        match node.links.iter().position(|l| *l == Some(old)) {
            Some(slot) => {
                node.links[slot] = new;
                Ok(())
            }
            None => Err(Error::BlockLinkError(format!(
                "{} block at {:#x} does not link to the replaced block",
                node.tag, node.address
            ))),
        }
    }

    /// Follow `superseded_by` until the live replacement is reached.
    pub fn resolve_superseded(&self, mut id: NodeId) -> NodeId {
        while let Some(next) = self.node(id).superseded_by {
            id = next;
        }
        id
    }

    /// Follow `slot` from `first` until a null link, visiting each node once.
    pub fn chain(&self, first: Option<NodeId>, slot: usize) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = first;
        while let Some(id) = cursor {
            if !seen.insert(id) {
                break;
            }
            out.push(id);
            cursor = self.link(id, slot);
        }
        out
    }

    /// Mark everything reachable from `start` as handled by a rewrite.
    /// Touching clears any problem already recorded on a node.
    pub fn touch_subtree(&mut self, start: NodeId, include_start: bool) {
        let mut stack = vec![start];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if id != start || include_start {
                let node = self.node_mut(id);
                node.touched = true;
                node.problems.clear();
            }
            stack.extend(self.node(id).links.iter().flatten().copied());
        }
    }

    pub fn touch(&mut self, id: NodeId) {
        let node = self.node_mut(id);
        node.touched = true;
        node.problems.clear();
    }

    /// Forget the result of a previous classification.
    pub fn clear_classification(&mut self) {
        for node in &mut self.nodes {
            node.touched = false;
            node.problems.clear();
        }
    }
}
