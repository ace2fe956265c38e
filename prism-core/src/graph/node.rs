//! Graph Nodes
//!
//! This module defines the vertex type stored in the graph arena. A node never
//! owns the nodes it is connected to: inputs and outputs are handles into the
//! arena, and the `Graph` keeps both directions consistent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexSet;
use smallvec::SmallVec;

use super::definition::NodeDefinition;
use super::property::PropertyStore;

/// Unique identifier for a node in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Ordered edge list. Duplicates are allowed and meaningful.
pub type NodeList = SmallVec<[NodeId; 4]>;

/// Per-node flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeFlags {
    /// Set once teardown starts. Suppresses all propagation through the node.
    pub deleting: bool,
    pub writable: bool,
    /// Inputs may come from other groups without a warning.
    pub unconstrained_inputs: bool,
    /// Traversal policies descend into this node.
    pub meta_searchable: bool,
    pub has_audio: bool,
    pub has_video: bool,
}

impl Default for NodeFlags {
    fn default() -> Self {
        Self {
            deleting: false,
            writable: true,
            unconstrained_inputs: false,
            meta_searchable: true,
            has_audio: false,
            has_video: false,
        }
    }
}

/// Structural role of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRole {
    /// An ordinary processing node.
    Plain,

    /// A container owning a sub-graph. Evaluation goes through `root`.
    Group {
        members: IndexSet<NodeId>,
        root: Option<NodeId>,
    },

    /// A group member standing in for one of the group's external inputs.
    Adaptor { group_input: Option<NodeId> },
}

/// A vertex in the graph.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    name: String,
    definition: Arc<NodeDefinition>,
    group: Option<NodeId>,
    role: NodeRole,

    /// Nodes this node reads from, in evaluation order.
    inputs: NodeList,

    /// Nodes whose input list contains this node, once per occurrence.
    outputs: NodeList,

    flags: NodeFlags,
    undo_ref_count: usize,
    properties: PropertyStore,
}

impl Node {
    pub(crate) fn new(
        name: String,
        definition: Arc<NodeDefinition>,
        group: Option<NodeId>,
        role: NodeRole,
    ) -> Self {
        let flags = definition.default_flags();
        Self {
            id: NodeId::new(),
            name,
            definition,
            group,
            role,
            inputs: NodeList::new(),
            outputs: NodeList::new(),
            flags,
            undo_ref_count: 0,
            properties: PropertyStore::default(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type descriptor this node was built from.
    pub fn definition(&self) -> &Arc<NodeDefinition> {
        &self.definition
    }

    /// Protocol (type) name, e.g. `"Color"`.
    pub fn protocol(&self) -> &str {
        self.definition.name()
    }

    pub fn protocol_version(&self) -> i32 {
        self.definition.version()
    }

    /// The group this node is a member of, if any.
    pub fn group(&self) -> Option<NodeId> {
        self.group
    }

    pub fn role(&self) -> &NodeRole {
        &self.role
    }

    pub(crate) fn role_mut(&mut self) -> &mut NodeRole {
        &mut self.role
    }

    pub fn is_group(&self) -> bool {
        matches!(self.role, NodeRole::Group { .. })
    }

    /// Root member of a group node.
    pub fn group_root(&self) -> Option<NodeId> {
        match &self.role {
            NodeRole::Group { root, .. } => *root,
            _ => None,
        }
    }

    pub fn minimum_inputs(&self) -> usize {
        self.definition.min_inputs()
    }

    /// `None` means unbounded.
    pub fn maximum_inputs(&self) -> Option<usize> {
        self.definition.max_inputs()
    }

    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }

    pub fn flags(&self) -> &NodeFlags {
        &self.flags
    }

    pub fn flags_mut(&mut self) -> &mut NodeFlags {
        &mut self.flags
    }

    pub fn is_deleting(&self) -> bool {
        self.flags.deleting
    }

    pub fn is_meta_searchable(&self) -> bool {
        self.flags.meta_searchable
    }

    pub fn undo_ref_count(&self) -> usize {
        self.undo_ref_count
    }

    pub(crate) fn set_undo_ref_count(&mut self, count: usize) {
        self.undo_ref_count = count;
    }

    pub fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    pub(crate) fn properties_mut(&mut self) -> &mut PropertyStore {
        &mut self.properties
    }

    /// Position of the first occurrence of `node` in the input list.
    pub fn index_of_child(&self, node: NodeId) -> Option<usize> {
        self.inputs.iter().position(|&n| n == node)
    }

    pub fn is_input(&self, node: NodeId) -> bool {
        self.inputs.contains(&node)
    }

    pub(crate) fn replace_inputs(&mut self, inputs: &[NodeId]) {
        self.inputs = inputs.iter().copied().collect();
    }

    pub(crate) fn add_output(&mut self, node: NodeId) {
        self.outputs.push(node);
    }

    /// Remove one occurrence of `node` from the output list.
    pub(crate) fn remove_output(&mut self, node: NodeId) -> bool {
        match self.outputs.iter().position(|&n| n == node) {
            Some(pos) => {
                self.outputs.remove(pos);
                true
            }
            None => false,
        }
    }
}
