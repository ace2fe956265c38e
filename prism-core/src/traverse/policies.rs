//! Traversal policies.
//!
//! None of these descend into a node whose `meta_searchable` flag is off.

use indexmap::{IndexMap, IndexSet};

use super::Visitor;
use crate::eval::Context;
use crate::graph::{Graph, Node, NodeId};

/// A node visited at a given frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalStep {
    pub frame: i32,
    pub node: NodeId,
}

fn searchable(graph: &Graph, id: NodeId) -> bool {
    graph.get(id).is_some_and(Node::is_meta_searchable)
}

fn has_protocol(graph: &Graph, id: NodeId, type_name: &str) -> bool {
    graph.get(id).is_some_and(|n| n.protocol() == type_name)
}

/// Records the path from the root to `leaf`. Once the leaf is entered the
/// path freezes and no further subtree is explored.
#[derive(Debug, Clone)]
pub struct MetaEvalPath {
    leaf: NodeId,
    path: Vec<EvalStep>,
    found: bool,
}

impl MetaEvalPath {
    pub fn new(leaf: NodeId) -> Self {
        Self {
            leaf,
            path: Vec::new(),
            found: false,
        }
    }

    pub fn found(&self) -> bool {
        self.found
    }

    pub fn path(&self) -> &[EvalStep] {
        &self.path
    }

    pub fn into_path(self) -> Vec<EvalStep> {
        self.path
    }
}

impl Visitor for MetaEvalPath {
    fn enter(&mut self, _graph: &Graph, context: &Context, node: NodeId) {
        self.path.push(EvalStep {
            frame: context.frame,
            node,
        });
        if node == self.leaf {
            self.found = true;
        }
    }

    fn traverse_child(&mut self, graph: &Graph, _: &Context, _: usize, _: NodeId, child: NodeId) -> bool {
        !self.found && searchable(graph, child)
    }

    fn leave(&mut self, _graph: &Graph, _context: &Context, _node: NodeId) {
        if !self.found {
            self.path.pop();
        }
    }
}

/// Every node of a protocol, without descending from a match into its own
/// inputs.
#[derive(Debug, Clone)]
pub struct MetaEvalClosestByTypeName {
    type_name: String,
    found: Vec<EvalStep>,
}

impl MetaEvalClosestByTypeName {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            found: Vec::new(),
        }
    }

    pub fn found(&self) -> &[EvalStep] {
        &self.found
    }

    pub fn into_found(self) -> Vec<EvalStep> {
        self.found
    }
}

impl Visitor for MetaEvalClosestByTypeName {
    fn enter(&mut self, graph: &Graph, context: &Context, node: NodeId) {
        if has_protocol(graph, node, &self.type_name) {
            self.found.push(EvalStep {
                frame: context.frame,
                node,
            });
        }
    }

    fn traverse_child(&mut self, graph: &Graph, _: &Context, _: usize, parent: NodeId, child: NodeId) -> bool {
        searchable(graph, child) && self.found.last().map_or(true, |last| last.node != parent)
    }
}

/// Stops at the first node of a protocol.
#[derive(Debug, Clone)]
pub struct MetaEvalFirstClosestByTypeName {
    type_name: String,
    found: Option<EvalStep>,
}

impl MetaEvalFirstClosestByTypeName {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            found: None,
        }
    }

    pub fn found(&self) -> Option<EvalStep> {
        self.found
    }
}

impl Visitor for MetaEvalFirstClosestByTypeName {
    fn enter(&mut self, graph: &Graph, context: &Context, node: NodeId) {
        if self.found.is_none() && has_protocol(graph, node, &self.type_name) {
            self.found = Some(EvalStep {
                frame: context.frame,
                node,
            });
        }
    }

    fn traverse_child(&mut self, graph: &Graph, _: &Context, _: usize, _: NodeId, child: NodeId) -> bool {
        self.found.is_none() && searchable(graph, child)
    }
}

/// Every node entered, in visiting order.
#[derive(Debug, Clone, Default)]
pub struct MetaEvalCollector {
    steps: Vec<EvalStep>,
}

impl MetaEvalCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[EvalStep] {
        &self.steps
    }
}

impl Visitor for MetaEvalCollector {
    fn enter(&mut self, _graph: &Graph, context: &Context, node: NodeId) {
        self.steps.push(EvalStep {
            frame: context.frame,
            node,
        });
    }

    fn traverse_child(&mut self, graph: &Graph, _: &Context, _: usize, _: NodeId, child: NodeId) -> bool {
        searchable(graph, child)
    }
}

/// Collects an integer list property from upstream nodes and maps it into
/// each downstream node's frames.
///
/// Frames flow through `NodeBehavior::map_input_to_eval_frames`, so retimes
/// and sequences translate them on the way. A node already holding frames
/// is not visited again. `max_depth` bounds how many property carrying nodes
/// may be stacked on the current path before descent stops.
#[derive(Debug, Clone)]
pub struct PropertyAsFramesVisitor {
    property: String,
    max_depth: usize,
    current_depth: usize,
    frames: IndexMap<NodeId, Vec<i32>>,
}

impl PropertyAsFramesVisitor {
    pub fn new(property: impl Into<String>, max_depth: usize) -> Self {
        Self {
            property: property.into(),
            max_depth,
            current_depth: 0,
            frames: IndexMap::new(),
        }
    }

    /// Frames collected for `node`.
    pub fn frames(&self, node: NodeId) -> Option<&[i32]> {
        self.frames.get(&node).map(Vec::as_slice)
    }

    fn carries_property(&self, graph: &Graph, node: NodeId) -> bool {
        graph
            .get(node)
            .is_some_and(|n| n.properties().ints(&self.property).is_some())
    }
}

impl Visitor for PropertyAsFramesVisitor {
    fn enter(&mut self, graph: &Graph, _context: &Context, node: NodeId) {
        if let Some(values) = graph.get(node).and_then(|n| n.properties().ints(&self.property)) {
            self.frames.insert(node, values.to_vec());
            self.current_depth += 1;
        }
    }

    fn traverse_child(&mut self, graph: &Graph, _: &Context, _: usize, _: NodeId, child: NodeId) -> bool {
        searchable(graph, child)
            && self.current_depth <= self.max_depth
            && !self.frames.contains_key(&child)
    }

    fn leave(&mut self, graph: &Graph, _context: &Context, node: NodeId) {
        let Some(n) = graph.get(node) else {
            return;
        };
        let behavior = n.definition().behavior();

        for (index, child) in behavior.traversal_children(n).into_iter().enumerate() {
            let Some(child_frames) = self.frames.get(&child) else {
                continue;
            };
            let mapped = behavior.map_input_to_eval_frames(n, index, child_frames);
            self.frames.entry(node).or_default().extend(mapped);
        }

        if self.carries_property(graph, node) {
            self.current_depth = self.current_depth.saturating_sub(1);
        }
    }
}

/// Protocol search over topology only, collecting matches into an ordered
/// set. Descent stops once more than `max_depth` matches are stacked on the
/// current path, so a depth of zero finds the nearest matches only.
#[derive(Debug, Clone)]
pub struct ClosestByTypeNameVisitor {
    type_name: String,
    max_depth: usize,
    current_depth: usize,
    nodes: IndexSet<NodeId>,
}

impl ClosestByTypeNameVisitor {
    pub fn new(type_name: impl Into<String>, max_depth: usize) -> Self {
        Self {
            type_name: type_name.into(),
            max_depth,
            current_depth: 0,
            nodes: IndexSet::new(),
        }
    }

    pub fn nodes(&self) -> &IndexSet<NodeId> {
        &self.nodes
    }
}

impl Visitor for ClosestByTypeNameVisitor {
    fn enter(&mut self, graph: &Graph, _context: &Context, node: NodeId) {
        if has_protocol(graph, node, &self.type_name) {
            self.nodes.insert(node);
            self.current_depth += 1;
        }
    }

    fn traverse_child(&mut self, graph: &Graph, _: &Context, _: usize, _: NodeId, child: NodeId) -> bool {
        searchable(graph, child) && self.current_depth <= self.max_depth
    }

    fn leave(&mut self, graph: &Graph, _context: &Context, node: NodeId) {
        if has_protocol(graph, node, &self.type_name) {
            self.current_depth = self.current_depth.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::eval::NodeBehavior;
    use crate::graph::{NodeDefinition, PropertyValue};
    use std::sync::Arc;

    /// Shifts input frames by a fixed offset.
    struct Offset(i32);

    impl NodeBehavior for Offset {
        fn map_input_to_eval_frames(&self, _: &Node, _: usize, frames: &[i32]) -> Vec<i32> {
            frames.iter().map(|f| f + self.0).collect()
        }
    }

    struct Chain {
        graph: Graph,
        ctx: Context,
    }

    impl Chain {
        fn new() -> Self {
            let graph = Graph::default();
            let ctx = graph.context_for_frame(10);
            Self { graph, ctx }
        }

        fn add(&mut self, name: &str, protocol: &str, inputs: &[NodeId]) -> NodeId {
            let def = NodeDefinition::new(protocol, 1).with_inputs(0, None);
            self.add_def(name, def, inputs)
        }

        fn add_def(&mut self, name: &str, def: NodeDefinition, inputs: &[NodeId]) -> NodeId {
            let id = self.graph.new_node(name, Arc::new(def), None).unwrap();
            self.graph.set_inputs(id, inputs).unwrap();
            id
        }

        fn run<V: Visitor>(&self, root: NodeId, visitor: &mut V) -> Result<()> {
            self.graph.traverse(root, &self.ctx, visitor)
        }
    }

    #[test]
    fn path_freezes_at_leaf() {
        let mut g = Chain::new();
        let leaf = g.add("leaf", "Source", &[]);
        let other = g.add("other", "Source", &[]);
        let mid = g.add("mid", "Color", &[leaf]);
        let root = g.add("root", "Stack", &[mid, other]);

        let path = g.graph.path_to(root, leaf, &g.ctx).unwrap().unwrap();
        let nodes: Vec<_> = path.iter().map(|s| s.node).collect();
        assert_eq!(nodes, vec![root, mid, leaf]);
        assert!(path.iter().all(|s| s.frame == 10));

        assert!(g.graph.path_to(mid, other, &g.ctx).unwrap().is_none());
    }

    #[test]
    fn searches_skip_unsearchable_nodes() {
        let mut g = Chain::new();
        let leaf = g.add("leaf", "Source", &[]);
        let hidden = g.add_def(
            "hidden",
            NodeDefinition::new("Cache", 1)
                .with_inputs(0, None)
                .meta_searchable(false),
            &[leaf],
        );
        let root = g.add("root", "Stack", &[hidden]);

        assert!(g.graph.path_to(root, leaf, &g.ctx).unwrap().is_none());

        let mut all = MetaEvalCollector::new();
        g.run(root, &mut all).unwrap();
        assert_eq!(all.steps().len(), 1);
    }

    #[test]
    fn closest_by_type_does_not_descend_through_matches() {
        let mut g = Chain::new();
        let deep = g.add("deep", "Color", &[]);
        let near = g.add("near", "Color", &[deep]);
        let side = g.add("side", "Color", &[]);
        let root = g.add("root", "Stack", &[near, side]);

        let found: Vec<_> = g
            .graph
            .closest_of_type(root, "Color", &g.ctx)
            .unwrap()
            .into_iter()
            .map(|s| s.node)
            .collect();
        assert_eq!(found, vec![near, side]);

        let mut first = MetaEvalFirstClosestByTypeName::new("Color");
        g.run(root, &mut first).unwrap();
        assert_eq!(first.found().map(|s| s.node), Some(near));
    }

    #[test]
    fn depth_limited_search_counts_stacked_matches() {
        let mut g = Chain::new();
        let c3 = g.add("c3", "Color", &[]);
        let c2 = g.add("c2", "Color", &[c3]);
        let c1 = g.add("c1", "Color", &[c2]);
        let root = g.add("root", "Stack", &[c1]);

        let mut nearest = ClosestByTypeNameVisitor::new("Color", 0);
        g.run(root, &mut nearest).unwrap();
        assert_eq!(nearest.nodes().iter().copied().collect::<Vec<_>>(), vec![c1]);

        let mut two = ClosestByTypeNameVisitor::new("Color", 1);
        g.run(root, &mut two).unwrap();
        assert_eq!(two.nodes().iter().copied().collect::<Vec<_>>(), vec![c1, c2]);
    }

    #[test]
    fn property_frames_are_remapped_downstream() {
        let mut g = Chain::new();
        let source = g.add("source", "Source", &[]);
        g.graph
            .set_property(source, "marks.frames", PropertyValue::Int(vec![1, 5]))
            .unwrap();
        let retime = g.add_def(
            "retime",
            NodeDefinition::new("Retime", 1)
                .with_inputs(0, Some(1))
                .with_behavior(Arc::new(Offset(100))),
            &[source],
        );
        let root = g.add("root", "Stack", &[retime]);

        let mut visitor = PropertyAsFramesVisitor::new("marks.frames", 4);
        g.run(root, &mut visitor).unwrap();

        assert_eq!(visitor.frames(source), Some(&[1, 5][..]));
        assert_eq!(visitor.frames(retime), Some(&[101, 105][..]));
        assert_eq!(visitor.frames(root), Some(&[101, 105][..]));
    }
}
