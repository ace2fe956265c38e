//! Graph Traversal
//!
//! One recursive engine walks upstream from a node and hands every step to
//! a `Visitor`:
//!
//! 1. `enter` the node
//! 2. for each upstream child, in order, ask `traverse_child`; a `false`
//!    skips that child's whole subtree but not its siblings
//! 3. `leave` the node on the way back up
//!
//! Which children a node has comes from its behavior: inputs for ordinary
//! nodes, the root member for groups, the external input for adaptors. The
//! behavior may also remap the context handed to each child.
//!
//! ```rust,ignore
//! let mut search = MetaEvalPath::new(leaf);
//! graph.traverse(root, &graph.context_for_frame(1), &mut search)?;
//! if search.found() {
//!     println!("{:?}", search.path());
//! }
//! ```

mod policies;

pub use policies::{
    ClosestByTypeNameVisitor, EvalStep, MetaEvalClosestByTypeName, MetaEvalCollector,
    MetaEvalFirstClosestByTypeName, MetaEvalPath, PropertyAsFramesVisitor,
};

use tracing::error;

use crate::error::Result;
use crate::eval::Context;
use crate::graph::{Graph, NodeId};

/// Strategy driving `Graph::traverse`.
pub trait Visitor {
    fn enter(&mut self, graph: &Graph, context: &Context, node: NodeId);

    /// Whether to descend into `child`, the `index`th child of `parent`.
    fn traverse_child(
        &mut self,
        graph: &Graph,
        context: &Context,
        index: usize,
        parent: NodeId,
        child: NodeId,
    ) -> bool;

    fn leave(&mut self, _graph: &Graph, _context: &Context, _node: NodeId) {}
}

impl Graph {
    /// Walk upstream from `root`, driven by `visitor`.
    ///
    /// Stale child handles are logged and skipped.
    pub fn traverse<V>(&self, root: NodeId, context: &Context, visitor: &mut V) -> Result<()>
    where
        V: Visitor + ?Sized,
    {
        let node = self.node(root)?;
        let behavior = node.definition().behavior();
        let children = behavior.traversal_children(node);

        visitor.enter(self, context, root);

        for (index, child) in children.into_iter().enumerate() {
            if !self.contains(child) {
                error!(node = %node.name(), index, "traversal reached a dangling input");
                continue;
            }

            let child_context = behavior.input_context(node, index, context);
            if visitor.traverse_child(self, &child_context, index, root, child) {
                self.traverse(child, &child_context, visitor)?;
            }
        }

        visitor.leave(self, context, root);
        Ok(())
    }

    /// The chain of nodes from `root` down to `leaf`, if `leaf` is
    /// reachable through searchable nodes.
    pub fn path_to(&self, root: NodeId, leaf: NodeId, context: &Context) -> Result<Option<Vec<EvalStep>>> {
        let mut search = MetaEvalPath::new(leaf);
        self.traverse(root, context, &mut search)?;
        Ok(search.found().then(|| search.into_path()))
    }

    /// The nearest upstream nodes of protocol `type_name`.
    pub fn closest_of_type(
        &self,
        root: NodeId,
        type_name: &str,
        context: &Context,
    ) -> Result<Vec<EvalStep>> {
        let mut search = MetaEvalClosestByTypeName::new(type_name);
        self.traverse(root, context, &mut search)?;
        Ok(search.into_found())
    }
}
