//! Built-in node behaviors.

use super::{Context, NodeBehavior};
use crate::error::Result;
use crate::graph::{Graph, Node, NodeId, NodeList, NodeRole};
use crate::render::{ImageId, RenderImage};

/// Pass-through of the inputs. Used when a definition sets no behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBehavior;

impl NodeBehavior for DefaultBehavior {}

/// Evaluates and answers queries through the group's root member.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupBehavior;

impl NodeBehavior for GroupBehavior {
    fn evaluate(&self, graph: &Graph, node: &Node, context: &Context) -> Result<RenderImage> {
        let starved = node.minimum_inputs() > 0 && node.inputs().is_empty();
        match node.group_root() {
            Some(root) if !starved => graph.evaluate(root, context),
            _ => Ok(RenderImage::no_image(Some(node.id()), "Empty")),
        }
    }

    fn evaluate_identifier(
        &self,
        graph: &Graph,
        node: &Node,
        context: &Context,
    ) -> Result<Option<ImageId>> {
        match node.group_root() {
            Some(root) => graph.evaluate_identifier(root, context),
            None => Ok(None),
        }
    }

    fn delegate(&self, node: &Node) -> Option<NodeId> {
        node.group_root()
    }

    fn traversal_children(&self, node: &Node) -> NodeList {
        node.group_root().into_iter().collect()
    }
}

/// Stands in for one of the group's external inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptorBehavior;

impl AdaptorBehavior {
    fn group_input(node: &Node) -> Option<NodeId> {
        match node.role() {
            NodeRole::Adaptor { group_input } => *group_input,
            _ => None,
        }
    }
}

impl NodeBehavior for AdaptorBehavior {
    fn evaluate(&self, graph: &Graph, node: &Node, context: &Context) -> Result<RenderImage> {
        match Self::group_input(node) {
            Some(input) => graph.evaluate(input, context),
            None => Ok(RenderImage::no_image(Some(node.id()), "No Input")),
        }
    }

    fn evaluate_identifier(
        &self,
        graph: &Graph,
        node: &Node,
        context: &Context,
    ) -> Result<Option<ImageId>> {
        match Self::group_input(node) {
            Some(input) => graph.evaluate_identifier(input, context),
            None => Ok(None),
        }
    }

    fn delegate(&self, node: &Node) -> Option<NodeId> {
        Self::group_input(node)
    }

    fn traversal_children(&self, node: &Node) -> NodeList {
        Self::group_input(node).into_iter().collect()
    }
}
