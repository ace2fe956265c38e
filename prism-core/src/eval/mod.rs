//! Evaluation
//!
//! Evaluation is a pull protocol. Asking a node for its image asks its
//! behavior, and the default behavior asks the inputs:
//!
//! - no inputs: a "No Input" placeholder
//! - one input: that input's image, unchanged
//! - several inputs: a blend composite with one child per input, in input
//!   order, carrying the summed resource usage
//!
//! `evaluate_identifier` follows the same fan-out but builds an identifier
//! chain, and returns `None` for a node without inputs.
//!
//! Range, structure, media and audio queries go to a single delegate, the
//! first input by default. Node types with other semantics implement
//! `NodeBehavior` and override what they need.

mod behavior;

pub use behavior::{AdaptorBehavior, DefaultBehavior, GroupBehavior};

use tracing::trace;

use crate::error::Result;
use crate::graph::{Graph, Node, NodeId, NodeList};
use crate::render::{ImageId, RenderImage};

/// Per-request evaluation state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Context {
    pub frame: i32,
    pub view_width: usize,
    pub view_height: usize,
    pub fps: f32,
}

impl Context {
    pub fn with_frame(self, frame: i32) -> Self {
        Self { frame, ..self }
    }
}

/// Frame range a node can produce.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImageRangeInfo {
    pub start: i32,
    pub end: i32,
    pub inc: i32,
    pub fps: f32,
    pub cut_in: i32,
    pub cut_out: i32,
    /// The range is not known yet (media still loading).
    pub undiscovered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageStructureInfo {
    pub width: usize,
    pub height: usize,
    pub pixel_aspect: f32,
}

impl Default for ImageStructureInfo {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            pixel_aspect: 1.0,
        }
    }
}

/// Description of one media source feeding a node.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub node: NodeId,
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub has_audio: bool,
    pub has_video: bool,
}

/// Window of audio requested from a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioContext {
    pub frame: i32,
    pub rate: f64,
    pub samples: usize,
}

/// How a node type evaluates and answers queries.
///
/// Every method has a default that treats the node as a pass-through of
/// its inputs.
pub trait NodeBehavior: Send + Sync {
    fn evaluate(&self, graph: &Graph, node: &Node, context: &Context) -> Result<RenderImage> {
        graph.evaluate_inputs(node, context)
    }

    fn evaluate_identifier(
        &self,
        graph: &Graph,
        node: &Node,
        context: &Context,
    ) -> Result<Option<ImageId>> {
        graph.evaluate_input_identifiers(node, context)
    }

    /// Node that range, structure, media and audio queries forward to.
    fn delegate(&self, node: &Node) -> Option<NodeId> {
        node.inputs().first().copied()
    }

    /// Nodes a traversal descends into, in order.
    fn traversal_children(&self, node: &Node) -> NodeList {
        node.inputs().iter().copied().collect()
    }

    fn image_range_info(&self, graph: &Graph, node: &Node) -> Result<ImageRangeInfo> {
        match self.delegate(node) {
            Some(id) => graph.image_range_info(id),
            None => Ok(ImageRangeInfo::default()),
        }
    }

    fn image_structure_info(
        &self,
        graph: &Graph,
        node: &Node,
        context: &Context,
    ) -> Result<ImageStructureInfo> {
        match self.delegate(node) {
            Some(id) => graph.image_structure_info(id, context),
            None => Ok(ImageStructureInfo::default()),
        }
    }

    fn media_info(&self, graph: &Graph, node: &Node, context: &Context) -> Result<Vec<MediaInfo>> {
        match self.delegate(node) {
            Some(id) => graph.media_info(id, context),
            None => Ok(Vec::new()),
        }
    }

    fn is_media_active(&self, graph: &Graph, node: &Node) -> Result<bool> {
        match self.delegate(node) {
            Some(id) => graph.is_media_active(id),
            None => Ok(false),
        }
    }

    /// Forward to every upstream node. The list is copied first.
    fn set_media_active(&self, graph: &Graph, node: &Node, state: bool) -> Result<()> {
        for upstream in self.traversal_children(node) {
            graph.set_media_active(upstream, state)?;
        }
        Ok(())
    }

    /// Returns the number of samples written.
    fn audio_fill_buffer(&self, graph: &Graph, node: &Node, context: &AudioContext) -> Result<usize> {
        match self.delegate(node) {
            Some(id) => graph.audio_fill_buffer(id, context),
            None => Ok(0),
        }
    }

    /// Map frames of input `input_index` to this node's frames.
    fn map_input_to_eval_frames(&self, _node: &Node, _input_index: usize, frames: &[i32]) -> Vec<i32> {
        frames.to_vec()
    }

    /// Context handed to input `input_index` during traversal.
    fn input_context(&self, _node: &Node, _input_index: usize, context: &Context) -> Context {
        *context
    }

    /// Input slot fed by output `source_output` of `source`. Layout and
    /// sequence style nodes that split a source across slots override this.
    fn map_to_input_index(&self, node: &Node, source: NodeId, _source_output: usize) -> Option<usize> {
        node.index_of_child(source)
    }
}

impl Graph {
    /// Evaluate `id` into a freshly built render tree.
    pub fn evaluate(&self, id: NodeId, context: &Context) -> Result<RenderImage> {
        let node = self.node(id)?;
        trace!(node = %node.name(), frame = context.frame, "evaluate");
        node.definition().behavior().evaluate(self, node, context)
    }

    /// The default fan-out over the inputs of `node`.
    ///
    /// On failure the partially built composite is dropped and the error
    /// returned.
    pub fn evaluate_inputs(&self, node: &Node, context: &Context) -> Result<RenderImage> {
        match node.inputs() {
            [] => Ok(RenderImage::no_image(Some(node.id()), "No Input")),
            [only] => self.evaluate(*only, context),
            inputs => {
                let mut head = RenderImage::new(Some(node.id()));
                for &input in inputs {
                    head.append_child(self.evaluate(input, context)?);
                }
                head.record_resource_usage();
                Ok(head)
            }
        }
    }

    pub fn evaluate_identifier(&self, id: NodeId, context: &Context) -> Result<Option<ImageId>> {
        let node = self.node(id)?;
        node.definition()
            .behavior()
            .evaluate_identifier(self, node, context)
    }

    /// Identifier counterpart of `evaluate_inputs`. Inputs without an
    /// identifier are left out of the chain.
    pub fn evaluate_input_identifiers(
        &self,
        node: &Node,
        context: &Context,
    ) -> Result<Option<ImageId>> {
        match node.inputs() {
            [] => Ok(None),
            [only] => self.evaluate_identifier(*only, context),
            inputs => {
                let mut children = Vec::with_capacity(inputs.len());
                for &input in inputs {
                    children.extend(self.evaluate_identifier(input, context)?);
                }
                Ok(Some(ImageId::with_children(
                    Some(node.id()),
                    context.frame,
                    children,
                )))
            }
        }
    }

    pub fn image_range_info(&self, id: NodeId) -> Result<ImageRangeInfo> {
        let node = self.node(id)?;
        node.definition().behavior().image_range_info(self, node)
    }

    pub fn image_structure_info(&self, id: NodeId, context: &Context) -> Result<ImageStructureInfo> {
        let node = self.node(id)?;
        node.definition()
            .behavior()
            .image_structure_info(self, node, context)
    }

    pub fn media_info(&self, id: NodeId, context: &Context) -> Result<Vec<MediaInfo>> {
        let node = self.node(id)?;
        node.definition().behavior().media_info(self, node, context)
    }

    pub fn is_media_active(&self, id: NodeId) -> Result<bool> {
        let node = self.node(id)?;
        node.definition().behavior().is_media_active(self, node)
    }

    pub fn set_media_active(&self, id: NodeId, state: bool) -> Result<()> {
        let node = self.node(id)?;
        node.definition()
            .behavior()
            .set_media_active(self, node, state)
    }

    pub fn audio_fill_buffer(&self, id: NodeId, context: &AudioContext) -> Result<usize> {
        let node = self.node(id)?;
        node.definition()
            .behavior()
            .audio_fill_buffer(self, node, context)
    }

    pub fn map_to_input_index(
        &self,
        id: NodeId,
        source: NodeId,
        source_output: usize,
    ) -> Result<Option<usize>> {
        let node = self.node(id)?;
        Ok(node
            .definition()
            .behavior()
            .map_to_input_index(node, source, source_output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;
    use crate::graph::NodeDefinition;
    use crate::render::FrameBufferInfo;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// A leaf producing one frame buffer of the given plane count.
    struct Plate {
        planes: usize,
        active: AtomicBool,
    }

    impl Plate {
        fn new(planes: usize) -> Arc<Self> {
            Arc::new(Self {
                planes,
                active: AtomicBool::new(false),
            })
        }
    }

    impl NodeBehavior for Plate {
        fn evaluate(&self, _: &Graph, node: &Node, _: &Context) -> Result<RenderImage> {
            Ok(RenderImage::from_frame_buffer(
                Some(node.id()),
                FrameBufferInfo::new(640, 480, self.planes),
            ))
        }

        fn evaluate_identifier(&self, _: &Graph, node: &Node, c: &Context) -> Result<Option<ImageId>> {
            Ok(Some(ImageId::new(Some(node.id()), c.frame)))
        }

        fn image_structure_info(&self, _: &Graph, _: &Node, _: &Context) -> Result<ImageStructureInfo> {
            Ok(ImageStructureInfo {
                width: 640,
                height: 480,
                pixel_aspect: 1.0,
            })
        }

        fn is_media_active(&self, _: &Graph, _: &Node) -> Result<bool> {
            Ok(self.active.load(Ordering::Relaxed))
        }

        fn set_media_active(&self, _: &Graph, _: &Node, state: bool) -> Result<()> {
            self.active.store(state, Ordering::Relaxed);
            Ok(())
        }
    }

    struct Broken;

    impl NodeBehavior for Broken {
        fn evaluate(&self, _: &Graph, node: &Node, _: &Context) -> Result<RenderImage> {
            Err(GraphError::Evaluation {
                node: node.name().to_string(),
                message: "unreadable".into(),
            })
        }
    }

    fn leaf(graph: &mut Graph, name: &str, behavior: Arc<dyn NodeBehavior>) -> NodeId {
        let def = NodeDefinition::new("Plate", 1)
            .with_inputs(0, Some(0))
            .with_behavior(behavior);
        graph.new_node(name, Arc::new(def), None).unwrap()
    }

    fn stack(graph: &mut Graph) -> NodeId {
        let def = NodeDefinition::new("Stack", 1).with_inputs(0, None);
        graph.new_node("stack", Arc::new(def), None).unwrap()
    }

    #[test]
    fn fan_out_follows_input_count() {
        let mut graph = Graph::default();
        let ctx = graph.context_for_frame(1);
        let a = leaf(&mut graph, "a", Plate::new(1));
        let b = leaf(&mut graph, "b", Plate::new(2));
        let node = stack(&mut graph);

        let empty = graph.evaluate(node, &ctx).unwrap();
        assert!(empty.is_no_image());
        assert_eq!(empty.node, Some(node));

        graph.set_inputs(node, &[a]).unwrap();
        let single = graph.evaluate(node, &ctx).unwrap();
        assert_eq!(single.node, Some(a));
        assert!(single.children.is_empty());

        graph.set_inputs(node, &[b, a]).unwrap();
        let composite = graph.evaluate(node, &ctx).unwrap();
        let order: Vec<_> = composite.children.iter().map(|c| c.node).collect();
        assert_eq!(order, vec![Some(b), Some(a)]);
        assert_eq!(composite.resource_usage.buffers, 3);
    }

    #[test]
    fn failing_input_fails_the_composite() {
        let mut graph = Graph::default();
        let ctx = graph.context_for_frame(1);
        let a = leaf(&mut graph, "a", Plate::new(1));
        let bad = leaf(&mut graph, "bad", Arc::new(Broken));
        let node = stack(&mut graph);
        graph.set_inputs(node, &[a, bad]).unwrap();

        let err = graph.evaluate(node, &ctx).unwrap_err();
        assert!(matches!(err, GraphError::Evaluation { ref node, .. } if node == "bad"));
    }

    #[test]
    fn identifiers_are_absent_without_inputs() {
        let mut graph = Graph::default();
        let ctx = graph.context_for_frame(4);
        let a = leaf(&mut graph, "a", Plate::new(1));
        let b = leaf(&mut graph, "b", Plate::new(1));
        let node = stack(&mut graph);

        assert_eq!(graph.evaluate_identifier(node, &ctx).unwrap(), None);

        graph.set_inputs(node, &[a, b]).unwrap();
        let id = graph.evaluate_identifier(node, &ctx).unwrap().unwrap();
        let children: Vec<_> = id.children().map(|c| c.node).collect();
        assert_eq!(children, vec![Some(a), Some(b)]);
        assert_eq!(id.frame, 4);
    }

    #[test]
    fn queries_follow_the_first_input() {
        let mut graph = Graph::default();
        let ctx = graph.context_for_frame(1);
        let a = leaf(&mut graph, "a", Plate::new(1));
        let b = leaf(&mut graph, "b", Plate::new(1));
        let node = stack(&mut graph);

        assert_eq!(
            graph.image_structure_info(node, &ctx).unwrap(),
            ImageStructureInfo::default()
        );
        assert!(!graph.is_media_active(node).unwrap());

        graph.set_inputs(node, &[a, b]).unwrap();
        assert_eq!(graph.image_structure_info(node, &ctx).unwrap().width, 640);

        graph.set_media_active(node, true).unwrap();
        assert!(graph.is_media_active(a).unwrap());
        assert!(graph.is_media_active(b).unwrap());
        assert!(graph.is_media_active(node).unwrap());
    }

    #[test]
    fn source_maps_to_its_first_slot() {
        let mut graph = Graph::default();
        let a = leaf(&mut graph, "a", Plate::new(1));
        let b = leaf(&mut graph, "b", Plate::new(1));
        let node = stack(&mut graph);
        graph.set_inputs(node, &[b, a, b]).unwrap();

        assert_eq!(graph.map_to_input_index(node, a, 0).unwrap(), Some(1));
        assert_eq!(graph.map_to_input_index(node, b, 3).unwrap(), Some(0));
        assert_eq!(graph.map_to_input_index(a, b, 0).unwrap(), None);
    }
}
