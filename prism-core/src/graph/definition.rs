//! Node type descriptors.

use std::fmt;
use std::sync::Arc;

use super::node::NodeFlags;
use crate::eval::{DefaultBehavior, NodeBehavior};

/// Describes a node type: its protocol name and version, how many inputs it
/// accepts, its default flags, and the behavior used to evaluate it.
///
/// ```rust,ignore
/// let over = NodeDefinition::new("Stack", 1).with_inputs(1, None);
/// let retime = NodeDefinition::new("Retime", 2)
///     .with_inputs(1, Some(1))
///     .with_behavior(Arc::new(RetimeBehavior::default()));
/// ```
#[derive(Clone)]
pub struct NodeDefinition {
    name: String,
    version: i32,
    min_inputs: usize,
    max_inputs: Option<usize>,
    flags: NodeFlags,
    behavior: Arc<dyn NodeBehavior>,
}

impl NodeDefinition {
    /// A definition accepting one or more inputs with the base evaluation
    /// protocol.
    pub fn new(name: impl Into<String>, version: i32) -> Self {
        Self {
            name: name.into(),
            version,
            min_inputs: 1,
            max_inputs: None,
            flags: NodeFlags::default(),
            behavior: Arc::new(DefaultBehavior),
        }
    }

    pub fn with_inputs(mut self, min: usize, max: Option<usize>) -> Self {
        self.min_inputs = min;
        self.max_inputs = max;
        self
    }

    pub fn with_behavior(mut self, behavior: Arc<dyn NodeBehavior>) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn unconstrained_inputs(mut self, value: bool) -> Self {
        self.flags.unconstrained_inputs = value;
        self
    }

    pub fn meta_searchable(mut self, value: bool) -> Self {
        self.flags.meta_searchable = value;
        self
    }

    pub fn with_media(mut self, audio: bool, video: bool) -> Self {
        self.flags.has_audio = audio;
        self.flags.has_video = video;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn min_inputs(&self) -> usize {
        self.min_inputs
    }

    pub fn max_inputs(&self) -> Option<usize> {
        self.max_inputs
    }

    pub fn default_flags(&self) -> NodeFlags {
        self.flags
    }

    pub fn behavior(&self) -> &Arc<dyn NodeBehavior> {
        &self.behavior
    }
}

impl fmt::Debug for NodeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDefinition")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("min_inputs", &self.min_inputs)
            .field("max_inputs", &self.max_inputs)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
