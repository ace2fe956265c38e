//! Prism Core
//!
//! This crate provides the node-graph engine behind the Prism media
//! renderer. It implements:
//!
//! - A validated graph of processing nodes with ordered, duplicate-aware
//!   input edges
//! - Change propagation (input, state, range, image structure, media)
//! - Pull-based evaluation into a render tree and an identifier tree
//! - A resource balancer that keeps merged shaders within GPU budgets
//! - Isolation and restore of nodes for undo
//!
//! Pixels, codecs, playback scheduling and GPU rasterization live elsewhere;
//! the finished render tree is the only thing handed to a renderer.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: node arena, registries, edges, propagation, isolation
//! - `eval`: evaluation protocols and node behaviors
//! - `traverse`: the visitor engine and its search policies
//! - `render`: render tree, shader expressions and the resource balancer
//! - `config`: graph-wide settings
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prism_core::graph::{Graph, NodeDefinition};
//!
//! let mut graph = Graph::default();
//! let plate = Arc::new(NodeDefinition::new("FileSource", 1).with_inputs(0, Some(0)));
//! let stack = Arc::new(NodeDefinition::new("Stack", 1).with_inputs(1, None));
//!
//! let a = graph.new_node("plate", plate.clone(), None)?;
//! let b = graph.new_node("plate", plate, None)?; // named "plate000002"
//! let over = graph.new_node("stack", stack, None)?;
//! graph.set_inputs(over, &[a, b])?;
//!
//! let image = graph.evaluate(over, &graph.context_for_frame(1))?;
//! assert_eq!(image.children.len(), 2);
//! ```

pub mod config;
pub mod error;
pub mod eval;
pub mod graph;
pub mod render;
pub mod traverse;

pub use config::{GraphConfig, ResourceLimits};
pub use error::{GraphError, Result};
pub use eval::{Context, NodeBehavior};
pub use graph::{Graph, NodeDefinition, NodeId, PropagateTarget};
pub use render::RenderImage;
