//! Node Graph
//!
//! This module implements the mutable graph of processing nodes that
//! evaluation pulls render trees from.
//!
//! # Overview
//!
//! The graph is an arena of nodes addressed by `NodeId`:
//!
//! - Each node has an ordered input list. Duplicates are allowed and the
//!   order is the evaluation order of a multi-input node.
//! - Each node keeps the multiset of nodes reading from it as its outputs.
//!   Every edge edit goes through `Graph::set_inputs`, which keeps the two
//!   directions consistent.
//! - Names are unique across the live and isolated registries. Both keep
//!   insertion order.
//!
//! Changes travel downstream as `GraphEvent`s delivered to subscribers. See
//! `propagate` for the five propagation protocols.
//!
//! # Design Decisions
//!
//! 1. The arena owns every node, so edges are plain handles and teardown
//!    needs no cycle breaking.
//!
//! 2. Cycles are not rejected by edge edits. `Graph::test_inputs` is the
//!    check callers run before an edit that could create one.
//!
//! 3. A node being deleted stops every propagation passing through it.

mod definition;
mod edges;
mod events;
mod isolate;
mod node;
mod propagate;
mod property;
mod registry;
mod validate;

pub use definition::NodeDefinition;
pub use edges::InputComparison;
pub use events::{GraphEvent, Subscriber, SubscriberId};
pub use node::{Node, NodeFlags, NodeId, NodeList, NodeRole};
pub use propagate::PropagateTarget;
pub use property::{PropertyStore, PropertyValue};
pub use registry::Graph;
pub use validate::InputTest;
