//! Change Propagation
//!
//! Five independent notifications travel from a node along its output edges:
//!
//! - input change and state change always reach every downstream node. When a
//!   node has no outputs the notification bubbles to its owning group, which
//!   continues from there.
//! - range, image structure and media changes carry a `PropagateTarget` mask
//!   choosing whether outputs, the owning group and the graph hear about it.
//!   Once the signal crosses an output edge the group and graph bits are
//!   dropped, unless `GROUP_AND_GRAPH_IN_OUTPUT` is set, so one edit produces
//!   one root-level notification instead of one per path. With the group
//!   bit set the owning group re-propagates too; range and image structure
//!   keep the caller's mask there, media uses the default one.
//!
//! A node whose `deleting` flag is set stops every propagation.
//!
//! Propagation walks each distinct edge path, so a node reachable twice is
//! notified twice. Each node's output list is copied before it is walked.

use std::fmt;
use std::ops::{BitAnd, BitOr};

use tracing::trace;

use super::events::GraphEvent;
use super::node::{NodeId, NodeList, NodeRole};
use super::registry::Graph;

/// Which parties a range, structure or media change should reach.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropagateTarget(u32);

impl PropagateTarget {
    pub const NONE: Self = Self(0);
    /// Re-propagate from the owning group.
    pub const GROUP: Self = Self(0x0001);
    /// Fire the graph hook at roots.
    pub const GRAPH: Self = Self(0x0002);
    /// Follow output edges.
    pub const OUTPUT: Self = Self(0x0004);
    /// Let a group forward the change to its members.
    pub const MEMBER: Self = Self(0x0008);
    /// Keep `GROUP` and `GRAPH` while flowing through outputs.
    pub const GROUP_AND_GRAPH_IN_OUTPUT: Self = Self(0x1000);

    /// Everything, including group and graph hooks on every path.
    pub const LEGACY: Self = Self(0x1000 | 0x0008 | 0x0004 | 0x0002 | 0x0001);
    /// Group, graph and outputs, with the hooks fired only at the origin.
    pub const FAST: Self = Self(0x0004 | 0x0002 | 0x0001);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// The mask handed to outputs.
    pub fn for_outputs(self) -> Self {
        if self.contains(Self::GROUP_AND_GRAPH_IN_OUTPUT) {
            self
        } else {
            self.without(Self::GRAPH | Self::GROUP)
        }
    }
}

impl Default for PropagateTarget {
    fn default() -> Self {
        Self::LEGACY
    }
}

impl BitOr for PropagateTarget {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for PropagateTarget {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for PropagateTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(PropagateTarget, &str); 5] = [
            (PropagateTarget::GROUP, "GROUP"),
            (PropagateTarget::GRAPH, "GRAPH"),
            (PropagateTarget::OUTPUT, "OUTPUT"),
            (PropagateTarget::MEMBER, "MEMBER"),
            (PropagateTarget::GROUP_AND_GRAPH_IN_OUTPUT, "GROUP_AND_GRAPH_IN_OUTPUT"),
        ];
        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "PropagateTarget({})", set.join(" | "))
    }
}

/// The three masked notification kinds share one walker.
#[derive(Clone, Copy)]
enum Masked {
    Range,
    ImageStructure,
    Media,
}

impl Graph {
    /// Outputs of a live, non-deleting node, or `None` when propagation
    /// must stop here.
    fn propagation_step(&self, id: NodeId) -> Option<(NodeList, Option<NodeId>)> {
        let node = self.get(id)?;
        if node.is_deleting() {
            return None;
        }
        Some((node.outputs().iter().copied().collect(), node.group()))
    }

    /// Slot of `source` in the input list of `output`.
    fn input_slot(&self, output: NodeId, source: NodeId) -> usize {
        self.get(output)
            .and_then(|n| n.index_of_child(source))
            .unwrap_or(0)
    }

    fn is_group_node(&self, id: NodeId) -> bool {
        matches!(self.get(id).map(|n| n.role()), Some(NodeRole::Group { .. }))
    }

    //
    //  Input change
    //

    pub fn propagate_input_change(&self, id: NodeId) {
        if self.get(id).map_or(true, |n| n.is_deleting()) {
            return;
        }
        self.propagate_input_change_internal(id);
    }

    pub(crate) fn propagate_input_change_internal(&self, id: NodeId) {
        let Some((outputs, group)) = self.propagation_step(id) else {
            return;
        };
        trace!(node = %self.display_name(id), "input change");

        if outputs.is_empty() {
            if let Some(g) = group {
                self.propagate_input_change_internal(g);
            }
            return;
        }

        for output in outputs {
            let index = self.input_slot(output, id);
            self.emit(GraphEvent::InputChanged {
                node: output,
                index,
            });
            if self.is_group_node(output) {
                for adaptor in self.group_adaptors(output) {
                    self.propagate_input_change_internal(adaptor);
                }
            }
            self.propagate_input_change_internal(output);
        }
    }

    //
    //  State change
    //

    pub fn propagate_state_change(&self, id: NodeId) {
        if self.get(id).map_or(true, |n| n.is_deleting()) {
            return;
        }
        self.propagate_state_change_internal(id);
    }

    fn propagate_state_change_internal(&self, id: NodeId) {
        let Some((outputs, group)) = self.propagation_step(id) else {
            return;
        };
        self.emit(GraphEvent::StateChanged(id));

        if outputs.is_empty() {
            if let Some(g) = group {
                self.propagate_state_change_internal(g);
            }
            return;
        }

        for output in outputs {
            let index = self.input_slot(output, id);
            self.emit(GraphEvent::InputStateChanged {
                node: output,
                index,
            });
            self.propagate_state_change_internal(output);
        }
    }

    //
    //  Range, image structure and media changes
    //

    pub fn propagate_range_change(&self, id: NodeId, target: PropagateTarget) {
        self.propagate_masked(Masked::Range, id, target);
    }

    pub fn propagate_image_structure_change(&self, id: NodeId, target: PropagateTarget) {
        self.propagate_masked(Masked::ImageStructure, id, target);
    }

    pub fn propagate_media_change(&self, id: NodeId, target: PropagateTarget) {
        self.propagate_masked(Masked::Media, id, target);
    }

    fn propagate_masked(&self, kind: Masked, id: NodeId, target: PropagateTarget) {
        let Some(node) = self.get(id) else {
            return;
        };
        if node.is_deleting() {
            return;
        }
        let group = node.group();

        self.propagate_masked_internal(kind, id, target);

        if target.contains(PropagateTarget::GROUP) {
            if let Some(g) = group {
                // Media restarts from the group with the full default mask.
                let group_target = match kind {
                    Masked::Media => PropagateTarget::default(),
                    Masked::Range | Masked::ImageStructure => target,
                };
                self.propagate_masked(kind, g, group_target);
            }
        }
    }

    fn propagate_masked_internal(&self, kind: Masked, id: NodeId, target: PropagateTarget) {
        let Some((outputs, group)) = self.propagation_step(id) else {
            return;
        };

        self.emit(match kind {
            Masked::Range => GraphEvent::RangeChanged(id),
            Masked::ImageStructure => GraphEvent::ImageStructureChanged(id),
            Masked::Media => GraphEvent::MediaChanged(id),
        });

        if outputs.is_empty() {
            if target.contains(PropagateTarget::GRAPH) && group.is_none() {
                trace!(node = %self.display_name(id), "root notifies graph");
                self.emit(match kind {
                    Masked::Range => GraphEvent::GraphRangeChanged(id),
                    Masked::ImageStructure => GraphEvent::GraphImageStructureChanged(id),
                    Masked::Media => GraphEvent::GraphMediaChanged(id),
                });
            }
            return;
        }

        if !target.contains(PropagateTarget::OUTPUT) {
            return;
        }

        let output_target = target.for_outputs();
        for output in outputs {
            let index = self.input_slot(output, id);
            self.emit(match kind {
                Masked::Range => GraphEvent::InputRangeChanged {
                    node: output,
                    index,
                    target: output_target,
                },
                Masked::ImageStructure => GraphEvent::InputImageStructureChanged {
                    node: output,
                    index,
                    target: output_target,
                },
                Masked::Media => GraphEvent::InputMediaChanged {
                    node: output,
                    source: id,
                    index,
                    target: output_target,
                },
            });

            let forward_to_members = match kind {
                Masked::Range => true,
                Masked::ImageStructure => output_target.contains(PropagateTarget::MEMBER),
                Masked::Media => false,
            };
            if forward_to_members && self.is_group_node(output) {
                for adaptor in self.group_adaptors(output) {
                    self.propagate_masked_internal(kind, adaptor, output_target);
                }
            }

            self.propagate_masked_internal(kind, output, output_target);
        }
    }

    //
    //  Cache flushes
    //

    /// Flush `id` and everything upstream of it. Groups flush through their root.
    pub fn propagate_flush_to_inputs(&self, id: NodeId) {
        let Some(node) = self.get(id) else {
            return;
        };
        self.emit(GraphEvent::FlushCaches(id));

        let next: NodeList = match node.role() {
            NodeRole::Group { root, .. } => root.iter().copied().collect(),
            _ => node.inputs().iter().copied().collect(),
        };
        for input in next {
            self.propagate_flush_to_inputs(input);
        }
    }

    /// Flush `id` and everything downstream of it.
    pub fn propagate_flush_to_outputs(&self, id: NodeId) {
        let Some(node) = self.get(id) else {
            return;
        };
        self.emit(GraphEvent::FlushCaches(id));

        let outputs: NodeList = node.outputs().iter().copied().collect();
        for output in outputs {
            self.propagate_flush_to_outputs(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_mask_strips_group_and_graph() {
        assert_eq!(PropagateTarget::FAST.for_outputs(), PropagateTarget::OUTPUT);
        assert_eq!(PropagateTarget::LEGACY.for_outputs(), PropagateTarget::LEGACY);
    }

    #[test]
    fn contains_requires_every_bit() {
        let t = PropagateTarget::OUTPUT | PropagateTarget::GRAPH;
        assert!(t.contains(PropagateTarget::OUTPUT));
        assert!(!t.contains(PropagateTarget::OUTPUT | PropagateTarget::GROUP));
        assert!(!t.contains(PropagateTarget::NONE));
    }

    #[test]
    fn debug_lists_bits() {
        let t = PropagateTarget::OUTPUT | PropagateTarget::GRAPH;
        assert_eq!(format!("{t:?}"), "PropagateTarget(GRAPH | OUTPUT)");
    }
}
