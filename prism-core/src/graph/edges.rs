//! Edge mutation.
//!
//! Every structural edit funnels into `Graph::set_inputs`, which keeps each
//! input's output list equal to the multiset of nodes reading from it.
//!
//! Cycles are not rejected here. Callers that might introduce one should run
//! `Graph::test_inputs` first.

use tracing::{error, warn};

use super::events::GraphEvent;
use super::node::{NodeId, NodeList};
use super::registry::Graph;
use crate::error::{GraphError, Result};

/// How a candidate input list relates to a node's current inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputComparison {
    /// Same nodes in the same order.
    Identical,
    /// The current list is a prefix of the candidate.
    Appended,
    /// The candidate is longer and contains every current input.
    Added,
    /// Same multiset of nodes, different order.
    Reordered,
    Differs,
}

impl Graph {
    /// Replace the input list of `id`.
    ///
    /// Does nothing when `inputs` equals the current list. Fails without
    /// touching the node when the list is longer than the node type allows.
    /// Handles that do not refer to a node are logged and kept; they get no
    /// back-reference.
    pub fn set_inputs(&mut self, id: NodeId, inputs: &[NodeId]) -> Result<()> {
        let node = self.node(id)?;
        if node.inputs() == inputs {
            return Ok(());
        }

        if let Some(max) = node.maximum_inputs() {
            if inputs.len() > max {
                return Err(GraphError::TooManyInputs {
                    node: node.name().to_string(),
                    max,
                    requested: inputs.len(),
                });
            }
        }

        let name = node.name().to_string();
        let group = node.group();
        let unconstrained = node.flags().unconstrained_inputs;
        let previous: NodeList = node.inputs().iter().copied().collect();

        for &input in inputs {
            if !self.contains(input) {
                error!(node = %name, input = input.raw(), "dangling input passed to set_inputs");
            }
        }

        for input in previous {
            if let Ok(n) = self.node_mut(input) {
                n.remove_output(id);
                self.emit(GraphEvent::OutputsChanged(input));
            }
        }

        self.node_mut(id)?.replace_inputs(inputs);

        for &input in inputs {
            let input_group = match self.get(input) {
                Some(n) => n.group(),
                None => continue,
            };

            if !unconstrained && input_group != group {
                warn!(
                    input = %self.display_name(input),
                    input_group = %self.group_label(input_group),
                    node = %name,
                    node_group = %self.group_label(group),
                    "input and output groups do not match"
                );
            }

            // N copies of an input register N outputs.
            self.node_mut(input)?.add_output(id);
            self.emit(GraphEvent::OutputsChanged(input));
        }

        self.inputs_changed(id);
        Ok(())
    }

    fn group_label(&self, group: Option<NodeId>) -> String {
        match group {
            Some(g) => self.display_name(g),
            None => "top level".to_string(),
        }
    }

    fn inputs_changed(&self, id: NodeId) {
        self.emit(GraphEvent::InputsChanged(id));
        self.emit(GraphEvent::GraphInputsChanged(id));
    }

    pub fn append_input(&mut self, id: NodeId, input: NodeId) -> Result<()> {
        let mut inputs: NodeList = self.node(id)?.inputs().iter().copied().collect();
        inputs.push(input);
        self.set_inputs(id, &inputs)
    }

    /// Insert `input` before position `index`. Indices past the end append.
    pub fn insert_input(&mut self, id: NodeId, input: NodeId, index: usize) -> Result<()> {
        let mut inputs: NodeList = self.node(id)?.inputs().iter().copied().collect();
        let at = index.min(inputs.len());
        inputs.insert(at, input);
        self.set_inputs(id, &inputs)
    }

    /// Remove the first occurrence of `input`. Logged and ignored when
    /// `input` is not an input of `id`.
    pub fn remove_input(&mut self, id: NodeId, input: NodeId) -> Result<()> {
        let node = self.node(id)?;
        let Some(pos) = node.index_of_child(input) else {
            error!(
                input = %self.display_name(input),
                node = %node.name(),
                "asked to remove a node that is not an input"
            );
            return Ok(());
        };

        let mut inputs: NodeList = node.inputs().iter().copied().collect();
        inputs.remove(pos);
        self.set_inputs(id, &inputs)
    }

    pub fn disconnect_inputs(&mut self, id: NodeId) -> Result<()> {
        self.set_inputs(id, &[])
    }

    /// Remove `id` from the input list of every node reading from it.
    pub fn disconnect_outputs(&mut self, id: NodeId) -> Result<()> {
        while let Some(&output) = self.node(id)?.outputs().last() {
            let reads_from = self.get(output).is_some_and(|n| n.is_input(id));
            if reads_from {
                self.remove_input(output, id)?;
            } else {
                error!(
                    node = %self.display_name(id),
                    output = %self.display_name(output),
                    "stale output reference"
                );
                self.node_mut(id)?.remove_output(output);
            }
        }
        Ok(())
    }

    /// Permute the inputs: input `i` becomes the old input at `indices[i]`.
    ///
    /// `indices` must be a permutation of the current positions; anything
    /// else is logged and ignored.
    pub fn reorder(&mut self, id: NodeId, indices: &[usize]) -> Result<()> {
        let node = self.node(id)?;
        let current = node.inputs();

        let mut seen = vec![false; current.len()];
        let valid = indices.len() == current.len()
            && indices.iter().all(|&i| {
                i < seen.len() && !std::mem::replace(&mut seen[i], true)
            });
        if !valid {
            error!(node = %node.name(), ?indices, "invalid input reordering");
            return Ok(());
        }

        let reordered: NodeList = indices.iter().map(|&i| current[i]).collect();
        self.node_mut(id)?.replace_inputs(&reordered);
        self.inputs_changed(id);
        Ok(())
    }

    /// Classify `candidate` against the current inputs of `id`.
    pub fn compare_to_inputs(&self, id: NodeId, candidate: &[NodeId]) -> Result<InputComparison> {
        let current = self.node(id)?.inputs();

        if current.len() <= candidate.len() {
            if candidate.starts_with(current) {
                return Ok(if current.len() == candidate.len() {
                    InputComparison::Identical
                } else {
                    InputComparison::Appended
                });
            }

            if candidate.len() > current.len() {
                let all_present = current.iter().all(|n| candidate.contains(n));
                return Ok(if all_present {
                    InputComparison::Added
                } else {
                    InputComparison::Differs
                });
            }
        }

        if current.len() == candidate.len() {
            let mut a = current.to_vec();
            let mut b = candidate.to_vec();
            a.sort();
            b.sort();
            if a == b {
                return Ok(InputComparison::Reordered);
            }
        }

        Ok(InputComparison::Differs)
    }

    /// For each current input, its position in `new_order`.
    pub fn input_reordering(&self, id: NodeId, new_order: &[NodeId]) -> Result<Vec<Option<usize>>> {
        Ok(self
            .node(id)?
            .inputs()
            .iter()
            .map(|input| new_order.iter().position(|n| n == input))
            .collect())
    }

    /// Match current inputs against `new_order`, duplicates included.
    ///
    /// Returns the positions of current inputs missing from `new_order`, and
    /// for each slot of `new_order` the current position that fills it.
    pub fn input_partial_reordering(
        &self,
        id: NodeId,
        new_order: &[NodeId],
    ) -> Result<(Vec<usize>, Vec<Option<usize>>)> {
        let inputs = self.node(id)?.inputs();
        let mut removed = Vec::new();
        let mut reorder = vec![None; new_order.len()];

        for (i, input) in inputs.iter().enumerate() {
            let slot = new_order
                .iter()
                .enumerate()
                .position(|(j, n)| reorder[j].is_none() && n == input);
            match slot {
                Some(j) => reorder[j] = Some(i),
                None => removed.push(i),
            }
        }

        Ok((removed, reorder))
    }

    /// Inputs at the given positions, skipping empty slots.
    pub fn find_inputs(&self, id: NodeId, indices: &[Option<usize>]) -> Result<Vec<NodeId>> {
        let inputs = self.node(id)?.inputs();
        Ok(indices
            .iter()
            .flatten()
            .filter_map(|&i| inputs.get(i).copied())
            .collect())
    }
}
