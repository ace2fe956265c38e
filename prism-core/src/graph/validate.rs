//! Structural Validation
//!
//! Edge mutation never rejects a cycle on its own. Code that may introduce
//! one asks first:
//!
//! - `test_inputs` checks a candidate input list for one node: arity, and
//!   whether any candidate already reads (directly or not) from the node
//! - `cyclic_nodes` / `validate_acyclic` check the whole graph
//! - `topological_order` lists a node's upstream closure, inputs first
//!
//! # Algorithm
//!
//! Whole-graph checks use Kahn's algorithm over input edges:
//!
//! 1. Count, for every node, its inputs inside the node set
//! 2. Queue every node whose count is zero
//! 3. Pop a node, emit it, and decrement each of its outputs
//! 4. Anything never emitted sits on or downstream of a cycle

use std::collections::{HashMap, HashSet, VecDeque};

use super::node::NodeId;
use super::registry::Graph;
use crate::error::Result;

/// Outcome of `Graph::test_inputs`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputTest {
    problems: Vec<String>,
}

impl InputTest {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }

    /// One human readable line per problem.
    pub fn problems(&self) -> &[String] {
        &self.problems
    }
}

impl Graph {
    /// Check whether `candidate` would be an acceptable input list for `id`.
    ///
    /// Arity is checked first; cycles are only looked for when it passes.
    /// Minimum arity is reported too, but `set_inputs` does not enforce it.
    pub fn test_inputs(&self, id: NodeId, candidate: &[NodeId]) -> Result<InputTest> {
        let node = self.node(id)?;
        let mut problems = Vec::new();

        if let Some(max) = node.maximum_inputs() {
            if candidate.len() > max {
                let label = self.label(id)?;
                problems.push(match max {
                    0 => format!("{label} cannot have inputs"),
                    1 => format!("{label} accepts no more than 1 input"),
                    n => format!("{label} accepts no more than {n} inputs"),
                });
                return Ok(InputTest { problems });
            }
        }

        if candidate.len() < node.minimum_inputs() {
            problems.push(format!(
                "{} needs at least {} input(s)",
                self.label(id)?,
                node.minimum_inputs()
            ));
        }

        for &input in candidate {
            if self.reaches(input, id) {
                problems.push(format!("{} would cause a cycle", self.label(input)?));
            }
        }

        Ok(InputTest { problems })
    }

    /// `ui name (name)`, or just the name when they agree.
    fn label(&self, id: NodeId) -> Result<String> {
        let ui = self.ui_name(id)?;
        let name = self.node(id)?.name();
        Ok(if ui == name {
            ui
        } else {
            format!("{ui} ({name})")
        })
    }

    /// Whether `target` is `from` or upstream of it.
    fn reaches(&self, from: NodeId, target: NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];

        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(node) = self.get(current) {
                stack.extend(node.inputs().iter().copied());
            }
        }
        false
    }

    /// Nodes left over by Kahn's algorithm: every node on a cycle and every
    /// node downstream of one. Empty for an acyclic graph.
    pub fn cyclic_nodes(&self) -> Vec<NodeId> {
        let all: Vec<NodeId> = self.node_ids().collect();
        let sorted: HashSet<NodeId> = self.kahn(&all).into_iter().collect();
        all.into_iter().filter(|id| !sorted.contains(id)).collect()
    }

    pub fn validate_acyclic(&self) -> bool {
        self.cyclic_nodes().is_empty()
    }

    /// `id` and everything upstream of it, inputs before the nodes reading
    /// them. Nodes on a cycle are left out.
    pub fn topological_order(&self, id: NodeId) -> Result<Vec<NodeId>> {
        self.node(id)?;
        let mut upstream = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![id];

        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            upstream.push(current);
            if let Some(node) = self.get(current) {
                stack.extend(node.inputs().iter().copied());
            }
        }

        Ok(self.kahn(&upstream))
    }

    /// Every node upstream of `id`, post-order, once per path.
    pub fn collect_inputs(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut nodes = Vec::new();
        for &input in self.node(id)?.inputs() {
            self.collect_inputs_into(input, &mut nodes);
        }
        Ok(nodes)
    }

    fn collect_inputs_into(&self, id: NodeId, nodes: &mut Vec<NodeId>) {
        if let Some(node) = self.get(id) {
            for &input in node.inputs() {
                self.collect_inputs_into(input, nodes);
            }
            nodes.push(id);
        }
    }

    /// Kahn's algorithm restricted to `nodes`.
    fn kahn(&self, nodes: &[NodeId]) -> Vec<NodeId> {
        let node_set: HashSet<_> = nodes.iter().copied().collect();
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        let mut result = Vec::new();
        let mut queue = VecDeque::new();

        // Count edges within the node set only. Duplicate inputs count once
        // per occurrence, matching the output multiset.
        for &id in nodes {
            if let Some(node) = self.get(id) {
                let degree = node
                    .inputs()
                    .iter()
                    .filter(|i| node_set.contains(i))
                    .count();
                in_degree.insert(id, degree);
                if degree == 0 {
                    queue.push_back(id);
                }
            }
        }

        while let Some(id) = queue.pop_front() {
            result.push(id);

            if let Some(node) = self.get(id) {
                for output in node.outputs() {
                    if let Some(degree) = in_degree.get_mut(output) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(*output);
                        }
                    }
                }
            }
        }

        result
    }
}
