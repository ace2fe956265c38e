//! Isolation and restore.
//!
//! Isolating a node takes it out of the graph for undo: its connections are
//! written to `__graph.*` properties, every edge is cut, and the node moves
//! from the live registry to the isolated one. Restoring reads the records
//! back and reconnects by name, so nodes restored out of order still find
//! each other.

use std::collections::HashMap;

use tracing::{debug, error};

use super::events::GraphEvent;
use super::node::NodeId;
use super::property::PropertyValue;
use super::registry::Graph;
use crate::error::{GraphError, Result};

const GRAPH_COMPONENT: &str = "__graph";
const INPUTS: &str = "__graph.inputs";
const OUTPUTS: &str = "__graph.outputs";
const OUTPUT_INDEX: &str = "__graph.outputIndex";

impl Graph {
    /// Detach a node and park it in the isolated registry. Group membership
    /// is left alone, so a member comes back into the same group.
    pub fn isolate(&mut self, id: NodeId) -> Result<()> {
        let node = self.node(id)?;
        let name = node.name().to_string();
        if self.is_isolated(id) {
            return Err(GraphError::AlreadyIsolated(name));
        }

        if !node.properties().has_component(GRAPH_COMPONENT) {
            self.record_connections(id)?;
        }

        self.disconnect_inputs(id)?;
        self.disconnect_outputs(id)?;
        self.remove_live(id)?;
        self.add_isolated(id)?;

        debug!(node = %name, "node isolated");
        self.emit(GraphEvent::Isolated(id));
        Ok(())
    }

    /// Write input names, output names and the input slot this node fills
    /// in each output. An output reading this node twice gets two records,
    /// one per slot, in slot order.
    fn record_connections(&mut self, id: NodeId) -> Result<()> {
        let node = self.node(id)?;
        let inputs: Vec<String> = node
            .inputs()
            .iter()
            .map(|&input| self.display_name(input))
            .collect();

        let mut outputs = Vec::with_capacity(node.outputs().len());
        let mut slots = Vec::with_capacity(node.outputs().len());
        let mut occurrence: HashMap<NodeId, usize> = HashMap::new();

        for &output in node.outputs() {
            let nth = occurrence.entry(output).or_insert(0);
            let slot = self
                .get(output)
                .and_then(|o| {
                    o.inputs()
                        .iter()
                        .enumerate()
                        .filter(|&(_, &n)| n == id)
                        .nth(*nth)
                })
                .map_or(0, |(slot, _)| slot);
            *nth += 1;

            outputs.push(self.display_name(output));
            slots.push(i32::try_from(slot).unwrap_or(i32::MAX));
        }

        self.set_property(id, INPUTS, PropertyValue::String(inputs))?;
        self.set_property(id, OUTPUTS, PropertyValue::String(outputs))?;
        self.set_property(id, OUTPUT_INDEX, PropertyValue::Int(slots))?;
        Ok(())
    }

    /// Bring an isolated node back and reconnect it.
    ///
    /// Inputs are rebuilt in recorded order. The node is then inserted into
    /// each recorded output at its recorded slot, or appended when the slot
    /// no longer exists. Names that no longer resolve are logged and
    /// skipped.
    pub fn restore(&mut self, id: NodeId) -> Result<()> {
        let node = self.node(id)?;
        let name = node.name().to_string();
        if !self.is_isolated(id) {
            return Err(GraphError::NotIsolated(name));
        }

        let props = node.properties();
        let inputs = props.strings(INPUTS).map(<[String]>::to_vec).unwrap_or_default();
        let outputs = props.strings(OUTPUTS).map(<[String]>::to_vec).unwrap_or_default();
        let slots = props.ints(OUTPUT_INDEX).map(<[i32]>::to_vec).unwrap_or_default();

        self.remove_isolated(id)?;
        self.add_live(id)?;

        let mut resolved = Vec::with_capacity(inputs.len());
        for input in &inputs {
            match self.find_node_possibly_isolated(input) {
                Some(n) => resolved.push(n),
                None => error!(node = %name, input = %input, "cannot find input node"),
            }
        }
        self.set_inputs(id, &resolved)?;

        for (output_name, slot) in outputs.iter().zip(slots) {
            let Some(output) = self.find_node_possibly_isolated(output_name) else {
                error!(node = %name, output = %output_name, "cannot find output node");
                continue;
            };

            let len = self.node(output)?.inputs().len();
            let result = match usize::try_from(slot) {
                Ok(slot) if slot <= len => self.insert_input(output, id, slot),
                _ => self.append_input(output, id),
            };
            if let Err(err) = result {
                error!(node = %name, output = %output_name, %err, "cannot reconnect output");
            }
        }

        for record in [INPUTS, OUTPUTS, OUTPUT_INDEX] {
            self.remove_property(id, record)?;
        }

        debug!(node = %name, "node restored");
        self.emit(GraphEvent::Restored(id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeDefinition;
    use std::sync::Arc;

    fn def() -> Arc<NodeDefinition> {
        Arc::new(NodeDefinition::new("T", 1).with_inputs(0, None))
    }

    #[test]
    fn isolate_then_restore_round_trips() {
        let mut graph = Graph::default();
        let a = graph.new_node("a", def(), None).unwrap();
        let b = graph.new_node("b", def(), None).unwrap();
        let s = graph.new_node("s", def(), None).unwrap();
        let d = graph.new_node("d", def(), None).unwrap();
        let e = graph.new_node("e", def(), None).unwrap();

        graph.set_inputs(s, &[a, b]).unwrap();
        graph.set_inputs(d, &[a, s, b, s]).unwrap();
        graph.set_inputs(e, &[s]).unwrap();

        graph.isolate(s).unwrap();
        assert!(graph.is_isolated(s));
        assert_eq!(graph.find_node("s"), None);
        assert_eq!(graph.find_node_possibly_isolated("s"), Some(s));
        assert!(graph.node(s).unwrap().inputs().is_empty());
        assert_eq!(graph.node(d).unwrap().inputs(), &[a, b]);
        assert!(graph.node(e).unwrap().inputs().is_empty());

        graph.restore(s).unwrap();
        assert!(!graph.is_isolated(s));
        assert_eq!(graph.find_node("s"), Some(s));
        assert_eq!(graph.node(s).unwrap().inputs(), &[a, b]);
        assert_eq!(graph.node(d).unwrap().inputs(), &[a, s, b, s]);
        assert_eq!(graph.node(e).unwrap().inputs(), &[s]);
        assert!(!graph.node(s).unwrap().properties().has_component("__graph"));
    }

    #[test]
    fn group_member_round_trips() {
        let mut graph = Graph::default();
        let group = graph
            .new_group("g", NodeDefinition::new("Group", 1), None)
            .unwrap();
        let a = graph.new_node("a", def(), Some(group)).unwrap();
        let m = graph.new_node("m", def(), Some(group)).unwrap();
        let d = graph.new_node("d", def(), Some(group)).unwrap();
        graph.set_inputs(m, &[a]).unwrap();
        graph.set_inputs(d, &[m]).unwrap();

        graph.isolate(m).unwrap();
        assert!(graph.is_isolated(m));
        assert!(graph.node(a).unwrap().outputs().is_empty());
        assert!(graph.node(d).unwrap().inputs().is_empty());
        assert!(matches!(graph.isolate(m), Err(GraphError::AlreadyIsolated(_))));

        graph.restore(m).unwrap();
        assert_eq!(graph.node(m).unwrap().group(), Some(group));
        assert!(graph.group_members(group).contains(&m));
        assert_eq!(graph.node(m).unwrap().inputs(), &[a]);
        assert_eq!(graph.node(d).unwrap().inputs(), &[m]);
        assert!(matches!(graph.restore(m), Err(GraphError::NotIsolated(_))));
    }

    #[test]
    fn unresolvable_names_are_skipped() {
        let mut graph = Graph::default();
        let a = graph.new_node("a", def(), None).unwrap();
        let b = graph.new_node("b", def(), None).unwrap();
        let s = graph.new_node("s", def(), None).unwrap();
        graph.set_inputs(s, &[a, b]).unwrap();

        graph.isolate(s).unwrap();
        graph.delete_node(a).unwrap();
        graph.restore(s).unwrap();

        assert_eq!(graph.node(s).unwrap().inputs(), &[b]);
    }
}
