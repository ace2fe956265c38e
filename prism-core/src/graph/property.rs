//! Per-node attribute storage.
//!
//! Properties are typed lists keyed by a dotted path (`"component.name"`).
//! The store itself is passive; the `Graph` wraps every mutation so the
//! matching events reach subscribers.

use std::mem;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::events::GraphEvent;
use super::node::NodeId;
use super::registry::Graph;
use crate::error::Result;

/// A typed property value. Every property is a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Int(Vec<i32>),
    Float(Vec<f32>),
    String(Vec<String>),
}

impl PropertyValue {
    pub fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert `other` at `index`. Returns false when the types differ.
    /// Indices past the end append.
    fn splice(&mut self, index: usize, other: PropertyValue) -> bool {
        fn splice_vec<T>(dst: &mut Vec<T>, index: usize, src: Vec<T>) {
            let at = index.min(dst.len());
            dst.splice(at..at, src);
        }

        match (self, other) {
            (Self::Int(dst), Self::Int(src)) => splice_vec(dst, index, src),
            (Self::Float(dst), Self::Float(src)) => splice_vec(dst, index, src),
            (Self::String(dst), Self::String(src)) => splice_vec(dst, index, src),
            _ => return false,
        }
        true
    }
}

/// Insertion-ordered property map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyStore {
    values: IndexMap<String, PropertyValue>,
}

impl PropertyStore {
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    pub fn ints(&self, name: &str) -> Option<&[i32]> {
        match self.values.get(name) {
            Some(PropertyValue::Int(v)) => Some(v),
            _ => None,
        }
    }

    pub fn floats(&self, name: &str) -> Option<&[f32]> {
        match self.values.get(name) {
            Some(PropertyValue::Float(v)) => Some(v),
            _ => None,
        }
    }

    pub fn strings(&self, name: &str) -> Option<&[String]> {
        match self.values.get(name) {
            Some(PropertyValue::String(v)) => Some(v),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// True when any property lives under `component.`.
    pub fn has_component(&self, component: &str) -> bool {
        self.values.keys().any(|k| {
            k.strip_prefix(component)
                .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Store a value, returning the previous one.
    pub(crate) fn set(&mut self, name: &str, value: PropertyValue) -> Option<PropertyValue> {
        self.values.insert(name.to_string(), value)
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<PropertyValue> {
        self.values.shift_remove(name)
    }

    pub(crate) fn insert_values(&mut self, name: &str, index: usize, values: PropertyValue) -> bool {
        match self.values.get_mut(name) {
            Some(existing) => existing.splice(index, values),
            None => false,
        }
    }
}

impl Graph {
    /// Create or overwrite a property, notifying subscribers.
    pub fn set_property(&mut self, id: NodeId, name: &str, value: PropertyValue) -> Result<()> {
        let exists = self.node(id)?.properties().contains(name);
        if exists {
            self.emit(GraphEvent::PropertyWillChange {
                node: id,
                name: name.to_string(),
            });
        }

        self.node_mut(id)?.properties_mut().set(name, value);

        let name = name.to_string();
        self.emit(if exists {
            GraphEvent::PropertyChanged { node: id, name }
        } else {
            GraphEvent::NewProperty { node: id, name }
        });
        Ok(())
    }

    /// Delete a property. Returns the removed value, if there was one.
    pub fn remove_property(&mut self, id: NodeId, name: &str) -> Result<Option<PropertyValue>> {
        if !self.node(id)?.properties().contains(name) {
            return Ok(None);
        }

        self.emit(GraphEvent::PropertyWillBeDeleted {
            node: id,
            name: name.to_string(),
        });
        let removed = self.node_mut(id)?.properties_mut().remove(name);
        self.emit(GraphEvent::PropertyDeleted {
            node: id,
            name: name.to_string(),
        });
        Ok(removed)
    }

    /// Splice `values` into an existing property at `index`.
    ///
    /// Returns false, without any event, when the property is missing or
    /// holds another type.
    pub fn insert_property_values(
        &mut self,
        id: NodeId,
        name: &str,
        index: usize,
        values: PropertyValue,
    ) -> Result<bool> {
        let compatible = self
            .node(id)?
            .properties()
            .get(name)
            .is_some_and(|v| mem::discriminant(v) == mem::discriminant(&values));
        if !compatible {
            return Ok(false);
        }

        let size = values.len();
        self.emit(GraphEvent::PropertyWillInsert {
            node: id,
            name: name.to_string(),
            index,
            size,
        });
        let inserted = self
            .node_mut(id)?
            .properties_mut()
            .insert_values(name, index, values);
        self.emit(GraphEvent::PropertyDidInsert {
            node: id,
            name: name.to_string(),
            index,
            size,
        });
        Ok(inserted)
    }

    /// Display name: the `ui.name` property when set, else the node name.
    pub fn ui_name(&self, id: NodeId) -> Result<String> {
        let node = self.node(id)?;
        Ok(node
            .properties()
            .strings("ui.name")
            .and_then(|v| v.first())
            .cloned()
            .unwrap_or_else(|| node.name().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors_check_the_variant() {
        let mut store = PropertyStore::default();
        store.set("frames.list", PropertyValue::Int(vec![1, 2, 3]));

        assert_eq!(store.ints("frames.list"), Some(&[1, 2, 3][..]));
        assert!(store.strings("frames.list").is_none());
        assert!(store.ints("missing").is_none());
    }

    #[test]
    fn component_lookup_requires_a_dot() {
        let mut store = PropertyStore::default();
        store.set("__graph.inputs", PropertyValue::String(vec![]));

        assert!(store.has_component("__graph"));
        assert!(!store.has_component("__gra"));
    }

    #[test]
    fn insert_values_splices_in_place() {
        let mut store = PropertyStore::default();
        store.set("a.b", PropertyValue::Int(vec![1, 4]));

        assert!(store.insert_values("a.b", 1, PropertyValue::Int(vec![2, 3])));
        assert_eq!(store.ints("a.b"), Some(&[1, 2, 3, 4][..]));

        assert!(!store.insert_values("a.b", 0, PropertyValue::Float(vec![0.5])));
        assert!(!store.insert_values("missing", 0, PropertyValue::Int(vec![])));
    }

    #[test]
    fn graph_property_edits_emit_events() {
        use crate::graph::NodeDefinition;
        use parking_lot::Mutex;
        use std::sync::Arc;

        let mut graph = Graph::default();
        let id = graph
            .new_node("n", Arc::new(NodeDefinition::new("T", 1)), None)
            .unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        graph.subscribe(move |e| sink.lock().push(e.clone()));

        graph.set_property(id, "a.b", PropertyValue::Int(vec![1])).unwrap();
        graph.set_property(id, "a.b", PropertyValue::Int(vec![2])).unwrap();
        assert!(graph
            .insert_property_values(id, "a.b", 0, PropertyValue::Int(vec![0]))
            .unwrap());
        assert!(!graph
            .insert_property_values(id, "a.b", 0, PropertyValue::Float(vec![0.0]))
            .unwrap());
        graph.remove_property(id, "a.b").unwrap();

        let name = || "a.b".to_string();
        assert_eq!(
            *seen.lock(),
            vec![
                GraphEvent::NewProperty { node: id, name: name() },
                GraphEvent::PropertyWillChange { node: id, name: name() },
                GraphEvent::PropertyChanged { node: id, name: name() },
                GraphEvent::PropertyWillInsert { node: id, name: name(), index: 0, size: 1 },
                GraphEvent::PropertyDidInsert { node: id, name: name(), index: 0, size: 1 },
                GraphEvent::PropertyWillBeDeleted { node: id, name: name() },
                GraphEvent::PropertyDeleted { node: id, name: name() },
            ]
        );
    }

    #[test]
    fn ui_name_prefers_property() {
        use crate::graph::NodeDefinition;
        use std::sync::Arc;

        let mut graph = Graph::default();
        let id = graph
            .new_node("sourceGroup000001", Arc::new(NodeDefinition::new("T", 1)), None)
            .unwrap();
        assert_eq!(graph.ui_name(id).unwrap(), "sourceGroup000001");

        graph
            .set_property(id, "ui.name", PropertyValue::String(vec!["Plate".into()]))
            .unwrap();
        assert_eq!(graph.ui_name(id).unwrap(), "Plate");
    }
}
