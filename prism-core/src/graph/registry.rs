//! The graph arena and its name registries.
//!
//! The `Graph` owns every node. Nodes refer to each other through `NodeId`
//! handles, so there is no ownership cycle between inputs and outputs. Two
//! insertion-ordered name maps sit on top of the arena: the live registry,
//! which normal lookups and traversals see, and the isolated registry, which
//! holds nodes removed for undo.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::definition::NodeDefinition;
use super::events::{GraphEvent, Subscriber, SubscriberId};
use super::node::{Node, NodeId, NodeRole};
use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::eval::{AdaptorBehavior, Context, GroupBehavior};

/// Owner of all nodes, plus the live and isolated name registries.
pub struct Graph {
    nodes: IndexMap<NodeId, Node>,
    live: IndexMap<String, NodeId>,
    isolated: IndexMap<String, NodeId>,
    subscribers: RwLock<Vec<Subscriber>>,
    config: GraphConfig,
}

impl Graph {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            nodes: IndexMap::new(),
            live: IndexMap::new(),
            isolated: IndexMap::new(),
            subscribers: RwLock::new(Vec::new()),
            config,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Evaluation context for `frame` using the configured viewport.
    pub fn context_for_frame(&self, frame: i32) -> Context {
        Context {
            frame,
            view_width: self.config.view_width,
            view_height: self.config.view_height,
            fps: self.config.fps,
        }
    }

    //
    //  Events
    //

    /// Register a callback that receives every graph event.
    pub fn subscribe<F>(&self, notify: F) -> SubscriberId
    where
        F: Fn(&GraphEvent) + Send + Sync + 'static,
    {
        let subscriber = Subscriber::new(notify);
        let id = subscriber.id();
        self.subscribers.write().push(subscriber);
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id() != id);
        subscribers.len() != before
    }

    pub(crate) fn emit(&self, event: GraphEvent) {
        for subscriber in self.subscribers.read().iter() {
            subscriber.notify(&event);
        }
    }

    //
    //  Node access
    //

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(GraphError::NoSuchNode(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(&id).ok_or(GraphError::NoSuchNode(id))
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Name of a node, or `"<dangling>"` for stale handles. Used in logs.
    pub(crate) fn display_name(&self, id: NodeId) -> String {
        self.nodes
            .get(&id)
            .map(|n| n.name().to_string())
            .unwrap_or_else(|| format!("<dangling {}>", id.raw()))
    }

    /// Number of nodes in the arena, live and isolated.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Every node in the arena, in creation order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Live node names in registration order.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.live.keys().map(String::as_str)
    }

    //
    //  Construction
    //

    /// Create a node, register it under a unique name and add it to `group`.
    pub fn new_node(
        &mut self,
        name: &str,
        definition: Arc<NodeDefinition>,
        group: Option<NodeId>,
    ) -> Result<NodeId> {
        self.insert_node(name, definition, group, NodeRole::Plain)
    }

    /// Create a group node. Its evaluation goes through its root member.
    pub fn new_group(
        &mut self,
        name: &str,
        definition: NodeDefinition,
        group: Option<NodeId>,
    ) -> Result<NodeId> {
        let definition = definition.with_behavior(Arc::new(GroupBehavior));
        self.insert_node(
            name,
            Arc::new(definition),
            group,
            NodeRole::Group {
                members: IndexSet::new(),
                root: None,
            },
        )
    }

    /// Create an adaptor member of `group` standing in for `group_input`.
    pub fn new_adaptor(
        &mut self,
        name: &str,
        group: NodeId,
        group_input: Option<NodeId>,
    ) -> Result<NodeId> {
        let definition = NodeDefinition::new("Adaptor", 1)
            .with_inputs(0, Some(0))
            .unconstrained_inputs(true)
            .with_behavior(Arc::new(AdaptorBehavior));
        self.insert_node(
            name,
            Arc::new(definition),
            Some(group),
            NodeRole::Adaptor { group_input },
        )
    }

    fn insert_node(
        &mut self,
        name: &str,
        definition: Arc<NodeDefinition>,
        group: Option<NodeId>,
        role: NodeRole,
    ) -> Result<NodeId> {
        if let Some(g) = group {
            if !self.node(g)?.is_group() {
                return Err(GraphError::NotAGroup(self.display_name(g)));
            }
        }

        let name = self.unique_name(name);
        let node = Node::new(name.clone(), definition, group, role);
        let id = node.id();

        self.nodes.insert(id, node);
        self.live.insert(name, id);

        if let Some(g) = group {
            if let NodeRole::Group { members, .. } = self.node_mut(g)?.role_mut() {
                members.insert(id);
            }
        }

        debug!(node = %self.display_name(id), "node created");
        self.emit(GraphEvent::NodeCreated(id));
        Ok(id)
    }

    //
    //  Groups
    //

    pub fn set_group_root(&mut self, group: NodeId, root: Option<NodeId>) -> Result<()> {
        let name = self.display_name(group);
        if let Some(r) = root {
            if self.node(r)?.group() != Some(group) {
                warn!(group = %name, root = %self.display_name(r), "group root is not a member");
            }
        }

        match self.node_mut(group)?.role_mut() {
            NodeRole::Group { root: slot, .. } => {
                *slot = root;
                Ok(())
            }
            _ => Err(GraphError::NotAGroup(name)),
        }
    }

    pub fn set_adaptor_input(&mut self, adaptor: NodeId, input: Option<NodeId>) -> Result<()> {
        match self.node_mut(adaptor)?.role_mut() {
            NodeRole::Adaptor { group_input } => {
                *group_input = input;
                Ok(())
            }
            _ => {
                warn!(node = %self.display_name(adaptor), "not an adaptor");
                Ok(())
            }
        }
    }

    /// Members of a group in insertion order. Empty for non-groups.
    pub fn group_members(&self, group: NodeId) -> Vec<NodeId> {
        match self.nodes.get(&group).map(Node::role) {
            Some(NodeRole::Group { members, .. }) => members.iter().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// Adaptor members of a group.
    pub(crate) fn group_adaptors(&self, group: NodeId) -> Vec<NodeId> {
        self.group_members(group)
            .into_iter()
            .filter(|m| {
                matches!(
                    self.nodes.get(m).map(Node::role),
                    Some(NodeRole::Adaptor { .. })
                )
            })
            .collect()
    }

    /// A node is writable only if it and every enclosing group are.
    pub fn is_writable(&self, id: NodeId) -> Result<bool> {
        let node = self.node(id)?;
        if let Some(g) = node.group() {
            if !self.is_writable(g)? {
                return Ok(false);
            }
        }
        Ok(node.flags().writable)
    }

    //
    //  Names and registries
    //

    /// Truncate `name` at the first character outside `[A-Za-z0-9_]`.
    pub fn canonical_name(name: &str) -> &str {
        let end = name
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(name.len());
        &name[..end]
    }

    fn name_taken(&self, name: &str) -> bool {
        self.live.contains_key(name) || self.isolated.contains_key(name)
    }

    /// A canonical name not used by any live or isolated node.
    ///
    /// A six digit zero padded counter in the middle of the name is bumped
    /// first, then a trailing number. Names with neither get `000002`
    /// appended.
    pub fn unique_name(&self, name: &str) -> String {
        let name = Self::canonical_name(name);
        if !self.name_taken(name) {
            return name.to_string();
        }

        if let Some((prefix, number, suffix)) = split_middle_counter(name) {
            return self.bump_counter(prefix, number, suffix);
        }

        if let Some((prefix, number)) = split_trailing_counter(name) {
            return self.bump_counter(prefix, number, "");
        }

        self.unique_name(&format!("{name}000002"))
    }

    /// Falls back to appending `000002` when the counter cannot grow.
    fn bump_counter(&self, prefix: &str, mut number: u64, suffix: &str) -> String {
        loop {
            let Some(next) = number.checked_add(1) else {
                return self.unique_name(&format!("{prefix}{number}{suffix}000002"));
            };
            number = next;
            let candidate = format!("{prefix}{number:06}{suffix}");
            if !self.name_taken(&candidate) {
                return candidate;
            }
        }
    }

    /// Look up a live node by name.
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.live.get(Self::canonical_name(name)).copied()
    }

    /// Look up a node in the live registry, then in the isolated one.
    pub fn find_node_possibly_isolated(&self, name: &str) -> Option<NodeId> {
        let name = Self::canonical_name(name);
        self.live
            .get(name)
            .or_else(|| self.isolated.get(name))
            .copied()
    }

    pub fn is_isolated(&self, id: NodeId) -> bool {
        self.nodes
            .get(&id)
            .is_some_and(|n| self.isolated.get(n.name()) == Some(&id))
    }

    pub(crate) fn add_live(&mut self, id: NodeId) -> Result<()> {
        let name = self.node(id)?.name().to_string();
        self.live.insert(name, id);
        Ok(())
    }

    /// Drop `id` from the live registry, unless the name now maps to another node.
    pub(crate) fn remove_live(&mut self, id: NodeId) -> Result<()> {
        let name = self.node(id)?.name().to_string();
        if self.live.get(&name) == Some(&id) {
            self.live.shift_remove(&name);
        }
        Ok(())
    }

    pub(crate) fn add_isolated(&mut self, id: NodeId) -> Result<()> {
        let name = self.node(id)?.name().to_string();
        self.isolated.insert(name, id);
        Ok(())
    }

    pub(crate) fn remove_isolated(&mut self, id: NodeId) -> Result<()> {
        let name = self.node(id)?.name().to_string();
        if self.isolated.get(&name) == Some(&id) {
            self.isolated.shift_remove(&name);
        }
        Ok(())
    }

    //
    //  Teardown
    //

    /// Mark a node as being deleted. All propagation through it stops.
    pub fn will_delete(&mut self, id: NodeId) -> Result<()> {
        self.node_mut(id)?.flags_mut().deleting = true;
        self.emit(GraphEvent::WillDelete(id));
        Ok(())
    }

    /// Delete a node: disconnect it, delete its group members, and drop it
    /// from its group, both registries and the arena.
    pub fn delete_node(&mut self, id: NodeId) -> Result<()> {
        self.will_delete(id)?;
        self.disconnect_outputs(id)?;
        self.disconnect_inputs(id)?;

        for member in self.group_members(id) {
            if self.contains(member) {
                self.delete_node(member)?;
            }
        }

        self.destroy(id)
    }

    fn destroy(&mut self, id: NodeId) -> Result<()> {
        let node = self.node(id)?;
        if !node.outputs().is_empty() {
            return Err(GraphError::OutputsConnected(node.name().to_string()));
        }
        let group = node.group();

        if let Some(g) = group {
            if let Some(NodeRole::Group { members, root }) =
                self.nodes.get_mut(&g).map(Node::role_mut)
            {
                members.shift_remove(&id);
                if *root == Some(id) {
                    *root = None;
                }
            }
        }

        self.remove_live(id)?;
        self.remove_isolated(id)?;

        if let Some(node) = self.nodes.shift_remove(&id) {
            debug!(node = %node.name(), "node destroyed");
            self.emit(GraphEvent::NodeDeleted {
                name: node.name().to_string(),
            });
        }
        Ok(())
    }

    /// Keep a removed node alive for an undo history.
    pub fn undo_ref(&mut self, id: NodeId) -> Result<usize> {
        let node = self.node_mut(id)?;
        let count = node.undo_ref_count() + 1;
        node.set_undo_ref_count(count);
        Ok(count)
    }

    /// Release one undo reference. Returns true when this destroyed the node.
    pub fn undo_deref(&mut self, id: NodeId) -> Result<bool> {
        let node = self.node_mut(id)?;
        let count = node.undo_ref_count();
        if count == 0 {
            return Err(GraphError::UndoRefUnderflow(node.name().to_string()));
        }

        node.set_undo_ref_count(count - 1);
        if count == 1 {
            self.delete_node(id)?;
            return Ok(true);
        }
        Ok(false)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}

/// `(prefix, number, suffix)` for names with six digits between two
/// non-digit runs, e.g. `sourceGroup000001_source`.
fn split_middle_counter(name: &str) -> Option<(&str, u64, &str)> {
    let bytes = name.as_bytes();
    if bytes.len() < 8 {
        return None;
    }

    (1..=bytes.len() - 7).rev().find_map(|start| {
        let end = start + 6;
        let digits = &bytes[start..end];
        let bounded = !bytes[start - 1].is_ascii_digit() && !bytes[end].is_ascii_digit();
        if bounded && digits.iter().all(u8::is_ascii_digit) {
            let number = name[start..end].parse().ok()?;
            Some((&name[..start], number, &name[end..]))
        } else {
            None
        }
    })
}

/// `(prefix, number)` for names ending in digits after a non-digit.
fn split_trailing_counter(name: &str) -> Option<(&str, u64)> {
    let start = name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if start == 0 || start == name.len() {
        return None;
    }
    let number = name[start..].parse().ok()?;
    Some((&name[..start], number))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def() -> Arc<NodeDefinition> {
        Arc::new(NodeDefinition::new("Test", 1).with_inputs(0, None))
    }

    #[test]
    fn canonical_name_truncates() {
        assert_eq!(Graph::canonical_name("color_1.look"), "color_1");
        assert_eq!(Graph::canonical_name("plain"), "plain");
    }

    #[test]
    fn unique_names_bump_counters() {
        let mut graph = Graph::default();
        let a = graph.new_node("source", def(), None).unwrap();
        let b = graph.new_node("source", def(), None).unwrap();
        let c = graph.new_node("source", def(), None).unwrap();

        assert_eq!(graph.node(a).unwrap().name(), "source");
        assert_eq!(graph.node(b).unwrap().name(), "source000002");
        assert_eq!(graph.node(c).unwrap().name(), "source000003");

        graph.new_node("group000001_color", def(), None).unwrap();
        assert_eq!(graph.unique_name("group000001_color"), "group000002_color");
        graph.new_node("layer7", def(), None).unwrap();
        assert_eq!(graph.unique_name("layer7"), "layer000008");
    }

    #[test]
    fn saturated_counter_appends_instead() {
        let mut graph = Graph::default();
        let name = format!("a{}", u64::MAX);
        let a = graph.new_node(&name, def(), None).unwrap();
        let b = graph.new_node(&name, def(), None).unwrap();
        let c = graph.new_node(&name, def(), None).unwrap();

        assert_eq!(graph.node(a).unwrap().name(), name);
        assert_eq!(graph.node(b).unwrap().name(), format!("{name}000002"));
        assert_ne!(graph.node(c).unwrap().name(), graph.node(b).unwrap().name());
        assert_ne!(graph.node(c).unwrap().name(), name);
    }

    #[test]
    fn registry_lookup_and_removal() {
        let mut graph = Graph::default();
        let a = graph.new_node("a", def(), None).unwrap();

        assert_eq!(graph.find_node("a"), Some(a));
        assert_eq!(graph.node_names().collect::<Vec<_>>(), vec!["a"]);

        graph.remove_live(a).unwrap();
        graph.add_isolated(a).unwrap();
        assert_eq!(graph.find_node("a"), None);
        assert_eq!(graph.find_node_possibly_isolated("a"), Some(a));
        assert!(graph.is_isolated(a));
    }

    #[test]
    fn group_membership_and_writability() {
        let mut graph = Graph::default();
        let group = graph
            .new_group("group", NodeDefinition::new("Group", 1), None)
            .unwrap();
        let member = graph.new_node("member", def(), Some(group)).unwrap();

        assert_eq!(graph.group_members(group), vec![member]);
        assert!(graph.is_writable(member).unwrap());

        graph.node_mut(group).unwrap().flags_mut().writable = false;
        assert!(!graph.is_writable(member).unwrap());
    }

    #[test]
    fn new_node_rejects_non_group_owner() {
        let mut graph = Graph::default();
        let a = graph.new_node("a", def(), None).unwrap();
        let err = graph.new_node("b", def(), Some(a)).unwrap_err();
        assert!(matches!(err, GraphError::NotAGroup(_)));
    }

    #[test]
    fn deleting_a_group_deletes_members() {
        let mut graph = Graph::default();
        let group = graph
            .new_group("group", NodeDefinition::new("Group", 1), None)
            .unwrap();
        let member = graph.new_node("member", def(), Some(group)).unwrap();
        graph.set_group_root(group, Some(member)).unwrap();

        graph.delete_node(group).unwrap();
        assert!(!graph.contains(group));
        assert!(!graph.contains(member));
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn undo_deref_destroys_at_zero() {
        let mut graph = Graph::default();
        let a = graph.new_node("a", def(), None).unwrap();

        assert!(matches!(
            graph.undo_deref(a),
            Err(GraphError::UndoRefUnderflow(_))
        ));

        graph.undo_ref(a).unwrap();
        graph.undo_ref(a).unwrap();
        assert!(!graph.undo_deref(a).unwrap());
        assert!(graph.contains(a));
        assert!(graph.undo_deref(a).unwrap());
        assert!(!graph.contains(a));
    }
}
