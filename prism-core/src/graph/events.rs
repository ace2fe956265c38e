//! Graph events and subscribers.
//!
//! Every per-node signal and every graph-level hook is delivered to
//! subscribers as a `GraphEvent`. A subscriber is just a callback with an ID
//! so it can be removed later.

use std::sync::atomic::{AtomicU64, Ordering};

use super::node::NodeId;
use super::propagate::PropagateTarget;

/// Unique identifier for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Something that happened to a node or to the graph.
///
/// Variants prefixed with `Graph` are the graph-level hooks; the rest are
/// per-node signals.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    NodeCreated(NodeId),
    WillDelete(NodeId),
    NodeDeleted { name: String },

    /// The input list of `node` was replaced or reordered.
    InputsChanged(NodeId),
    /// Graph hook for `InputsChanged`, fired for every node.
    GraphInputsChanged(NodeId),
    OutputsChanged(NodeId),

    /// `node` was notified that its input at `index` changed.
    InputChanged { node: NodeId, index: usize },
    InputStateChanged { node: NodeId, index: usize },
    StateChanged(NodeId),

    RangeChanged(NodeId),
    InputRangeChanged {
        node: NodeId,
        index: usize,
        target: PropagateTarget,
    },
    GraphRangeChanged(NodeId),

    ImageStructureChanged(NodeId),
    InputImageStructureChanged {
        node: NodeId,
        index: usize,
        target: PropagateTarget,
    },
    GraphImageStructureChanged(NodeId),

    MediaChanged(NodeId),
    InputMediaChanged {
        node: NodeId,
        source: NodeId,
        index: usize,
        target: PropagateTarget,
    },
    GraphMediaChanged(NodeId),

    FlushCaches(NodeId),

    Isolated(NodeId),
    Restored(NodeId),

    NewProperty { node: NodeId, name: String },
    PropertyWillChange { node: NodeId, name: String },
    PropertyChanged { node: NodeId, name: String },
    PropertyWillBeDeleted { node: NodeId, name: String },
    PropertyDeleted { node: NodeId, name: String },
    PropertyWillInsert {
        node: NodeId,
        name: String,
        index: usize,
        size: usize,
    },
    PropertyDidInsert {
        node: NodeId,
        name: String,
        index: usize,
        size: usize,
    },
}

/// A registered event callback.
pub struct Subscriber {
    id: SubscriberId,
    notify: Box<dyn Fn(&GraphEvent) + Send + Sync>,
}

impl Subscriber {
    /// Create a new subscriber with the given callback.
    pub fn new<F>(notify: F) -> Self
    where
        F: Fn(&GraphEvent) + Send + Sync + 'static,
    {
        Self {
            id: SubscriberId::new(),
            notify: Box::new(notify),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn notify(&self, event: &GraphEvent) {
        (self.notify)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn subscriber_notify_calls_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscriber = Subscriber::new(move |e| sink.lock().push(e.clone()));

        let node = NodeId::new();
        subscriber.notify(&GraphEvent::StateChanged(node));

        assert_eq!(*seen.lock(), vec![GraphEvent::StateChanged(node)]);
    }
}
