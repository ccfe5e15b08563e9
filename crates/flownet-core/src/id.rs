use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a node (producer/consumer/storage/converter) in the flow graph.
    pub struct NodeId;

    /// Identifies a directed connection between two nodes in the flow graph.
    pub struct ConnectionId;
}

/// Identifies a registered task in the scheduler. Allocated at registration,
/// stable for the task's whole lifetime, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

/// Identifies an event-bus subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub u64);

/// A pending node ID returned from queued registrations. Resolves to a real
/// `NodeId` when the change applies at the next tick boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingNodeId(pub u64);

/// A pending connection ID returned from queued registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingConnectionId(pub u64);

/// A node endpoint in a registration call: either an already-applied node or
/// one still pending in the change queue. Lets a caller wire up a whole
/// network in one batch without waiting for a tick between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Id(NodeId),
    Pending(PendingNodeId),
}

impl From<NodeId> for NodeRef {
    fn from(id: NodeId) -> Self {
        NodeRef::Id(id)
    }
}

impl From<PendingNodeId> for NodeRef {
    fn from(id: PendingNodeId) -> Self {
        NodeRef::Pending(id)
    }
}
