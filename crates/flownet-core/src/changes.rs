//! Boundary change queue for externally-submitted engine mutations.
//!
//! Registration and unregistration calls never touch the ledger, graph, or
//! scheduler directly. They validate synchronously, then enqueue a [`Change`]
//! that the engine applies at the start of the next tick. A tick already in
//! progress is never interrupted, and replays from identical submissions are
//! deterministic.
//!
//! Handles for structures created by a queued change (nodes, connections)
//! are pending ids; the [`ChangeResult`] of the applying tick maps them to
//! their real ids.

use crate::error::FlowError;
use crate::fixed::Fixed64;
use crate::id::{ConnectionId, NodeId, NodeRef, PendingConnectionId, PendingNodeId, TaskId};
use crate::node::NodeSpec;
use crate::resource::ResourceType;
use crate::sim::SimTime;
use crate::task::{ConsumptionSpec, FlowSpec, ProductionSpec};

// ---------------------------------------------------------------------------
// Change enum
// ---------------------------------------------------------------------------

/// A single mutation waiting for the next tick boundary.
///
/// Payloads are validated before queueing; a change can still be rejected at
/// apply time when it references an id that disappeared in the meantime.
#[derive(Debug, Clone)]
pub enum Change {
    /// Add a node to the flow graph.
    AddNode {
        pending: PendingNodeId,
        spec: NodeSpec,
    },
    /// Remove a node and every connection touching it.
    RemoveNode { node: NodeId },
    /// Add a standalone connection between two nodes.
    Connect {
        pending: PendingConnectionId,
        from: NodeRef,
        to: NodeRef,
        resource: ResourceType,
        rate: Fixed64,
        max_rate: Fixed64,
    },
    /// Remove a connection.
    Disconnect { connection: ConnectionId },
    /// Register a production task.
    RegisterProduction { task: TaskId, spec: ProductionSpec },
    /// Register a consumption task.
    RegisterConsumption { task: TaskId, spec: ConsumptionSpec },
    /// Register a transfer task with its driven connections.
    RegisterFlow { task: TaskId, spec: FlowSpec },
    /// Unregister a task of any kind.
    UnregisterTask { task: TaskId },
    /// Change a ledger capacity. Stock above the new capacity is discarded
    /// and reported.
    SetCapacity {
        resource: ResourceType,
        capacity: Fixed64,
    },
    /// Pause or resume a node.
    SetNodePaused { node: NodeId, paused: bool },
}

// ---------------------------------------------------------------------------
// ChangeQueue
// ---------------------------------------------------------------------------

/// Changes waiting to be applied at the next tick boundary.
///
/// Supports optional history tracking for replay and debugging.
#[derive(Debug)]
pub struct ChangeQueue {
    /// Changes waiting to be applied, in submission order.
    pending: Vec<Change>,
    /// History of applied changes: (time, change).
    history: Vec<(SimTime, Change)>,
    /// Maximum history entries to retain. 0 = no history.
    max_history: usize,
}

impl Default for ChangeQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeQueue {
    /// Create an empty queue with no history tracking.
    pub fn new() -> Self {
        Self::with_max_history(0)
    }

    /// Create a queue that retains up to `max_history` applied entries.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            pending: Vec::new(),
            history: Vec::new(),
            max_history,
        }
    }

    /// Queue a single change.
    pub fn push(&mut self, change: Change) {
        self.pending.push(change);
    }

    /// Drain all pending changes in submission order, recording them in
    /// history against `now`.
    pub fn drain(&mut self, now: SimTime) -> Vec<Change> {
        let changes: Vec<Change> = self.pending.drain(..).collect();

        if self.max_history > 0 {
            self.history
                .extend(changes.iter().map(|c| (now, c.clone())));
            let excess = self.history.len().saturating_sub(self.max_history);
            if excess > 0 {
                self.history.drain(..excess);
            }
        }

        changes
    }

    /// Number of changes waiting to be applied.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Applied changes as (time, change) pairs, oldest first.
    pub fn history(&self) -> &[(SimTime, Change)] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

// ---------------------------------------------------------------------------
// ChangeResult
// ---------------------------------------------------------------------------

/// Outcome of applying one tick boundary's drained changes.
///
/// Carries the pending-to-real id mappings for structures created this
/// boundary, plus any changes that had to be rejected at apply time.
#[derive(Debug, Default)]
pub struct ChangeResult {
    /// Changes that applied cleanly.
    pub applied: usize,
    /// Changes rejected at apply time, with the reason.
    pub rejected: Vec<(Change, FlowError)>,
    node_map: Vec<(PendingNodeId, NodeId)>,
    connection_map: Vec<(PendingConnectionId, ConnectionId)>,
}

impl ChangeResult {
    /// Look up the real id of a node created this boundary.
    pub fn resolve_node(&self, pending: PendingNodeId) -> Option<NodeId> {
        self.node_map
            .iter()
            .find(|(p, _)| *p == pending)
            .map(|(_, id)| *id)
    }

    /// Look up the real id of a connection created this boundary.
    pub fn resolve_connection(&self, pending: PendingConnectionId) -> Option<ConnectionId> {
        self.connection_map
            .iter()
            .find(|(p, _)| *p == pending)
            .map(|(_, id)| *id)
    }

    pub(crate) fn record_node(&mut self, pending: PendingNodeId, id: NodeId) {
        self.node_map.push((pending, id));
    }

    pub(crate) fn record_connection(&mut self, pending: PendingConnectionId, id: ConnectionId) {
        self.connection_map.push((pending, id));
    }

    pub(crate) fn record_rejected(&mut self, change: Change, error: FlowError) {
        self.rejected.push((change, error));
    }
}

// ===========================================================================
// Tests
// ===========================================================================
