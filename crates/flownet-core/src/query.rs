//! Read-only query API for inspecting network state.
//!
//! Provides snapshot types that aggregate engine state into convenient views
//! for rendering, UI, and tooling. All types are owned copies -- no
//! references into internal engine storage.

use crate::fixed::Fixed64;
use crate::graph::FlowGraph;
use crate::id::{ConnectionId, NodeId};
use crate::node::{FlowConnection, FlowNode, NodeRole, NodeStatus};
use crate::resource::{PerResource, ResourceType};

// ---------------------------------------------------------------------------
// Node snapshot
// ---------------------------------------------------------------------------

/// An aggregated, read-only view of a single node in the flow graph.
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    /// The node's ID in the flow graph.
    pub id: NodeId,
    pub role: NodeRole,
    /// Primary resource type (deposit, demand, or conversion input).
    pub resource: ResourceType,
    pub status: NodeStatus,
    /// Buffered amount per resource type.
    pub amounts: PerResource<Fixed64>,
    /// Per-type buffer bound.
    pub max_amount: Fixed64,
    /// Extraction / consumption / conversion cap per time unit.
    pub rate: Fixed64,
    /// Lower value = served first on contention.
    pub priority: u32,
    /// Connections targeting this node.
    pub inbound: Vec<ConnectionId>,
    /// Connections leaving this node.
    pub outbound: Vec<ConnectionId>,
}

impl NodeSnapshot {
    pub(crate) fn capture(graph: &FlowGraph, id: NodeId, node: &FlowNode) -> Self {
        Self {
            id,
            role: node.role,
            resource: node.resource,
            status: node.status,
            amounts: PerResource::from_fn(|r| node.amount(r)),
            max_amount: node.max_amount,
            rate: node.rate,
            priority: node.priority,
            inbound: graph.inbound(id).to_vec(),
            outbound: graph.outbound(id).to_vec(),
        }
    }

    /// Total buffered amount across all resource types.
    pub fn total_amount(&self) -> Fixed64 {
        ResourceType::ALL
            .iter()
            .map(|&r| self.amounts[r])
            .fold(Fixed64::ZERO, |acc, v| acc + v)
    }
}

// ---------------------------------------------------------------------------
// Connection snapshot
// ---------------------------------------------------------------------------

/// An aggregated, read-only view of a single connection.
#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    /// The connection's ID in the flow graph.
    pub id: ConnectionId,
    pub from: NodeId,
    pub to: NodeId,
    pub resource: ResourceType,
    /// Current nominal rate per time unit.
    pub rate: Fixed64,
    pub max_rate: Fixed64,
    /// Whether a transfer task drives this connection.
    pub driven: bool,
}

impl ConnectionSnapshot {
    pub(crate) fn capture(id: ConnectionId, conn: &FlowConnection) -> Self {
        Self {
            id,
            from: conn.from,
            to: conn.to,
            resource: conn.resource,
            rate: conn.rate,
            max_rate: conn.max_rate,
            driven: conn.driven,
        }
    }
}
