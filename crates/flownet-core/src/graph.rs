//! The flow graph: nodes, directed connections, and the per-tick transfer
//! allocation step.
//!
//! # Design
//!
//! - Nodes and connections live in `SlotMap`s; insertion order is tracked
//!   separately so queries and allocation walks are deterministic.
//! - Adjacency is a `SecondaryMap` keyed by `NodeId`, guaranteeing key
//!   synchronization with the primary nodes map.
//! - `compute_step` never fails: infeasible transfers degrade to partial or
//!   zero amounts and are reported in the result, not thrown.

use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};

use crate::error::FlowError;
use crate::fixed::{checked_mul_64, ticks_to_fixed64, Fixed64};
use crate::id::{ConnectionId, NodeId};
use crate::node::{FlowConnection, FlowNode, NodeRole, NodeSpec, NodeStatus};
use crate::resource::ResourceType;
use crate::sim::SimTime;

// ---------------------------------------------------------------------------
// Adjacency
// ---------------------------------------------------------------------------

/// Inbound and outbound connection lists for a single node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NodeAdjacency {
    /// Connections whose target is this node.
    inbound: Vec<ConnectionId>,
    /// Connections whose source is this node.
    outbound: Vec<ConnectionId>,
}

// ---------------------------------------------------------------------------
// Step input / output
// ---------------------------------------------------------------------------

/// One connection due to act this tick, with the amount it wants to move.
///
/// The engine computes `requested` from the owning transfer task's entries
/// (driven connections) or from `rate * dt` (standalone connections).
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest {
    pub connection: ConnectionId,
    pub requested: Fixed64,
}

/// Why a transfer moved less than it requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortfallCause {
    /// The source could not supply the full amount. This is the
    /// "insufficient supply" condition surfaced to the monitor.
    InsufficientSupply,
    /// The target had no room. Backpressure, not a supply failure.
    TargetFull,
}

/// One executed (possibly partial, possibly zero) transfer.
#[derive(Debug, Clone, Copy)]
pub struct AppliedTransfer {
    pub connection: ConnectionId,
    pub from: NodeId,
    pub to: NodeId,
    pub resource: ResourceType,
    pub requested: Fixed64,
    pub delivered: Fixed64,
    pub shortfall: Option<ShortfallCause>,
}

impl AppliedTransfer {
    /// Whether the source failed to cover the request.
    pub fn insufficient_supply(&self) -> bool {
        matches!(self.shortfall, Some(ShortfallCause::InsufficientSupply))
    }
}

/// A node status flip recorded while reconciling the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub node: NodeId,
    pub from: NodeStatus,
    pub to: NodeStatus,
}

/// A consumer node draining its own buffer.
#[derive(Debug, Clone, Copy)]
pub struct ConsumerDrain {
    pub node: NodeId,
    pub resource: ResourceType,
    pub want: Fixed64,
    pub taken: Fixed64,
}

impl ConsumerDrain {
    /// Whether the node's demand went unmet this tick.
    pub fn starved(&self) -> bool {
        self.taken < self.want
    }
}

/// A converter node transforming its input type into its output type.
#[derive(Debug, Clone, Copy)]
pub struct Conversion {
    pub node: NodeId,
    pub from: ResourceType,
    pub to: ResourceType,
    pub amount: Fixed64,
}

// ---------------------------------------------------------------------------
// FlowGraph
// ---------------------------------------------------------------------------

/// Nodes and directed connections, with deterministic iteration and the
/// transfer allocation algorithm.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowGraph {
    nodes: SlotMap<NodeId, FlowNode>,
    connections: SlotMap<ConnectionId, FlowConnection>,
    adjacency: SecondaryMap<NodeId, NodeAdjacency>,

    /// Node ids in registration order. Drives `nodes()` and every
    /// deterministic per-node walk.
    node_order: Vec<NodeId>,
    /// Connection ids in registration order. Breaks allocation ties.
    connection_order: Vec<ConnectionId>,
    /// Monotonic registration sequence per connection, for tie-breaks that
    /// survive removals.
    connection_seq: SecondaryMap<ConnectionId, u64>,
    next_connection_seq: u64,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Structure
    // -----------------------------------------------------------------------

    /// Add a node from an already-validated `NodeSpec`.
    pub fn add_node(&mut self, spec: &NodeSpec) -> NodeId {
        let id = self.nodes.insert(FlowNode::from_spec(spec));
        self.adjacency.insert(id, NodeAdjacency::default());
        self.node_order.push(id);
        id
    }

    /// Remove a node and every connection touching it. Returns the removed
    /// connection ids, or `None` when the node was already gone.
    pub fn remove_node(&mut self, node: NodeId) -> Option<Vec<ConnectionId>> {
        self.nodes.get(node)?;

        let dropped: Vec<ConnectionId> = self
            .adjacency
            .get(node)
            .map(|adj| adj.inbound.iter().chain(adj.outbound.iter()).copied().collect())
            .unwrap_or_default();
        for conn in &dropped {
            self.remove_connection(*conn);
        }

        self.nodes.remove(node);
        self.adjacency.remove(node);
        self.node_order.retain(|&n| n != node);
        Some(dropped)
    }

    /// Connect two nodes. Fails with `UnknownNode` when either endpoint is
    /// unregistered, or `Configuration` when the rates are malformed or the
    /// connection is a self-loop.
    pub fn add_connection(&mut self, conn: FlowConnection) -> Result<ConnectionId, FlowError> {
        if !self.nodes.contains_key(conn.from) {
            return Err(FlowError::UnknownNode(conn.from));
        }
        if !self.nodes.contains_key(conn.to) {
            return Err(FlowError::UnknownNode(conn.to));
        }
        if conn.from == conn.to {
            return Err(FlowError::Configuration(
                "connection endpoints must differ".into(),
            ));
        }
        conn.validate()?;

        let from = conn.from;
        let to = conn.to;
        let id = self.connections.insert(conn);
        if let Some(adj) = self.adjacency.get_mut(from) {
            adj.outbound.push(id);
        }
        if let Some(adj) = self.adjacency.get_mut(to) {
            adj.inbound.push(id);
        }
        self.connection_order.push(id);
        self.connection_seq.insert(id, self.next_connection_seq);
        self.next_connection_seq += 1;
        Ok(id)
    }

    /// Remove a connection. Returns the removed connection, if it existed.
    pub fn remove_connection(&mut self, id: ConnectionId) -> Option<FlowConnection> {
        let conn = self.connections.remove(id)?;
        if let Some(adj) = self.adjacency.get_mut(conn.from) {
            adj.outbound.retain(|&c| c != id);
        }
        if let Some(adj) = self.adjacency.get_mut(conn.to) {
            adj.inbound.retain(|&c| c != id);
        }
        self.connection_order.retain(|&c| c != id);
        self.connection_seq.remove(id);
        Some(conn)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Option<&FlowNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut FlowNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in registration order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &FlowNode)> {
        self.node_order.iter().filter_map(|&id| Some((id, self.nodes.get(id)?)))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&FlowConnection> {
        self.connections.get(id)
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut FlowConnection> {
        self.connections.get_mut(id)
    }

    /// Connections in registration order.
    pub fn connections(&self) -> impl Iterator<Item = (ConnectionId, &FlowConnection)> {
        self.connection_order
            .iter()
            .filter_map(|&id| Some((id, self.connections.get(id)?)))
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Connections feeding into a node.
    pub fn inbound(&self, node: NodeId) -> &[ConnectionId] {
        self.adjacency
            .get(node)
            .map(|adj| adj.inbound.as_slice())
            .unwrap_or(&[])
    }

    /// Connections leaving a node.
    pub fn outbound(&self, node: NodeId) -> &[ConnectionId] {
        self.adjacency
            .get(node)
            .map(|adj| adj.outbound.as_slice())
            .unwrap_or(&[])
    }

    /// Position of a node in registration order. Used for deterministic
    /// tie-breaks when ranking nodes.
    pub fn node_position(&self, node: NodeId) -> Option<usize> {
        self.node_order.iter().position(|&n| n == node)
    }

    // -----------------------------------------------------------------------
    // Pause control
    // -----------------------------------------------------------------------

    /// Pause or resume a node. Returns the status transition when the call
    /// changed anything.
    pub fn set_paused(
        &mut self,
        node: NodeId,
        paused: bool,
    ) -> Result<Option<StatusTransition>, FlowError> {
        let n = self.nodes.get_mut(node).ok_or(FlowError::UnknownNode(node))?;
        let from = n.status;
        let to = if paused {
            NodeStatus::Paused
        } else if n.status == NodeStatus::Paused {
            // Re-evaluated against supply on the next reconcile.
            NodeStatus::Active
        } else {
            n.status
        };
        if from == to {
            return Ok(None);
        }
        n.status = to;
        Ok(Some(StatusTransition { node, from, to }))
    }

    // -----------------------------------------------------------------------
    // Transfer allocation
    // -----------------------------------------------------------------------

    /// Execute the due transfer set for this tick.
    ///
    /// Allocation order is ascending target-node priority (lower value is
    /// served first); ties fall back to connection registration order, so a
    /// contended source pays out deterministically. Each transfer moves
    /// `min(requested, source availability, target free capacity)`, where a
    /// producer source additionally caps its total outflow this tick at
    /// `rate * dt`.
    pub fn compute_step(&mut self, dt: SimTime, due: &[TransferRequest]) -> Vec<AppliedTransfer> {
        let dt_fixed = ticks_to_fixed64(dt);

        // Producer outflow budgets for this tick.
        let mut budgets: SecondaryMap<NodeId, Fixed64> = SecondaryMap::new();
        for &id in &self.node_order {
            if let Some(node) = self.nodes.get(id)
                && node.role == NodeRole::Producer
            {
                let budget = checked_mul_64(node.rate, dt_fixed).unwrap_or(Fixed64::MAX);
                budgets.insert(id, budget);
            }
        }

        // Sort the due set by (target priority, registration seq). The sort
        // is stable but the explicit seq key keeps order independent of how
        // the caller assembled `due`.
        let mut ordered: Vec<(u32, u64, TransferRequest)> = due
            .iter()
            .filter_map(|req| {
                let conn = self.connections.get(req.connection)?;
                let target = self.nodes.get(conn.to)?;
                let seq = self.connection_seq.get(req.connection).copied()?;
                Some((target.priority, seq, *req))
            })
            .collect();
        ordered.sort_by_key(|&(priority, seq, _)| (priority, seq));

        let mut applied = Vec::with_capacity(ordered.len());
        for (_, _, req) in ordered {
            let Some(conn) = self.connections.get(req.connection) else {
                continue;
            };
            let (from, to, resource) = (conn.from, conn.to, conn.resource);

            let Some(source) = self.nodes.get(from) else { continue };
            let Some(target) = self.nodes.get(to) else { continue };
            // Paused endpoints sit the tick out entirely.
            if source.status == NodeStatus::Paused || target.status == NodeStatus::Paused {
                continue;
            }

            let requested = req.requested.max(Fixed64::ZERO);
            let mut supply = source.amount(resource);
            if let Some(budget) = budgets.get(from) {
                supply = supply.min(*budget);
            }
            let room = target.free(resource);
            let delivered = requested.min(supply).min(room).max(Fixed64::ZERO);

            if delivered > Fixed64::ZERO {
                // Endpoints differ (self-connections are rejected at
                // registration), so sequential borrows are safe.
                if let Some(src) = self.nodes.get_mut(from) {
                    src.withdraw(resource, delivered);
                }
                if let Some(dst) = self.nodes.get_mut(to) {
                    dst.deposit(resource, delivered);
                }
                if let Some(budget) = budgets.get_mut(from) {
                    *budget -= delivered;
                }
            }

            let shortfall = if delivered >= requested {
                None
            } else if supply < requested {
                Some(ShortfallCause::InsufficientSupply)
            } else {
                Some(ShortfallCause::TargetFull)
            };

            applied.push(AppliedTransfer {
                connection: req.connection,
                from,
                to,
                resource,
                requested,
                delivered,
                shortfall,
            });
        }

        applied
    }

    // -----------------------------------------------------------------------
    // Node dynamics
    // -----------------------------------------------------------------------

    /// Drain every active consumer node by `rate * dt` of its resource.
    /// Walks nodes in registration order.
    pub fn drain_consumers(&mut self, dt: SimTime) -> Vec<ConsumerDrain> {
        let dt_fixed = ticks_to_fixed64(dt);
        let mut drains = Vec::new();
        for &id in &self.node_order.clone() {
            let Some(node) = self.nodes.get_mut(id) else { continue };
            if node.role != NodeRole::Consumer || !node.is_active() {
                continue;
            }
            let want = checked_mul_64(node.rate, dt_fixed).unwrap_or(Fixed64::MAX);
            if want == Fixed64::ZERO {
                continue;
            }
            let resource = node.resource;
            let taken = node.withdraw(resource, want);
            drains.push(ConsumerDrain {
                node: id,
                resource,
                want,
                taken,
            });
        }
        drains
    }

    /// Run every active converter: move `rate * dt` of the input type to the
    /// output type, bounded by buffer and free capacity.
    pub fn run_converters(&mut self, dt: SimTime) -> Vec<Conversion> {
        let dt_fixed = ticks_to_fixed64(dt);
        let mut conversions = Vec::new();
        for &id in &self.node_order.clone() {
            let Some(node) = self.nodes.get_mut(id) else { continue };
            let NodeRole::Converter { output } = node.role else {
                continue;
            };
            if !node.is_active() {
                continue;
            }
            let input = node.resource;
            let amount = checked_mul_64(node.rate, dt_fixed)
                .unwrap_or(Fixed64::MAX)
                .min(node.amount(input))
                .min(node.free(output));
            if amount == Fixed64::ZERO {
                continue;
            }
            node.withdraw(input, amount);
            node.deposit(output, amount);
            conversions.push(Conversion {
                node: id,
                from: input,
                to: output,
                amount,
            });
        }
        conversions
    }

    /// Re-derive depleted/active statuses after the tick's flows settle.
    ///
    /// A node is depleted when its total buffer is zero and no inbound
    /// connection has an active source; it recovers the tick its buffer (or
    /// an inbound source) comes back. Paused nodes are left alone.
    pub fn reconcile_statuses(&mut self) -> Vec<StatusTransition> {
        let mut transitions = Vec::new();
        for &id in &self.node_order.clone() {
            let Some(node) = self.nodes.get(id) else { continue };
            if node.status == NodeStatus::Paused {
                continue;
            }

            let empty = node.total_amount() == Fixed64::ZERO;
            let has_active_feed = self.inbound(id).iter().any(|&conn| {
                self.connections
                    .get(conn)
                    .and_then(|c| self.nodes.get(c.from))
                    .is_some_and(|src| src.status == NodeStatus::Active)
            });

            let next = if empty && !has_active_feed {
                NodeStatus::Depleted
            } else {
                NodeStatus::Active
            };

            let from = node.status;
            if from != next {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.status = next;
                }
                transitions.push(StatusTransition {
                    node: id,
                    from,
                    to: next,
                });
            }
        }
        transitions
    }

    /// Sum of buffered amounts for one resource type across all nodes.
    /// Transfers must leave this unchanged (the conservation law).
    pub fn total_amount(&self, resource: ResourceType) -> Fixed64 {
        self.node_order
            .iter()
            .filter_map(|&id| self.nodes.get(id))
            .map(|n| n.amount(resource))
            .fold(Fixed64::ZERO, |acc, v| acc + v)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
