use serde::{Deserialize, Serialize};

use crate::error::FlowError;
use crate::fixed::Fixed64;
use crate::id::NodeId;
use crate::resource::{PerResource, ResourceType};

// ---------------------------------------------------------------------------
// Node role and status
// ---------------------------------------------------------------------------

/// What a node does with the resources it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    /// Holds a finite deposit of its resource, drained by outbound
    /// connections. Total outflow per tick is capped by `rate * dt`.
    Producer,
    /// Drains its own buffer by `rate * dt` each tick (the amount is
    /// destroyed). A shortfall marks the node starved for that tick.
    Consumer,
    /// Buffers any resource type up to `max_amount` per type.
    Storage,
    /// Turns `rate * dt` of the node's primary resource into `output`,
    /// one-to-one, bounded by buffer and free capacity.
    Converter { output: ResourceType },
}

/// Lifecycle status of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NodeStatus {
    #[default]
    Active,
    /// Buffer hit zero with no active inbound source. Cleared the tick
    /// supply resumes.
    Depleted,
    /// Excluded from every phase until unpaused by the external API.
    Paused,
}

// ---------------------------------------------------------------------------
// Node spec and node
// ---------------------------------------------------------------------------

/// Registration input for a node. Validated before it enters the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub role: NodeRole,
    /// Primary resource type: the deposit for producers, the demand for
    /// consumers, the conversion input for converters. Storage nodes use it
    /// only as a labelling default.
    pub resource: ResourceType,
    /// Starting amount of the primary resource.
    pub initial_amount: Fixed64,
    /// Per-resource-type buffer bound.
    pub max_amount: Fixed64,
    /// Extraction / consumption / conversion cap per time unit.
    pub rate: Fixed64,
    /// Lower value = served first on contention.
    pub priority: u32,
}

impl NodeSpec {
    /// Reject malformed registrations before they reach the graph.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.max_amount < Fixed64::ZERO {
            return Err(FlowError::Configuration(format!(
                "node max_amount must be non-negative, got {}",
                self.max_amount
            )));
        }
        if self.initial_amount < Fixed64::ZERO || self.initial_amount > self.max_amount {
            return Err(FlowError::Configuration(format!(
                "node initial_amount {} outside [0, {}]",
                self.initial_amount, self.max_amount
            )));
        }
        if self.rate < Fixed64::ZERO {
            return Err(FlowError::Configuration(format!(
                "node rate must be non-negative, got {}",
                self.rate
            )));
        }
        if let NodeRole::Converter { output } = self.role
            && output == self.resource
        {
            return Err(FlowError::Configuration(format!(
                "converter output must differ from its input ({output})"
            )));
        }
        Ok(())
    }
}

/// A node in the flow graph.
///
/// Buffers are per resource type so storage nodes can hold several kinds at
/// once; bounds (`0 <= amount <= max_amount`) hold independently per type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    pub role: NodeRole,
    pub resource: ResourceType,
    buffers: PerResource<Fixed64>,
    pub max_amount: Fixed64,
    pub rate: Fixed64,
    pub priority: u32,
    pub status: NodeStatus,
}

impl FlowNode {
    pub(crate) fn from_spec(spec: &NodeSpec) -> Self {
        let mut buffers = PerResource::default();
        buffers[spec.resource] = spec.initial_amount;
        Self {
            role: spec.role,
            resource: spec.resource,
            buffers,
            max_amount: spec.max_amount,
            rate: spec.rate,
            priority: spec.priority,
            status: NodeStatus::Active,
        }
    }

    /// Buffered amount of one resource type.
    #[inline]
    pub fn amount(&self, resource: ResourceType) -> Fixed64 {
        self.buffers[resource]
    }

    /// Total buffered amount across all resource types.
    pub fn total_amount(&self) -> Fixed64 {
        ResourceType::ALL
            .iter()
            .map(|&r| self.buffers[r])
            .fold(Fixed64::ZERO, |acc, v| acc + v)
    }

    /// Free capacity for one resource type.
    #[inline]
    pub fn free(&self, resource: ResourceType) -> Fixed64 {
        self.max_amount - self.buffers[resource]
    }

    /// Whether the node takes part in the current phase.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }

    /// Add up to `want`, bounded by free capacity. Returns the amount
    /// actually deposited.
    pub(crate) fn deposit(&mut self, resource: ResourceType, want: Fixed64) -> Fixed64 {
        let taken = want.min(self.free(resource)).max(Fixed64::ZERO);
        self.buffers[resource] += taken;
        taken
    }

    /// Remove up to `want`, bounded by the buffered amount. Returns the
    /// amount actually withdrawn.
    pub(crate) fn withdraw(&mut self, resource: ResourceType, want: Fixed64) -> Fixed64 {
        let taken = want.min(self.buffers[resource]).max(Fixed64::ZERO);
        self.buffers[resource] -= taken;
        taken
    }
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// A directed, rate-limited channel moving one resource type between two
/// nodes. Never moves more than `min(rate * window, source availability,
/// target free capacity)` per act -- transfers conserve, only production and
/// consumption create or destroy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConnection {
    pub from: NodeId,
    pub to: NodeId,
    pub resource: ResourceType,
    /// Nominal rate per time unit. `rate <= max_rate` always.
    pub rate: Fixed64,
    pub max_rate: Fixed64,
    /// Driven connections belong to a transfer task and act only when it
    /// fires; standalone connections act every tick.
    pub driven: bool,
}

impl FlowConnection {
    /// Reject malformed rate configuration.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.rate < Fixed64::ZERO || self.max_rate < Fixed64::ZERO {
            return Err(FlowError::Configuration(format!(
                "connection rates must be non-negative, got rate {} max_rate {}",
                self.rate, self.max_rate
            )));
        }
        if self.rate > self.max_rate {
            return Err(FlowError::Configuration(format!(
                "connection rate {} exceeds max_rate {}",
                self.rate, self.max_rate
            )));
        }
        Ok(())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::f64_to_fixed64 as fx;

    fn storage_spec() -> NodeSpec {
        NodeSpec {
            role: NodeRole::Storage,
            resource: ResourceType::Minerals,
            initial_amount: fx(0.0),
            max_amount: fx(100.0),
            rate: fx(0.0),
            priority: 5,
        }
    }

    // -----------------------------------------------------------------------
    // Test 1: spec_validation_bounds
    // -----------------------------------------------------------------------
    #[test]
    fn spec_validation_bounds() {
        let mut spec = storage_spec();
        assert!(spec.validate().is_ok());

        spec.initial_amount = fx(150.0);
        assert!(spec.validate().is_err());

        spec.initial_amount = fx(0.0);
        spec.rate = fx(-1.0);
        assert!(spec.validate().is_err());
    }

    // -----------------------------------------------------------------------
    // Test 2: converter_must_change_type
    // -----------------------------------------------------------------------
    #[test]
    fn converter_must_change_type() {
        let mut spec = storage_spec();
        spec.role = NodeRole::Converter {
            output: ResourceType::Minerals,
        };
        let err = spec.validate().unwrap_err();
        assert!(matches!(err, FlowError::Configuration(_)));

        spec.role = NodeRole::Converter {
            output: ResourceType::Energy,
        };
        assert!(spec.validate().is_ok());
    }

    // -----------------------------------------------------------------------
    // Test 3: deposit_respects_free_capacity
    // -----------------------------------------------------------------------
    #[test]
    fn deposit_respects_free_capacity() {
        let mut node = FlowNode::from_spec(&storage_spec());
        assert_eq!(node.deposit(ResourceType::Minerals, fx(60.0)), fx(60.0));
        assert_eq!(node.deposit(ResourceType::Minerals, fx(60.0)), fx(40.0));
        assert_eq!(node.amount(ResourceType::Minerals), fx(100.0));
        assert_eq!(node.free(ResourceType::Minerals), fx(0.0));
    }

    // -----------------------------------------------------------------------
    // Test 4: withdraw_respects_buffer
    // -----------------------------------------------------------------------
    #[test]
    fn withdraw_respects_buffer() {
        let mut node = FlowNode::from_spec(&storage_spec());
        node.deposit(ResourceType::Minerals, fx(25.0));
        assert_eq!(node.withdraw(ResourceType::Minerals, fx(40.0)), fx(25.0));
        assert_eq!(node.amount(ResourceType::Minerals), fx(0.0));
    }

    // -----------------------------------------------------------------------
    // Test 5: per_type_buffers_are_independent
    // -----------------------------------------------------------------------
    #[test]
    fn per_type_buffers_are_independent() {
        let mut node = FlowNode::from_spec(&storage_spec());
        node.deposit(ResourceType::Minerals, fx(100.0));
        // Minerals full, gas still has its own headroom.
        assert_eq!(node.deposit(ResourceType::Gas, fx(30.0)), fx(30.0));
        assert_eq!(node.total_amount(), fx(130.0));
    }

    // -----------------------------------------------------------------------
    // Test 6: connection_rate_validation
    // -----------------------------------------------------------------------
    #[test]
    fn connection_rate_validation() {
        let mut sm = slotmap::SlotMap::<NodeId, ()>::with_key();
        let a = sm.insert(());
        let b = sm.insert(());
        let mut conn = FlowConnection {
            from: a,
            to: b,
            resource: ResourceType::Gas,
            rate: fx(5.0),
            max_rate: fx(10.0),
            driven: false,
        };
        assert!(conn.validate().is_ok());

        conn.rate = fx(12.0);
        assert!(conn.validate().is_err());
    }
}
