//! Registered task types: production, consumption, and transfer entries,
//! plus the ledger conditions that can gate a production fire.
//!
//! Tasks are owned by the scheduler and referenced, never copied, by the
//! optimizer when it tunes intervals. Registration input is validated here
//! so malformed entries are rejected before they reach any component.

use serde::{Deserialize, Serialize};

use crate::error::FlowError;
use crate::fixed::Fixed64;
use crate::id::{ConnectionId, NodeId, NodeRef, TaskId};
use crate::ledger::Ledger;
use crate::resource::ResourceType;
use crate::sim::SimTime;

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// A ledger predicate gating a production fire (e.g. "energy at or above
/// 20% of capacity"). All conditions on a task must hold or the fire is
/// skipped; `next_fire` still advances, so a failed condition never retries
/// early.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    MinAmount {
        resource: ResourceType,
        amount: Fixed64,
    },
    MinFraction {
        resource: ResourceType,
        fraction: Fixed64,
    },
    MaxAmount {
        resource: ResourceType,
        amount: Fixed64,
    },
    MaxFraction {
        resource: ResourceType,
        fraction: Fixed64,
    },
}

impl Condition {
    pub fn validate(&self) -> Result<(), FlowError> {
        match *self {
            Condition::MinAmount { amount, .. } | Condition::MaxAmount { amount, .. } => {
                if amount < Fixed64::ZERO {
                    return Err(FlowError::Configuration(format!(
                        "condition amount must be non-negative, got {amount}"
                    )));
                }
            }
            Condition::MinFraction { fraction, .. } | Condition::MaxFraction { fraction, .. } => {
                if fraction < Fixed64::ZERO || fraction > Fixed64::ONE {
                    return Err(FlowError::Configuration(format!(
                        "condition fraction must be within [0, 1], got {fraction}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Evaluate against the current ledger state.
    pub fn eval(&self, ledger: &Ledger) -> bool {
        match *self {
            Condition::MinAmount { resource, amount } => ledger.amount(resource) >= amount,
            Condition::MaxAmount { resource, amount } => ledger.amount(resource) <= amount,
            Condition::MinFraction { resource, fraction } => {
                ledger.utilization(resource) >= fraction
            }
            Condition::MaxFraction { resource, fraction } => {
                ledger.utilization(resource) <= fraction
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Registration specs (external API input)
// ---------------------------------------------------------------------------

/// Registration input for a production task: adds `amount` of `resource`
/// to the ledger every `interval`, gated by `conditions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionSpec {
    pub resource: ResourceType,
    pub amount: Fixed64,
    pub interval: SimTime,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ProductionSpec {
    pub fn validate(&self) -> Result<(), FlowError> {
        validate_interval(self.interval)?;
        validate_amount(self.amount)?;
        for c in &self.conditions {
            c.validate()?;
        }
        Ok(())
    }
}

/// Registration input for a consumption task: removes `amount` of
/// `resource` from the ledger every `interval`. A `required` task that
/// cannot be fully served publishes a `RESOURCE_SHORTAGE` event; an optional
/// one just takes what is there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumptionSpec {
    pub resource: ResourceType,
    pub amount: Fixed64,
    pub interval: SimTime,
    #[serde(default)]
    pub required: bool,
}

impl ConsumptionSpec {
    pub fn validate(&self) -> Result<(), FlowError> {
        validate_interval(self.interval)?;
        validate_amount(self.amount)
    }
}

/// One resource moved by a transfer task fire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub resource: ResourceType,
    pub amount: Fixed64,
}

/// Registration input for a transfer task: moves each entry from `source`
/// to `target` every `interval`, through one dedicated connection per entry.
#[derive(Debug, Clone)]
pub struct FlowSpec {
    pub source: NodeRef,
    pub target: NodeRef,
    pub entries: Vec<ResourceEntry>,
    pub interval: SimTime,
}

impl FlowSpec {
    pub fn validate(&self) -> Result<(), FlowError> {
        validate_interval(self.interval)?;
        if self.entries.is_empty() {
            return Err(FlowError::Configuration(
                "transfer task needs at least one resource entry".into(),
            ));
        }
        for entry in &self.entries {
            validate_amount(entry.amount)?;
        }
        Ok(())
    }
}

fn validate_interval(interval: SimTime) -> Result<(), FlowError> {
    if interval == 0 {
        return Err(FlowError::Configuration(
            "interval must be positive".into(),
        ));
    }
    Ok(())
}

fn validate_amount(amount: Fixed64) -> Result<(), FlowError> {
    if amount <= Fixed64::ZERO {
        return Err(FlowError::Configuration(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Registered tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProductionTask {
    pub resource: ResourceType,
    pub amount_per_fire: Fixed64,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone)]
pub struct ConsumptionTask {
    pub resource: ResourceType,
    pub amount_per_fire: Fixed64,
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct TransferTask {
    pub source: NodeId,
    pub target: NodeId,
    pub entries: Vec<ResourceEntry>,
    /// One driven connection per entry, same order. Created alongside the
    /// task when the registration applies.
    pub connections: Vec<ConnectionId>,
}

/// The three kinds of scheduled work.
#[derive(Debug, Clone)]
pub enum TaskKind {
    Production(ProductionTask),
    Consumption(ConsumptionTask),
    Transfer(TransferTask),
}

/// Per-tick firing lifecycle: Idle -> Due -> Fired -> Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    #[default]
    Idle,
    Due,
    Fired,
}

/// A registered task with its schedule.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub interval: SimTime,
    /// Next nominal fire time. Advanced by `interval` on every fire, from
    /// the previous scheduled time, so drift never accumulates.
    pub next_fire: SimTime,
    pub state: TaskState,
    /// Registration sequence, the deterministic tie-break for simultaneous
    /// fires.
    pub(crate) seq: u64,
}

// ===========================================================================
// Tests
// ===========================================================================
