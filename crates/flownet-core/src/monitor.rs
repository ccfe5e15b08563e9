//! Performance monitoring: snapshots, bottlenecks, rolling rates.
//!
//! After the optimizer evaluates each tick, the monitor records one
//! immutable [`PerformanceSnapshot`] into a bounded FIFO history. Snapshots
//! carry per-resource utilization, the mean system load, the tick's
//! bottlenecks ranked by how many distinct consumers they starved, and
//! recommendation codes derived from the optimizer's decisions.
//!
//! Rolling production/consumption rates are tracked per resource over a
//! configurable window of ticks, fed from the ledger's per-tick
//! accumulators.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::MonitorConfig;
use crate::fixed::Fixed64;
use crate::graph::{AppliedTransfer, ConsumerDrain, FlowGraph};
use crate::id::NodeId;
use crate::ledger::Ledger;
use crate::node::NodeRole;
use crate::optimizer::{Adjustment, OptimizationMetrics, UtilizationBand};
use crate::resource::{PerResource, ResourceType};
use crate::sim::SimTime;

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// A node that failed to cover demand this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bottleneck {
    pub node: NodeId,
    /// Distinct consumer nodes this node starved (its own unmet drain
    /// counts itself).
    pub starved_consumers: usize,
}

/// A diagnostic code describing a policy the optimizer applied or a
/// condition it reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    /// Utilization below critical: produce more of this resource.
    RaiseProduction(ResourceType),
    /// Utilization between critical and low: stock is thin.
    LowStock(ResourceType),
    /// Utilization above high: optional consumption was slowed.
    ThrottleConsumption(ResourceType),
    /// Utilization above high: transfers carrying this resource were slowed.
    SlowTransfers(ResourceType),
}

impl Recommendation {
    /// Stable code for external diagnostics. Never reworded.
    pub fn code(&self) -> &'static str {
        match self {
            Recommendation::RaiseProduction(_) => "raise-production",
            Recommendation::LowStock(_) => "low-stock",
            Recommendation::ThrottleConsumption(_) => "throttle-consumption",
            Recommendation::SlowTransfers(_) => "slow-transfers",
        }
    }

    pub fn resource(&self) -> ResourceType {
        match self {
            Recommendation::RaiseProduction(r)
            | Recommendation::LowStock(r)
            | Recommendation::ThrottleConsumption(r)
            | Recommendation::SlowTransfers(r) => *r,
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.code(), self.resource())
    }
}

/// One tick's performance record. Immutable once recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSnapshot {
    pub at: SimTime,
    /// Utilization per resource at snapshot time.
    pub utilization: PerResource<Fixed64>,
    /// Mean utilization across resources with nonzero capacity.
    pub system_load: Fixed64,
    /// Nodes that failed to cover demand, most-starving first.
    pub bottlenecks: Vec<Bottleneck>,
    /// Codes describing what the optimizer did or flagged.
    pub recommendations: Vec<Recommendation>,
}

// ---------------------------------------------------------------------------
// Rolling window
// ---------------------------------------------------------------------------

/// Per-tick amounts over the most recent N ticks.
///
/// One value is committed per tick. When the window is full the oldest tick
/// is evicted, keeping `total` and `rate` O(1).
#[derive(Debug, Clone)]
pub struct RollingWindow {
    amounts: Vec<Fixed64>,
    write_pos: usize,
    committed_total: Fixed64,
    committed_count: usize,
}

impl RollingWindow {
    /// # Panics
    ///
    /// Panics if `window` is zero (config validation keeps this out of
    /// production paths).
    pub fn new(window: usize) -> Self {
        assert!(window > 0, "RollingWindow size must be > 0");
        Self {
            amounts: vec![Fixed64::ZERO; window],
            write_pos: 0,
            committed_total: Fixed64::ZERO,
            committed_count: 0,
        }
    }

    /// Commit one tick's amount, evicting the oldest if at capacity.
    pub fn push(&mut self, amount: Fixed64) {
        if self.committed_count == self.amounts.len() {
            self.committed_total -= self.amounts[self.write_pos];
        } else {
            self.committed_count += 1;
        }
        self.amounts[self.write_pos] = amount;
        self.committed_total += amount;
        self.write_pos = (self.write_pos + 1) % self.amounts.len();
    }

    /// Sum over the window.
    pub fn total(&self) -> Fixed64 {
        self.committed_total
    }

    /// Average amount per tick over the committed window.
    pub fn rate(&self) -> Fixed64 {
        if self.committed_count == 0 {
            return Fixed64::ZERO;
        }
        self.committed_total / Fixed64::from_num(self.committed_count as u32)
    }

    pub fn len(&self) -> usize {
        self.committed_count
    }

    pub fn is_empty(&self) -> bool {
        self.committed_count == 0
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Monitor {
    config: MonitorConfig,
    /// FIFO snapshot history, oldest at the front.
    history: VecDeque<PerformanceSnapshot>,
    production_rates: PerResource<RollingWindow>,
    consumption_rates: PerResource<RollingWindow>,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Self {
        let window = config.rate_window;
        Self {
            config,
            history: VecDeque::new(),
            production_rates: PerResource::from_fn(|_| RollingWindow::new(window)),
            consumption_rates: PerResource::from_fn(|_| RollingWindow::new(window)),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Record one tick. Runs after the optimizer, before the ledger's
    /// end-of-tick reset, so the per-tick accumulators are still live.
    pub fn record(
        &mut self,
        now: SimTime,
        ledger: &Ledger,
        graph: &FlowGraph,
        transfers: &[AppliedTransfer],
        drains: &[ConsumerDrain],
        metrics: &OptimizationMetrics,
    ) {
        for resource in ResourceType::ALL {
            self.production_rates[resource].push(ledger.produced_this_tick(resource));
            self.consumption_rates[resource].push(ledger.consumed_this_tick(resource));
        }

        let utilization = ledger.utilization_table();
        let system_load = mean_utilization(ledger, &utilization);
        let bottlenecks = rank_bottlenecks(graph, transfers, drains);
        let recommendations = derive_recommendations(metrics);

        self.history.push_back(PerformanceSnapshot {
            at: now,
            utilization,
            system_load,
            bottlenecks,
            recommendations,
        });
        while self.history.len() > self.config.history_capacity {
            self.history.pop_front();
        }
    }

    /// Most recent snapshot, if any.
    pub fn latest_snapshot(&self) -> Option<&PerformanceSnapshot> {
        self.history.back()
    }

    /// Snapshot history, oldest to newest.
    pub fn history(&self) -> impl Iterator<Item = &PerformanceSnapshot> {
        self.history.iter()
    }

    /// Utilization series for one resource, oldest to newest.
    pub fn resource_history(
        &self,
        resource: ResourceType,
    ) -> impl Iterator<Item = (SimTime, Fixed64)> + '_ {
        self.history
            .iter()
            .map(move |s| (s.at, s.utilization[resource]))
    }

    /// Rolling production rate (amount per tick over the window).
    pub fn production_rate(&self, resource: ResourceType) -> Fixed64 {
        self.production_rates[resource].rate()
    }

    /// Rolling consumption rate (amount per tick over the window).
    pub fn consumption_rate(&self, resource: ResourceType) -> Fixed64 {
        self.consumption_rates[resource].rate()
    }
}

/// Mean utilization over resources with nonzero capacity. Zero when no
/// resource has capacity.
fn mean_utilization(ledger: &Ledger, utilization: &PerResource<Fixed64>) -> Fixed64 {
    let mut sum = Fixed64::ZERO;
    let mut tracked = 0u32;
    for resource in ResourceType::ALL {
        if ledger.capacity(resource) > Fixed64::ZERO {
            sum += utilization[resource];
            tracked += 1;
        }
    }
    if tracked == 0 {
        Fixed64::ZERO
    } else {
        sum / Fixed64::from_num(tracked)
    }
}

/// Collect the tick's bottlenecks: sources whose transfers ran short of
/// supply, and consumers starved on their own drain. Ranked by distinct
/// starved consumers (descending), ties by node registration order.
fn rank_bottlenecks(
    graph: &FlowGraph,
    transfers: &[AppliedTransfer],
    drains: &[ConsumerDrain],
) -> Vec<Bottleneck> {
    let mut starved: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();

    for transfer in transfers {
        if !transfer.insufficient_supply() {
            continue;
        }
        let entry = starved.entry(transfer.from).or_default();
        // Only consumer targets count toward the ranking; the entry itself
        // still marks the source as a bottleneck.
        if let Some(target) = graph.node(transfer.to)
            && target.role == NodeRole::Consumer
        {
            entry.insert(transfer.to);
        }
    }

    for drain in drains {
        if drain.starved() {
            starved.entry(drain.node).or_default().insert(drain.node);
        }
    }

    let mut ranked: Vec<Bottleneck> = starved
        .into_iter()
        .map(|(node, consumers)| Bottleneck {
            node,
            starved_consumers: consumers.len(),
        })
        .collect();
    ranked.sort_by_key(|b| {
        (
            std::cmp::Reverse(b.starved_consumers),
            graph.node_position(b.node).unwrap_or(usize::MAX),
        )
    });
    ranked
}

/// Translate optimizer bands and adjustments into stable diagnostic codes,
/// in canonical resource order.
fn derive_recommendations(metrics: &OptimizationMetrics) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();
    for resource in ResourceType::ALL {
        match metrics.bands[resource] {
            UtilizationBand::Critical => {
                recommendations.push(Recommendation::RaiseProduction(resource));
            }
            UtilizationBand::Low => {
                recommendations.push(Recommendation::LowStock(resource));
            }
            UtilizationBand::High => {
                recommendations.push(Recommendation::ThrottleConsumption(resource));
                let slowed_transfers = metrics.adjustments.iter().any(|adj| {
                    matches!(adj, Adjustment::TransferSlowed { resource: r, .. } if *r == resource)
                });
                if slowed_transfers {
                    recommendations.push(Recommendation::SlowTransfers(resource));
                }
            }
            UtilizationBand::Normal => {}
        }
    }
    recommendations
}

// ===========================================================================
// Tests
// ===========================================================================
