//! Utilization-driven tuning of scheduling parameters.
//!
//! Runs once per tick after transfers settle. Reads each resource's
//! utilization from the ledger, classifies it into a band, and nudges task
//! intervals and producer priorities in place. It never creates or removes
//! tasks, and every interval it assigns stays inside
//! `[interval_floor, interval_ceiling]`, so repeated evaluations cannot
//! oscillate the schedule.
//!
//! # Policy
//!
//! - Below `critical`: producers of the resource are served earlier
//!   (priority lowered by one) and their production tasks fire faster.
//! - Above `high`: consumption tasks not marked required, and transfer
//!   tasks carrying the resource, are slowed down.
//! - Between `critical` and `high`: no structural change; the band is
//!   still reported so the monitor can derive recommendations.

use crate::config::OptimizerConfig;
use crate::fixed::Fixed64;
use crate::graph::FlowGraph;
use crate::id::{NodeId, TaskId};
use crate::ledger::Ledger;
use crate::node::NodeRole;
use crate::resource::{PerResource, ResourceType};
use crate::sched::Scheduler;
use crate::sim::SimTime;
use crate::task::TaskKind;

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Where a resource's utilization sits relative to the configured
/// thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UtilizationBand {
    /// Below `critical`: production is actively boosted.
    Critical,
    /// Between `critical` and `low`: scarce, reported only.
    Low,
    /// Between `low` and `high`: steady state.
    #[default]
    Normal,
    /// Above `high`: demand is throttled.
    High,
}

/// One in-place adjustment the optimizer applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Adjustment {
    /// A producer node moved up in contention order.
    ProducerPriorityRaised {
        resource: ResourceType,
        node: NodeId,
        from: u32,
        to: u32,
    },
    /// A production task now fires more often.
    ProductionAccelerated {
        resource: ResourceType,
        task: TaskId,
        from: SimTime,
        to: SimTime,
    },
    /// An optional consumption task now fires less often.
    ConsumptionThrottled {
        resource: ResourceType,
        task: TaskId,
        from: SimTime,
        to: SimTime,
    },
    /// A transfer task carrying the resource now fires less often.
    TransferSlowed {
        resource: ResourceType,
        task: TaskId,
        from: SimTime,
        to: SimTime,
    },
}

/// Result of one optimizer evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationMetrics {
    pub at: SimTime,
    /// Utilization per resource at evaluation time.
    pub utilization: PerResource<Fixed64>,
    /// Band classification per resource.
    pub bands: PerResource<UtilizationBand>,
    /// Adjustments applied this evaluation, in application order.
    pub adjustments: Vec<Adjustment>,
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Optimizer {
    config: OptimizerConfig,
    latest: Option<OptimizationMetrics>,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            latest: None,
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Metrics from the most recent evaluation, if any.
    pub fn latest(&self) -> Option<&OptimizationMetrics> {
        self.latest.as_ref()
    }

    /// Classify a utilization value. Exact threshold hits fall on the
    /// calmer side (`== critical` is `Low`, `== high` is `Normal`).
    fn band(&self, utilization: Fixed64) -> UtilizationBand {
        if utilization < self.config.critical {
            UtilizationBand::Critical
        } else if utilization < self.config.low {
            UtilizationBand::Low
        } else if utilization > self.config.high {
            UtilizationBand::High
        } else {
            UtilizationBand::Normal
        }
    }

    /// Evaluate all resources and apply the policy. Called once per tick
    /// after the transfer phase.
    pub fn evaluate(
        &mut self,
        now: SimTime,
        ledger: &Ledger,
        graph: &mut FlowGraph,
        sched: &mut Scheduler,
    ) -> &OptimizationMetrics {
        let utilization = ledger.utilization_table();
        let bands = PerResource::from_fn(|resource| {
            // A zero-capacity resource is untracked; leave it alone.
            if ledger.capacity(resource) == Fixed64::ZERO {
                UtilizationBand::Normal
            } else {
                self.band(utilization[resource])
            }
        });

        let mut adjustments = Vec::new();
        for resource in ResourceType::ALL {
            match bands[resource] {
                UtilizationBand::Critical => {
                    self.boost_production(resource, graph, sched, &mut adjustments);
                }
                UtilizationBand::High => {
                    self.throttle_demand(resource, sched, &mut adjustments);
                }
                UtilizationBand::Low | UtilizationBand::Normal => {}
            }
        }

        if !adjustments.is_empty() {
            log::debug!(
                "optimizer applied {} adjustment(s) at t={now}",
                adjustments.len()
            );
        }

        self.latest.insert(OptimizationMetrics {
            at: now,
            utilization,
            bands,
            adjustments,
        })
    }

    /// Serve producers of a critically scarce resource earlier and fire
    /// their production tasks faster.
    fn boost_production(
        &self,
        resource: ResourceType,
        graph: &mut FlowGraph,
        sched: &mut Scheduler,
        adjustments: &mut Vec<Adjustment>,
    ) {
        let producers: Vec<NodeId> = graph
            .nodes()
            .filter(|(_, node)| node.role == NodeRole::Producer && node.resource == resource)
            .map(|(id, _)| id)
            .collect();
        for id in producers {
            if let Some(node) = graph.node_mut(id)
                && node.priority > 0
            {
                let from = node.priority;
                node.priority -= 1;
                adjustments.push(Adjustment::ProducerPriorityRaised {
                    resource,
                    node: id,
                    from,
                    to: node.priority,
                });
            }
        }

        let tasks: Vec<(TaskId, SimTime)> = sched
            .tasks()
            .filter(|task| {
                matches!(&task.kind, TaskKind::Production(p) if p.resource == resource)
            })
            .map(|task| (task.id, task.interval))
            .collect();
        for (id, interval) in tasks {
            let target = interval
                .saturating_sub(step_amount(interval, self.config.adjust_step))
                .max(self.config.interval_floor);
            if let Some(adj) = sched.adjust_interval(id, target) {
                adjustments.push(Adjustment::ProductionAccelerated {
                    resource,
                    task: id,
                    from: adj.old,
                    to: adj.new,
                });
            }
        }
    }

    /// Slow down optional demand on an overfull resource: non-required
    /// consumption tasks and transfer tasks carrying it.
    fn throttle_demand(
        &self,
        resource: ResourceType,
        sched: &mut Scheduler,
        adjustments: &mut Vec<Adjustment>,
    ) {
        let tasks: Vec<(TaskId, SimTime, bool)> = sched
            .tasks()
            .filter_map(|task| match &task.kind {
                TaskKind::Consumption(c) if c.resource == resource && !c.required => {
                    Some((task.id, task.interval, false))
                }
                TaskKind::Transfer(t) if t.entries.iter().any(|e| e.resource == resource) => {
                    Some((task.id, task.interval, true))
                }
                _ => None,
            })
            .collect();
        for (id, interval, is_transfer) in tasks {
            let target = interval
                .saturating_add(step_amount(interval, self.config.adjust_step))
                .min(self.config.interval_ceiling);
            let Some(adj) = sched.adjust_interval(id, target) else {
                continue;
            };
            adjustments.push(if is_transfer {
                Adjustment::TransferSlowed {
                    resource,
                    task: id,
                    from: adj.old,
                    to: adj.new,
                }
            } else {
                Adjustment::ConsumptionThrottled {
                    resource,
                    task: id,
                    from: adj.old,
                    to: adj.new,
                }
            });
        }
    }
}

/// `interval * step` in integer ticks, never less than one so an
/// adjustment always makes progress until it hits its bound.
///
/// `step` is strictly inside (0, 1), so its raw fractional bits fit in 32
/// bits and the widened multiply cannot overflow.
fn step_amount(interval: SimTime, step: Fixed64) -> SimTime {
    let scaled = ((interval as u128) * (step.to_bits() as u128)) >> 32;
    (scaled as SimTime).max(1)
}

// ===========================================================================
// Tests
// ===========================================================================
