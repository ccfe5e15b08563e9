//! The flow engine: owns every subsystem and orchestrates the tick pipeline.
//!
//! # Architecture
//!
//! The `Engine` owns:
//! - A [`Ledger`] (global per-resource stockpiles and capacities)
//! - A [`FlowGraph`] (nodes and directed connections)
//! - A [`Scheduler`] (interval tasks with drift-free firing)
//! - An [`Optimizer`] and a [`Monitor`] (utilization policy and diagnostics)
//! - An [`EventBus`] (buffered per-topic delivery)
//! - A [`ChangeQueue`] (structural mutations held for the tick boundary)
//!
//! # Tick pipeline
//!
//! Each `advance(now)` runs:
//! 1. **Boundary** -- apply queued changes; resolve pending ids
//! 2. **Production** -- due production tasks add to the ledger
//! 3. **Consumption** -- due consumption tasks draw from the ledger, then
//!    consumer nodes drain their buffers and converters transform
//! 4. **Transfer** -- due transfer fires plus standalone connections move
//!    amounts between node buffers under rate and priority rules
//! 5. **Optimize** -- utilization bands drive interval and priority nudges
//! 6. **Monitor** -- snapshot utilization, load, bottlenecks
//! 7. **Delivery** -- buffered events reach subscribers in publish order
//! 8. **Bookkeeping** -- derived rates, task states, tick counter, state hash
//!
//! Mutations requested mid-tick never take effect mid-tick: the registration
//! API queues them and returns pending ids, and `advance` (or
//! [`Engine::apply_pending`]) resolves them at the next boundary.

use crate::changes::{Change, ChangeQueue, ChangeResult};
use crate::config::EngineConfig;
use crate::error::FlowError;
use crate::event::{Event, EventBus, EventHandler, EventKind, StatusDetail};
use crate::fixed::{checked_div_64, checked_mul_64, ticks_to_fixed64, Fixed64};
use crate::graph::{AppliedTransfer, ConsumerDrain, FlowGraph, TransferRequest};
use crate::id::{
    ConnectionId, NodeId, NodeRef, PendingConnectionId, PendingNodeId, SubscriberId, TaskId,
};
use crate::ledger::Ledger;
use crate::monitor::{Monitor, PerformanceSnapshot};
use crate::node::{FlowConnection, NodeSpec};
use crate::optimizer::{OptimizationMetrics, Optimizer};
use crate::query::{ConnectionSnapshot, NodeSnapshot};
use crate::resource::ResourceType;
use crate::sched::Scheduler;
use crate::sim::{SimState, SimTime, StateHash};
use crate::task::{
    ConsumptionSpec, ConsumptionTask, FlowSpec, ProductionSpec, ProductionTask, TaskKind,
    TransferTask,
};

use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Registration input
// ---------------------------------------------------------------------------

/// Registration input for a standalone connection. Standalone connections
/// act every tick, moving up to `rate * dt` when supply and room allow.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSpec {
    pub from: NodeRef,
    pub to: NodeRef,
    pub resource: ResourceType,
    /// Nominal rate per time unit.
    pub rate: Fixed64,
    /// Upper bound the optimizer may never exceed. `rate <= max_rate`.
    pub max_rate: Fixed64,
}

impl ConnectionSpec {
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

// ---------------------------------------------------------------------------
// Tick report
// ---------------------------------------------------------------------------

/// What one `advance` call did, returned to the driver.
#[derive(Debug, Default)]
pub struct TickReport {
    /// The simulated time this tick ran at.
    pub now: SimTime,
    /// Window since the previous tick. Zero on a repeated timestamp.
    pub dt: SimTime,
    /// Outcome of the boundary's change application, including the
    /// pending-to-real id mappings.
    pub changes: ChangeResult,
    /// Number of task fires that executed (catch-up fires counted
    /// individually; condition-gated skips not counted).
    pub fired: usize,
    /// Every transfer executed this tick, in allocation order.
    pub transfers: Vec<AppliedTransfer>,
    /// Events handed to subscribers during the delivery phase.
    pub events_delivered: usize,
    /// State hash after the tick. Equal hashes across two runs mean the
    /// runs are in identical states.
    pub state_hash: u64,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The core flow engine. Drives the resource network through the tick
/// pipeline under an externally supplied clock.
#[derive(Debug)]
pub struct Engine {
    ledger: Ledger,
    graph: FlowGraph,
    sched: Scheduler,
    optimizer: Optimizer,
    monitor: Monitor,
    bus: EventBus,
    changes: ChangeQueue,
    sim_state: SimState,
    paused: bool,

    /// The most recently computed state hash.
    last_state_hash: u64,

    // -- Id sources --
    next_task: u64,
    next_pending_node: u64,
    next_pending_connection: u64,

    /// Pending-to-real node ids across all past boundaries, so a `NodeRef`
    /// can reference a node created in an earlier batch.
    node_aliases: HashMap<PendingNodeId, NodeId>,
}

impl Engine {
    /// Create an engine from a validated configuration.
    pub fn new(config: EngineConfig) -> Result<Self, FlowError> {
        config.validate()?;
        let mut engine = Self {
            ledger: Ledger::new(config.capacities),
            graph: FlowGraph::new(),
            sched: Scheduler::new(),
            optimizer: Optimizer::new(config.optimizer),
            monitor: Monitor::new(config.monitor),
            bus: EventBus::new(config.event_capacity),
            changes: ChangeQueue::with_max_history(config.change_history),
            sim_state: SimState::new(),
            paused: false,
            last_state_hash: 0,
            next_task: 0,
            next_pending_node: 0,
            next_pending_connection: 0,
            node_aliases: HashMap::new(),
        };
        engine.last_state_hash = engine.compute_state_hash();
        Ok(engine)
    }

    // -----------------------------------------------------------------------
    // Registration (queued, applied at the next tick boundary)
    // -----------------------------------------------------------------------

    /// Queue a node registration. Resolves to a real [`NodeId`] in the next
    /// boundary's [`ChangeResult`].
    pub fn add_node(&mut self, spec: NodeSpec) -> Result<PendingNodeId, FlowError> {
        spec.validate()?;
        let pending = PendingNodeId(self.next_pending_node);
        self.next_pending_node += 1;
        self.changes.push(Change::AddNode { pending, spec });
        Ok(pending)
    }

    /// Queue removal of a node and every connection touching it.
    pub fn remove_node(&mut self, node: NodeId) -> Result<(), FlowError> {
        if !self.graph.contains_node(node) {
            return Err(FlowError::UnknownNode(node));
        }
        self.changes.push(Change::RemoveNode { node });
        Ok(())
    }

    /// Queue a standalone connection between two nodes. Either endpoint may
    /// be a pending node from the same batch.
    pub fn connect(&mut self, spec: ConnectionSpec) -> Result<PendingConnectionId, FlowError> {
        spec.validate()?;
        self.check_node_ref(spec.from)?;
        self.check_node_ref(spec.to)?;
        let pending = PendingConnectionId(self.next_pending_connection);
        self.next_pending_connection += 1;
        self.changes.push(Change::Connect {
            pending,
            from: spec.from,
            to: spec.to,
            resource: spec.resource,
            rate: spec.rate,
            max_rate: spec.max_rate,
        });
        Ok(pending)
    }

    /// Queue removal of a connection.
    pub fn disconnect(&mut self, connection: ConnectionId) -> Result<(), FlowError> {
        if self.graph.connection(connection).is_none() {
            return Err(FlowError::UnknownConnection(connection));
        }
        self.changes.push(Change::Disconnect { connection });
        Ok(())
    }

    /// Queue a production task: adds `spec.amount` of the resource to the
    /// ledger every `spec.interval`, gated by its conditions. The returned
    /// id is final; the task starts firing once the registration applies.
    pub fn register_production(&mut self, spec: ProductionSpec) -> Result<TaskId, FlowError> {
        spec.validate()?;
        let task = self.alloc_task();
        self.changes.push(Change::RegisterProduction { task, spec });
        Ok(task)
    }

    /// Queue a consumption task: draws `spec.amount` of the resource from
    /// the ledger every `spec.interval`. Required tasks publish a shortage
    /// event when underserved.
    pub fn register_consumption(&mut self, spec: ConsumptionSpec) -> Result<TaskId, FlowError> {
        spec.validate()?;
        let task = self.alloc_task();
        self.changes.push(Change::RegisterConsumption { task, spec });
        Ok(task)
    }

    /// Queue a transfer task: moves each entry from source to target every
    /// interval through a dedicated driven connection per entry.
    pub fn register_flow(&mut self, spec: FlowSpec) -> Result<TaskId, FlowError> {
        spec.validate()?;
        self.check_node_ref(spec.source)?;
        self.check_node_ref(spec.target)?;
        let task = self.alloc_task();
        self.changes.push(Change::RegisterFlow { task, spec });
        Ok(task)
    }

    /// Queue removal of a task of any kind. A transfer task takes its
    /// driven connections with it.
    pub fn unregister_task(&mut self, task: TaskId) -> Result<(), FlowError> {
        // Ids are allocated sequentially; anything at or past the cursor
        // was never handed out.
        if task.0 >= self.next_task {
            return Err(FlowError::UnknownTask(task));
        }
        self.changes.push(Change::UnregisterTask { task });
        Ok(())
    }

    /// Queue a ledger capacity change. Stock above the new capacity is
    /// discarded at apply time and reported via a status event.
    pub fn set_capacity(&mut self, resource: ResourceType, capacity: Fixed64) -> Result<(), FlowError> {
        if capacity < Fixed64::ZERO {
            return Err(FlowError::Configuration(format!(
                "capacity for {resource} must be non-negative, got {capacity}"
            )));
        }
        self.changes.push(Change::SetCapacity { resource, capacity });
        Ok(())
    }

    /// Queue a node pause or resume.
    pub fn set_node_paused(&mut self, node: NodeId, paused: bool) -> Result<(), FlowError> {
        if !self.graph.contains_node(node) {
            return Err(FlowError::UnknownNode(node));
        }
        self.changes.push(Change::SetNodePaused { node, paused });
        Ok(())
    }

    /// Apply queued changes now, without running a tick. Lets setup code
    /// resolve pending ids before the first `advance`. Status events raised
    /// by the application are delivered before returning.
    pub fn apply_pending(&mut self) -> ChangeResult {
        let boundary = self.sim_state.now.unwrap_or(0);
        let result = self.apply_changes(boundary);
        self.bus.deliver();
        result
    }

    fn alloc_task(&mut self) -> TaskId {
        let task = TaskId(self.next_task);
        self.next_task += 1;
        task
    }

    /// Synchronous existence check for a registration endpoint. Pending
    /// refs are checked at apply time instead.
    fn check_node_ref(&self, node: NodeRef) -> Result<(), FlowError> {
        match node {
            NodeRef::Id(id) if !self.graph.contains_node(id) => Err(FlowError::UnknownNode(id)),
            _ => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Pause control
    // -----------------------------------------------------------------------

    /// Pause the engine. `advance` becomes a no-op until resumed; queued
    /// changes stay queued.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume a paused engine.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    // -----------------------------------------------------------------------
    // The tick
    // -----------------------------------------------------------------------

    /// Run one tick at simulated time `now`.
    ///
    /// The window `dt = now - previous now` scales rate-limited work;
    /// interval tasks fire on their own schedule, catching up when the
    /// driver skipped past several nominal fire times. A paused engine
    /// returns an empty report and changes nothing.
    pub fn advance(&mut self, now: SimTime) -> TickReport {
        if self.paused {
            return TickReport {
                now,
                state_hash: self.last_state_hash,
                ..TickReport::default()
            };
        }

        let dt = self.sim_state.dt_to(now);
        let changes = self.apply_changes(now);

        let due = self.sched.collect_due(now);
        let mut fired = 0;
        fired += self.phase_production(now, &due.production);
        fired += self.phase_consumption(now, &due.consumption);
        let drains = self.phase_node_demand(now, dt);
        let transfers = self.phase_transfer(now, dt, &due.transfer, &mut fired);
        self.phase_reconcile(now);

        let metrics = self
            .optimizer
            .evaluate(now, &self.ledger, &mut self.graph, &mut self.sched)
            .clone();
        self.monitor
            .record(now, &self.ledger, &self.graph, &transfers, &drains, &metrics);

        let events_delivered = self.bus.deliver();

        self.ledger.end_tick(dt);
        self.sched.end_tick();
        self.sim_state.now = Some(now);
        self.sim_state.tick += 1;
        self.last_state_hash = self.compute_state_hash();

        log::trace!(
            "tick {} at t={now}: dt={dt} fired={fired} transfers={} events={events_delivered}",
            self.sim_state.tick,
            transfers.len(),
        );

        TickReport {
            now,
            dt,
            changes,
            fired,
            transfers,
            events_delivered,
            state_hash: self.last_state_hash,
        }
    }

    // -----------------------------------------------------------------------
    // Phase 1: boundary changes
    // -----------------------------------------------------------------------

    fn apply_changes(&mut self, now: SimTime) -> ChangeResult {
        // Tasks registered at this boundary anchor to the previous tick's
        // time, so a task with interval <= dt fires within this very tick.
        let anchor = self.sim_state.now.unwrap_or(0);
        let mut result = ChangeResult::default();
        for change in self.changes.drain(now) {
            match self.apply_change(&change, now, anchor, &mut result) {
                Ok(()) => result.applied += 1,
                Err(err) => {
                    log::debug!("change rejected at t={now}: {err}");
                    result.record_rejected(change, err);
                }
            }
        }
        result
    }

    fn apply_change(
        &mut self,
        change: &Change,
        now: SimTime,
        anchor: SimTime,
        result: &mut ChangeResult,
    ) -> Result<(), FlowError> {
        match change {
            Change::AddNode { pending, spec } => {
                let id = self.graph.add_node(spec);
                self.node_aliases.insert(*pending, id);
                result.record_node(*pending, id);
                Ok(())
            }
            Change::RemoveNode { node } => {
                self.graph
                    .remove_node(*node)
                    .map(|_| ())
                    .ok_or(FlowError::UnknownNode(*node))
            }
            Change::Connect {
                pending,
                from,
                to,
                resource,
                rate,
                max_rate,
            } => {
                let from = self.resolve_node_ref(result, *from)?;
                let to = self.resolve_node_ref(result, *to)?;
                let id = self.graph.add_connection(FlowConnection {
                    from,
                    to,
                    resource: *resource,
                    rate: *rate,
                    max_rate: *max_rate,
                    driven: false,
                })?;
                result.record_connection(*pending, id);
                Ok(())
            }
            Change::Disconnect { connection } => self
                .graph
                .remove_connection(*connection)
                .map(|_| ())
                .ok_or(FlowError::UnknownConnection(*connection)),
            Change::RegisterProduction { task, spec } => {
                self.sched.insert(
                    *task,
                    TaskKind::Production(ProductionTask {
                        resource: spec.resource,
                        amount_per_fire: spec.amount,
                        conditions: spec.conditions.clone(),
                    }),
                    spec.interval,
                    anchor,
                );
                Ok(())
            }
            Change::RegisterConsumption { task, spec } => {
                self.sched.insert(
                    *task,
                    TaskKind::Consumption(ConsumptionTask {
                        resource: spec.resource,
                        amount_per_fire: spec.amount,
                        required: spec.required,
                    }),
                    spec.interval,
                    anchor,
                );
                Ok(())
            }
            Change::RegisterFlow { task, spec } => {
                let source = self.resolve_node_ref(result, spec.source)?;
                let target = self.resolve_node_ref(result, spec.target)?;
                let interval_fixed = ticks_to_fixed64(spec.interval);
                let mut connections = Vec::with_capacity(spec.entries.len());
                for entry in &spec.entries {
                    let rate =
                        checked_div_64(entry.amount, interval_fixed).unwrap_or(Fixed64::ZERO);
                    let added = self.graph.add_connection(FlowConnection {
                        from: source,
                        to: target,
                        resource: entry.resource,
                        rate,
                        max_rate: rate,
                        driven: true,
                    });
                    match added {
                        Ok(id) => connections.push(id),
                        Err(err) => {
                            // Partial wiring must not outlive the rejection.
                            for id in connections {
                                self.graph.remove_connection(id);
                            }
                            return Err(err);
                        }
                    }
                }
                self.sched.insert(
                    *task,
                    TaskKind::Transfer(TransferTask {
                        source,
                        target,
                        entries: spec.entries.clone(),
                        connections,
                    }),
                    spec.interval,
                    anchor,
                );
                Ok(())
            }
            Change::UnregisterTask { task } => {
                let removed = self
                    .sched
                    .remove(*task)
                    .ok_or(FlowError::UnknownTask(*task))?;
                if let TaskKind::Transfer(t) = removed.kind {
                    for id in t.connections {
                        self.graph.remove_connection(id);
                    }
                }
                Ok(())
            }
            Change::SetCapacity { resource, capacity } => {
                if let Some(discarded) = self.ledger.set_capacity(*resource, *capacity)? {
                    self.bus.publish(Event::StatusChanged {
                        detail: StatusDetail::CapacityReduced {
                            resource: *resource,
                            discarded,
                        },
                        at: now,
                    });
                }
                Ok(())
            }
            Change::SetNodePaused { node, paused } => {
                if let Some(transition) = self.graph.set_paused(*node, *paused)? {
                    self.bus.publish(Event::StatusChanged {
                        detail: StatusDetail::Node {
                            node: transition.node,
                            from: transition.from,
                            to: transition.to,
                        },
                        at: now,
                    });
                }
                Ok(())
            }
        }
    }

    fn resolve_node_ref(
        &self,
        result: &ChangeResult,
        node: NodeRef,
    ) -> Result<NodeId, FlowError> {
        match node {
            NodeRef::Id(id) => {
                if self.graph.contains_node(id) {
                    Ok(id)
                } else {
                    Err(FlowError::UnknownNode(id))
                }
            }
            NodeRef::Pending(pending) => result
                .resolve_node(pending)
                .or_else(|| self.node_aliases.get(&pending).copied())
                .ok_or_else(|| {
                    FlowError::Configuration(format!(
                        "pending node {} has not been applied",
                        pending.0
                    ))
                }),
        }
    }

    // -----------------------------------------------------------------------
    // Phase 2: production
    // -----------------------------------------------------------------------

    fn phase_production(&mut self, now: SimTime, due: &[TaskId]) -> usize {
        let mut fired = 0;
        for &id in due {
            let Some(task) = self.sched.task(id) else {
                continue;
            };
            let TaskKind::Production(ref p) = task.kind else {
                continue;
            };
            let p = p.clone();
            if !p.conditions.iter().all(|c| c.eval(&self.ledger)) {
                // Gated fire: the slot is skipped, not deferred.
                continue;
            }
            // A positive amount can't drive the ledger negative, so this
            // only fails on a malformed task, which registration rejects.
            let Ok(outcome) = self.ledger.add(p.resource, p.amount_per_fire) else {
                continue;
            };
            if outcome.applied > Fixed64::ZERO {
                self.bus.publish(Event::ResourceProduced {
                    resource: p.resource,
                    amount: outcome.applied,
                    node: None,
                    at: now,
                });
            }
            if let Some(overflow) = outcome.clamped {
                self.bus.publish(Event::StatusChanged {
                    detail: StatusDetail::LedgerClamped {
                        resource: p.resource,
                        overflow,
                    },
                    at: now,
                });
            }
            self.sched.note_fired(id);
            fired += 1;
        }
        fired
    }

    // -----------------------------------------------------------------------
    // Phase 3: consumption
    // -----------------------------------------------------------------------

    fn phase_consumption(&mut self, now: SimTime, due: &[TaskId]) -> usize {
        let mut fired = 0;
        for &id in due {
            let Some(task) = self.sched.task(id) else {
                continue;
            };
            let TaskKind::Consumption(ref c) = task.kind else {
                continue;
            };
            let c = c.clone();
            let outcome = self.ledger.consume_up_to(c.resource, c.amount_per_fire);
            if outcome.taken > Fixed64::ZERO {
                self.bus.publish(Event::ResourceConsumed {
                    resource: c.resource,
                    amount: outcome.taken,
                    node: None,
                    at: now,
                });
            }
            if c.required && !outcome.satisfied() {
                self.bus.publish(Event::ResourceShortage {
                    resource: c.resource,
                    required: c.amount_per_fire,
                    available: outcome.taken,
                    node: None,
                    at: now,
                });
            }
            self.sched.note_fired(id);
            fired += 1;
        }
        fired
    }

    /// Consumer nodes drain their own buffers against pre-transfer
    /// availability, then converters transform.
    fn phase_node_demand(&mut self, now: SimTime, dt: SimTime) -> Vec<ConsumerDrain> {
        let drains = self.graph.drain_consumers(dt);
        for d in &drains {
            if d.taken > Fixed64::ZERO {
                self.bus.publish(Event::ResourceConsumed {
                    resource: d.resource,
                    amount: d.taken,
                    node: Some(d.node),
                    at: now,
                });
            }
        }
        for c in self.graph.run_converters(dt) {
            self.bus.publish(Event::ResourceProduced {
                resource: c.to,
                amount: c.amount,
                node: Some(c.node),
                at: now,
            });
        }
        drains
    }

    // -----------------------------------------------------------------------
    // Phase 4: transfer
    // -----------------------------------------------------------------------

    fn phase_transfer(
        &mut self,
        now: SimTime,
        dt: SimTime,
        due: &[TaskId],
        fired: &mut usize,
    ) -> Vec<AppliedTransfer> {
        let mut requests: Vec<TransferRequest> = Vec::new();

        // Driven connections act only on their task's fire, moving up to
        // the entry amount capped by the connection's current rate over
        // one interval (the optimizer may have slowed it).
        for &id in due {
            let Some(task) = self.sched.task(id) else {
                continue;
            };
            let interval_fixed = ticks_to_fixed64(task.interval);
            let TaskKind::Transfer(ref t) = task.kind else {
                continue;
            };
            let entries = t.entries.clone();
            let connections = t.connections.clone();
            let mut scheduled = false;
            for (entry, &conn_id) in entries.iter().zip(&connections) {
                let Some(conn) = self.graph.connection(conn_id) else {
                    // Endpoint or connection removed since registration.
                    continue;
                };
                let cap = checked_mul_64(conn.rate, interval_fixed).unwrap_or(Fixed64::MAX);
                let requested = entry.amount.min(cap);
                if requested > Fixed64::ZERO {
                    requests.push(TransferRequest {
                        connection: conn_id,
                        requested,
                    });
                    scheduled = true;
                }
            }
            if scheduled {
                self.sched.note_fired(id);
                *fired += 1;
            }
        }

        // Standalone connections act every tick over the window dt.
        let dt_fixed = ticks_to_fixed64(dt);
        requests.extend(self.graph.connections().filter_map(|(id, conn)| {
            if conn.driven {
                return None;
            }
            let requested = checked_mul_64(conn.rate, dt_fixed).unwrap_or(Fixed64::MAX);
            (requested > Fixed64::ZERO).then_some(TransferRequest {
                connection: id,
                requested,
            })
        }));

        let transfers = self.graph.compute_step(dt, &requests);
        for t in &transfers {
            if t.delivered > Fixed64::ZERO {
                self.bus.publish(Event::ResourceTransferred {
                    connection: t.connection,
                    from: t.from,
                    to: t.to,
                    resource: t.resource,
                    amount: t.delivered,
                    at: now,
                });
            }
            if t.insufficient_supply() {
                self.bus.publish(Event::ResourceShortage {
                    resource: t.resource,
                    required: t.requested,
                    available: t.delivered,
                    node: Some(t.from),
                    at: now,
                });
            }
        }
        transfers
    }

    fn phase_reconcile(&mut self, now: SimTime) {
        for transition in self.graph.reconcile_statuses() {
            self.bus.publish(Event::StatusChanged {
                detail: StatusDetail::Node {
                    node: transition.node,
                    from: transition.from,
                    to: transition.to,
                },
                at: now,
            });
        }
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Subscribe to a topic. Invoked in subscription order at delivery.
    pub fn subscribe(&mut self, kind: EventKind, handler: EventHandler) -> SubscriberId {
        self.bus.subscribe(kind, handler)
    }

    /// Subscribe to a topic, receiving only events about one resource.
    pub fn subscribe_filtered(
        &mut self,
        kind: EventKind,
        resource: ResourceType,
        handler: EventHandler,
    ) -> SubscriberId {
        self.bus.subscribe_filtered(kind, resource, handler)
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Drop every future event on a topic until unmuted.
    pub fn mute(&mut self, kind: EventKind) {
        self.bus.mute(kind);
    }

    pub fn unmute(&mut self, kind: EventKind) {
        self.bus.unmute(kind);
    }

    /// Read-only access to the bus for buffer inspection.
    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Global stockpile of one resource type.
    pub fn resource_amount(&self, resource: ResourceType) -> Fixed64 {
        self.ledger.amount(resource)
    }

    /// The ledger, read-only.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// The flow graph, read-only.
    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    /// The scheduler, read-only.
    pub fn scheduler(&self) -> &Scheduler {
        &self.sched
    }

    /// An owned snapshot of one node, or `None` if the id is stale.
    pub fn node(&self, id: NodeId) -> Option<NodeSnapshot> {
        let node = self.graph.node(id)?;
        Some(NodeSnapshot::capture(&self.graph, id, node))
    }

    /// Owned snapshots of every node, in insertion order.
    pub fn nodes(&self) -> Vec<NodeSnapshot> {
        self.graph
            .nodes()
            .map(|(id, node)| NodeSnapshot::capture(&self.graph, id, node))
            .collect()
    }

    /// An owned snapshot of one connection, or `None` if the id is stale.
    pub fn connection(&self, id: ConnectionId) -> Option<ConnectionSnapshot> {
        self.graph
            .connection(id)
            .map(|conn| ConnectionSnapshot::capture(id, conn))
    }

    /// The optimizer's most recent metrics.
    pub fn optimization_metrics(&self) -> Option<&OptimizationMetrics> {
        self.optimizer.latest()
    }

    /// The monitor's most recent snapshot.
    pub fn latest_snapshot(&self) -> Option<&PerformanceSnapshot> {
        self.monitor.latest_snapshot()
    }

    /// Monitor history, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &PerformanceSnapshot> {
        self.monitor.history()
    }

    /// Utilization history of one resource, oldest first.
    pub fn resource_history(
        &self,
        resource: ResourceType,
    ) -> impl Iterator<Item = (SimTime, Fixed64)> + '_ {
        self.monitor.resource_history(resource)
    }

    /// The monitor, read-only.
    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// Number of completed ticks.
    pub fn tick(&self) -> u64 {
        self.sim_state.tick
    }

    /// Simulated time of the last completed tick.
    pub fn last_advance(&self) -> Option<SimTime> {
        self.sim_state.now
    }

    /// Changes waiting for the next boundary.
    pub fn pending_changes(&self) -> usize {
        self.changes.pending_count()
    }

    /// Applied-change history, when enabled in the configuration.
    pub fn change_history(&self) -> &[(SimTime, Change)] {
        self.changes.history()
    }

    // -----------------------------------------------------------------------
    // Determinism
    // -----------------------------------------------------------------------

    /// The state hash after the last completed tick.
    pub fn state_hash(&self) -> u64 {
        self.last_state_hash
    }

    /// Fold ledger, graph, and schedule into a single hash. Iteration is
    /// insertion-ordered, so two runs with identical inputs hash identically.
    fn compute_state_hash(&self) -> u64 {
        let mut hash = StateHash::new();
        hash.write_u64(self.sim_state.tick);
        for resource in ResourceType::ALL {
            let state = self.ledger.state(resource);
            hash.write_fixed64(state.current);
            hash.write_fixed64(state.capacity);
        }
        for (_, node) in self.graph.nodes() {
            for resource in ResourceType::ALL {
                hash.write_fixed64(node.amount(resource));
            }
            hash.write_u32(node.priority);
            hash.write_u32(node.status as u32);
        }
        for (_, conn) in self.graph.connections() {
            hash.write_fixed64(conn.rate);
        }
        self.sched.hash_into(&mut hash);
        hash.finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizerConfig;
    use crate::fixed::f64_to_fixed64 as fx;
    use crate::node::{NodeRole, NodeStatus};
    use crate::task::ResourceEntry;
    use crate::test_utils::*;

    // Test 1: an empty engine ticks without firing anything.
    #[test]
    fn empty_engine_advances() {
        let mut engine = default_engine();
        let report = engine.advance(1);
        assert_eq!(report.dt, 1);
        assert_eq!(report.fired, 0);
        assert!(report.transfers.is_empty());
        assert_eq!(engine.tick(), 1);
        assert_eq!(engine.last_advance(), Some(1));
    }

    // Test 2: registrations stay queued until a boundary.
    #[test]
    fn changes_apply_only_at_the_boundary() {
        let mut engine = default_engine();
        let pending = engine
            .add_node(producer_spec(ResourceType::Minerals, 50.0, 5.0))
            .unwrap();
        assert_eq!(engine.graph().node_count(), 0);
        assert_eq!(engine.pending_changes(), 1);

        let report = engine.advance(1);
        assert_eq!(report.changes.applied, 1);
        let id = report.changes.resolve_node(pending).unwrap();
        assert!(engine.graph().contains_node(id));
        assert_eq!(engine.pending_changes(), 0);
    }

    // Test 3: apply_pending resolves ids without running a tick.
    #[test]
    fn apply_pending_resolves_without_tick() {
        let mut engine = default_engine();
        let pending = engine
            .add_node(storage_spec(ResourceType::Gas, 100.0))
            .unwrap();
        let result = engine.apply_pending();
        assert_eq!(result.applied, 1);
        assert!(result.resolve_node(pending).is_some());
        assert_eq!(engine.tick(), 0);
    }

    // Test 4: a producer/consumer pair nets out over three ticks.
    #[test]
    fn ledger_arithmetic_over_three_ticks() {
        let mut engine = default_engine();
        engine
            .register_production(production(ResourceType::Minerals, 10.0, 1))
            .unwrap();
        engine
            .register_consumption(consumption(ResourceType::Minerals, 5.0, 1, true))
            .unwrap();

        let shortages = collect(&mut engine, EventKind::ResourceShortage);
        for t in 1..=3 {
            engine.advance(t);
        }

        assert_eq!(engine.resource_amount(ResourceType::Minerals), fx(15.0));
        assert!(shortages.borrow().is_empty());
    }

    // Test 5: required consumption on an empty ledger publishes a shortage.
    #[test]
    fn required_consumption_shortage() {
        let mut engine = default_engine();
        engine
            .register_consumption(consumption(ResourceType::Gas, 5.0, 1, true))
            .unwrap();
        let shortages = collect(&mut engine, EventKind::ResourceShortage);

        engine.advance(1);

        let events = shortages.borrow();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::ResourceShortage {
                resource,
                required,
                available,
                ..
            } => {
                assert_eq!(*resource, ResourceType::Gas);
                assert_eq!(*required, fx(5.0));
                assert_eq!(*available, Fixed64::ZERO);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        // Partial service, not failure; amounts stay in range.
        assert_eq!(engine.resource_amount(ResourceType::Gas), Fixed64::ZERO);
    }

    // Test 6: optional consumption never publishes a shortage.
    #[test]
    fn optional_consumption_stays_quiet() {
        let mut engine = default_engine();
        engine
            .register_consumption(consumption(ResourceType::Gas, 5.0, 1, false))
            .unwrap();
        let shortages = collect(&mut engine, EventKind::ResourceShortage);
        engine.advance(1);
        assert!(shortages.borrow().is_empty());
    }

    // Test 7: a skipped stretch of time fires every missed slot once.
    #[test]
    fn catch_up_fires() {
        let mut engine = default_engine();
        engine
            .register_production(production(ResourceType::Energy, 2.0, 10))
            .unwrap();
        engine.advance(1);
        assert_eq!(engine.resource_amount(ResourceType::Energy), Fixed64::ZERO);

        // Slots at 10, 20, 30 are all due by t=35.
        let report = engine.advance(35);
        assert_eq!(report.fired, 3);
        assert_eq!(engine.resource_amount(ResourceType::Energy), fx(6.0));
    }

    // Test 8: production is gated by its conditions.
    #[test]
    fn conditional_production() {
        let mut engine = default_engine();
        let mut spec = production(ResourceType::Minerals, 10.0, 1);
        spec.conditions = vec![crate::task::Condition::MaxAmount {
            resource: ResourceType::Minerals,
            amount: fx(15.0),
        }];
        engine.register_production(spec).unwrap();

        for t in 1..=5 {
            engine.advance(t);
        }
        // Fires at t=1 (0 < 15) and t=2 (10 < 15); gated from t=3 on.
        assert_eq!(engine.resource_amount(ResourceType::Minerals), fx(20.0));
    }

    // Test 9: a transfer task moves amounts and conserves the total.
    #[test]
    fn transfer_task_conserves() {
        let mut engine = default_engine();
        let src = engine
            .add_node(producer_spec(ResourceType::Minerals, 100.0, 50.0))
            .unwrap();
        let dst = engine.add_node(storage_spec(ResourceType::Minerals, 100.0)).unwrap();
        engine
            .register_flow(FlowSpec {
                source: src.into(),
                target: dst.into(),
                entries: vec![ResourceEntry {
                    resource: ResourceType::Minerals,
                    amount: fx(10.0),
                }],
                interval: 1,
            })
            .unwrap();

        let report = engine.advance(1);
        let src = report.changes.resolve_node(src).unwrap();
        let dst = report.changes.resolve_node(dst).unwrap();
        let before = engine.graph().total_amount(ResourceType::Minerals);

        engine.advance(2);
        let graph = engine.graph();
        assert_eq!(graph.node(src).unwrap().amount(ResourceType::Minerals), fx(80.0));
        assert_eq!(graph.node(dst).unwrap().amount(ResourceType::Minerals), fx(20.0));
        assert_eq!(graph.total_amount(ResourceType::Minerals), before);
    }

    // Test 10: standalone connections act every tick at rate * dt.
    #[test]
    fn standalone_connection_flows_each_tick() {
        let mut engine = default_engine();
        let src = engine
            .add_node(producer_spec(ResourceType::Gas, 100.0, 50.0))
            .unwrap();
        let dst = engine.add_node(storage_spec(ResourceType::Gas, 100.0)).unwrap();
        engine
            .connect(ConnectionSpec {
                from: src.into(),
                to: dst.into(),
                resource: ResourceType::Gas,
                rate: fx(3.0),
                max_rate: fx(6.0),
            })
            .unwrap();
        let result = engine.apply_pending();
        let dst = result.resolve_node(dst).unwrap();

        engine.advance(1);
        engine.advance(2);
        assert_eq!(
            engine.graph().node(dst).unwrap().amount(ResourceType::Gas),
            fx(6.0)
        );
    }

    // Test 11: transfer events carry the delivered amount.
    #[test]
    fn transfer_events_report_delivery() {
        let mut engine = default_engine();
        let src = engine
            .add_node(producer_spec(ResourceType::Minerals, 4.0, 50.0))
            .unwrap();
        let dst = engine.add_node(storage_spec(ResourceType::Minerals, 100.0)).unwrap();
        engine
            .connect(ConnectionSpec {
                from: src.into(),
                to: dst.into(),
                resource: ResourceType::Minerals,
                rate: fx(10.0),
                max_rate: fx(10.0),
            })
            .unwrap();
        engine.apply_pending();

        let transferred = collect(&mut engine, EventKind::ResourceTransferred);
        let shortages = collect(&mut engine, EventKind::ResourceShortage);
        engine.advance(1);

        // Only 4 available against a request of 10: partial delivery plus
        // an insufficient-supply shortage naming the source.
        let events = transferred.borrow();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::ResourceTransferred { amount, .. } => assert_eq!(*amount, fx(4.0)),
            other => panic!("unexpected event: {other:?}"),
        }
        let shortage = shortages.borrow();
        assert_eq!(shortage.len(), 1);
        match &shortage[0] {
            Event::ResourceShortage { node, required, available, .. } => {
                assert!(node.is_some());
                assert_eq!(*required, fx(10.0));
                assert_eq!(*available, fx(4.0));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    // Test 12: unregistering a transfer task removes its driven connections.
    #[test]
    fn unregister_flow_removes_connections() {
        let mut engine = default_engine();
        let src = engine
            .add_node(producer_spec(ResourceType::Gas, 100.0, 10.0))
            .unwrap();
        let dst = engine.add_node(storage_spec(ResourceType::Gas, 100.0)).unwrap();
        let task = engine
            .register_flow(FlowSpec {
                source: src.into(),
                target: dst.into(),
                entries: vec![ResourceEntry {
                    resource: ResourceType::Gas,
                    amount: fx(5.0),
                }],
                interval: 2,
            })
            .unwrap();
        engine.apply_pending();
        assert_eq!(engine.graph().connection_count(), 1);

        engine.unregister_task(task).unwrap();
        engine.apply_pending();
        assert_eq!(engine.graph().connection_count(), 0);
        assert!(engine.scheduler().is_empty());
    }

    // Test 13: unknown ids are rejected synchronously.
    #[test]
    fn unknown_ids_rejected() {
        let mut engine = default_engine();
        assert!(matches!(
            engine.unregister_task(TaskId(7)),
            Err(FlowError::UnknownTask(_))
        ));

        let mut throwaway = slotmap::SlotMap::<NodeId, ()>::with_key();
        let stale = throwaway.insert(());
        assert!(matches!(
            engine.remove_node(stale),
            Err(FlowError::UnknownNode(_))
        ));
        assert!(matches!(
            engine.set_node_paused(stale, true),
            Err(FlowError::UnknownNode(_))
        ));
    }

    // Test 14: a paused engine ignores advance.
    #[test]
    fn paused_engine_is_inert() {
        let mut engine = default_engine();
        engine
            .register_production(production(ResourceType::Minerals, 10.0, 1))
            .unwrap();
        engine.advance(1);
        let hash = engine.state_hash();

        engine.pause();
        assert!(engine.is_paused());
        let report = engine.advance(2);
        assert_eq!(report.fired, 0);
        assert_eq!(report.state_hash, hash);
        assert_eq!(engine.tick(), 1);

        engine.resume();
        engine.advance(2);
        assert_eq!(engine.tick(), 2);
    }

    // Test 15: pausing a node stops its extraction and drains.
    #[test]
    fn paused_node_sits_out() {
        let mut engine = default_engine();
        let src = engine
            .add_node(producer_spec(ResourceType::Minerals, 100.0, 50.0))
            .unwrap();
        let dst = engine.add_node(storage_spec(ResourceType::Minerals, 100.0)).unwrap();
        engine
            .connect(ConnectionSpec {
                from: src.into(),
                to: dst.into(),
                resource: ResourceType::Minerals,
                rate: fx(5.0),
                max_rate: fx(5.0),
            })
            .unwrap();
        let result = engine.apply_pending();
        let src = result.resolve_node(src).unwrap();
        let dst = result.resolve_node(dst).unwrap();

        engine.set_node_paused(src, true).unwrap();
        engine.advance(1);
        assert_eq!(
            engine.graph().node(src).unwrap().status,
            NodeStatus::Paused
        );
        assert_eq!(
            engine.graph().node(dst).unwrap().amount(ResourceType::Minerals),
            Fixed64::ZERO
        );
    }

    // Test 16: capacity reduction discards overflow and reports it.
    #[test]
    fn capacity_reduction_reports_discard() {
        let mut engine = default_engine();
        engine
            .register_production(production(ResourceType::Energy, 100.0, 1))
            .unwrap();
        engine.advance(1);
        assert_eq!(engine.resource_amount(ResourceType::Energy), fx(100.0));

        let status = collect(&mut engine, EventKind::StatusChanged);
        engine.set_capacity(ResourceType::Energy, fx(40.0)).unwrap();
        engine.advance(2);

        assert_eq!(engine.resource_amount(ResourceType::Energy), fx(40.0));
        let events = status.borrow();
        assert!(events.iter().any(|e| matches!(
            e,
            Event::StatusChanged {
                detail: StatusDetail::CapacityReduced { discarded, .. },
                ..
            } if *discarded == fx(60.0)
        )));
    }

    // Test 17: critical scarcity accelerates production and raises
    // producer priority.
    #[test]
    fn optimizer_reacts_to_critical_scarcity() {
        let mut engine = default_engine();
        let node = engine
            .add_node(producer_spec(ResourceType::Minerals, 50.0, 5.0))
            .unwrap();
        let task = engine
            .register_production(production(ResourceType::Minerals, 1.0, 100))
            .unwrap();
        let result = engine.apply_pending();
        let node = result.resolve_node(node).unwrap();

        // Ledger sits at 0 of 1000: well under the critical band.
        engine.advance(1);

        let metrics = engine.optimization_metrics().unwrap();
        assert!(!metrics.adjustments.is_empty());
        assert_eq!(
            engine.scheduler().task(task).unwrap().interval,
            75,
            "interval shrinks by the adjustment step"
        );
        assert_eq!(engine.graph().node(node).unwrap().priority, 9);
    }

    // Test 18: identical runs produce identical hashes; an extra
    // registration diverges them.
    #[test]
    fn state_hash_tracks_divergence() {
        let build = |extra: bool| {
            let mut engine = default_engine();
            engine
                .register_production(production(ResourceType::Minerals, 10.0, 1))
                .unwrap();
            if extra {
                engine
                    .register_consumption(consumption(ResourceType::Minerals, 1.0, 1, false))
                    .unwrap();
            }
            for t in 1..=5 {
                engine.advance(t);
            }
            engine.state_hash()
        };
        assert_eq!(build(false), build(false));
        assert_ne!(build(false), build(true));
    }

    // Test 19: converters transform between resource types.
    #[test]
    fn converter_produces_output_type() {
        let mut engine = default_engine();
        let node = engine
            .add_node(converter_spec(ResourceType::Minerals, ResourceType::Energy, 4.0, 20.0))
            .unwrap();
        let result = engine.apply_pending();
        let node = result.resolve_node(node).unwrap();

        let produced = collect(&mut engine, EventKind::ResourceProduced);
        engine.advance(1);

        let n = engine.graph().node(node).unwrap();
        assert_eq!(n.amount(ResourceType::Minerals), fx(16.0));
        assert_eq!(n.amount(ResourceType::Energy), fx(4.0));
        assert!(produced.borrow().iter().any(|e| matches!(
            e,
            Event::ResourceProduced { resource: ResourceType::Energy, node: Some(_), .. }
        )));
    }

    // Test 20: node snapshots reflect graph state.
    #[test]
    fn node_snapshots() {
        let mut engine = default_engine();
        let pending = engine
            .add_node(producer_spec(ResourceType::Gas, 30.0, 2.0))
            .unwrap();
        let result = engine.apply_pending();
        let id = result.resolve_node(pending).unwrap();

        let snap = engine.node(id).unwrap();
        assert_eq!(snap.id, id);
        assert_eq!(snap.role, NodeRole::Producer);
        assert_eq!(snap.amounts[ResourceType::Gas], fx(30.0));
        assert!(snap.outbound.is_empty());

        assert_eq!(engine.nodes().len(), 1);
        assert!(engine.node(id_unused()).is_none());
    }

    // Test 21: muted topics stay silent, unmuting restores them.
    #[test]
    fn mute_and_unmute() {
        let mut engine = default_engine();
        engine
            .register_production(production(ResourceType::Minerals, 1.0, 1))
            .unwrap();
        let produced = collect(&mut engine, EventKind::ResourceProduced);

        engine.mute(EventKind::ResourceProduced);
        engine.advance(1);
        assert!(produced.borrow().is_empty());

        engine.unmute(EventKind::ResourceProduced);
        engine.advance(2);
        assert_eq!(produced.borrow().len(), 1);
    }

    // Test 22: a failing subscriber never derails the others.
    #[test]
    fn subscriber_errors_are_contained() {
        let mut engine = default_engine();
        engine
            .register_production(production(ResourceType::Minerals, 1.0, 1))
            .unwrap();
        engine.subscribe(
            EventKind::ResourceProduced,
            Box::new(|_| Err("listener bug".into())),
        );
        let seen = collect(&mut engine, EventKind::ResourceProduced);

        let report = engine.advance(1);
        assert_eq!(seen.borrow().len(), 1);
        assert!(report.events_delivered >= 1);
    }

    // Test 23: a connection via pending refs wires up in one batch.
    #[test]
    fn one_batch_wiring() {
        let mut engine = default_engine();
        let a = engine
            .add_node(producer_spec(ResourceType::Minerals, 10.0, 5.0))
            .unwrap();
        let b = engine.add_node(storage_spec(ResourceType::Minerals, 50.0)).unwrap();
        let conn = engine
            .connect(ConnectionSpec {
                from: a.into(),
                to: b.into(),
                resource: ResourceType::Minerals,
                rate: fx(1.0),
                max_rate: fx(1.0),
            })
            .unwrap();

        let result = engine.apply_pending();
        assert_eq!(result.applied, 3);
        assert!(result.rejected.is_empty());
        assert!(result.resolve_connection(conn).is_some());
    }

    // Test 24: rejections at apply time surface in the report.
    #[test]
    fn apply_time_rejection_is_reported() {
        let mut engine = default_engine();
        let pending = engine
            .add_node(producer_spec(ResourceType::Gas, 10.0, 1.0))
            .unwrap();
        let result = engine.apply_pending();
        let id = result.resolve_node(pending).unwrap();

        // Queue two removals of the same node; the second finds it gone.
        engine.remove_node(id).unwrap();
        engine.remove_node(id).unwrap();
        let result = engine.apply_pending();
        assert_eq!(result.applied, 1);
        assert_eq!(result.rejected.len(), 1);
        assert!(matches!(result.rejected[0].1, FlowError::UnknownNode(_)));
    }

    // Test 25: optimizer throttles a transfer carrying an overfull
    // resource, and the driven connection still honours its entry amount.
    #[test]
    fn optimizer_slows_overfull_transfers() {
        let config = EngineConfig {
            optimizer: OptimizerConfig::default(),
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(config).unwrap();
        engine
            .register_production(production(ResourceType::Gas, 900.0, 1))
            .unwrap();
        let src = engine
            .add_node(producer_spec(ResourceType::Gas, 100.0, 10.0))
            .unwrap();
        let dst = engine.add_node(storage_spec(ResourceType::Gas, 200.0)).unwrap();
        let task = engine
            .register_flow(FlowSpec {
                source: src.into(),
                target: dst.into(),
                entries: vec![ResourceEntry {
                    resource: ResourceType::Gas,
                    amount: fx(5.0),
                }],
                interval: 4,
            })
            .unwrap();
        engine.apply_pending();

        // 900 of 1000 puts gas in the high band immediately.
        engine.advance(1);
        assert_eq!(engine.scheduler().task(task).unwrap().interval, 5);
    }

    // Test 26: a huge consumer rate over a multi-tick window drains what is
    // there instead of overflowing the fixed-point window budget.
    #[test]
    fn extreme_consumer_rate_survives_wide_window() {
        let mut engine = default_engine();
        let consumer = engine
            .add_node(NodeSpec {
                role: NodeRole::Consumer,
                resource: ResourceType::Energy,
                initial_amount: fx(60.0),
                max_amount: fx(100.0),
                rate: fx(1_500_000_000.0),
                priority: 10,
            })
            .unwrap();
        let result = engine.apply_pending();
        let consumer = result.resolve_node(consumer).unwrap();

        // dt = 2, so rate * dt overflows Q32.32; the drain must clamp.
        let report = engine.advance(2);
        assert_eq!(report.now, 2);
        assert_eq!(
            engine.node(consumer).unwrap().amounts[ResourceType::Energy],
            Fixed64::ZERO
        );
    }

    // Throwaway SlotMap id for stale-lookup tests.
    fn id_unused() -> NodeId {
        let mut map = slotmap::SlotMap::<NodeId, ()>::with_key();
        let id = map.insert(());
        map.remove(id);
        id
    }
}
