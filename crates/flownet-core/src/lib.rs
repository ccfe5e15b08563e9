//! Flownet Core -- a deterministic resource flow network engine.
//!
//! This crate provides the global resource ledger, the flow graph of
//! producers, consumers, storages, and converters, interval task scheduling,
//! utilization-driven optimization, performance monitoring, and a buffered
//! event bus -- all in Q32.32 fixed-point so identical inputs replay
//! identically on every platform.
//!
//! # Tick Pipeline
//!
//! Each call to [`engine::Engine::advance`] runs one tick at an externally
//! supplied simulated time, through the following phases:
//!
//! 1. **Boundary** -- Apply queued structural changes; resolve pending ids.
//! 2. **Production** -- Due production tasks add to the ledger.
//! 3. **Consumption** -- Due consumption tasks draw from the ledger, then
//!    consumer nodes drain their buffers and converters transform.
//! 4. **Transfer** -- Due transfer fires and standalone connections move
//!    amounts between node buffers under rate and priority rules.
//! 5. **Optimize** -- Utilization bands drive interval and priority nudges.
//! 6. **Monitor** -- Snapshot utilization, system load, and bottlenecks.
//! 7. **Delivery** -- Buffered events reach subscribers in publish order.
//! 8. **Bookkeeping** -- Derived rates, task states, tick counter, state hash.
//!
//! # Change Queue Pattern
//!
//! Structural changes are queued and applied at tick boundaries, never
//! mid-tick:
//!
//! ```rust,ignore
//! let pending = engine.add_node(spec)?;
//! let report = engine.advance(now);
//! let node_id = report.changes.resolve_node(pending).unwrap();
//! ```
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- Pipeline orchestrator and the registration,
//!   query, and subscription boundary.
//! - [`ledger::Ledger`] -- Global per-resource stockpiles with capacity
//!   clamping and derived rates.
//! - [`graph::FlowGraph`] -- Nodes and directed, rate-limited connections
//!   with deterministic priority allocation.
//! - [`sched::Scheduler`] -- Drift-free interval firing with catch-up.
//! - [`optimizer::Optimizer`] -- Threshold-band policy nudging intervals
//!   and priorities.
//! - [`monitor::Monitor`] -- Rolling rates, bottleneck ranking, and
//!   recommendations.
//! - [`event::EventBus`] -- Per-topic ring buffers with end-of-tick
//!   delivery.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.

pub mod changes;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod fixed;
pub mod graph;
pub mod id;
pub mod ledger;
pub mod monitor;
pub mod node;
pub mod optimizer;
pub mod query;
pub mod resource;
pub mod sched;
pub mod sim;
pub mod task;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
