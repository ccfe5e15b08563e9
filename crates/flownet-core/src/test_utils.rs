//! Shared helpers for tests, benchmarks, and examples.
//!
//! Available to unit tests unconditionally and to downstream crates behind
//! the `test-utils` feature.

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::event::{Event, EventKind};
use crate::fixed::{f64_to_fixed64, Fixed64};
use crate::id::NodeRef;
use crate::node::{NodeRole, NodeSpec};
use crate::resource::ResourceType;
use crate::sim::SimTime;
use crate::task::{ConsumptionSpec, FlowSpec, ProductionSpec, ResourceEntry};

use std::cell::RefCell;
use std::rc::Rc;

/// Shorthand for building fixed-point values from float literals.
pub fn fixed(v: f64) -> Fixed64 {
    f64_to_fixed64(v)
}

/// An engine with the default configuration.
pub fn default_engine() -> Engine {
    Engine::new(EngineConfig::default()).expect("default config is valid")
}

// ---------------------------------------------------------------------------
// Node specs
// ---------------------------------------------------------------------------

/// A producer holding `initial` of its resource, extractable at `rate` per
/// time unit.
pub fn producer_spec(resource: ResourceType, initial: f64, rate: f64) -> NodeSpec {
    NodeSpec {
        role: NodeRole::Producer,
        resource,
        initial_amount: fixed(initial),
        max_amount: fixed(initial.max(1000.0)),
        rate: fixed(rate),
        priority: 10,
    }
}

/// An empty storage node bounded at `max` per resource type.
pub fn storage_spec(resource: ResourceType, max: f64) -> NodeSpec {
    NodeSpec {
        role: NodeRole::Storage,
        resource,
        initial_amount: Fixed64::ZERO,
        max_amount: fixed(max),
        rate: Fixed64::ZERO,
        priority: 10,
    }
}

/// A consumer demanding `rate` of its resource per time unit.
pub fn consumer_spec(resource: ResourceType, rate: f64) -> NodeSpec {
    NodeSpec {
        role: NodeRole::Consumer,
        resource,
        initial_amount: Fixed64::ZERO,
        max_amount: fixed(100.0),
        rate: fixed(rate),
        priority: 10,
    }
}

/// A converter turning `input` into `output` at `rate` per time unit,
/// starting with `initial` of the input buffered.
pub fn converter_spec(
    input: ResourceType,
    output: ResourceType,
    rate: f64,
    initial: f64,
) -> NodeSpec {
    NodeSpec {
        role: NodeRole::Converter { output },
        resource: input,
        initial_amount: fixed(initial),
        max_amount: fixed(initial.max(1000.0)),
        rate: fixed(rate),
        priority: 10,
    }
}

// ---------------------------------------------------------------------------
// Task specs
// ---------------------------------------------------------------------------

/// An unconditional production task.
pub fn production(resource: ResourceType, amount: f64, interval: SimTime) -> ProductionSpec {
    ProductionSpec {
        resource,
        amount: fixed(amount),
        interval,
        conditions: Vec::new(),
    }
}

/// A consumption task.
pub fn consumption(
    resource: ResourceType,
    amount: f64,
    interval: SimTime,
    required: bool,
) -> ConsumptionSpec {
    ConsumptionSpec {
        resource,
        amount: fixed(amount),
        interval,
        required,
    }
}

/// A single-entry transfer task.
pub fn flow_spec(
    source: impl Into<NodeRef>,
    target: impl Into<NodeRef>,
    resource: ResourceType,
    amount: f64,
    interval: SimTime,
) -> FlowSpec {
    FlowSpec {
        source: source.into(),
        target: target.into(),
        entries: vec![ResourceEntry {
            resource,
            amount: fixed(amount),
        }],
        interval,
    }
}

// ---------------------------------------------------------------------------
// Event collection
// ---------------------------------------------------------------------------

/// Subscribe a collector to one topic. Events land in the returned buffer
/// in delivery order.
pub fn collect(engine: &mut Engine, kind: EventKind) -> Rc<RefCell<Vec<Event>>> {
    let sink = Rc::new(RefCell::new(Vec::new()));
    let inner = Rc::clone(&sink);
    engine.subscribe(
        kind,
        Box::new(move |event| {
            inner.borrow_mut().push(event.clone());
            Ok(())
        }),
    );
    sink
}
