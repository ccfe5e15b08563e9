//! Colony network example: producers, storage, consumers, and shortage
//! handling.
//!
//! Builds a small mining colony -- a mineral mine feeding a depot, a
//! habitat drawing from the depot, and a generator converting minerals to
//! energy -- then starves it and watches the shortage events arrive.
//!
//! Run with: `RUST_LOG=info cargo run -p flownet-examples --example colony_network`

use std::cell::RefCell;
use std::rc::Rc;

use flownet_core::config::EngineConfig;
use flownet_core::engine::{ConnectionSpec, Engine};
use flownet_core::event::{Event, EventKind};
use flownet_core::fixed::{fixed64_to_f64, Fixed64};
use flownet_core::node::{NodeRole, NodeSpec};
use flownet_core::resource::ResourceType;
use flownet_core::task::{ConsumptionSpec, FlowSpec, ProductionSpec, ResourceEntry};

fn main() {
    env_logger::init();

    let mut engine = Engine::new(EngineConfig::default()).expect("default config is valid");

    // --- Wire up the colony in one batch ---

    let mine = engine
        .add_node(NodeSpec {
            role: NodeRole::Producer,
            resource: ResourceType::Minerals,
            initial_amount: Fixed64::from_num(120),
            max_amount: Fixed64::from_num(500),
            rate: Fixed64::from_num(25),
            priority: 5,
        })
        .unwrap();
    let depot = engine
        .add_node(NodeSpec {
            role: NodeRole::Storage,
            resource: ResourceType::Minerals,
            initial_amount: Fixed64::ZERO,
            max_amount: Fixed64::from_num(300),
            rate: Fixed64::ZERO,
            priority: 5,
        })
        .unwrap();
    let habitat = engine
        .add_node(NodeSpec {
            role: NodeRole::Consumer,
            resource: ResourceType::Minerals,
            initial_amount: Fixed64::ZERO,
            max_amount: Fixed64::from_num(60),
            rate: Fixed64::from_num(6),
            priority: 1, // served first on contention
        })
        .unwrap();
    let generator = engine
        .add_node(NodeSpec {
            role: NodeRole::Converter {
                output: ResourceType::Energy,
            },
            resource: ResourceType::Minerals,
            initial_amount: Fixed64::ZERO,
            max_amount: Fixed64::from_num(100),
            rate: Fixed64::from_num(3),
            priority: 8,
        })
        .unwrap();

    // Mine -> depot: a transfer task shipping 15 minerals per time unit.
    engine
        .register_flow(FlowSpec {
            source: mine.into(),
            target: depot.into(),
            entries: vec![ResourceEntry {
                resource: ResourceType::Minerals,
                amount: Fixed64::from_num(15),
            }],
            interval: 1,
        })
        .unwrap();

    // Depot -> habitat and depot -> generator: standalone connections that
    // act every tick.
    engine
        .connect(ConnectionSpec {
            from: depot.into(),
            to: habitat.into(),
            resource: ResourceType::Minerals,
            rate: Fixed64::from_num(7),
            max_rate: Fixed64::from_num(14),
        })
        .unwrap();
    engine
        .connect(ConnectionSpec {
            from: depot.into(),
            to: generator.into(),
            resource: ResourceType::Minerals,
            rate: Fixed64::from_num(4),
            max_rate: Fixed64::from_num(8),
        })
        .unwrap();

    // Global ledger tasks: gas income, required gas upkeep.
    engine
        .register_production(ProductionSpec {
            resource: ResourceType::Gas,
            amount: Fixed64::from_num(8),
            interval: 2,
            conditions: Vec::new(),
        })
        .unwrap();
    engine
        .register_consumption(ConsumptionSpec {
            resource: ResourceType::Gas,
            amount: Fixed64::from_num(5),
            interval: 1,
            required: true,
        })
        .unwrap();

    let result = engine.apply_pending();
    let mine = result.resolve_node(mine).unwrap();
    let depot = result.resolve_node(depot).unwrap();
    let generator = result.resolve_node(generator).unwrap();

    // --- Watch for shortages ---

    let shortages = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&shortages);
    engine.subscribe(
        EventKind::ResourceShortage,
        Box::new(move |event| {
            if let Event::ResourceShortage {
                resource,
                required,
                available,
                at,
                ..
            } = event
            {
                sink.borrow_mut().push(format!(
                    "t={at}: short on {resource}: wanted {:.1}, had {:.1}",
                    fixed64_to_f64(*required),
                    fixed64_to_f64(*available),
                ));
            }
            Ok(())
        }),
    );

    // --- Run ---

    println!("== running 12 ticks ==");
    for t in 1..=12 {
        let report = engine.advance(t);
        log::info!(
            "t={t}: {} fires, {} transfers, hash {:016x}",
            report.fired,
            report.transfers.len(),
            report.state_hash
        );
    }

    let snapshot = |engine: &Engine, label: &str, id| {
        let node = engine.node(id).expect("node exists");
        println!(
            "{label:9} minerals {:7.1}  energy {:6.1}  [{:?}]",
            fixed64_to_f64(node.amounts[ResourceType::Minerals]),
            fixed64_to_f64(node.amounts[ResourceType::Energy]),
            node.status,
        );
    };
    snapshot(&engine, "mine", mine);
    snapshot(&engine, "depot", depot);
    snapshot(&engine, "generator", generator);
    println!(
        "ledger: gas {:.1} of {:.1}",
        fixed64_to_f64(engine.resource_amount(ResourceType::Gas)),
        fixed64_to_f64(engine.ledger().capacity(ResourceType::Gas)),
    );

    // --- Starve the colony: pause the mine and keep running ---

    println!("\n== pausing the mine ==");
    engine.set_node_paused(mine, true).unwrap();
    for t in 13..=24 {
        engine.advance(t);
    }
    snapshot(&engine, "mine", mine);
    snapshot(&engine, "depot", depot);

    println!("\n== shortages seen ==");
    for line in shortages.borrow().iter() {
        println!("  {line}");
    }

    println!("\n== resuming the mine ==");
    engine.set_node_paused(mine, false).unwrap();
    for t in 25..=30 {
        engine.advance(t);
    }
    snapshot(&engine, "mine", mine);
    snapshot(&engine, "depot", depot);
}
