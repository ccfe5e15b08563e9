//! Monitor and optimizer walkthrough: utilization bands, interval
//! adjustments, bottleneck ranking, and performance history.
//!
//! Loads the engine configuration from JSON, drives a deliberately
//! unbalanced network, and prints what the optimizer did about it and what
//! the monitor recorded.
//!
//! Run with: `RUST_LOG=debug cargo run -p flownet-examples --example monitor_walkthrough`

use flownet_core::config::EngineConfig;
use flownet_core::engine::Engine;
use flownet_core::fixed::{fixed64_to_f64, Fixed64};
use flownet_core::node::{NodeRole, NodeSpec};
use flownet_core::resource::ResourceType;
use flownet_core::task::{ConsumptionSpec, FlowSpec, ProductionSpec, ResourceEntry};

const CONFIG: &str = r#"{
    "capacities": { "minerals": 400, "gas": 200, "energy": 100 },
    "optimizer": { "critical": 0.1, "low": 0.25, "high": 0.75, "adjust_step": 0.25 },
    "monitor": { "history_capacity": 32, "rate_window": 16 }
}"#;

fn main() {
    env_logger::init();

    let config = EngineConfig::from_json_str(CONFIG).expect("config parses");
    let mut engine = Engine::new(config).expect("config is valid");

    // Minerals: slow production against steady demand, so utilization sinks
    // into the critical band and the optimizer reacts.
    let mine = engine
        .add_node(NodeSpec {
            role: NodeRole::Producer,
            resource: ResourceType::Minerals,
            initial_amount: Fixed64::from_num(40),
            max_amount: Fixed64::from_num(200),
            rate: Fixed64::from_num(10),
            priority: 6,
        })
        .unwrap();
    let workshop = engine
        .add_node(NodeSpec {
            role: NodeRole::Consumer,
            resource: ResourceType::Minerals,
            initial_amount: Fixed64::ZERO,
            max_amount: Fixed64::from_num(50),
            rate: Fixed64::from_num(9),
            priority: 3,
        })
        .unwrap();
    engine
        .register_flow(FlowSpec {
            source: mine.into(),
            target: workshop.into(),
            entries: vec![ResourceEntry {
                resource: ResourceType::Minerals,
                amount: Fixed64::from_num(6),
            }],
            interval: 1,
        })
        .unwrap();
    let mineral_task = engine
        .register_production(ProductionSpec {
            resource: ResourceType::Minerals,
            amount: Fixed64::from_num(3),
            interval: 10,
            conditions: Vec::new(),
        })
        .unwrap();

    // Gas: heavy production against optional demand, so utilization climbs
    // into the high band and optional consumers get throttled.
    engine
        .register_production(ProductionSpec {
            resource: ResourceType::Gas,
            amount: Fixed64::from_num(40),
            interval: 1,
            conditions: Vec::new(),
        })
        .unwrap();
    let vent_task = engine
        .register_consumption(ConsumptionSpec {
            resource: ResourceType::Gas,
            amount: Fixed64::from_num(2),
            interval: 4,
            required: false,
        })
        .unwrap();

    engine.apply_pending();

    println!("== driving 20 ticks ==");
    for t in 1..=20 {
        engine.advance(t);
    }

    // --- What the optimizer did ---

    let metrics = engine.optimization_metrics().expect("ran at least once");
    println!("\nutilization bands at t={}:", metrics.at);
    for r in ResourceType::ALL {
        println!(
            "  {r:9} {:5.2}  {:?}",
            fixed64_to_f64(metrics.utilization[r]),
            metrics.bands[r],
        );
    }
    println!("\nadjustments this tick: {}", metrics.adjustments.len());
    println!(
        "  mineral production interval: 10 -> {}",
        engine.scheduler().task(mineral_task).unwrap().interval
    );
    println!(
        "  gas venting interval:        4 -> {}",
        engine.scheduler().task(vent_task).unwrap().interval
    );

    // --- What the monitor saw ---

    let snapshot = engine.latest_snapshot().expect("monitor recorded ticks");
    println!(
        "\nsystem load {:.2}, {} bottleneck(s)",
        fixed64_to_f64(snapshot.system_load),
        snapshot.bottlenecks.len(),
    );
    for b in &snapshot.bottlenecks {
        println!("  node {:?} starved {} consumer(s)", b.node, b.starved_consumers);
    }
    for rec in &snapshot.recommendations {
        println!("  recommend: {rec}");
    }

    println!("\nminerals utilization history (last 10):");
    let history: Vec<(u64, f64)> = engine
        .resource_history(ResourceType::Minerals)
        .map(|(at, u)| (at, fixed64_to_f64(u)))
        .collect();
    for (at, u) in history.iter().rev().take(10).rev() {
        println!("  t={at:3}  {u:5.2}");
    }
    println!(
        "\nrolling rates: minerals +{:.2}/-{:.2} per tick",
        fixed64_to_f64(engine.monitor().production_rate(ResourceType::Minerals)),
        fixed64_to_f64(engine.monitor().consumption_rate(ResourceType::Minerals)),
    );
}
