//! Fast producer, slow consumer: one run per overflow strategy
//!
//! Usage: cargo run --example overflow_strategies -- [error|drop|latest|buffer-drop-latest|buffer-drop-oldest|all]
//!        cargo run --example overflow_strategies -- --config pipeline.toml
//!
//! Set RUST_LOG=backpressure_pipeline=trace to see every emission.

use backpressure_pipeline::{
    Discipline, EvictionPolicy, IntervalSource, LoggingSink, OverflowMode, PipelineBuilder,
    PipelineConfig,
};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Values a demand-driven sink asks for at a time
const REQUEST_SIZE: u64 = 4;

struct Scenario {
    name: &'static str,
    config: PipelineConfig,
    run_for: Duration,
}

fn scenarios() -> Vec<Scenario> {
    let fast = |name, mode| Scenario {
        name,
        config: PipelineConfig {
            mode,
            production_interval_millis: 1,
            handling_delay_millis: 5,
            ..PipelineConfig::default()
        },
        run_for: Duration::from_secs(2),
    };
    let buffered = |name, eviction| Scenario {
        name,
        config: PipelineConfig {
            mode: OverflowMode::Buffered {
                capacity: 2,
                eviction,
            },
            production_interval_millis: 300,
            handling_delay_millis: 1000,
            ..PipelineConfig::default()
        },
        run_for: Duration::from_millis(2500),
    };

    vec![
        fast("error", OverflowMode::UnboundedFail),
        fast("drop", OverflowMode::DropNew),
        fast("latest", OverflowMode::KeepLatest),
        buffered("buffer-drop-latest", EvictionPolicy::DropLatest),
        buffered("buffer-drop-oldest", EvictionPolicy::DropOldest),
    ]
}

fn run(scenario: &Scenario) -> Result<(), Box<dyn std::error::Error>> {
    let config = &scenario.config;
    println!(
        "\n=== {} ({}, {:?}) ===",
        scenario.name, config.mode, config.discipline
    );

    let mut pipeline = PipelineBuilder::from_config(config).build()?;

    // A push sink never requests credit, which would stall a demand-driven run
    let sink = match config.discipline {
        Discipline::Push => LoggingSink::new(scenario.name),
        Discipline::DemandDriven => LoggingSink::with_request_size(scenario.name, REQUEST_SIZE),
    };
    let running = pipeline.start(IntervalSource::new(), sink)?;
    let report = running.wait_timeout(scenario.run_for)?;

    println!("state: {}", report.state);
    if let Some(failure) = &report.failure {
        println!("failure: {failure}");
    }
    println!("{}", report.metrics.format());
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    if let [flag, path] = args.as_slice() {
        if flag == "--config" {
            return run(&Scenario {
                name: "configured",
                config: PipelineConfig::load(path)?,
                run_for: Duration::from_secs(3),
            });
        }
    }

    let wanted = args.first().map(String::as_str).unwrap_or("buffer-drop-oldest");
    let selected: Vec<Scenario> = scenarios()
        .into_iter()
        .filter(|s| wanted == "all" || s.name == wanted)
        .collect();

    if selected.is_empty() {
        return Err(format!("unknown strategy: {wanted}").into());
    }
    for scenario in &selected {
        run(scenario)?;
    }
    Ok(())
}
