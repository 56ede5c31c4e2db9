//! Demand-driven consumption: the sink asks for values explicitly
//!
//! A finite source of 1..=5 only emits when the sink has outstanding credit.
//! The sink requests `N` values on subscribe and again after every `N` it
//! handles, so the producer can never outrun it.
//!
//! Usage: cargo run --example request_size -- [N]

use backpressure_pipeline::{
    Discipline, EvictionPolicy, LoggingSink, PipelineBuilder, RangeSource,
};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,backpressure_pipeline=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let request_size = match std::env::args().nth(1) {
        Some(arg) => arg.parse::<u64>()?,
        None => 1,
    };

    // A buffer as large as one request never has to evict
    let mut pipeline = PipelineBuilder::new()
        .buffered(request_size.max(1) as usize, EvictionPolicy::DropLatest)
        .discipline(Discipline::DemandDriven)
        .production_interval(Duration::ZERO)
        .handling_delay(Duration::from_secs(2))
        .build()?;

    let running = pipeline.start(
        RangeSource::new(1, 5),
        LoggingSink::with_request_size("request-size", request_size),
    )?;
    let report = running.wait()?.into_result()?;

    println!("state: {}", report.state);
    println!("{}", report.metrics.format());
    Ok(())
}
