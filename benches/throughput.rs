use backpressure_pipeline::{
    CollectSink, Discipline, Event, EvictionPolicy, FlowController, IntervalSource,
    OverflowMode, PipelineBuilder,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Duration;

fn benchmark_controller_submit_take(c: &mut Criterion) {
    c.bench_function("controller_submit_take_1000_values", |b| {
        b.iter(|| {
            let controller = FlowController::new(
                OverflowMode::Buffered {
                    capacity: 1000,
                    eviction: EvictionPolicy::DropLatest,
                },
                Discipline::Push,
            );

            for i in 0..1000u64 {
                controller.submit(black_box(i));
            }
            let mut delivered = 0;
            while let Some(Event::Signal(_)) = controller.try_take() {
                delivered += 1;
            }
            black_box(delivered)
        });
    });
}

fn benchmark_threaded_push(c: &mut Criterion) {
    c.bench_function("threaded_push_1000_values", |b| {
        b.iter(|| {
            let mut pipeline = PipelineBuilder::new()
                .buffered(1000, EvictionPolicy::DropLatest)
                .production_interval(Duration::ZERO)
                .handling_delay(Duration::ZERO)
                .build()
                .expect("Build failed");

            let running = pipeline
                .start(IntervalSource::with_limit(1000), CollectSink::new())
                .expect("Start failed");
            black_box(running.wait().expect("Wait failed"))
        });
    });
}

fn benchmark_threaded_demand(c: &mut Criterion) {
    c.bench_function("threaded_demand_1000_values", |b| {
        b.iter(|| {
            let mut pipeline = PipelineBuilder::new()
                .buffered(64, EvictionPolicy::DropLatest)
                .discipline(Discipline::DemandDriven)
                .production_interval(Duration::ZERO)
                .handling_delay(Duration::ZERO)
                .build()
                .expect("Build failed");

            let running = pipeline
                .start(IntervalSource::with_limit(1000), CollectSink::demanding(32))
                .expect("Start failed");
            black_box(running.wait().expect("Wait failed"))
        });
    });
}

criterion_group!(
    benches,
    benchmark_controller_submit_take,
    benchmark_threaded_push,
    benchmark_threaded_demand
);
criterion_main!(benches);
