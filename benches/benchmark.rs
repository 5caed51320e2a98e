use criterion::{criterion_group, criterion_main, Criterion};
use std::{hint::black_box, sync::Arc};
use trackhub::{
    parameters::{merge, ParameterSet, Value},
    trackers::MemoryTracker,
    Configuration, DispatchEngine, SimpleEvent,
};

fn parameter_set(prefix: &str, len: usize) -> ParameterSet {
    (0..len)
        .map(|i| (format!("{}{}", prefix, i), Value::from(i)))
        .collect()
}

fn bench_merge(c: &mut Criterion) {
    let base = parameter_set("k", 16);
    let overlay = parameter_set("k", 8);
    c.bench_function("merge 16 + 8", |b| {
        b.iter(|| merge(black_box(Some(base.clone())), black_box(Some(overlay.clone()))))
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let engine = runtime.block_on(async {
        let config = Configuration::default()
            .with_default_parameters(parameter_set("default_", 8))
            .with_queue_capacity(1 << 16);
        DispatchEngine::new(config).unwrap()
    });
    for i in 0..4 {
        engine.add_tracker(Arc::new(MemoryTracker::new(format!("tracker_{}", i))));
    }
    let event = SimpleEvent::builder()
        .name("bench")
        .parameter("screen", "home")
        .trackers(["tracker_0", "tracker_1"])
        .build()
        .unwrap();

    c.bench_function("dispatch to 2 of 4 trackers", |b| {
        b.iter(|| {
            engine.dispatch(black_box(&event));
        });
        runtime.block_on(engine.flush());
    });
}

// ベンチマークグループの定義
criterion_group!(benches, bench_merge, bench_dispatch);
criterion_main!(benches);
