use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use integration_test_utils::{incoming_message, RecordingMessageListener, ScriptedTransportFactory};
use mqtt_hub::{ConnectRequest, ConnectionRegistry, QoS};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};

const REGISTERED_URLS: usize = 128;
const CHURN_BATCH_OPS: usize = 8;

fn registry_with_urls(
    runtime: &Runtime,
    count: usize,
) -> (Arc<ScriptedTransportFactory>, ConnectionRegistry) {
    let factory = Arc::new(ScriptedTransportFactory::new());
    let registry = ConnectionRegistry::new(factory.clone());
    for i in 0..count {
        runtime
            .block_on(registry.connect(ConnectRequest::new(&format!("broker-{i}"), "bench")))
            .expect("fixture connect should succeed");
    }
    (factory, registry)
}

fn registry_criterion(c: &mut Criterion) {
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("benchmark runtime should build");

    let mut lifecycle_group = c.benchmark_group("registry_lifecycle");
    lifecycle_group.bench_function("connect_disconnect_churn", |b| {
        b.iter_batched(
            || registry_with_urls(&runtime, REGISTERED_URLS).1,
            |registry| {
                for _ in 0..CHURN_BATCH_OPS {
                    let channel = runtime
                        .block_on(registry.connect(ConnectRequest::new("churn", "bench")))
                        .expect("churn connect should succeed");
                    black_box(channel);
                    let removed = runtime.block_on(registry.disconnect("churn"));
                    assert!(removed, "churn iteration should remove its entry");
                }
            },
            BatchSize::SmallInput,
        );
    });
    lifecycle_group.bench_function("disconnect_all", |b| {
        b.iter_batched(
            || registry_with_urls(&runtime, REGISTERED_URLS).1,
            |registry| {
                runtime.block_on(registry.disconnect_all());
                black_box(registry.connected_urls().len());
            },
            BatchSize::SmallInput,
        );
    });
    lifecycle_group.finish();

    let (factory, registry) = registry_with_urls(&runtime, REGISTERED_URLS);
    let channel = registry.channel("broker-0").expect("fixture channel should exist");
    let listener = Arc::new(RecordingMessageListener::new("bench"));
    channel.set_message_listener(listener.clone());
    let transport = factory.latest("broker-0").expect("fixture transport should exist");

    let mut traffic_group = c.benchmark_group("channel_traffic");
    traffic_group.bench_function("publish", |b| {
        b.iter(|| {
            let id = runtime.block_on(channel.publish("bench/topic", QoS::AtMostOnce, "payload"));
            black_box(id)
        });
    });
    traffic_group.bench_function("message_dispatch", |b| {
        b.iter(|| {
            runtime.block_on(transport.emit_message(incoming_message(1, "bench/in", b"payload")));
        });
    });
    traffic_group.bench_function("membership_snapshot", |b| {
        b.iter(|| black_box(registry.is_connected("broker-64")));
    });
    traffic_group.finish();
    black_box(listener.count());
}

criterion_group!(benches, registry_criterion);
criterion_main!(benches);
