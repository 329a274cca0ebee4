use arx_core::operation::{Fields, ParamValue};
use arx_core::{transform, Operation, OperationParams, Point};
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;
use uuid::Uuid;

fn insert(target: &str, x: f64, y: f64) -> Operation {
    Operation::new(Uuid::nil(), "bench", target, OperationParams::Insert { position: Point::new(x, y) })
}

fn update(target: &str, n: usize) -> Operation {
    let properties: Fields = (0..n)
        .map(|i| (format!("prop_{i}"), ParamValue::Number(i as f64)))
        .collect();
    Operation::new(Uuid::nil(), "bench", target, OperationParams::Update { properties })
}

fn bench_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("OT Transform");
    group.throughput(Throughput::Elements(1));

    let a = insert("e1", 0.0, 0.0);
    let b = insert("e1", 100.0, 100.0);
    group.bench_function("insert_insert_midpoint", |bench| {
        bench.iter(|| black_box(transform(black_box(&a), black_box(&b))))
    });

    let other = insert("e2", 5.0, 5.0);
    group.bench_function("different_target_pass_through", |bench| {
        bench.iter(|| black_box(transform(black_box(&a), black_box(&other))))
    });

    // Typical BIM property edit: a couple dozen fields per element
    let ua = update("e1", 24);
    let ub = update("e1", 12);
    group.bench_function("update_update_merge_24_fields", |bench| {
        bench.iter(|| black_box(transform(black_box(&ua), black_box(&ub))))
    });

    group.finish();
}

criterion_group!(benches, bench_transform);
criterion_main!(benches);
