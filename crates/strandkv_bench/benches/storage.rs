//! In-memory engine benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strandkv_bench::{random_data, sequential_keys};
use strandkv_storage::{CollectionOptions, InMemoryEngine, StorageEngine};

/// Benchmark begin/commit of an engine transaction.
///
/// Begin copies the committed tables, so the cost grows with the data.
fn bench_begin_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_begin_commit");

    for count in [0usize, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let mut engine = InMemoryEngine::new();
            let handle = engine
                .open_collection(Some("bench"), CollectionOptions::new())
                .unwrap();
            engine.begin().unwrap();
            for key in sequential_keys(count) {
                engine.put(&handle, &key, &random_data(64)).unwrap();
            }
            engine.commit().unwrap();

            b.iter(|| {
                engine.begin().unwrap();
                engine.commit().unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark walking all keys with `next_key`.
fn bench_key_walk(c: &mut Criterion) {
    let mut engine = InMemoryEngine::new();
    let handle = engine
        .open_collection(Some("bench"), CollectionOptions::new())
        .unwrap();
    engine.begin().unwrap();
    for key in sequential_keys(1000) {
        engine.put(&handle, &key, b"v").unwrap();
    }

    c.bench_function("key_walk_1000", |b| {
        b.iter(|| {
            let mut cursor = engine.first_key(&handle).unwrap();
            let mut seen = 0usize;
            while let Some(key) = cursor {
                seen += 1;
                cursor = engine.next_key(&handle, &key).unwrap();
            }
            black_box(seen);
        });
    });
}

criterion_group!(benches, bench_begin_commit, bench_key_walk);
criterion_main!(benches);
