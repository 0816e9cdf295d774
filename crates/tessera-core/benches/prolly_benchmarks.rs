//! Benchmarks for chunked collection operations

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tessera_blockstore::MemoryBlockStore;
use tessera_core::{Blob, ChunkConfig, List, Map, Value, ValueStore};

fn create_store() -> Arc<ValueStore<MemoryBlockStore>> {
    Arc::new(
        ValueStore::with_config(Arc::new(MemoryBlockStore::new()), ChunkConfig::default()).unwrap(),
    )
}

fn ints(n: i64) -> Vec<Value> {
    (0..n).map(Value::Int).collect()
}

fn bench_build(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("list_build");

    for size in [1_000i64, 10_000, 100_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                rt.block_on(async {
                    let list = List::from_values(create_store(), ints(size)).await.unwrap();
                    black_box(list)
                })
            });
        });
    }

    group.finish();
}

fn bench_edit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    // Pre-populate list
    let list = rt.block_on(List::from_values(create_store(), ints(100_000))).unwrap();

    let mut group = c.benchmark_group("list_edit");

    group.bench_function("set_middle", |b| {
        b.iter(|| {
            rt.block_on(async {
                let edited = list.set(50_000, Value::Int(-1)).await.unwrap();
                black_box(edited)
            })
        });
    });

    group.bench_function("append", |b| {
        b.iter(|| {
            rt.block_on(async {
                let edited = list.append(Value::Int(-1)).await.unwrap();
                black_box(edited)
            })
        });
    });

    group.finish();
}

fn bench_map_lookup(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    // Pre-populate map
    let entries = (0..10_000)
        .map(|i| (Value::from(format!("key-{i:08}")), Value::Int(i)))
        .collect();
    let map = rt.block_on(Map::from_entries(create_store(), entries)).unwrap();

    let mut group = c.benchmark_group("map_lookup");

    group.bench_function("existing_key", |b| {
        let key = Value::from("key-00005000");
        b.iter(|| {
            rt.block_on(async {
                let result = map.get(&key).await.unwrap();
                black_box(result)
            })
        });
    });

    group.bench_function("missing_key", |b| {
        let key = Value::from("nonexistent");
        b.iter(|| {
            rt.block_on(async {
                let result = map.get(&key).await.unwrap();
                black_box(result)
            })
        });
    });

    group.finish();
}

fn bench_blob(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let data: Vec<u8> = (0..1_000_000u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8).collect();

    c.bench_function("blob_build_1mb", |b| {
        b.iter(|| {
            rt.block_on(async {
                let blob = Blob::from_bytes(create_store(), &data).await.unwrap();
                black_box(blob)
            })
        });
    });
}

criterion_group!(benches, bench_build, bench_edit, bench_map_lookup, bench_blob,);

criterion_main!(benches);
