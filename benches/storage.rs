//! Benchmarks for the state store: the in-memory shared cache and the file
//! backend's flush cycle.

use std::collections::HashMap;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use four_rl::storage::{load_from_file, save_to_file, InMemoryCache, PersistedState, SharedCache};
use tokio::runtime::Runtime;

fn sample_state(num_keys: u64) -> PersistedState<f64> {
    let mut state = PersistedState::default();
    for i in 0..num_keys {
        state.state.insert(format!("k:{i}"), i as f64);
    }
    state.dynamic_limits = HashMap::new();
    state.timestamp = 0.0;
    state
}

fn bench_in_memory_cache(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("in_memory_cache");

    group.bench_function("get_existing", |b| {
        let cache = InMemoryCache::new();
        rt.block_on(async {
            cache.set("bench:key", b"hello".to_vec(), Duration::from_secs(3600)).await.unwrap();
        });
        b.iter(|| rt.block_on(async { black_box(cache.get("bench:key").await) }))
    });

    group.bench_function("get_missing", |b| {
        let cache = InMemoryCache::new();
        b.iter(|| rt.block_on(async { black_box(cache.get("nonexistent:key").await) }))
    });

    group.bench_function("set", |b| {
        let cache = InMemoryCache::new();
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            let key = format!("bench:set:{i}");
            rt.block_on(async { black_box(cache.set(&key, b"hello".to_vec(), Duration::from_secs(3600)).await) })
        })
    });

    group.finish();
}

fn bench_in_memory_cache_scaling(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("in_memory_cache_scaling");

    for num_keys in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::new("get_with_entries", num_keys), num_keys, |b, &num_keys| {
            let cache = InMemoryCache::new();
            rt.block_on(async {
                for i in 0..num_keys {
                    let key = format!("scale:{i}");
                    cache.set(&key, b"v".to_vec(), Duration::from_secs(3600)).await.unwrap();
                }
            });

            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                let key = format!("scale:{}", i % num_keys);
                rt.block_on(async { black_box(cache.get(&key).await) })
            })
        });
    }

    group.finish();
}

fn bench_file_backend_flush_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_backend");

    for num_keys in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("save_then_load", num_keys), num_keys, |b, &num_keys| {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("bench_state.json");
            let state = sample_state(num_keys);

            b.iter(|| {
                save_to_file(&path, &state).unwrap();
                let loaded: PersistedState<f64> = load_from_file(&path);
                black_box(loaded)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_in_memory_cache, bench_in_memory_cache_scaling, bench_file_backend_flush_cycle);
criterion_main!(benches);
