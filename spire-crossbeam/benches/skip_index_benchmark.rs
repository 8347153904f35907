//! Benchmark comparing the epoch-guarded SkipIndex with crossbeam-skiplist.
//!
//! Run with: cargo bench --package spire-crossbeam --bench skip_index_benchmark

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use crossbeam_skiplist::SkipMap;
use mimalloc::MiMalloc;
use std::sync::Arc;
use std::thread;

use spire_core::SkipIndex;
use spire_crossbeam::EpochGuard;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const POPULATED: i64 = 10_000;
const OPS_PER_THREAD: i64 = 5_000;

type EpochSkipIndex = SkipIndex<i64, i64, EpochGuard>;

// ============================================================================
// Sequential workloads
// ============================================================================

fn bench_insert_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_sequential");

    group.bench_function(BenchmarkId::new("spire", POPULATED), |b| {
        b.iter(|| {
            let index: EpochSkipIndex = SkipIndex::new(true);
            for k in 0..POPULATED {
                index.insert(black_box(k), k * 10);
            }
        })
    });

    group.bench_function(BenchmarkId::new("crossbeam_skiplist", POPULATED), |b| {
        b.iter(|| {
            let map: SkipMap<i64, i64> = SkipMap::new();
            for k in 0..POPULATED {
                map.insert(black_box(k), k * 10);
            }
        })
    });

    group.finish();
}

fn bench_search_hot(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_hot");

    let index: EpochSkipIndex = SkipIndex::new(true);
    for k in 0..POPULATED {
        index.insert(k, k * 10);
    }
    group.bench_function("spire", |b| {
        b.iter(|| {
            for k in (0..POPULATED).step_by(7) {
                black_box(index.search(&k));
            }
        })
    });

    let map: SkipMap<i64, i64> = SkipMap::new();
    for k in 0..POPULATED {
        map.insert(k, k * 10);
    }
    group.bench_function("crossbeam_skiplist", |b| {
        b.iter(|| {
            for k in (0..POPULATED).step_by(7) {
                black_box(map.get(&k));
            }
        })
    });

    group.finish();
}

// ============================================================================
// Concurrent workloads
// ============================================================================

fn run_mixed_spire(index: Arc<EpochSkipIndex>, threads: usize) {
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                let base = t as i64 * OPS_PER_THREAD;
                for i in 0..OPS_PER_THREAD {
                    let k = base + i;
                    index.insert(k, k * 10);
                    black_box(index.search(&k));
                    if i % 4 == 0 {
                        index.delete(&k, &(k * 10));
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

fn run_mixed_crossbeam(map: Arc<SkipMap<i64, i64>>, threads: usize) {
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                let base = t as i64 * OPS_PER_THREAD;
                for i in 0..OPS_PER_THREAD {
                    let k = base + i;
                    map.insert(k, k * 10);
                    black_box(map.get(&k));
                    if i % 4 == 0 {
                        map.remove(&k);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

fn bench_concurrent_mixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_mixed");
    group.sample_size(10);

    for threads in [2usize, 4, 8] {
        group.bench_with_input(
            BenchmarkId::new("spire", threads),
            &threads,
            |b, &threads| {
                b.iter(|| {
                    let index: Arc<EpochSkipIndex> = Arc::new(SkipIndex::new(true));
                    run_mixed_spire(index, threads);
                })
            },
        );

        group.bench_with_input(
            BenchmarkId::new("crossbeam_skiplist", threads),
            &threads,
            |b, &threads| {
                b.iter(|| {
                    let map: Arc<SkipMap<i64, i64>> = Arc::new(SkipMap::new());
                    run_mixed_crossbeam(map, threads);
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_insert_sequential,
    bench_search_hot,
    bench_concurrent_mixed
);
criterion_main!(benches);
