//! Worker pool dispatch cost: mailbox push round-trips and parallel_for
//! over a memory-bound kernel.
//!
//! Run with: `cargo bench --package skein_core`

#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use skein_core::{Arena, ThreadPool};

fn bench_push_round_trip(c: &mut Criterion) {
    let arena = Arena::new();
    assert!(arena.reserve(1 << 16, None));
    {
        let pool = ThreadPool::new(&arena, 2, 0);
        let counter = std::sync::Arc::new(AtomicUsize::new(0));

        c.bench_function("pool_push_wait", |b| {
            b.iter(|| {
                let counter = std::sync::Arc::clone(&counter);
                pool.push_untagged(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
                pool.wait_for_tasks();
            });
        });
        black_box(counter.load(Ordering::Relaxed));
    }
    arena.free(None);
}

fn bench_parallel_for_sum(c: &mut Criterion) {
    let arena = Arena::new();
    assert!(arena.reserve(1 << 16, None));
    {
        let pool = ThreadPool::new(&arena, 3, 0);
        let values: Vec<f32> = (0..100_000).map(|i| i as f32).collect();

        c.bench_function("pool_parallel_for_100k", |b| {
            b.iter(|| {
                let total = AtomicUsize::new(0);
                pool.parallel_for(
                    |start, end| {
                        let partial: f32 = values[start..end].iter().sum();
                        total.fetch_add(partial as usize, Ordering::Relaxed);
                    },
                    values.len(),
                    0,
                );
                black_box(total.load(Ordering::Relaxed));
            });
        });
    }
    arena.free(None);
}

criterion_group!(benches, bench_push_round_trip, bench_parallel_for_sum);
criterion_main!(benches);
