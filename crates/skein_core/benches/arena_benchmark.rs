//! Arena allocation throughput: bump allocate/deallocate pairs and fixed
//! array construction against the system allocator baseline.
//!
//! Run with: `cargo bench --package skein_core`

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use skein_core::{Arena, FixedArray};

fn bench_allocate_deallocate(c: &mut Criterion) {
    let arena = Arena::new();
    assert!(arena.reserve(1 << 20, None));

    c.bench_function("arena_alloc_dealloc_1k_u64", |b| {
        b.iter(|| {
            let block = arena.allocate::<u64>(1024, 0).expect("arena sized for this");
            black_box(block);
            arena.deallocate(block, 1024);
        });
    });

    arena.free(None);
}

fn bench_fixed_array_fill(c: &mut Criterion) {
    let arena = Arena::new();
    assert!(arena.reserve(1 << 20, None));

    c.bench_function("fixed_array_default_fill_4k_f32", |b| {
        b.iter(|| {
            let values: FixedArray<f32> = FixedArray::new(&arena, 4096);
            black_box(values.len());
        });
    });

    arena.free(None);
}

criterion_group!(benches, bench_allocate_deallocate, bench_fixed_array_fill);
criterion_main!(benches);
