//! Allocator benchmarks
//!
//! Compares the arena allocators against the system heap across the
//! workloads they are built for.

use std::alloc::Layout;
use std::hint::black_box;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use bedrock_memory::allocator::{CompactingAllocator, CompactingConfig, PoolAllocator, PoolConfig};

/// Benchmark single allocation/deallocation cycle
fn bench_single_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_allocation");

    // Pool allocator
    group.bench_function("pool_64b", |b| {
        let pool = PoolAllocator::with_config(64, 8, 1024, PoolConfig::production()).unwrap();

        b.iter(|| {
            let ptr = pool.allocate_block().unwrap();
            pool.deallocate_block(ptr);
            black_box(ptr);
        });
    });

    // Compacting allocator
    group.bench_function("compacting_64b", |b| {
        let mut heap =
            CompactingAllocator::with_config(1024 * 1024, CompactingConfig::production()).unwrap();

        b.iter(|| {
            let handle = heap.malloc(64).unwrap();
            heap.free(handle);
            black_box(handle);
        });
    });

    // System allocator (baseline)
    group.bench_function("system_64b", |b| {
        let layout = Layout::from_size_align(64, 8).unwrap();

        b.iter(|| unsafe {
            let ptr = std::alloc::alloc(layout);
            std::alloc::dealloc(ptr, layout);
            black_box(ptr);
        });
    });

    group.finish();
}

/// Benchmark batch allocations
fn bench_batch_allocations(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_allocations");
    group.throughput(Throughput::Elements(100));

    group.bench_function("pool_100x64b", |b| {
        let pool = PoolAllocator::with_config(64, 8, 1024, PoolConfig::production()).unwrap();

        b.iter(|| {
            let mut ptrs = Vec::with_capacity(100);
            for _ in 0..100 {
                ptrs.push(pool.allocate_block().unwrap());
            }
            for ptr in ptrs {
                pool.deallocate_block(ptr);
            }
        });
    });

    group.bench_function("compacting_100x64b", |b| {
        let mut heap =
            CompactingAllocator::with_config(1024 * 1024, CompactingConfig::production()).unwrap();

        b.iter(|| {
            let mut handles = Vec::with_capacity(100);
            for _ in 0..100 {
                handles.push(heap.malloc(64).unwrap());
            }
            for handle in handles {
                heap.free(handle);
            }
        });
    });

    group.finish();
}

/// Benchmark a full compaction pass over a fragmented arena
fn bench_compaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("compaction");

    group.bench_function("compact_fragmented_1mb", |b| {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        let sizes: Vec<usize> = (0..256).map(|_| rng.gen_range(64..2048)).collect();

        b.iter_batched(
            || {
                let mut heap =
                    CompactingAllocator::with_config(1024 * 1024, CompactingConfig::production())
                        .unwrap();
                let handles: Vec<_> = sizes.iter().map(|&s| heap.malloc(s).unwrap()).collect();
                for handle in handles.iter().step_by(2) {
                    heap.free(*handle);
                }
                heap
            },
            |mut heap| {
                black_box(heap.compact(usize::MAX));
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_allocation,
    bench_batch_allocations,
    bench_compaction
);
criterion_main!(benches);
