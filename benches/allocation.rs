use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vdisk_rs::sort::{read_ints, write_ints, BoundedSorter};
use vdisk_rs::{BitmapAllocator, BlockAllocator, MemoryStore};

/// Benchmark reserving 100K blocks in runs of 10
fn bench_reserve_100k(c: &mut Criterion) {
    c.bench_function("bitmap_reserve_100k_blocks", |b| {
        b.iter(|| {
            let mut alloc = BitmapAllocator::new(4096, 100_000);
            for _ in 0..10_000 {
                alloc.reserve(10 * 4096).unwrap();
            }
        });
    });
}

/// Benchmark reserve + release cycles (fragmentation test)
fn bench_reserve_release_cycle(c: &mut Criterion) {
    c.bench_function("bitmap_reserve_release_cycle", |b| {
        b.iter(|| {
            let mut alloc = BitmapAllocator::new(4096, 10_000);
            let mut extents = Vec::new();

            for _ in 0..1000 {
                extents.push(alloc.reserve(5 * 4096).unwrap());
            }

            // Release every other extent
            for i in (0..extents.len()).step_by(2) {
                alloc.release(extents[i]);
            }

            // Reserve again into the holes
            for _ in 0..500 {
                alloc.reserve(5 * 4096).unwrap();
            }

            black_box(alloc.largest_free_run());
        });
    });
}

/// Benchmark sorting with the in-memory and external strategies
fn bench_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort_100k");
    let count = 100_000usize;
    let mut rng = StdRng::seed_from_u64(1);
    let values: Vec<i32> = (0..count).map(|_| rng.gen_range(0..1_000_000)).collect();

    let swap_offset = 1024 * 1024;
    let swap_capacity = 1024 * 1024;

    for budget in [4096usize, 16_384, 131_072] {
        group.bench_with_input(BenchmarkId::from_parameter(budget), &budget, |b, &budget| {
            b.iter(|| {
                let mut store = MemoryStore::new(swap_offset + swap_capacity);
                write_ints(&mut store, 0, &values).unwrap();

                BoundedSorter::new(&mut store, budget, swap_offset, swap_capacity)
                    .sort(0, count as u64)
                    .unwrap();

                black_box(read_ints(&mut store, 0, 1).unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_reserve_100k,
    bench_reserve_release_cycle,
    bench_sort
);
criterion_main!(benches);
