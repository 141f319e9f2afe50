use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use poolcore::{OrderedMap, Pool, PoolFlags};

fn bench_bump_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("bump_allocation");

    for size in [16usize, 64, 200].iter() {
        group.throughput(Throughput::Bytes(*size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let pool = Pool::create(PoolFlags::CUSTOM);
            b.iter(|| {
                let ptr = pool.palloc(black_box(size));
                black_box(ptr);
            });
            pool.destroy();
        });
    }

    group.finish();
}

fn bench_large_block_recycling(c: &mut Criterion) {
    let mut group = c.benchmark_group("large_block_recycling");

    for size in [512usize, 4096, 65536].iter() {
        group.throughput(Throughput::Bytes(*size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let pool = Pool::create(PoolFlags::CUSTOM);
            b.iter(|| {
                let mut requested = size;
                let ptr = pool.alloc(black_box(&mut requested));
                pool.free(ptr, requested);
            });
            pool.destroy();
        });
    }

    group.finish();
}

fn bench_clear_vs_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("clear_generation");

    for count in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));

        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let pool = Pool::create(PoolFlags::CUSTOM);
            b.iter(|| {
                for _ in 0..count {
                    black_box(pool.palloc(48));
                }
                pool.clear();
            });
            pool.destroy();
        });
    }

    group.finish();
}

fn bench_map_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("ordered_map_insert");

    for count in [100usize, 1000].iter() {
        group.throughput(Throughput::Elements(*count as u64));

        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let pool = Pool::create(PoolFlags::CUSTOM);
            b.iter(|| {
                let mut map = OrderedMap::new(&pool);
                map.reserve(count);
                for key in 0..count as u64 {
                    map.insert(black_box(key), key);
                }
                black_box(map.len());
            });
            pool.destroy();
        });
    }

    group.finish();
}

fn bench_box_baseline(c: &mut Criterion) {
    let mut group = c.benchmark_group("box_allocation_baseline");

    for size in [16usize, 200].iter() {
        group.throughput(Throughput::Bytes(*size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let boxed = vec![0u8; black_box(size)].into_boxed_slice();
                black_box(boxed);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_bump_allocation,
    bench_large_block_recycling,
    bench_clear_vs_generation,
    bench_map_insert,
    bench_box_baseline
);
criterion_main!(benches);
