use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fixalloc::{BumpAllocator, OwnedRegion, RawAllocator, ScratchRing, SystemAllocator};

const BATCH_SIZE: usize = 1000;
const OBJECT_SIZE: usize = 48;

fn bench_alloc_single(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_allocation");
    let mut backing = OwnedRegion::new(64 * 1024 * 1024).unwrap();

    group.bench_function("system", |b| {
        let system = SystemAllocator;
        b.iter(|| {
            let ptr = system.allocate(black_box(OBJECT_SIZE), 8).unwrap();
            unsafe { system.free(ptr.as_ptr()) };
        })
    });

    group.bench_function("scratch", |b| {
        let ring = ScratchRing::new(backing.region(), false);
        b.iter(|| black_box(ring.allocate(black_box(OBJECT_SIZE), 8).unwrap()))
    });

    group.bench_function("scratch_locked", |b| {
        let ring = ScratchRing::new(backing.region(), true);
        b.iter(|| black_box(ring.allocate(black_box(OBJECT_SIZE), 8).unwrap()))
    });

    group.finish();
}

fn bench_alloc_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_allocation_1000");
    let mut backing = OwnedRegion::new(BATCH_SIZE * (OBJECT_SIZE + 16)).unwrap();

    group.bench_function("system", |b| {
        let system = SystemAllocator;
        b.iter(|| {
            let mut v = Vec::with_capacity(BATCH_SIZE);
            for _ in 0..BATCH_SIZE {
                v.push(system.allocate(OBJECT_SIZE, 8).unwrap());
            }
            for ptr in v {
                unsafe { system.free(ptr.as_ptr()) };
            }
        })
    });

    for (name, multithread) in [("bump_st", false), ("bump_mt", true)] {
        group.bench_function(name, |b| {
            let mut bump = BumpAllocator::new(backing.region(), multithread);
            b.iter(|| {
                for _ in 0..BATCH_SIZE {
                    black_box(bump.allocate(OBJECT_SIZE, 8).unwrap());
                }
                bump.reset();
            })
        });
    }

    group.finish();
}

fn bench_alloc_mixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_alignment_1000");
    let mut backing = OwnedRegion::new(BATCH_SIZE * 256).unwrap();

    group.bench_function("system", |b| {
        let system = SystemAllocator;
        b.iter(|| {
            for i in 0..BATCH_SIZE {
                let ptr = system.allocate(16 + i % 64, 1 << (i % 7)).unwrap();
                unsafe { system.free(black_box(ptr).as_ptr()) };
            }
        })
    });

    group.bench_function("bump_st", |b| {
        let mut bump = BumpAllocator::new(backing.region(), false);
        b.iter(|| {
            for i in 0..BATCH_SIZE {
                black_box(bump.allocate(16 + i % 64, 1 << (i % 7)).unwrap());
            }
            bump.reset();
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_alloc_single,
    bench_alloc_batch,
    bench_alloc_mixed
);
criterion_main!(benches);
