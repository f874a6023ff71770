use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use entropy_rs::{FreeBlockIterator, GroupFlags, MemoryFilesystem};

const BLOCK: usize = 4096;
const PER_GROUP: u64 = 32_768;

/// Layout with every other block in use and every fourth group uninitialized
fn fragmented(groups: u64) -> MemoryFilesystem {
    let mut fs = MemoryFilesystem::new(groups, PER_GROUP, BLOCK);
    fs.mark_used((0..groups * PER_GROUP).step_by(2));
    for group in (0..groups).step_by(4) {
        fs.set_group_flags(group, GroupFlags::BLOCK_UNINIT);
    }
    fs
}

/// Full walk cost, dominated by bitmap lookups and block copies
fn bench_walk(c: &mut Criterion) {
    let mut group = c.benchmark_group("free_block_walk");
    group.sample_size(10);

    for groups in [1u64, 4, 8] {
        let mut fs = fragmented(groups);
        group.bench_with_input(BenchmarkId::new("groups", groups), &groups, |b, _| {
            b.iter(|| {
                let mut iter = FreeBlockIterator::new(&mut fs).unwrap();
                let visited = iter
                    .for_each_free_block(|block, data| {
                        black_box((block, data[0]));
                        Ok(())
                    })
                    .unwrap();
                black_box(visited);
            });
        });
    }

    group.finish();
}

/// Skipping fully used groups without reading anything
fn bench_skip_used(c: &mut Criterion) {
    let mut fs = MemoryFilesystem::new(4, PER_GROUP, BLOCK);
    fs.mark_used(0..4 * PER_GROUP);

    c.bench_function("walk_fully_used", |b| {
        b.iter(|| {
            let mut iter = FreeBlockIterator::new(&mut fs).unwrap();
            let mut buf = vec![0u8; BLOCK];
            black_box(iter.next_block(&mut buf).is_err());
        });
    });
}

criterion_group!(benches, bench_walk, bench_skip_used);
criterion_main!(benches);
