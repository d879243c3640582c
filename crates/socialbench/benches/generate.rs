//! Fixture generation benchmarks.
//!
//! Generation runs before every insert and is excluded from the reported
//! database timings, but at the default 100k rows per kind it dominates the
//! wall time of a run.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use socialbench::{Dataset, EntityCounts, Generator, PairSelection, Table};

fn bench_users(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate/users");

    for count in [100, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| black_box(Generator::new(41).users(count)));
        });
    }

    group.finish();
}

fn bench_pairs(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate/likes");

    let mut generator = Generator::new(41);
    let users = generator.users(1_000);
    let posts = generator.posts(&users, 1_000).unwrap();

    for selection in [PairSelection::Prefix, PairSelection::Sampled] {
        let name = format!("{selection:?}");
        group.bench_with_input(BenchmarkId::new(name, 10_000), &selection, |b, &selection| {
            b.iter(|| {
                let mut generator = Generator::new(41).with_pair_selection(selection);
                black_box(generator.likes(&posts, &users, 10_000).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_dataset(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate/dataset");
    group.sample_size(20);

    for count in [1_000, 10_000] {
        let counts = EntityCounts::uniform(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &counts, |b, counts| {
            b.iter(|| black_box(Dataset::generate(counts, &mut Generator::new(41)).unwrap()));
        });
    }

    group.finish();
}

fn bench_tables(c: &mut Criterion) {
    let dataset =
        Dataset::generate(&EntityCounts::uniform(10_000), &mut Generator::new(41)).unwrap();

    c.bench_function("generate/table_users", |b| {
        b.iter(|| black_box(Table::from_records(&dataset.users).len()));
    });
}

criterion_group!(benches, bench_users, bench_pairs, bench_dataset, bench_tables);
criterion_main!(benches);
