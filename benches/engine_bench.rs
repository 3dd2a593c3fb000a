//! Benchmarks for iso-commander
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use iso_commander::pool::WorkerPool;
use iso_commander::search::{filter_indices, BoyerMoore, Query};
use iso_commander::sort::{natural_sort, parallel_sort};
use std::sync::Arc;

fn sample_paths(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("/mnt/library/collection {}/Game Title {} (Disc {}).iso", i % 37, i * 7919 % n, i % 3 + 1))
        .collect()
}

fn benchmark_boyer_moore(c: &mut Criterion) {
    let matcher = BoyerMoore::new("disc 2");
    let haystack = "/mnt/library/collection 12/game title 4411 (disc 2).iso";

    c.bench_function("boyer_moore_find", |b| {
        b.iter(|| black_box(matcher.find(black_box(haystack))))
    });
}

fn benchmark_filter(c: &mut Criterion) {
    let pool = WorkerPool::new(num_cpus::get().max(2)).unwrap();
    let items = Arc::new(sample_paths(100_000));
    let query = Arc::new(Query::parse("collection 12;Disc 3"));

    c.bench_function("filter_100k", |b| {
        b.iter(|| {
            let hits = filter_indices(&pool, &items, &query).unwrap();
            black_box(hits);
        })
    });
}

fn benchmark_sort(c: &mut Criterion) {
    let pool = WorkerPool::new(num_cpus::get().max(2)).unwrap();
    let items = sample_paths(50_000);

    c.bench_function("natural_sort_50k", |b| {
        b.iter(|| {
            let mut copy = items.clone();
            natural_sort(&mut copy);
            black_box(copy);
        })
    });

    c.bench_function("parallel_sort_50k", |b| {
        b.iter(|| black_box(parallel_sort(&pool, items.clone()).unwrap()))
    });
}

criterion_group!(benches, benchmark_boyer_moore, benchmark_filter, benchmark_sort);
criterion_main!(benches);
