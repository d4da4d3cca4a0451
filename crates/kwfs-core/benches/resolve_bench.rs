use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use kwfs_core::{KeywordFs, KeywordGraph, MemoryFs, ResolutionEngine};

/// `width` projects, each with the same set of status folders and a few files.
fn reference_tree(width: usize) -> MemoryFs {
    let fs = MemoryFs::new("/ref");
    for p in 0..width {
        for status in ["urgent", "later", "done"] {
            for f in 0..4 {
                fs.add_file(format!("/ref/proj{}/{}/file{}.txt", p, status, f));
            }
        }
    }
    fs
}

fn resolve_uncached_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_uncached");

    for width in [10, 100, 1000].iter() {
        let fs = reference_tree(*width);
        let mut graph = KeywordGraph::new("/ref");
        graph.scan(&fs).unwrap();
        let engine = ResolutionEngine::new(&graph, &fs, "@@");

        group.bench_with_input(BenchmarkId::new("shared_keyword", width), width, |b, _| {
            b.iter(|| engine.resolve(black_box("/urgent")).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("narrowed", width), width, |b, _| {
            b.iter(|| engine.resolve(black_box("/urgent/proj7")).unwrap());
        });
    }

    group.finish();
}

fn resolve_cached_benchmark(c: &mut Criterion) {
    let kfs = KeywordFs::new("/ref", Arc::new(reference_tree(1000))).unwrap();
    kfs.resolve("/urgent").unwrap();

    c.bench_function("resolve_cache_hit", |b| {
        b.iter(|| kfs.resolve(black_box("/urgent")).unwrap());
    });

    c.bench_function("resolve_after_flush", |b| {
        b.iter(|| {
            kfs.invalidate_all();
            kfs.resolve(black_box("/urgent")).unwrap()
        });
    });
}

fn scan_benchmark(c: &mut Criterion) {
    let fs = reference_tree(500);
    c.bench_function("scan_2000_dirs", |b| {
        b.iter(|| {
            let mut graph = KeywordGraph::new("/ref");
            graph.scan(black_box(&fs)).unwrap()
        });
    });
}

criterion_group!(
    benches,
    resolve_uncached_benchmark,
    resolve_cached_benchmark,
    scan_benchmark
);
criterion_main!(benches);
