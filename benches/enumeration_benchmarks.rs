//! Benchmarks for the map-schedule enumerator.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mapsched::analysis::extract_nest;
use mapsched::autotuning::{space, EnumeratorConfig, MapScheduleEnumerator};
use mapsched::ir::kernels;

/// Benchmark nest extraction.
fn bench_extraction(c: &mut Criterion) {
    let fragment = kernels::matmul(256).unwrap();

    c.bench_function("extract_nest_matmul", |b| {
        b.iter(|| extract_nest(black_box(&fragment)).unwrap())
    });
}

/// Benchmark the pure generators.
fn bench_generators(c: &mut Criterion) {
    let levels: Vec<Vec<String>> = vec![
        vec!["i".into(), "j".into(), "k".into()],
        vec!["l".into(), "m".into()],
    ];
    let sizes = EnumeratorConfig::default().tile_sizes();
    let inputs = vec!["A".to_string(), "B".to_string()];
    let outputs = vec!["C".to_string()];

    c.bench_function("generate_permutations", |b| {
        b.iter(|| space::permutations(black_box(&levels)))
    });

    c.bench_function("generate_tilings", |b| {
        b.iter(|| space::tilings(black_box(&levels), black_box(&sizes)))
    });

    c.bench_function("generate_local_storage", |b| {
        b.iter(|| space::local_storages(black_box(5), &inputs, &outputs))
    });
}

/// Benchmark enumeration throughput.
fn bench_enumeration(c: &mut Criterion) {
    let scale = kernels::scale(1024).unwrap();
    let matmul = kernels::matmul(64).unwrap();

    c.bench_function("enumerate_scale_quick", |b| {
        b.iter(|| {
            MapScheduleEnumerator::new(black_box(scale.clone()), EnumeratorConfig::quick())
                .unwrap()
                .count()
        })
    });

    c.bench_function("enumerate_matmul_first_100", |b| {
        b.iter(|| {
            MapScheduleEnumerator::new(black_box(matmul.clone()), EnumeratorConfig::quick())
                .unwrap()
                .take(100)
                .count()
        })
    });
}

/// Benchmark validation of a rewritten candidate.
fn bench_validation(c: &mut Criterion) {
    let candidate = MapScheduleEnumerator::new(kernels::matmul(64).unwrap(), EnumeratorConfig::quick())
        .unwrap()
        .nth(50)
        .unwrap();

    c.bench_function("validate_candidate", |b| {
        b.iter(|| black_box(&candidate.fragment).validate().unwrap())
    });
}

criterion_group!(
    benches,
    bench_extraction,
    bench_generators,
    bench_enumeration,
    bench_validation,
);

criterion_main!(benches);
