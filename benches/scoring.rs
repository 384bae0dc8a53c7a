//! Scoring benchmark: forest fit and batch scoring on an encoded matrix.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::Array2;
use txn_sentinel::model::{ForestParams, IsolationForest};

fn make_matrix(rows: usize, cols: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(r, c)| ((r * 31 + c * 17) % 97) as f64 / 97.0)
}

fn params() -> ForestParams {
    ForestParams {
        n_estimators: 100,
        max_samples: 256,
        contamination: 0.02,
        random_state: 42,
    }
}

fn bench_fit(c: &mut Criterion) {
    let x = make_matrix(1_000, 8);
    c.bench_function("forest_fit_1000x8", |b| {
        b.iter(|| black_box(IsolationForest::fit(params(), black_box(&x))).unwrap())
    });
}

fn bench_score(c: &mut Criterion) {
    let x = make_matrix(1_000, 8);
    let forest = IsolationForest::fit(params(), &x).unwrap();
    c.bench_function("forest_score_1000x8", |b| {
        b.iter(|| black_box(forest.score_samples(black_box(&x))).unwrap())
    });
}

criterion_group!(benches, bench_fit, bench_score);
criterion_main!(benches);
