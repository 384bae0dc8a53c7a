//! Encoding benchmark: fit and transform of a mixed numeric/categorical batch.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use txn_sentinel::features::FeatureEncoder;
use txn_sentinel::TransactionBatch;

fn make_batch(n: usize) -> TransactionBatch {
    let header: Vec<String> = ["Transaction ID", "Amount", "Merchant", "Country", "Hour"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let rows = (0..n)
        .map(|i| {
            vec![
                format!("TX-{}", i),
                format!("{}.{:02}", 10 + i % 90, i % 100),
                format!("merchant_{}", i % 25),
                ["NL", "DE", "FR", "US"][i % 4].to_string(),
                format!("{}", i % 24),
            ]
        })
        .collect();
    TransactionBatch::from_rows("Transaction ID", &header, rows).unwrap()
}

fn bench_fit(c: &mut Criterion) {
    let batch = make_batch(1_000);
    c.bench_function("encode_fit_1000_rows", |b| {
        b.iter(|| {
            let mut encoder = FeatureEncoder::new();
            black_box(encoder.encode(black_box(&batch))).unwrap()
        })
    });
}

fn bench_transform(c: &mut Criterion) {
    let batch = make_batch(1_000);
    let mut encoder = FeatureEncoder::new();
    encoder.encode(&batch).unwrap();
    let fitted = encoder.into_fitted().unwrap();

    c.bench_function("encode_transform_1000_rows", |b| {
        b.iter(|| black_box(fitted.transform(black_box(&batch))).unwrap())
    });
}

criterion_group!(benches, bench_fit, bench_transform);
criterion_main!(benches);
