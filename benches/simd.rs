//! Kernel benchmarks
//!
//! Run with: cargo bench --bench simd

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rand::Rng;
use recipe_core::simd::{dot_product, l2_normalized};

fn random_vector(dim: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..dim).map(|_| rng.gen::<f32>() - 0.5).collect()
}

fn bench_dot_product(c: &mut Criterion) {
    let mut group = c.benchmark_group("dot_product");

    for dim in [128, 384, 768] {
        group.throughput(Throughput::Elements(dim as u64));

        let a = random_vector(dim);
        let b = random_vector(dim);

        group.bench_function(format!("dim_{}", dim), |bencher| {
            bencher.iter(|| dot_product(black_box(&a), black_box(&b)))
        });
    }

    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let v = random_vector(384);
    c.bench_function("l2_normalized/dim_384", |bencher| {
        bencher.iter(|| l2_normalized(black_box(&v)))
    });
}

criterion_group!(benches, bench_dot_product, bench_normalize);
criterion_main!(benches);
