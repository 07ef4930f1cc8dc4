//! Criterion benchmarks for the built-in machines: fit and batch predict.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use cobra_machines::{Classifier, MachineKind, TrainingData};

fn make_classification(
    n_samples: usize,
    n_features: usize,
    n_classes: usize,
    seed: u64,
) -> (Vec<Vec<f64>>, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut features = Vec::with_capacity(n_samples);
    let mut labels = Vec::with_capacity(n_samples);
    for i in 0..n_samples {
        let class = i % n_classes;
        labels.push(class);
        let row: Vec<f64> = (0..n_features)
            .map(|f| {
                let base = if f == class { 3.0 } else { 0.0 };
                base + rng.r#gen::<f64>() * 0.5
            })
            .collect();
        features.push(row);
    }
    (features, labels)
}

fn bench_fit(c: &mut Criterion) {
    let (features, labels) = make_classification(500, 20, 5, 42);
    let data = TrainingData::new(&features, &labels, 5).unwrap();
    let mut group = c.benchmark_group("fit_500x20_5class");
    group.sample_size(10);
    for kind in MachineKind::ALL {
        let learner = kind.learner(42);
        group.bench_with_input(BenchmarkId::from_parameter(kind), &data, |b, data| {
            b.iter(|| learner.fit(data).unwrap());
        });
    }
    group.finish();
}

fn bench_predict_batch(c: &mut Criterion) {
    let (features, labels) = make_classification(500, 20, 5, 42);
    let data = TrainingData::new(&features, &labels, 5).unwrap();
    let mut group = c.benchmark_group("predict_batch_500x20");
    for kind in MachineKind::basic() {
        let machine = kind.learner(42).fit(&data).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(kind), &features, |b, features| {
            b.iter(|| machine.predict_batch(features).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fit, bench_predict_batch);
criterion_main!(benches);
