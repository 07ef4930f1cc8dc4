//! Criterion benchmarks for COBRA: agreement table build and aggregation.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use cobra_ensemble::{Cobra, CobraConfig, Dataset, Preset};

fn make_dataset(n_samples: usize, n_features: usize, n_classes: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut features = Vec::with_capacity(n_samples);
    let mut labels = Vec::with_capacity(n_samples);
    for i in 0..n_samples {
        let class = i % n_classes;
        labels.push(class);
        features.push(
            (0..n_features)
                .map(|f| {
                    let base = if f == class { 2.0 } else { 0.0 };
                    base + rng.r#gen::<f64>()
                })
                .collect(),
        );
    }
    Dataset::new(features, labels).unwrap()
}

fn bench_load_machine_predictions(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_machine_predictions");
    group.sample_size(10);
    for n in [500, 2_000] {
        let ds = make_dataset(n, 10, 3, 42);
        let mut cobra: Cobra = Cobra::new(CobraConfig::new());
        cobra.split_data(&ds).unwrap();
        cobra.load_default().unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| cobra.load_machine_predictions().unwrap());
        });
    }
    group.finish();
}

fn bench_predict(c: &mut Criterion) {
    let ds = make_dataset(2_000, 10, 3, 42);
    let queries = make_dataset(200, 10, 3, 7).features().to_vec();
    let mut group = c.benchmark_group("predict_200_queries");
    group.sample_size(10);
    for (name, preset) in [("basic", Preset::Basic), ("advanced", Preset::Advanced)] {
        let mut cobra: Cobra = Cobra::new(CobraConfig::new().with_preset(preset));
        cobra.fit(&ds).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &queries, |b, queries| {
            b.iter(|| cobra.predict_with_info(queries, None).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_load_machine_predictions, bench_predict);
criterion_main!(benches);
