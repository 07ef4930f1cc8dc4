//! Behavioral tests for COBRA selection and voting.
//!
//! Synthetic data is generated with a seeded `ChaCha8Rng` so every assertion
//! is deterministic.

use std::collections::BTreeSet;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use cobra_ensemble::{
    Cobra, CobraConfig, CobraError, Dataset, DynLearner, FALLBACK_LABEL, QuorumRule, SplitConfig,
};
use cobra_machines::{Classifier, KnnConfig, Learner, MachineError, TrainingData};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Two 2-D blobs with `n / 2` points each, alternating labels.
///
/// `spread` is the width of the uniform noise; centers sit at 0 and 5.
fn make_blobs(n: usize, spread: f64, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut features = Vec::with_capacity(n);
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let class = i % 2;
        let center = class as f64 * 5.0;
        features.push(vec![
            center + rng.gen_range(0.0..spread),
            center + rng.gen_range(0.0..spread),
        ]);
        labels.push(class);
    }
    Dataset::with_class_names(features, labels, vec!["A".into(), "B".into()]).unwrap()
}

fn fitted(config: CobraConfig, dataset: &Dataset) -> Cobra {
    let mut cobra: Cobra = Cobra::new(config);
    cobra.fit(dataset).unwrap();
    cobra
}

fn queries(n: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| vec![rng.gen_range(-1.0..7.0), rng.gen_range(-1.0..7.0)])
        .collect()
}

/// Predicts 1 below `at` and 2 above it on feature 0.
#[derive(Debug, Clone)]
struct Threshold {
    at: f64,
}

impl Classifier for Threshold {
    fn n_features(&self) -> usize {
        1
    }

    fn n_classes(&self) -> usize {
        3
    }

    fn predict(&self, sample: &[f64]) -> Result<usize, MachineError> {
        Ok(if sample[0] > self.at { 2 } else { 1 })
    }
}

struct ThresholdLearner {
    name: &'static str,
    at: f64,
}

impl Learner for ThresholdLearner {
    type Model = Threshold;

    fn name(&self) -> &str {
        self.name
    }

    fn fit(&self, _data: &TrainingData<'_>) -> Result<Threshold, MachineError> {
        Ok(Threshold { at: self.at })
    }
}

struct Broken;

impl Learner for Broken {
    type Model = Threshold;

    fn name(&self) -> &str {
        "broken"
    }

    fn fit(&self, _data: &TrainingData<'_>) -> Result<Threshold, MachineError> {
        Err(MachineError::DegenerateTrainingData {
            machine: "broken",
            reason: "always fails".into(),
        })
    }
}

fn line_dataset(n: usize) -> Dataset {
    let features = (0..n).map(|i| vec![i as f64]).collect();
    let labels = (0..n).map(|i| i % 3).collect();
    Dataset::with_class_names(features, labels, vec!["x".into(), "y".into(), "z".into()]).unwrap()
}

// ---------------------------------------------------------------------------
// Selection properties
// ---------------------------------------------------------------------------

#[test]
fn selected_points_stay_inside_aggregation_range() {
    let ds = make_blobs(120, 3.0, 1);
    let cobra = fitted(CobraConfig::new(), &ds);
    let n_points = cobra.split().unwrap().aggregation().len();

    for query in queries(25, 2) {
        for m in 1..=cobra.n_machines() {
            let selection = cobra.predict_one(&query, Some(m)).unwrap();
            assert!(selection.points.iter().all(|&i| i < n_points));
            assert!(selection.points.windows(2).all(|w| w[0] < w[1]));
        }
    }
}

#[test]
fn exact_quorum_partitions_points() {
    let ds = make_blobs(120, 3.0, 3);
    let cobra = fitted(CobraConfig::new(), &ds);
    let n_points = cobra.split().unwrap().aggregation().len();

    for query in queries(10, 4) {
        let mut seen = BTreeSet::new();
        for m in 1..=cobra.n_machines() {
            for i in cobra.predict_one(&query, Some(m)).unwrap().points {
                assert!(seen.insert(i), "point {i} selected under two quorums");
            }
        }
        assert!(seen.len() <= n_points);
    }
}

#[test]
fn at_least_quorum_shrinks_monotonically() {
    let ds = make_blobs(120, 3.0, 5);
    let cobra = fitted(CobraConfig::new().with_quorum_rule(QuorumRule::AtLeast), &ds);

    for query in queries(25, 6) {
        let sizes: Vec<usize> = (1..=cobra.n_machines())
            .map(|m| cobra.predict_one(&query, Some(m)).unwrap().points.len())
            .collect();
        assert!(sizes.windows(2).all(|w| w[0] >= w[1]), "sizes {sizes:?}");
    }
}

#[test]
fn same_seed_same_predictions() {
    let ds = make_blobs(100, 3.0, 7);
    let a = fitted(CobraConfig::new().with_seed(11), &ds);
    let b = fitted(CobraConfig::new().with_seed(11), &ds);
    let q = queries(30, 8);

    assert_eq!(a.agreement(), b.agreement());
    assert_eq!(a.predict_with_info(&q, None).unwrap(), b.predict_with_info(&q, None).unwrap());
}

#[test]
fn unanimous_quorum_recovers_class_a() {
    let ds = make_blobs(100, 1.0, 9);
    let split = SplitConfig::new().with_k(Some(50)).with_l(Some(100));
    let cobra = fitted(CobraConfig::new().with_split(split), &ds);
    assert_eq!(cobra.n_machines(), 4);

    let training = cobra.split().unwrap().training();
    let class_a_row = training
        .labels()
        .iter()
        .position(|&label| label == 0)
        .map(|i| training.features()[i].clone())
        .unwrap();

    let selection = cobra.predict_one(&class_a_row, Some(4)).unwrap();
    assert_eq!(selection.label, 0);
    assert!(!selection.points.is_empty());
    let truth = cobra.split().unwrap().aggregation().labels();
    assert!(selection.points.iter().all(|&i| truth[i] == 0));

    assert_eq!(cobra.predict_single(&[5.5, 5.5]).unwrap(), 1);
}

#[test]
fn batch_preserves_order_and_averages_over_processed_rows() {
    let ds = make_blobs(100, 1.0, 10);
    let cobra = fitted(CobraConfig::new(), &ds);
    let q = vec![vec![0.5, 0.5], vec![5.5, 5.5], vec![0.2, 0.8]];

    let batch = cobra.predict_with_info(&q, None).unwrap();
    assert_eq!(batch.labels, [0, 1, 0]);
    let total: usize = batch.selections.iter().map(|s| s.points.len()).sum();
    assert!((batch.mean_selected - total as f64 / 3.0).abs() < 1e-12);
    assert_eq!(cobra.predict(&q, None).unwrap(), batch.labels);

    let empty = cobra.predict_with_info(&[], None).unwrap();
    assert!(empty.labels.is_empty());
    assert!(empty.mean_selected.abs() < f64::EPSILON);
}

// ---------------------------------------------------------------------------
// Degenerate cases
// ---------------------------------------------------------------------------

#[test]
fn disagreeing_query_falls_back() {
    let ds = line_dataset(30);
    let learners: Vec<DynLearner<Threshold>> = vec![
        Box::new(ThresholdLearner { name: "low", at: 100.0 }),
        Box::new(ThresholdLearner { name: "high", at: 200.0 }),
    ];
    let mut cobra: Cobra<Threshold> = Cobra::new(CobraConfig::new());
    cobra.fit_with(&ds, &learners).unwrap();

    let selection = cobra.predict_one(&[1_000.0], None).unwrap();
    assert_eq!(selection.label, FALLBACK_LABEL);
    assert!(selection.points.is_empty());
    assert!(selection.is_fallback());

    let agreeing = cobra.predict_one(&[1.0], None).unwrap();
    assert!(!agreeing.is_fallback());
    assert_eq!(agreeing.points.len(), cobra.split().unwrap().aggregation().len());
}

#[test]
fn failing_learner_is_skipped() {
    let ds = line_dataset(30);
    let learners: Vec<DynLearner<Threshold>> = vec![
        Box::new(Broken),
        Box::new(ThresholdLearner { name: "low", at: 100.0 }),
    ];
    let mut cobra: Cobra<Threshold> = Cobra::new(CobraConfig::new());
    let report = cobra.fit_with(&ds, &learners).unwrap();

    assert_eq!(report.n_failed(), 1);
    assert_eq!(report.failed().next().unwrap().0, "broken");
    assert_eq!(cobra.machine_names(), ["low"]);
    assert!(cobra.predict_one(&[3.0], None).is_ok());
}

#[test]
fn all_learners_failing_is_an_error() {
    let ds = line_dataset(30);
    let learners: Vec<DynLearner<Threshold>> = vec![Box::new(Broken)];
    let mut cobra: Cobra<Threshold> = Cobra::new(CobraConfig::new());
    let err = cobra.fit_with(&ds, &learners).unwrap_err();
    assert!(matches!(err, CobraError::NoMachines { failed: 1 }));
}

#[test]
fn invalid_quorum_fails_fast() {
    let ds = make_blobs(60, 1.0, 12);
    let cobra = fitted(CobraConfig::new(), &ds);
    for m in [0, 5] {
        let err = cobra.predict_one(&[0.0, 0.0], Some(m)).unwrap_err();
        assert!(matches!(err, CobraError::InvalidQuorum { n_machines: 4, .. }));
    }
}

#[test]
fn malformed_queries_are_rejected() {
    let ds = make_blobs(60, 1.0, 13);
    let cobra = fitted(CobraConfig::new(), &ds);
    assert!(matches!(
        cobra.predict_one(&[0.0], None),
        Err(CobraError::FeatureMismatch { expected: 2, got: 1 })
    ));
    assert!(matches!(
        cobra.predict_one(&[0.0, f64::NAN], None),
        Err(CobraError::NonFiniteQuery { feature_index: 1 })
    ));
}

#[test]
fn registry_change_requires_rebuild() {
    let ds = make_blobs(60, 1.0, 14);
    let mut cobra = fitted(CobraConfig::new(), &ds);

    let data = cobra.split().unwrap().training().training_data().unwrap();
    let knn = KnnConfig::new().with_n_neighbors(1).fit(&data).unwrap();
    cobra.load_machine("knn_1", knn.into()).unwrap();

    assert!(matches!(
        cobra.predict_one(&[0.0, 0.0], None),
        Err(CobraError::AgreementNotBuilt)
    ));
    cobra.load_machine_predictions().unwrap();
    assert_eq!(cobra.predict_one(&[0.5, 0.5], None).unwrap().label, 0);
}

#[test]
fn unfitted_ensemble_reports_not_fitted() {
    let cobra: Cobra = Cobra::new(CobraConfig::new());
    assert!(matches!(cobra.predict_one(&[0.0], None), Err(CobraError::NotFitted)));
}

#[test]
fn pre_split_subsets_are_used_as_given() {
    let train = make_blobs(40, 1.0, 15);
    let aggregation = make_blobs(30, 1.0, 16);
    let mut cobra: Cobra = Cobra::new(CobraConfig::new());
    cobra.set_subsets(train, aggregation.clone()).unwrap();
    cobra.load_default().unwrap();
    cobra.load_machine_predictions().unwrap();

    assert_eq!(cobra.split().unwrap().aggregation(), &aggregation);
    assert_eq!(cobra.predict_single(&[0.5, 0.5]).unwrap(), 0);
}

#[test]
fn subsets_with_different_classes_are_rejected() {
    let train = line_dataset(30);
    let features = (0..10).map(|i| vec![i as f64]).collect();
    let labels = (0..10).map(|i| i % 2).collect();
    let aggregation =
        Dataset::with_class_names(features, labels, vec!["x".into(), "y".into()]).unwrap();

    let mut cobra: Cobra = Cobra::new(CobraConfig::new());
    let err = cobra.set_subsets(train, aggregation).unwrap_err();
    assert!(matches!(err, CobraError::SubsetClassMismatch { .. }));
    assert!(cobra.split().is_none());
}

// ---------------------------------------------------------------------------
// Confidence and evaluation
// ---------------------------------------------------------------------------

#[test]
fn predict_proba_is_a_distribution() {
    let ds = make_blobs(100, 3.0, 17);
    let cobra = fitted(CobraConfig::new(), &ds);
    for proba in cobra.predict_proba_batch(&queries(10, 18)).unwrap() {
        assert_eq!(proba.len(), 2);
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(proba.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }
}

#[test]
fn predict_proba_without_source_fails() {
    let ds = line_dataset(30);
    let learners: Vec<DynLearner<Threshold>> =
        vec![Box::new(ThresholdLearner { name: "low", at: 100.0 })];
    let mut cobra: Cobra<Threshold> = Cobra::new(CobraConfig::new());
    cobra.fit_with(&ds, &learners).unwrap();
    assert!(matches!(
        cobra.predict_proba(&[1.0]),
        Err(CobraError::NoConfidenceSource)
    ));
}

/// Reports a two-class distribution regardless of the data it sees.
#[derive(Debug, Clone)]
struct TwoWay;

impl Classifier for TwoWay {
    fn n_features(&self) -> usize {
        1
    }

    fn n_classes(&self) -> usize {
        2
    }

    fn predict(&self, _sample: &[f64]) -> Result<usize, MachineError> {
        Ok(0)
    }

    fn predict_proba(&self, _sample: &[f64]) -> Result<Vec<f64>, MachineError> {
        Ok(vec![0.5, 0.5])
    }
}

#[test]
fn predict_proba_rejects_short_distribution() {
    let mut cobra: Cobra<TwoWay> = Cobra::new(CobraConfig::new());
    cobra.split_data(&line_dataset(30)).unwrap();
    cobra.load_machine("two_way", TwoWay).unwrap();

    let err = cobra.predict_proba(&[10.0]).unwrap_err();
    assert!(matches!(
        err,
        CobraError::ProbabilityLengthMismatch { expected: 3, got: 2, .. }
    ));
}

#[test]
fn holdout_evaluation_is_accurate() {
    let ds = make_blobs(200, 1.0, 19);
    let (train, test) = ds.train_test_split(0.22, 42).unwrap();
    let cobra = fitted(CobraConfig::new(), &train);

    let eval = cobra.evaluate(test.features(), test.labels(), None).unwrap();
    assert_eq!(eval.n_samples, test.len());
    assert!(eval.accuracy > 0.95, "accuracy {}", eval.accuracy);
    assert_eq!(eval.machine_accuracy.len(), 4);
    assert!(eval.mean_selected > 0.0);
}
