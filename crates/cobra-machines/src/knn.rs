use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::{
    MachineError,
    classifier::{Classifier, Learner, TrainingData, check_sample},
    linalg::{argmax, squared_distance},
};

/// Distance used to rank neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DistanceMetric {
    /// Straight-line distance.
    Euclidean,
    /// Sum of absolute coordinate differences.
    Manhattan,
}

impl DistanceMetric {
    fn distance(self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            // Squared distance ranks identically and skips the sqrt.
            DistanceMetric::Euclidean => squared_distance(a, b),
            DistanceMetric::Manhattan => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
        }
    }
}

/// Configuration for a k-nearest-neighbors classifier.
///
/// # Defaults
///
/// | Parameter     | Default     |
/// |---------------|-------------|
/// | `n_neighbors` | 5           |
/// | `metric`      | `Euclidean` |
#[derive(Debug, Clone)]
pub struct KnnConfig {
    n_neighbors: usize,
    metric: DistanceMetric,
}

impl KnnConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            n_neighbors: 5,
            metric: DistanceMetric::Euclidean,
        }
    }

    /// Set the number of neighbors that vote.
    #[must_use]
    pub fn with_n_neighbors(mut self, n_neighbors: usize) -> Self {
        self.n_neighbors = n_neighbors;
        self
    }

    /// Set the distance metric.
    #[must_use]
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Return the number of neighbors.
    #[must_use]
    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    /// Store the training set.
    ///
    /// When fewer than `n_neighbors` samples are available every sample votes.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::InvalidParameter`] when `n_neighbors` is zero.
    #[instrument(skip_all, fields(n_samples = data.n_samples(), k = self.n_neighbors))]
    pub fn fit(&self, data: &TrainingData<'_>) -> Result<Knn, MachineError> {
        if self.n_neighbors == 0 {
            return Err(MachineError::InvalidParameter {
                machine: "knn",
                parameter: "n_neighbors",
                value: "0".to_owned(),
                expected: "at least 1",
            });
        }
        let k = self.n_neighbors.min(data.n_samples());
        debug!(effective_k = k, "knn stored training set");
        Ok(Knn {
            features: data.features().to_vec(),
            labels: data.labels().to_vec(),
            n_neighbors: k,
            metric: self.metric,
            n_features: data.n_features(),
            n_classes: data.n_classes(),
        })
    }
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Learner for KnnConfig {
    type Model = Knn;

    fn name(&self) -> &str {
        "knn"
    }

    fn fit(&self, data: &TrainingData<'_>) -> Result<Knn, MachineError> {
        KnnConfig::fit(self, data)
    }
}

/// A fitted k-nearest-neighbors classifier.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Knn {
    features: Vec<Vec<f64>>,
    labels: Vec<usize>,
    n_neighbors: usize,
    metric: DistanceMetric,
    n_features: usize,
    n_classes: usize,
}

impl Knn {
    /// Vote fractions of the `n_neighbors` closest training samples.
    ///
    /// Distance ties are broken by training order.
    fn votes(&self, sample: &[f64]) -> Result<Vec<f64>, MachineError> {
        check_sample(sample, self.n_features)?;
        let mut ranked: Vec<(f64, usize)> = self
            .features
            .iter()
            .enumerate()
            .map(|(i, row)| (self.metric.distance(sample, row), i))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut votes = vec![0.0; self.n_classes];
        for &(_, i) in &ranked[..self.n_neighbors] {
            votes[self.labels[i]] += 1.0;
        }
        let k = self.n_neighbors as f64;
        votes.iter_mut().for_each(|v| *v /= k);
        Ok(votes)
    }
}

impl Classifier for Knn {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict(&self, sample: &[f64]) -> Result<usize, MachineError> {
        Ok(argmax(&self.votes(sample)?))
    }

    fn predict_proba(&self, sample: &[f64]) -> Result<Vec<f64>, MachineError> {
        self.votes(sample)
    }

    fn predict_batch(&self, samples: &[Vec<f64>]) -> Result<Vec<usize>, MachineError> {
        samples.par_iter().map(|s| self.predict(s)).collect()
    }
}
