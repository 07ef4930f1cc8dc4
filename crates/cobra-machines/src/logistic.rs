use tracing::{debug, instrument};

use crate::{
    MachineError,
    classifier::{Classifier, Learner, TrainingData, check_sample},
    linalg::{Standardizer, argmax, dot, softmax_in_place},
};

/// Configuration for multinomial logistic regression trained by full-batch
/// gradient descent on standardized inputs.
///
/// # Defaults
///
/// | Parameter       | Default |
/// |-----------------|---------|
/// | `learning_rate` | 0.5     |
/// | `l2`            | 1e-4    |
/// | `max_iter`      | 500     |
/// | `tol`           | 1e-6    |
#[derive(Debug, Clone)]
pub struct LogisticConfig {
    learning_rate: f64,
    l2: f64,
    max_iter: usize,
    tol: f64,
}

impl LogisticConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            learning_rate: 0.5,
            l2: 1e-4,
            max_iter: 500,
            tol: 1e-6,
        }
    }

    /// Set the gradient step size.
    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the L2 penalty on the weights.
    #[must_use]
    pub fn with_l2(mut self, l2: f64) -> Self {
        self.l2 = l2;
        self
    }

    /// Set the maximum number of gradient steps.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Train the classifier.
    ///
    /// Stops early once the mean cross-entropy improves by less than `tol`.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`MachineError::InvalidParameter`] | `learning_rate <= 0` or `l2 < 0` |
    /// | [`MachineError::DegenerateTrainingData`] | fewer than two classes present |
    #[instrument(skip_all, fields(n_samples = data.n_samples()))]
    pub fn fit(&self, data: &TrainingData<'_>) -> Result<Logistic, MachineError> {
        if !(self.learning_rate > 0.0) {
            return Err(MachineError::InvalidParameter {
                machine: "logreg",
                parameter: "learning_rate",
                value: self.learning_rate.to_string(),
                expected: "a value > 0",
            });
        }
        if !(self.l2 >= 0.0) {
            return Err(MachineError::InvalidParameter {
                machine: "logreg",
                parameter: "l2",
                value: self.l2.to_string(),
                expected: "a value >= 0",
            });
        }
        let present = data.present_classes();
        if present.len() < 2 {
            return Err(MachineError::DegenerateTrainingData {
                machine: "logreg",
                reason: format!("{} class present, need at least 2", present.len()),
            });
        }

        let n_classes = data.n_classes();
        let n_features = data.n_features();
        let scaler = Standardizer::fit(data.features());
        let x = scaler.transform_all(data.features());
        let labels = data.labels();
        let n = x.len() as f64;

        let mut active = vec![false; n_classes];
        for &c in &present {
            active[c] = true;
        }

        let mut weights = vec![vec![0.0; n_features]; n_classes];
        let mut biases = vec![0.0; n_classes];
        let mut previous = f64::INFINITY;
        let mut iterations = 0;

        for _ in 0..self.max_iter {
            iterations += 1;
            let mut grad_w = vec![vec![0.0; n_features]; n_classes];
            let mut grad_b = vec![0.0; n_classes];
            let mut loss = 0.0;

            for (row, &label) in x.iter().zip(labels) {
                let mut p = logits(&weights, &biases, &active, row);
                softmax_in_place(&mut p);
                loss -= p[label].max(1e-15).ln();
                for c in present.iter().copied() {
                    let err = p[c] - if c == label { 1.0 } else { 0.0 };
                    grad_b[c] += err;
                    for (g, v) in grad_w[c].iter_mut().zip(row) {
                        *g += err * v;
                    }
                }
            }

            for c in present.iter().copied() {
                for (w, g) in weights[c].iter_mut().zip(&grad_w[c]) {
                    *w -= self.learning_rate * (g / n + self.l2 * *w);
                }
                biases[c] -= self.learning_rate * grad_b[c] / n;
            }

            loss /= n;
            if (previous - loss).abs() < self.tol {
                break;
            }
            previous = loss;
        }
        debug!(iterations = iterations, loss = previous, "logistic regression trained");

        Ok(Logistic {
            scaler,
            weights,
            biases,
            active,
            n_features,
        })
    }
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Learner for LogisticConfig {
    type Model = Logistic;

    fn name(&self) -> &str {
        "logreg"
    }

    fn fit(&self, data: &TrainingData<'_>) -> Result<Logistic, MachineError> {
        LogisticConfig::fit(self, data)
    }
}

fn logits(weights: &[Vec<f64>], biases: &[f64], active: &[bool], row: &[f64]) -> Vec<f64> {
    weights
        .iter()
        .zip(biases)
        .zip(active)
        .map(|((w, b), &on)| if on { dot(w, row) + b } else { f64::NEG_INFINITY })
        .collect()
}

/// A fitted multinomial logistic regression.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Logistic {
    scaler: Standardizer,
    weights: Vec<Vec<f64>>,
    biases: Vec<f64>,
    /// Classes seen during training.
    active: Vec<bool>,
    n_features: usize,
}

impl Classifier for Logistic {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.biases.len()
    }

    fn predict(&self, sample: &[f64]) -> Result<usize, MachineError> {
        Ok(argmax(&self.decision_function(sample)?))
    }

    fn predict_proba(&self, sample: &[f64]) -> Result<Vec<f64>, MachineError> {
        let mut p = self.decision_function(sample)?;
        softmax_in_place(&mut p);
        Ok(p)
    }

    /// Raw logits; absent classes score `f64::NEG_INFINITY`.
    fn decision_function(&self, sample: &[f64]) -> Result<Vec<f64>, MachineError> {
        check_sample(sample, self.n_features)?;
        let z = self.scaler.transform(sample);
        Ok(logits(&self.weights, &self.biases, &self.active, &z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_blobs() -> (Vec<Vec<f64>>, Vec<usize>) {
        let centers = [(0.0, 0.0), (5.0, 0.0), (0.0, 5.0)];
        let offsets = [(0.3, 0.1), (-0.2, 0.3), (0.1, -0.3), (-0.3, -0.2)];
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for (class, (cx, cy)) in centers.iter().enumerate() {
            for (dx, dy) in offsets {
                features.push(vec![cx + dx, cy + dy]);
                labels.push(class);
            }
        }
        (features, labels)
    }

    #[test]
    fn separates_three_blobs() {
        let (features, labels) = three_blobs();
        let data = TrainingData::new(&features, &labels, 3).unwrap();
        let model = LogisticConfig::new().fit(&data).unwrap();
        for (sample, &label) in features.iter().zip(&labels) {
            assert_eq!(model.predict(sample).unwrap(), label);
        }
    }

    #[test]
    fn proba_sums_to_one_and_masks_absent() {
        let (features, labels) = three_blobs();
        let data = TrainingData::new(&features, &labels, 4).unwrap();
        let model = LogisticConfig::new().fit(&data).unwrap();
        let p = model.predict_proba(&[4.8, 0.2]).unwrap();
        assert_eq!(p.len(), 4);
        assert_eq!(p[3], 0.0);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-10);
        assert_eq!(argmax(&p), 1);
    }

    #[test]
    fn single_class_is_degenerate() {
        let features = vec![vec![0.0], vec![1.0]];
        let data = TrainingData::new(&features, &[0, 0], 2).unwrap();
        assert!(matches!(
            LogisticConfig::new().fit(&data),
            Err(MachineError::DegenerateTrainingData { machine: "logreg", .. })
        ));
    }
}
