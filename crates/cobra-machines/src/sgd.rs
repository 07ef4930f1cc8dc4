use rand::{SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::{
    MachineError,
    classifier::{Classifier, Learner, TrainingData, check_sample},
    linalg::{Standardizer, argmax, dot},
};

/// Per-sample loss optimized by [`SgdConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SgdLoss {
    /// Linear SVM: `max(0, 1 - y·f)`.
    Hinge,
    /// Logistic regression: `ln(1 + exp(-y·f))`. Enables `predict_proba`.
    Log,
}

/// Configuration for a linear classifier trained by stochastic gradient
/// descent with an inverse-scaling learning rate `eta0 / (t + 1)^power_t`.
///
/// Inputs are standardized before training. Two present classes train a
/// single binary problem; more train one-vs-rest.
///
/// # Defaults
///
/// | Parameter          | Default |
/// |--------------------|---------|
/// | `loss`             | `Hinge` |
/// | `alpha`            | 1e-4    |
/// | `eta0`             | 0.01    |
/// | `power_t`          | 0.25    |
/// | `max_iter`         | 1000    |
/// | `tol`              | 1e-3    |
/// | `n_iter_no_change` | 5       |
/// | `seed`             | 42      |
#[derive(Debug, Clone)]
pub struct SgdConfig {
    loss: SgdLoss,
    alpha: f64,
    eta0: f64,
    power_t: f64,
    max_iter: usize,
    tol: f64,
    n_iter_no_change: usize,
    seed: u64,
}

impl SgdConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            loss: SgdLoss::Hinge,
            alpha: 1e-4,
            eta0: 0.01,
            power_t: 0.25,
            max_iter: 1000,
            tol: 1e-3,
            n_iter_no_change: 5,
            seed: 42,
        }
    }

    /// Set the loss.
    #[must_use]
    pub fn with_loss(mut self, loss: SgdLoss) -> Self {
        self.loss = loss;
        self
    }

    /// Set the L2 penalty strength.
    #[must_use]
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set the initial learning rate.
    #[must_use]
    pub fn with_eta0(mut self, eta0: f64) -> Self {
        self.eta0 = eta0;
        self
    }

    /// Set the maximum number of epochs.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the random seed for epoch shuffling.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the loss.
    #[must_use]
    pub fn loss(&self) -> SgdLoss {
        self.loss
    }

    /// Train the classifier.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`MachineError::InvalidParameter`] | `eta0 <= 0`, `alpha < 0` or `max_iter == 0` |
    /// | [`MachineError::DegenerateTrainingData`] | fewer than two classes present |
    #[instrument(skip_all, fields(n_samples = data.n_samples(), loss = ?self.loss))]
    pub fn fit(&self, data: &TrainingData<'_>) -> Result<Sgd, MachineError> {
        if !(self.eta0 > 0.0) {
            return Err(MachineError::InvalidParameter {
                machine: "sgd",
                parameter: "eta0",
                value: self.eta0.to_string(),
                expected: "a value > 0",
            });
        }
        if !(self.alpha >= 0.0) {
            return Err(MachineError::InvalidParameter {
                machine: "sgd",
                parameter: "alpha",
                value: self.alpha.to_string(),
                expected: "a value >= 0",
            });
        }
        if self.max_iter == 0 {
            return Err(MachineError::InvalidParameter {
                machine: "sgd",
                parameter: "max_iter",
                value: "0".to_owned(),
                expected: "at least 1",
            });
        }
        let present = data.present_classes();
        if present.len() < 2 {
            return Err(MachineError::DegenerateTrainingData {
                machine: "sgd",
                reason: format!("{} class present, need at least 2", present.len()),
            });
        }

        let scaler = Standardizer::fit(data.features());
        let x = scaler.transform_all(data.features());
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let positives: &[usize] = if present.len() == 2 {
            &present[1..]
        } else {
            &present
        };
        let mut planes = Vec::with_capacity(positives.len());
        for &class in positives {
            let y: Vec<f64> = data
                .labels()
                .iter()
                .map(|&l| if l == class { 1.0 } else { -1.0 })
                .collect();
            let (weights, bias, epochs) = self.train_binary(&x, &y, &mut rng);
            debug!(class = class, epochs = epochs, "sgd sub-problem converged");
            planes.push(Hyperplane {
                class,
                weights,
                bias,
            });
        }

        Ok(Sgd {
            scaler,
            planes,
            negative: (present.len() == 2).then_some(present[0]),
            loss: self.loss,
            n_features: data.n_features(),
            n_classes: data.n_classes(),
        })
    }

    /// Returns `(weights, bias, epochs_run)`.
    fn train_binary(&self, x: &[Vec<f64>], y: &[f64], rng: &mut ChaCha8Rng) -> (Vec<f64>, f64, usize) {
        let n_features = x[0].len();
        let mut w = vec![0.0; n_features];
        let mut b = 0.0;
        let mut order: Vec<usize> = (0..x.len()).collect();
        let mut t = 0usize;
        let mut best_loss = f64::INFINITY;
        let mut stale = 0usize;
        let mut epochs = 0usize;

        for _ in 0..self.max_iter {
            epochs += 1;
            order.shuffle(rng);
            let mut epoch_loss = 0.0;
            for &i in &order {
                let lr = self.eta0 / ((t + 1) as f64).powf(self.power_t);
                t += 1;

                let margin = y[i] * (dot(&w, &x[i]) + b);
                // d(loss)/d(f), scaled by y.
                let grad = match self.loss {
                    SgdLoss::Hinge => {
                        epoch_loss += (1.0 - margin).max(0.0);
                        if margin < 1.0 { -y[i] } else { 0.0 }
                    }
                    SgdLoss::Log => {
                        epoch_loss += (-margin).exp().ln_1p();
                        -y[i] / (1.0 + margin.exp())
                    }
                };

                for (wj, xj) in w.iter_mut().zip(&x[i]) {
                    *wj -= lr * (grad * xj + self.alpha * *wj);
                }
                b -= lr * grad;
            }
            epoch_loss /= x.len() as f64;

            if epoch_loss > best_loss - self.tol {
                stale += 1;
                if stale >= self.n_iter_no_change {
                    break;
                }
            } else {
                stale = 0;
            }
            best_loss = best_loss.min(epoch_loss);
        }
        (w, b, epochs)
    }
}

impl Default for SgdConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Learner for SgdConfig {
    type Model = Sgd;

    fn name(&self) -> &str {
        "sgd"
    }

    fn fit(&self, data: &TrainingData<'_>) -> Result<Sgd, MachineError> {
        SgdConfig::fit(self, data)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Hyperplane {
    class: usize,
    weights: Vec<f64>,
    bias: f64,
}

/// A fitted SGD linear classifier.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Sgd {
    scaler: Standardizer,
    planes: Vec<Hyperplane>,
    negative: Option<usize>,
    loss: SgdLoss,
    n_features: usize,
    n_classes: usize,
}

impl Classifier for Sgd {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict(&self, sample: &[f64]) -> Result<usize, MachineError> {
        Ok(argmax(&self.decision_function(sample)?))
    }

    /// One-vs-rest sigmoid scores, renormalized. Only for [`SgdLoss::Log`].
    fn predict_proba(&self, sample: &[f64]) -> Result<Vec<f64>, MachineError> {
        if self.loss != SgdLoss::Log {
            return Err(MachineError::Unsupported {
                capability: crate::Capability::Probabilities,
            });
        }
        let mut proba: Vec<f64> = self
            .decision_function(sample)?
            .into_iter()
            .map(|f| 1.0 / (1.0 + (-f).exp()))
            .collect();
        let sum: f64 = proba.iter().sum();
        if sum > 0.0 {
            proba.iter_mut().for_each(|p| *p /= sum);
        }
        Ok(proba)
    }

    /// Signed distances per class; absent classes score `f64::NEG_INFINITY`.
    fn decision_function(&self, sample: &[f64]) -> Result<Vec<f64>, MachineError> {
        check_sample(sample, self.n_features)?;
        let z = self.scaler.transform(sample);
        let mut scores = vec![f64::NEG_INFINITY; self.n_classes];
        for plane in &self.planes {
            let f = dot(&plane.weights, &z) + plane.bias;
            scores[plane.class] = f;
            if let Some(negative) = self.negative {
                scores[negative] = -f;
            }
        }
        Ok(scores)
    }
}
