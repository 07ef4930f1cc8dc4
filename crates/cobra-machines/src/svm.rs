use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::{
    MachineError,
    classifier::{Classifier, Learner, TrainingData, check_sample},
    linalg::{argmax, squared_distance},
};

/// Largest training set the SVM accepts; the kernel matrix is `n²` floats.
pub const MAX_KERNEL_SAMPLES: usize = 5_000;

/// RBF kernel width.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Gamma {
    /// `1 / (n_features * var(X))` over all training values.
    Scale,
    /// A fixed positive value.
    Value(f64),
}

/// Configuration for an RBF-kernel support vector classifier trained with
/// simplified SMO.
///
/// Two present classes train a single binary problem; more train one
/// one-vs-rest problem per present class.
///
/// # Defaults
///
/// | Parameter    | Default |
/// |--------------|---------|
/// | `c`          | 1.0     |
/// | `gamma`      | `Scale` |
/// | `tol`        | 1e-3    |
/// | `max_passes` | 5       |
/// | `max_iter`   | 1000    |
/// | `seed`       | 42      |
#[derive(Debug, Clone)]
pub struct SvmConfig {
    c: f64,
    gamma: Gamma,
    tol: f64,
    max_passes: usize,
    max_iter: usize,
    seed: u64,
}

impl SvmConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            c: 1.0,
            gamma: Gamma::Scale,
            tol: 1e-3,
            max_passes: 5,
            max_iter: 1000,
            seed: 42,
        }
    }

    /// Set the box constraint.
    #[must_use]
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    /// Set the kernel width.
    #[must_use]
    pub fn with_gamma(mut self, gamma: Gamma) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set the KKT violation tolerance.
    #[must_use]
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set how many consecutive passes without an update end training.
    #[must_use]
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// Set the hard cap on full passes over the data.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the random seed for the second-multiplier choice.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> Result<(), MachineError> {
        let invalid = |parameter, value: f64, expected| MachineError::InvalidParameter {
            machine: "svm",
            parameter,
            value: value.to_string(),
            expected,
        };
        if !(self.c > 0.0 && self.c.is_finite()) {
            return Err(invalid("c", self.c, "a finite value > 0"));
        }
        if !(self.tol > 0.0) {
            return Err(invalid("tol", self.tol, "a value > 0"));
        }
        if let Gamma::Value(g) = self.gamma
            && !(g > 0.0 && g.is_finite())
        {
            return Err(invalid("gamma", g, "a finite value > 0"));
        }
        if self.max_passes == 0 {
            return Err(invalid("max_passes", 0.0, "at least 1"));
        }
        Ok(())
    }

    /// Train the classifier.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`MachineError::InvalidParameter`] | a hyperparameter is out of range |
    /// | [`MachineError::TooManySamples`] | more than [`MAX_KERNEL_SAMPLES`] samples |
    /// | [`MachineError::DegenerateTrainingData`] | fewer than two classes present |
    #[instrument(skip_all, fields(n_samples = data.n_samples()))]
    pub fn fit(&self, data: &TrainingData<'_>) -> Result<Svm, MachineError> {
        self.validate()?;
        let n = data.n_samples();
        if n > MAX_KERNEL_SAMPLES {
            return Err(MachineError::TooManySamples {
                machine: "svm",
                n_samples: n,
                limit: MAX_KERNEL_SAMPLES,
            });
        }
        let present = data.present_classes();
        if present.len() < 2 {
            return Err(MachineError::DegenerateTrainingData {
                machine: "svm",
                reason: format!("{} class present, need at least 2", present.len()),
            });
        }

        let gamma = match self.gamma {
            Gamma::Value(g) => g,
            Gamma::Scale => scale_gamma(data.features()),
        };
        let x = data.features();
        let kernel: Vec<Vec<f64>> = (0..n)
            .map(|i| (0..n).map(|j| rbf(gamma, &x[i], &x[j])).collect())
            .collect();

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        // Binary problems train only the higher label as the positive class.
        let positives: &[usize] = if present.len() == 2 {
            &present[1..]
        } else {
            &present
        };

        let mut used = vec![false; n];
        let mut raw = Vec::with_capacity(positives.len());
        for &class in positives {
            let y: Vec<f64> = data
                .labels()
                .iter()
                .map(|&l| if l == class { 1.0 } else { -1.0 })
                .collect();
            let (alphas, bias) = self.smo(&kernel, &y, &mut rng);
            let coefs: Vec<(usize, f64)> = alphas
                .iter()
                .enumerate()
                .filter(|&(_, &a)| a > 1e-8)
                .map(|(i, &a)| (i, a * y[i]))
                .collect();
            for &(i, _) in &coefs {
                used[i] = true;
            }
            raw.push((class, coefs, bias));
        }

        // Keep only rows that are support vectors of some sub-problem.
        let mut remap = vec![usize::MAX; n];
        let mut support_vectors = Vec::new();
        for (i, _) in used.iter().enumerate().filter(|&(_, &u)| u) {
            remap[i] = support_vectors.len();
            support_vectors.push(x[i].clone());
        }
        let machines: Vec<BinarySvm> = raw
            .into_iter()
            .map(|(class, coefs, bias)| BinarySvm {
                class,
                coefs: coefs.into_iter().map(|(i, c)| (remap[i], c)).collect(),
                bias,
            })
            .collect();

        debug!(
            gamma = gamma,
            n_problems = machines.len(),
            n_support = support_vectors.len(),
            "svm trained"
        );

        Ok(Svm {
            support_vectors,
            machines,
            negative: (present.len() == 2).then_some(present[0]),
            gamma,
            n_features: data.n_features(),
            n_classes: data.n_classes(),
        })
    }

    /// Simplified SMO on a precomputed kernel. Returns `(alphas, bias)`.
    fn smo(&self, kernel: &[Vec<f64>], y: &[f64], rng: &mut ChaCha8Rng) -> (Vec<f64>, f64) {
        let n = y.len();
        let c = self.c;
        let mut alphas = vec![0.0; n];
        let mut bias = 0.0;

        let output = |alphas: &[f64], bias: f64, i: usize| -> f64 {
            alphas
                .iter()
                .zip(y)
                .zip(&kernel[i])
                .filter(|((a, _), _)| **a > 0.0)
                .map(|((a, yj), k)| a * yj * k)
                .sum::<f64>()
                + bias
        };

        let mut passes = 0;
        let mut iter = 0;
        while passes < self.max_passes && iter < self.max_iter {
            let mut changed = 0;
            for i in 0..n {
                let e_i = output(&alphas, bias, i) - y[i];
                let violates = (y[i] * e_i < -self.tol && alphas[i] < c)
                    || (y[i] * e_i > self.tol && alphas[i] > 0.0);
                if !violates {
                    continue;
                }

                let mut j = rng.gen_range(0..n - 1);
                if j >= i {
                    j += 1;
                }
                let e_j = output(&alphas, bias, j) - y[j];
                let (ai_old, aj_old) = (alphas[i], alphas[j]);

                let (lo, hi) = if y[i] == y[j] {
                    ((ai_old + aj_old - c).max(0.0), (ai_old + aj_old).min(c))
                } else {
                    ((aj_old - ai_old).max(0.0), (c + aj_old - ai_old).min(c))
                };
                if hi - lo < 1e-12 {
                    continue;
                }

                let eta = 2.0 * kernel[i][j] - kernel[i][i] - kernel[j][j];
                if eta >= 0.0 {
                    continue;
                }

                alphas[j] = (aj_old - y[j] * (e_i - e_j) / eta).max(lo).min(hi);
                if (alphas[j] - aj_old).abs() < 1e-5 {
                    continue;
                }
                alphas[i] = ai_old + y[i] * y[j] * (aj_old - alphas[j]);

                let di = y[i] * (alphas[i] - ai_old);
                let dj = y[j] * (alphas[j] - aj_old);
                let b1 = bias - e_i - di * kernel[i][i] - dj * kernel[i][j];
                let b2 = bias - e_j - di * kernel[i][j] - dj * kernel[j][j];
                bias = if alphas[i] > 0.0 && alphas[i] < c {
                    b1
                } else if alphas[j] > 0.0 && alphas[j] < c {
                    b2
                } else {
                    (b1 + b2) / 2.0
                };
                changed += 1;
            }
            iter += 1;
            passes = if changed == 0 { passes + 1 } else { 0 };
        }
        (alphas, bias)
    }
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Learner for SvmConfig {
    type Model = Svm;

    fn name(&self) -> &str {
        "svm"
    }

    fn fit(&self, data: &TrainingData<'_>) -> Result<Svm, MachineError> {
        SvmConfig::fit(self, data)
    }
}

fn rbf(gamma: f64, a: &[f64], b: &[f64]) -> f64 {
    (-gamma * squared_distance(a, b)).exp()
}

fn scale_gamma(features: &[Vec<f64>]) -> f64 {
    let count = features.iter().map(Vec::len).sum::<usize>() as f64;
    let n_features = features.first().map_or(1, Vec::len) as f64;
    let mean = features.iter().flatten().sum::<f64>() / count;
    let var = features.iter().flatten().map(|v| (v - mean) * (v - mean)).sum::<f64>() / count;
    if var > 1e-12 { 1.0 / (n_features * var) } else { 1.0 }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct BinarySvm {
    /// Positive class of this sub-problem.
    class: usize,
    /// `(support vector index, alpha * y)`.
    coefs: Vec<(usize, f64)>,
    bias: f64,
}

/// A fitted RBF support vector classifier.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Svm {
    support_vectors: Vec<Vec<f64>>,
    machines: Vec<BinarySvm>,
    /// Negative class when exactly two classes were present.
    negative: Option<usize>,
    gamma: f64,
    n_features: usize,
    n_classes: usize,
}

impl Svm {
    /// Return the number of stored support vectors.
    #[must_use]
    pub fn n_support(&self) -> usize {
        self.support_vectors.len()
    }

    /// Return the kernel width in use.
    #[must_use]
    pub fn gamma(&self) -> f64 {
        self.gamma
    }
}

impl Classifier for Svm {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict(&self, sample: &[f64]) -> Result<usize, MachineError> {
        Ok(argmax(&self.decision_function(sample)?))
    }

    /// Signed margins per class. Classes absent from training score
    /// `f64::NEG_INFINITY`. A binary model reports `+f` for the positive
    /// class and `-f` for the negative one.
    fn decision_function(&self, sample: &[f64]) -> Result<Vec<f64>, MachineError> {
        check_sample(sample, self.n_features)?;
        let kernel: Vec<f64> = self
            .support_vectors
            .iter()
            .map(|sv| rbf(self.gamma, sample, sv))
            .collect();

        let mut scores = vec![f64::NEG_INFINITY; self.n_classes];
        for m in &self.machines {
            let f = m.coefs.iter().map(|&(i, c)| c * kernel[i]).sum::<f64>() + m.bias;
            scores[m.class] = f;
            if let Some(negative) = self.negative {
                scores[negative] = -f;
            }
        }
        Ok(scores)
    }
}
