use std::f64::consts::PI;

use tracing::{debug, instrument};

use crate::{
    MachineError,
    classifier::{Classifier, Learner, TrainingData, check_sample},
    linalg::{argmax, softmax_in_place},
};

/// Configuration for Gaussian naive Bayes.
///
/// Every per-class variance is inflated by `var_smoothing` times the largest
/// overall feature variance, with a floor of `1e-12`.
///
/// # Defaults
///
/// | Parameter       | Default |
/// |-----------------|---------|
/// | `var_smoothing` | 1e-9    |
#[derive(Debug, Clone)]
pub struct NaiveBayesConfig {
    var_smoothing: f64,
}

impl NaiveBayesConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            var_smoothing: 1e-9,
        }
    }

    /// Set the variance smoothing fraction.
    #[must_use]
    pub fn with_var_smoothing(mut self, var_smoothing: f64) -> Self {
        self.var_smoothing = var_smoothing;
        self
    }

    /// Estimate per-class priors, means and variances.
    ///
    /// A single present class is accepted; it then receives probability 1.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::InvalidParameter`] when `var_smoothing < 0`.
    #[instrument(skip_all, fields(n_samples = data.n_samples()))]
    pub fn fit(&self, data: &TrainingData<'_>) -> Result<NaiveBayes, MachineError> {
        if !(self.var_smoothing >= 0.0) {
            return Err(MachineError::InvalidParameter {
                machine: "naive_bayes",
                parameter: "var_smoothing",
                value: self.var_smoothing.to_string(),
                expected: "a value >= 0",
            });
        }
        let n_classes = data.n_classes();
        let n_features = data.n_features();
        let counts = data.class_counts();

        // Welford running moments per class.
        let mut means = vec![vec![0.0; n_features]; n_classes];
        let mut m2 = vec![vec![0.0; n_features]; n_classes];
        let mut seen = vec![0usize; n_classes];
        for (row, &label) in data.features().iter().zip(data.labels()) {
            seen[label] += 1;
            let k = seen[label] as f64;
            for (f, &v) in row.iter().enumerate() {
                let delta = v - means[label][f];
                means[label][f] += delta / k;
                m2[label][f] += delta * (v - means[label][f]);
            }
        }

        let epsilon = (self.var_smoothing * max_feature_variance(data.features())).max(1e-12);
        let variances: Vec<Vec<f64>> = m2
            .iter()
            .zip(&counts)
            .map(|(row, &n)| {
                let n = n.max(1) as f64;
                row.iter().map(|s| s / n + epsilon).collect()
            })
            .collect();

        let total = data.n_samples() as f64;
        let log_priors: Vec<f64> = counts
            .iter()
            .map(|&c| if c > 0 { (c as f64 / total).ln() } else { f64::NEG_INFINITY })
            .collect();

        debug!(epsilon = epsilon, n_classes = n_classes, "naive bayes fitted");
        Ok(NaiveBayes {
            log_priors,
            means,
            variances,
            n_features,
        })
    }
}

impl Default for NaiveBayesConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Learner for NaiveBayesConfig {
    type Model = NaiveBayes;

    fn name(&self) -> &str {
        "naive_bayes"
    }

    fn fit(&self, data: &TrainingData<'_>) -> Result<NaiveBayes, MachineError> {
        NaiveBayesConfig::fit(self, data)
    }
}

fn max_feature_variance(features: &[Vec<f64>]) -> f64 {
    let n = features.len() as f64;
    let n_features = features.first().map_or(0, Vec::len);
    (0..n_features)
        .map(|f| {
            let mean = features.iter().map(|r| r[f]).sum::<f64>() / n;
            features.iter().map(|r| (r[f] - mean) * (r[f] - mean)).sum::<f64>() / n
        })
        .fold(0.0, f64::max)
}

/// A fitted Gaussian naive Bayes classifier.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NaiveBayes {
    log_priors: Vec<f64>,
    means: Vec<Vec<f64>>,
    variances: Vec<Vec<f64>>,
    n_features: usize,
}

impl NaiveBayes {
    /// Unnormalized log posterior per class.
    fn joint_log_likelihood(&self, sample: &[f64]) -> Result<Vec<f64>, MachineError> {
        check_sample(sample, self.n_features)?;
        Ok(self
            .log_priors
            .iter()
            .zip(&self.means)
            .zip(&self.variances)
            .map(|((&prior, mean), var)| {
                if prior == f64::NEG_INFINITY {
                    return prior;
                }
                prior
                    + sample
                        .iter()
                        .zip(mean)
                        .zip(var)
                        .map(|((x, m), v)| -0.5 * ((x - m) * (x - m) / v + (2.0 * PI * v).ln()))
                        .sum::<f64>()
            })
            .collect())
    }
}

impl Classifier for NaiveBayes {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.log_priors.len()
    }

    fn predict(&self, sample: &[f64]) -> Result<usize, MachineError> {
        Ok(argmax(&self.joint_log_likelihood(sample)?))
    }

    fn predict_proba(&self, sample: &[f64]) -> Result<Vec<f64>, MachineError> {
        let mut p = self.joint_log_likelihood(sample)?;
        softmax_in_place(&mut p);
        Ok(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaussian_blobs() {
        let features = vec![
            vec![1.0, 1.1],
            vec![0.9, 1.0],
            vec![1.1, 0.9],
            vec![4.0, 4.1],
            vec![3.9, 4.0],
            vec![4.1, 3.9],
        ];
        let labels = vec![0, 0, 0, 1, 1, 1];
        let data = TrainingData::new(&features, &labels, 2).unwrap();
        let nb = NaiveBayesConfig::new().fit(&data).unwrap();
        assert_eq!(nb.predict(&[1.0, 1.0]).unwrap(), 0);
        assert_eq!(nb.predict(&[4.0, 4.0]).unwrap(), 1);
        let p = nb.predict_proba(&[1.0, 1.0]).unwrap();
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-10);
        assert!(p[0] > 0.99);
    }

    #[test]
    fn absent_class_gets_zero_probability() {
        let features = vec![vec![0.0], vec![0.2], vec![3.0], vec![3.2]];
        let data = TrainingData::new(&features, &[0, 0, 2, 2], 3).unwrap();
        let nb = NaiveBayesConfig::new().fit(&data).unwrap();
        let p = nb.predict_proba(&[1.5]).unwrap();
        assert_eq!(p[1], 0.0);
    }

    #[test]
    fn single_class_predicts_it() {
        let features = vec![vec![0.0], vec![1.0]];
        let data = TrainingData::new(&features, &[1, 1], 2).unwrap();
        let nb = NaiveBayesConfig::new().fit(&data).unwrap();
        assert_eq!(nb.predict(&[10.0]).unwrap(), 1);
        assert_eq!(nb.predict_proba(&[10.0]).unwrap(), vec![0.0, 1.0]);
    }
}
