use tracing::{debug, instrument};

use crate::{
    MachineError,
    classifier::{Classifier, Learner, TrainingData, check_sample},
    linalg::{argmax, dot, invert, softmax_in_place},
};

/// Configuration for linear discriminant analysis with a pooled covariance.
///
/// `shrinkage` blends the pooled covariance toward a scaled identity:
/// `(1 - s) Σ + s (tr(Σ) / p) I`.
///
/// # Defaults
///
/// | Parameter   | Default |
/// |-------------|---------|
/// | `shrinkage` | 0.0     |
#[derive(Debug, Clone)]
pub struct LdaConfig {
    shrinkage: f64,
}

impl LdaConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self { shrinkage: 0.0 }
    }

    /// Set the covariance shrinkage in `[0, 1]`.
    #[must_use]
    pub fn with_shrinkage(mut self, shrinkage: f64) -> Self {
        self.shrinkage = shrinkage;
        self
    }

    /// Fit class means, priors and the shared covariance.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`MachineError::InvalidParameter`] | `shrinkage` outside `[0, 1]` |
    /// | [`MachineError::DegenerateTrainingData`] | fewer than two classes, or a singular covariance |
    #[instrument(skip_all, fields(n_samples = data.n_samples()))]
    pub fn fit(&self, data: &TrainingData<'_>) -> Result<Lda, MachineError> {
        if !(0.0..=1.0).contains(&self.shrinkage) {
            return Err(MachineError::InvalidParameter {
                machine: "lda",
                parameter: "shrinkage",
                value: self.shrinkage.to_string(),
                expected: "a value in [0, 1]",
            });
        }
        let present = data.present_classes();
        if present.len() < 2 {
            return Err(MachineError::DegenerateTrainingData {
                machine: "lda",
                reason: format!("{} class present, need at least 2", present.len()),
            });
        }

        let n_classes = data.n_classes();
        let p = data.n_features();
        let counts = data.class_counts();

        let mut means = vec![vec![0.0; p]; n_classes];
        for (row, &label) in data.features().iter().zip(data.labels()) {
            for (m, v) in means[label].iter_mut().zip(row) {
                *m += v;
            }
        }
        for (mean, &count) in means.iter_mut().zip(&counts) {
            if count > 0 {
                mean.iter_mut().for_each(|m| *m /= count as f64);
            }
        }

        let mut cov = vec![vec![0.0; p]; p];
        for (row, &label) in data.features().iter().zip(data.labels()) {
            let centered: Vec<f64> = row.iter().zip(&means[label]).map(|(v, m)| v - m).collect();
            for i in 0..p {
                for j in 0..p {
                    cov[i][j] += centered[i] * centered[j];
                }
            }
        }
        let n = data.n_samples();
        let dof = if n > present.len() { n - present.len() } else { n } as f64;
        cov.iter_mut().flatten().for_each(|c| *c /= dof);

        if self.shrinkage > 0.0 {
            let mu = (0..p).map(|i| cov[i][i]).sum::<f64>() / p as f64;
            for i in 0..p {
                for j in 0..p {
                    cov[i][j] *= 1.0 - self.shrinkage;
                }
                cov[i][i] += self.shrinkage * mu;
            }
        }

        let precision = invert(&cov).ok_or_else(|| MachineError::DegenerateTrainingData {
            machine: "lda",
            reason: "singular within-class covariance".to_owned(),
        })?;

        let total = n as f64;
        let mut coefs = Vec::with_capacity(n_classes);
        let mut intercepts = Vec::with_capacity(n_classes);
        for (mean, &count) in means.iter().zip(&counts) {
            if count == 0 {
                coefs.push(vec![0.0; p]);
                intercepts.push(f64::NEG_INFINITY);
                continue;
            }
            let coef: Vec<f64> = precision.iter().map(|row| dot(row, mean)).collect();
            intercepts.push(-0.5 * dot(&coef, mean) + (count as f64 / total).ln());
            coefs.push(coef);
        }

        debug!(n_classes = present.len(), shrinkage = self.shrinkage, "lda fitted");
        Ok(Lda {
            coefs,
            intercepts,
            n_features: p,
        })
    }
}

impl Default for LdaConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Learner for LdaConfig {
    type Model = Lda;

    fn name(&self) -> &str {
        "lda"
    }

    fn fit(&self, data: &TrainingData<'_>) -> Result<Lda, MachineError> {
        LdaConfig::fit(self, data)
    }
}

/// A fitted linear discriminant classifier.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Lda {
    coefs: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
    n_features: usize,
}

impl Classifier for Lda {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.intercepts.len()
    }

    fn predict(&self, sample: &[f64]) -> Result<usize, MachineError> {
        Ok(argmax(&self.decision_function(sample)?))
    }

    fn predict_proba(&self, sample: &[f64]) -> Result<Vec<f64>, MachineError> {
        let mut p = self.decision_function(sample)?;
        softmax_in_place(&mut p);
        Ok(p)
    }

    /// Linear discriminant scores; absent classes score `f64::NEG_INFINITY`.
    fn decision_function(&self, sample: &[f64]) -> Result<Vec<f64>, MachineError> {
        check_sample(sample, self.n_features)?;
        Ok(self
            .coefs
            .iter()
            .zip(&self.intercepts)
            .map(|(coef, &b)| {
                if b == f64::NEG_INFINITY {
                    b
                } else {
                    dot(coef, sample) + b
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> (Vec<Vec<f64>>, Vec<usize>) {
        let features = vec![
            vec![1.0, 2.0],
            vec![2.0, 1.0],
            vec![1.5, 1.2],
            vec![1.2, 1.7],
            vec![6.0, 5.0],
            vec![5.0, 6.0],
            vec![5.5, 5.8],
            vec![5.8, 5.3],
        ];
        (features, vec![0, 0, 0, 0, 1, 1, 1, 1])
    }

    #[test]
    fn separates_blobs() {
        let (features, labels) = blobs();
        let data = TrainingData::new(&features, &labels, 2).unwrap();
        let lda = LdaConfig::new().fit(&data).unwrap();
        for (sample, &label) in features.iter().zip(&labels) {
            assert_eq!(lda.predict(sample).unwrap(), label);
        }
        let p = lda.predict_proba(&[1.5, 1.5]).unwrap();
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-10);
        assert!(p[0] > 0.5);
    }

    #[test]
    fn collinear_features_are_singular_without_shrinkage() {
        let features: Vec<Vec<f64>> = (0..6).map(|i| vec![i as f64, 2.0 * i as f64]).collect();
        let labels = vec![0, 0, 0, 1, 1, 1];
        let data = TrainingData::new(&features, &labels, 2).unwrap();
        assert!(matches!(
            LdaConfig::new().fit(&data),
            Err(MachineError::DegenerateTrainingData { machine: "lda", .. })
        ));
        let lda = LdaConfig::new().with_shrinkage(0.1).fit(&data).unwrap();
        assert_eq!(lda.predict(&[0.0, 0.0]).unwrap(), 0);
        assert_eq!(lda.predict(&[5.0, 10.0]).unwrap(), 1);
    }

    #[test]
    fn absent_class_masked() {
        let (features, labels) = blobs();
        let data = TrainingData::new(&features, &labels, 3).unwrap();
        let lda = LdaConfig::new().fit(&data).unwrap();
        assert_eq!(lda.decision_function(&[1.0, 1.0]).unwrap()[2], f64::NEG_INFINITY);
        assert_eq!(lda.predict_proba(&[1.0, 1.0]).unwrap()[2], 0.0);
    }
}
