//! Capability traits shared by every base classifier.

use crate::error::{Capability, MachineError};

/// A fitted classifier.
///
/// `predict` is mandatory. `predict_proba` and `decision_function` are
/// optional capabilities; the default implementations return
/// [`MachineError::Unsupported`], which callers treat as "skip this machine".
///
/// Class labels are zero-based indices. Probability and margin vectors always
/// have length [`Classifier::n_classes`] so that outputs of different machines
/// line up index by index.
pub trait Classifier: Send + Sync {
    /// Number of feature columns the classifier was trained on.
    fn n_features(&self) -> usize;

    /// Number of classes in the label space.
    fn n_classes(&self) -> usize;

    /// Predict the class label for a single sample.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::PredictionFeatureMismatch`] when
    /// `sample.len() != n_features`.
    fn predict(&self, sample: &[f64]) -> Result<usize, MachineError>;

    /// Return the class probability distribution for a single sample.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Unsupported`] unless overridden.
    fn predict_proba(&self, _sample: &[f64]) -> Result<Vec<f64>, MachineError> {
        Err(MachineError::Unsupported {
            capability: Capability::Probabilities,
        })
    }

    /// Return per-class decision margins for a single sample.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Unsupported`] unless overridden.
    fn decision_function(&self, _sample: &[f64]) -> Result<Vec<f64>, MachineError> {
        Err(MachineError::Unsupported {
            capability: Capability::DecisionFunction,
        })
    }

    /// Predict class labels for a batch of samples.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by [`Classifier::predict`].
    fn predict_batch(&self, samples: &[Vec<f64>]) -> Result<Vec<usize>, MachineError> {
        samples.iter().map(|s| self.predict(s)).collect()
    }
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn n_features(&self) -> usize {
        (**self).n_features()
    }

    fn n_classes(&self) -> usize {
        (**self).n_classes()
    }

    fn predict(&self, sample: &[f64]) -> Result<usize, MachineError> {
        (**self).predict(sample)
    }

    fn predict_proba(&self, sample: &[f64]) -> Result<Vec<f64>, MachineError> {
        (**self).predict_proba(sample)
    }

    fn decision_function(&self, sample: &[f64]) -> Result<Vec<f64>, MachineError> {
        (**self).decision_function(sample)
    }

    fn predict_batch(&self, samples: &[Vec<f64>]) -> Result<Vec<usize>, MachineError> {
        (**self).predict_batch(samples)
    }
}

/// An unfitted classifier configuration that can be trained into a model.
pub trait Learner {
    /// The fitted model type.
    type Model: Classifier;

    /// Short registry name, e.g. `"tree"` or `"knn"`.
    fn name(&self) -> &str;

    /// Fit a model on validated training data.
    ///
    /// # Errors
    ///
    /// Implementations return [`MachineError`] when hyperparameters are
    /// invalid or the data cannot support the model.
    fn fit(&self, data: &TrainingData<'_>) -> Result<Self::Model, MachineError>;
}

/// A validated, borrowed view over a labeled training set.
///
/// `features[sample_idx][feature_idx]` in row-major layout, `labels[sample_idx]`
/// zero-based and strictly below `n_classes`.
#[derive(Debug, Clone, Copy)]
pub struct TrainingData<'a> {
    features: &'a [Vec<f64>],
    labels: &'a [usize],
    n_classes: usize,
    n_features: usize,
}

impl<'a> TrainingData<'a> {
    /// Validate and wrap a training set.
    ///
    /// `n_classes` fixes the width of probability and margin outputs; it may
    /// exceed the number of classes actually present in `labels`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`MachineError::EmptyDataset`] | `features` is empty |
    /// | [`MachineError::ZeroFeatures`] | rows have zero feature columns |
    /// | [`MachineError::LabelCountMismatch`] | `labels.len() != features.len()` |
    /// | [`MachineError::FeatureCountMismatch`] | rows have inconsistent lengths |
    /// | [`MachineError::NonFiniteValue`] | any value is NaN or infinite |
    /// | [`MachineError::LabelOutOfRange`] | a label is `>= n_classes` |
    pub fn new(
        features: &'a [Vec<f64>],
        labels: &'a [usize],
        n_classes: usize,
    ) -> Result<Self, MachineError> {
        if features.is_empty() {
            return Err(MachineError::EmptyDataset);
        }
        let n_features = features[0].len();
        if n_features == 0 {
            return Err(MachineError::ZeroFeatures);
        }
        if labels.len() != features.len() {
            return Err(MachineError::LabelCountMismatch {
                n_samples: features.len(),
                n_labels: labels.len(),
            });
        }
        for (sample_index, row) in features.iter().enumerate() {
            if row.len() != n_features {
                return Err(MachineError::FeatureCountMismatch {
                    expected: n_features,
                    got: row.len(),
                    sample_index,
                });
            }
            if let Some(feature_index) = row.iter().position(|v| !v.is_finite()) {
                return Err(MachineError::NonFiniteValue {
                    sample_index,
                    feature_index,
                });
            }
        }
        if let Some((sample_index, &label)) =
            labels.iter().enumerate().find(|&(_, &l)| l >= n_classes)
        {
            return Err(MachineError::LabelOutOfRange {
                label,
                n_classes,
                sample_index,
            });
        }
        Ok(Self {
            features,
            labels,
            n_classes,
            n_features,
        })
    }

    /// Return the feature rows.
    #[must_use]
    pub fn features(&self) -> &'a [Vec<f64>] {
        self.features
    }

    /// Return the labels.
    #[must_use]
    pub fn labels(&self) -> &'a [usize] {
        self.labels
    }

    /// Return the declared number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the number of samples.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.features.len()
    }

    /// Count samples per class, indexed by label.
    #[must_use]
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &label in self.labels {
            counts[label] += 1;
        }
        counts
    }

    /// Labels that occur at least once, in ascending order.
    #[must_use]
    pub fn present_classes(&self) -> Vec<usize> {
        self.class_counts()
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c > 0)
            .map(|(class, _)| class)
            .collect()
    }
}

/// Reject a query whose length does not match the training width.
pub(crate) fn check_sample(sample: &[f64], n_features: usize) -> Result<(), MachineError> {
    if sample.len() != n_features {
        return Err(MachineError::PredictionFeatureMismatch {
            expected: n_features,
            got: sample.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty() {
        let err = TrainingData::new(&[], &[], 2).unwrap_err();
        assert!(matches!(err, MachineError::EmptyDataset));
    }

    #[test]
    fn rejects_label_out_of_range() {
        let features = vec![vec![1.0], vec![2.0]];
        let err = TrainingData::new(&features, &[0, 2], 2).unwrap_err();
        assert!(matches!(
            err,
            MachineError::LabelOutOfRange { label: 2, sample_index: 1, .. }
        ));
    }

    #[test]
    fn rejects_ragged_rows() {
        let features = vec![vec![1.0, 2.0], vec![2.0]];
        let err = TrainingData::new(&features, &[0, 1], 2).unwrap_err();
        assert!(matches!(err, MachineError::FeatureCountMismatch { .. }));
    }

    #[test]
    fn rejects_nan() {
        let features = vec![vec![1.0, f64::NAN]];
        let err = TrainingData::new(&features, &[0], 1).unwrap_err();
        assert!(matches!(
            err,
            MachineError::NonFiniteValue { sample_index: 0, feature_index: 1 }
        ));
    }

    #[test]
    fn present_classes_skips_missing() {
        let features = vec![vec![1.0], vec![2.0], vec![3.0]];
        let data = TrainingData::new(&features, &[0, 2, 2], 4).unwrap();
        assert_eq!(data.present_classes(), vec![0, 2]);
        assert_eq!(data.class_counts(), vec![1, 0, 2, 0]);
    }
}
