use rand::{SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use cobra_machines::TrainingData;

use crate::CobraError;

/// An ordered, validated sequence of `(feature vector, label)` pairs.
///
/// `features[sample_idx][feature_idx]` in row-major layout; labels are
/// zero-based indices into [`Dataset::class_names`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Dataset {
    features: Vec<Vec<f64>>,
    labels: Vec<usize>,
    class_names: Vec<String>,
    n_features: usize,
}

impl Dataset {
    /// Build a dataset whose class names are the label values themselves
    /// (`"0"`, `"1"`, ...).
    ///
    /// # Errors
    ///
    /// Returns [`CobraError::InvalidDataset`] when the rows are empty,
    /// ragged, zero-width or non-finite, or when `labels.len()` differs from
    /// the row count.
    pub fn new(features: Vec<Vec<f64>>, labels: Vec<usize>) -> Result<Self, CobraError> {
        let n_classes = labels.iter().max().map_or(1, |&m| m + 1);
        let class_names = (0..n_classes).map(|c| c.to_string()).collect();
        Self::with_class_names(features, labels, class_names)
    }

    /// Build a dataset with explicit class names. `class_names.len()` fixes
    /// the number of classes and may exceed the largest label.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CobraError::ClassNameCountMismatch`] | a label has no name |
    /// | [`CobraError::InvalidDataset`] | rows empty, ragged, zero-width, non-finite, or label count mismatch |
    pub fn with_class_names(
        features: Vec<Vec<f64>>,
        labels: Vec<usize>,
        class_names: Vec<String>,
    ) -> Result<Self, CobraError> {
        let needed = labels.iter().max().map_or(0, |&m| m + 1);
        if class_names.len() < needed {
            return Err(CobraError::ClassNameCountMismatch {
                n_names: class_names.len(),
                n_classes: needed,
            });
        }
        let n_features = TrainingData::new(&features, &labels, class_names.len())
            .map_err(CobraError::InvalidDataset)?
            .n_features();
        Ok(Self {
            features,
            labels,
            class_names,
            n_features,
        })
    }

    /// Rows selected by `indices`, in that order. May be empty.
    pub(crate) fn subset(&self, indices: &[usize]) -> Self {
        Self {
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            class_names: self.class_names.clone(),
            n_features: self.n_features,
        }
    }

    /// Return the feature rows.
    #[must_use]
    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    /// Return the labels.
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Return the class names, indexed by label.
    #[must_use]
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Return the number of classes in the label space.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Return `true` if the dataset has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Borrow the rows as learner input.
    ///
    /// # Errors
    ///
    /// Returns [`CobraError::EmptyTrainingSubset`] when the dataset is empty.
    pub fn training_data(&self) -> Result<TrainingData<'_>, CobraError> {
        if self.is_empty() {
            return Err(CobraError::EmptyTrainingSubset);
        }
        Ok(TrainingData::new(&self.features, &self.labels, self.n_classes())?)
    }

    /// Shuffle with `seed` and hold out `round(n * test_fraction)` rows,
    /// at least one on each side. Returns `(train, test)`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CobraError::InvalidTestFraction`] | fraction outside `(0, 1)` |
    /// | [`CobraError::EmptyTrainingSubset`] | fewer than two rows |
    pub fn train_test_split(
        &self,
        test_fraction: f64,
        seed: u64,
    ) -> Result<(Dataset, Dataset), CobraError> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(CobraError::InvalidTestFraction { test_fraction });
        }
        let n = self.len();
        if n < 2 {
            return Err(CobraError::EmptyTrainingSubset);
        }
        let n_test = ((n as f64 * test_fraction).round() as usize).clamp(1, n - 1);

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
        let (test, train) = order.split_at(n_test);

        debug!(n_train = train.len(), n_test = test.len(), "hold-out split");
        Ok((self.subset(train), self.subset(test)))
    }
}
