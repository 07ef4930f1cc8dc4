//! Domain types for cobra-io.

use crate::IoError;

/// A query sample identifier.
///
/// Wraps a non-empty string parsed from the first column of a query CSV.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SampleId(String);

impl SampleId {
    pub(crate) fn new(id: String) -> Self {
        debug_assert!(!id.is_empty(), "sample ID must not be empty");
        Self(id)
    }

    /// Return the sample ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SampleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated experiment name for output file naming.
///
/// Must match `[a-zA-Z0-9_-]+`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentName(String);

impl ExperimentName {
    /// Parse and validate an experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidExperimentName`] if the name is empty or
    /// contains characters outside `[a-zA-Z0-9_-]`.
    pub fn new(name: String) -> Result<Self, IoError> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(IoError::InvalidExperimentName { name });
        }
        Ok(Self(name))
    }

    /// Return the experiment name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExperimentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Labeled training rows read from CSV.
///
/// Produced by [`LabeledReader`](crate::LabeledReader). Labels are indices
/// into `class_names`, which are sorted.
#[derive(Debug)]
pub struct LabeledTable {
    feature_names: Vec<String>,
    class_names: Vec<String>,
    features: Vec<Vec<f64>>,
    labels: Vec<usize>,
}

impl LabeledTable {
    pub(crate) fn new(
        feature_names: Vec<String>,
        class_names: Vec<String>,
        features: Vec<Vec<f64>>,
        labels: Vec<usize>,
    ) -> Self {
        Self {
            feature_names,
            class_names,
            features,
            labels,
        }
    }

    /// Return the feature column names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Return the sorted class names.
    #[must_use]
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Return the feature matrix (row-major).
    #[must_use]
    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    /// Return the label indices.
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Return the number of rows.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.features.len()
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Consume the table, returning `(features, labels, class_names)`.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Vec<f64>>, Vec<usize>, Vec<String>) {
        (self.features, self.labels, self.class_names)
    }
}

/// Unlabeled query rows read from CSV.
///
/// Produced by [`QueryReader`](crate::QueryReader). `sample_ids[i]`
/// corresponds to `features[i]`.
#[derive(Debug)]
pub struct QueryTable {
    sample_ids: Vec<SampleId>,
    feature_names: Vec<String>,
    features: Vec<Vec<f64>>,
}

impl QueryTable {
    pub(crate) fn new(
        sample_ids: Vec<SampleId>,
        feature_names: Vec<String>,
        features: Vec<Vec<f64>>,
    ) -> Self {
        Self {
            sample_ids,
            feature_names,
            features,
        }
    }

    /// Return the sample IDs.
    #[must_use]
    pub fn sample_ids(&self) -> &[SampleId] {
        &self.sample_ids
    }

    /// Return the feature column names.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Return the feature matrix (row-major).
    #[must_use]
    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    /// Return the number of samples.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }
}
