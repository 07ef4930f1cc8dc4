use std::fmt;

/// An optional capability a fitted classifier may expose beyond `predict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Per-class probability estimates.
    Probabilities,
    /// Per-class decision margins (signed distances or raw scores).
    DecisionFunction,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Probabilities => f.write_str("predict_proba"),
            Capability::DecisionFunction => f.write_str("decision_function"),
        }
    }
}

/// Errors from fitting or querying a base classifier.
#[derive(Debug, thiserror::Error)]
pub enum MachineError {
    /// Returned when the training dataset has zero samples.
    #[error("training dataset has zero samples")]
    EmptyDataset,

    /// Returned when the training dataset has zero feature columns.
    #[error("training dataset has zero feature columns")]
    ZeroFeatures,

    /// Returned when a sample has a different number of features than expected.
    #[error("sample {sample_index} has {got} features, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the sample.
        got: usize,
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when the label vector and the feature rows differ in length.
    #[error("{n_labels} labels provided for {n_samples} samples")]
    LabelCountMismatch {
        /// Number of feature rows.
        n_samples: usize,
        /// Number of labels.
        n_labels: usize,
    },

    /// Returned when a label does not index into the declared class range.
    #[error("sample {sample_index} has label {label}, but only {n_classes} classes are declared")]
    LabelOutOfRange {
        /// The offending label.
        label: usize,
        /// The declared number of classes.
        n_classes: usize,
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when a training value is NaN or infinite.
    #[error("non-finite value at sample {sample_index}, feature {feature_index}")]
    NonFiniteValue {
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// The zero-based index of the offending feature column.
        feature_index: usize,
    },

    /// Returned when a sample has a different number of features at prediction time.
    #[error("prediction input has {got} features, expected {expected}")]
    PredictionFeatureMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the prediction input.
        got: usize,
    },

    /// Returned when max_depth is zero.
    #[error("max_depth must be at least 1, got {max_depth}")]
    InvalidMaxDepth {
        /// The invalid max_depth value provided.
        max_depth: usize,
    },

    /// Returned when min_samples_split is less than 2.
    #[error("min_samples_split must be at least 2, got {min_samples_split}")]
    InvalidMinSamplesSplit {
        /// The invalid min_samples_split value provided.
        min_samples_split: usize,
    },

    /// Returned when min_samples_leaf is zero.
    #[error("min_samples_leaf must be at least 1, got {min_samples_leaf}")]
    InvalidMinSamplesLeaf {
        /// The invalid min_samples_leaf value provided.
        min_samples_leaf: usize,
    },

    /// Returned when max_features is 0 or exceeds n_features.
    #[error("max_features is {max_features}, but must be in [1, {n_features}]")]
    InvalidMaxFeatures {
        /// The requested max_features value.
        max_features: usize,
        /// The number of features in the dataset.
        n_features: usize,
    },

    /// Returned when a numeric hyperparameter is outside its valid range.
    #[error("{machine}: {parameter} = {value} is invalid, expected {expected}")]
    InvalidParameter {
        /// Machine name the parameter belongs to.
        machine: &'static str,
        /// Parameter name.
        parameter: &'static str,
        /// The rejected value, rendered.
        value: String,
        /// Human-readable description of the valid range.
        expected: &'static str,
    },

    /// Returned when the training subset cannot support the requested model,
    /// e.g. a margin classifier that sees a single class.
    #[error("{machine} cannot be fitted: {reason}")]
    DegenerateTrainingData {
        /// Machine name.
        machine: &'static str,
        /// Human-readable description of the problem.
        reason: String,
    },

    /// Returned when the kernel matrix would exceed the sample limit.
    #[error("{machine} supports at most {limit} training samples, got {n_samples}")]
    TooManySamples {
        /// Machine name.
        machine: &'static str,
        /// Number of samples provided.
        n_samples: usize,
        /// Maximum supported.
        limit: usize,
    },

    /// Returned when a classifier is asked for a capability it does not have.
    #[error("capability {capability} is not supported by this machine")]
    Unsupported {
        /// The capability that was requested.
        capability: Capability,
    },
}
