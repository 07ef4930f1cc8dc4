use std::path::PathBuf;

use cobra_machines::MachineError;

/// Errors from building, querying or persisting a COBRA ensemble.
#[derive(Debug, thiserror::Error)]
pub enum CobraError {
    /// Returned when a dataset fails validation at construction.
    #[error("invalid dataset: {0}")]
    InvalidDataset(#[source] MachineError),

    /// Returned when a base machine fails outside of ensemble fitting,
    /// e.g. while building the agreement table.
    #[error(transparent)]
    Machine(#[from] MachineError),

    /// Returned when fewer class names are given than labels require.
    #[error("{n_names} class names provided, but labels need {n_classes}")]
    ClassNameCountMismatch {
        /// Number of names provided.
        n_names: usize,
        /// Number of classes implied by the labels.
        n_classes: usize,
    },

    /// Returned when the resolved split bounds violate `k <= l`.
    #[error("invalid split: k = {k} exceeds l = {l} (n = {n})")]
    InvalidSplit {
        /// Training subset size.
        k: usize,
        /// Aggregation subset end index.
        l: usize,
        /// Dataset size.
        n: usize,
    },

    /// Returned when the machine-training subset is empty.
    #[error("training subset is empty; increase k")]
    EmptyTrainingSubset,

    /// Returned when the aggregation subset is empty.
    #[error("aggregation subset is empty; l must exceed k")]
    EmptyAggregationSubset,

    /// Returned when the training and aggregation subsets differ in width.
    #[error("training subset has {training} features, aggregation subset has {aggregation}")]
    SubsetWidthMismatch {
        /// Feature count of the training subset.
        training: usize,
        /// Feature count of the aggregation subset.
        aggregation: usize,
    },

    /// Returned when the training and aggregation subsets name different
    /// classes, so label indices would mean different things in each.
    #[error("training subset classes {training:?} differ from aggregation subset classes {aggregation:?}")]
    SubsetClassMismatch {
        /// Class names of the training subset.
        training: Vec<String>,
        /// Class names of the aggregation subset.
        aggregation: Vec<String>,
    },

    /// Returned when no machine is registered, e.g. every fit failed.
    #[error("no machines available ({failed} failed to fit)")]
    NoMachines {
        /// Number of machines whose fit failed.
        failed: usize,
    },

    /// Returned when an operation needs data that has not been split yet.
    #[error("ensemble has no data; call split_data or fit first")]
    NotFitted,

    /// Returned when predicting before the agreement table is (re)built.
    #[error("agreement table is missing or stale; call load_machine_predictions")]
    AgreementNotBuilt,

    /// Returned when a quorum outside `1..=n_machines` is requested.
    #[error("quorum {quorum} is invalid for {n_machines} machines")]
    InvalidQuorum {
        /// Requested quorum.
        quorum: usize,
        /// Number of registered machines.
        n_machines: usize,
    },

    /// Returned when a query has the wrong number of features.
    #[error("query has {got} features, expected {expected}")]
    FeatureMismatch {
        /// Feature count the ensemble was fitted with.
        expected: usize,
        /// Feature count of the query.
        got: usize,
    },

    /// Returned when a query contains NaN or infinity.
    #[error("query value at feature {feature_index} is not finite")]
    NonFiniteQuery {
        /// Zero-based index of the offending feature.
        feature_index: usize,
    },

    /// Returned when no registered machine produces class probabilities.
    #[error("no registered machine supports predict_proba")]
    NoConfidenceSource,

    /// Returned when a machine's class distribution has the wrong length.
    #[error("machine '{name}' returned {got} class probabilities, expected {expected}")]
    ProbabilityLengthMismatch {
        /// Machine name.
        name: String,
        /// Number of classes of the ensemble.
        expected: usize,
        /// Length of the returned distribution.
        got: usize,
    },

    /// Returned when a supplied agreement table names an unregistered machine.
    #[error("agreement table names unknown machine '{name}'")]
    UnknownTableMachine {
        /// The unknown machine name.
        name: String,
    },

    /// Returned when a supplied agreement table omits a registered machine.
    #[error("agreement table has no entry for machine '{name}'")]
    MissingTableMachine {
        /// The missing machine name.
        name: String,
    },

    /// Returned when a supplied agreement row has the wrong length.
    #[error("agreement table for '{name}' has {got} rows, expected {expected}")]
    TableLengthMismatch {
        /// Machine name.
        name: String,
        /// Aggregation subset size.
        expected: usize,
        /// Supplied row count.
        got: usize,
    },

    /// Returned when evaluation labels and rows differ in length.
    #[error("{n_labels} labels provided for {n_samples} samples")]
    LabelCountMismatch {
        /// Number of rows.
        n_samples: usize,
        /// Number of labels.
        n_labels: usize,
    },

    /// Returned when evaluating on zero samples.
    #[error("evaluation set is empty")]
    EmptyEvaluationSet,

    /// Returned when an evaluation label is outside the ensemble's classes.
    #[error("label {label} at sample {sample_index} is outside the {n_classes} known classes")]
    LabelOutOfRange {
        /// The offending label.
        label: usize,
        /// Number of classes the ensemble knows.
        n_classes: usize,
        /// Zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when a hold-out fraction is outside `(0, 1)`.
    #[error("test fraction must be in (0, 1), got {test_fraction}")]
    InvalidTestFraction {
        /// The rejected fraction.
        test_fraction: f64,
    },

    /// Returned when model serialization fails.
    #[error("failed to serialize model")]
    SerializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when model deserialization fails.
    #[error("failed to deserialize model")]
    DeserializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when writing the model file fails.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the model file fails.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when loading a model with an incompatible format version.
    #[error("incompatible model version: expected {expected}, found {found}")]
    IncompatibleModelVersion {
        /// The format version this build expects.
        expected: u32,
        /// The format version found in the blob.
        found: u32,
    },
}
