//! COBRA consensus aggregation of classifiers.
//!
//! A dataset is split into a machine-training subset and an aggregation
//! subset. Every machine is fitted on the first and its predictions on the
//! second are cached in an [`AgreementTable`]. To classify a query, each
//! machine predicts it live; an aggregation point is selected when the
//! number of machines whose cached label there matches their live label
//! meets the quorum `M`. The answer is the majority ground-truth label of
//! the selected points, or [`FALLBACK_LABEL`] when none is selected.
//!
//! ```no_run
//! use cobra_ensemble::{Cobra, CobraConfig, Dataset};
//!
//! # fn main() -> Result<(), cobra_ensemble::CobraError> {
//! let features = vec![vec![0.0, 0.1], vec![5.0, 5.1], vec![0.2, 0.0], vec![5.2, 4.9]];
//! let dataset = Dataset::new(features, vec![0, 1, 0, 1])?;
//! let mut cobra: Cobra = Cobra::new(CobraConfig::new());
//! cobra.fit(&dataset)?;
//! let label = cobra.predict_single(&[0.1, 0.1])?;
//! # let _ = label;
//! # Ok(())
//! # }
//! ```

mod aggregate;
mod agreement;
mod cobra;
mod config;
mod confusion;
mod dataset;
mod error;
mod evaluate;
mod persist;
mod split;
mod trainer;

pub use aggregate::{BatchPrediction, FALLBACK_LABEL, Selection};
pub use agreement::{AgreementTable, Confidence, ConfidenceTable};
pub use cobra::Cobra;
pub use config::{CobraConfig, Preset, QuorumRule};
pub use confusion::{ClassMetrics, ConfusionMatrix};
pub use dataset::Dataset;
pub use error::CobraError;
pub use evaluate::Evaluation;
pub use persist::FORMAT_VERSION;
pub use split::{SplitConfig, SplitData, split};
pub use trainer::{DynLearner, FitOutcome, FitReport};
