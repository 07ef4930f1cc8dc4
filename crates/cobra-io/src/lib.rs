//! File I/O, validation, and serialization for the cobra pipeline.

mod domain;
mod error;
mod query_reader;
mod reader;
mod writer;

pub use domain::{ExperimentName, LabeledTable, QueryTable, SampleId};
pub use error::IoError;
pub use query_reader::QueryReader;
pub use reader::LabeledReader;
pub use writer::{EvaluationSummary, PredictionExtras, ResultWriter};
