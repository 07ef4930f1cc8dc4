//! CSV reader for unlabeled query rows.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::{QueryTable, SampleId};
use crate::reader::{csv_error, open_csv, parse_value};

/// Reads query samples from a CSV file.
///
/// Expected CSV format:
/// - Header row required (first column is the sample id, remaining are feature names)
/// - `sample_id,feature1,feature2,...,featureN`
/// - One row per sample, all rows must have the same number of columns
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::NoFeatureColumns`] | Only the id column, no feature columns |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::EmptySampleId`] | Sample id cell is empty |
/// | [`IoError::DuplicateSampleId`] | Same sample id appears twice |
/// | [`IoError::NonFiniteValue`] | Cell is NaN, Inf, or unparseable float |
pub struct QueryReader {
    path: PathBuf,
}

impl QueryReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Read and validate the CSV file, returning a [`QueryTable`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<QueryTable, IoError> {
        let mut rdr = open_csv(&self.path)?;

        let header = rdr.headers().map_err(|e| csv_error(&self.path, e))?;
        let expected_cols = header.len();
        debug!(expected_cols, "read CSV header");
        if expected_cols < 2 {
            return Err(IoError::NoFeatureColumns {
                path: self.path.clone(),
            });
        }
        let feature_names: Vec<String> = header.iter().skip(1).map(String::from).collect();

        let mut sample_ids = Vec::new();
        let mut features = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| csv_error(&self.path, e))?;
            if record.len() != expected_cols {
                return Err(IoError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    expected: expected_cols,
                    got: record.len(),
                });
            }

            let id = record.get(0).unwrap_or("").to_string();
            if id.is_empty() {
                return Err(IoError::EmptySampleId {
                    path: self.path.clone(),
                    row_index,
                });
            }
            if let Some(&first_row) = seen.get(&id) {
                return Err(IoError::DuplicateSampleId {
                    path: self.path.clone(),
                    sample_id: id,
                    first_row,
                    second_row: row_index,
                });
            }
            seen.insert(id.clone(), row_index);

            let row = record
                .iter()
                .skip(1)
                .enumerate()
                .map(|(col_index, raw)| parse_value(&self.path, raw, row_index, col_index))
                .collect::<Result<Vec<f64>, IoError>>()?;

            sample_ids.push(SampleId::new(id));
            features.push(row);
        }

        if sample_ids.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        info!(
            n_samples = sample_ids.len(),
            n_features = feature_names.len(),
            "query dataset loaded"
        );

        Ok(QueryTable::new(sample_ids, feature_names, features))
    }
}
