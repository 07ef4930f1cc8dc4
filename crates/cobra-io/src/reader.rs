//! CSV reader for labeled training data.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::LabeledTable;

/// Open `path` as a headed CSV reader.
///
/// `flexible(true)` lets rows with a wrong column count reach our own
/// [`IoError::InconsistentRowLength`] check instead of a low-level parse error.
pub(crate) fn open_csv(path: &Path) -> Result<csv::Reader<File>, IoError> {
    let file = File::open(path).map_err(|e| IoError::FileNotFound {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file))
}

pub(crate) fn csv_error(path: &Path, e: csv::Error) -> IoError {
    IoError::CsvParse {
        path: path.to_path_buf(),
        offset: e.position().map_or(0, |p| p.byte()),
        source: e,
    }
}

/// Parse a finite float cell.
pub(crate) fn parse_value(
    path: &Path,
    raw: &str,
    row_index: usize,
    col_index: usize,
) -> Result<f64, IoError> {
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(IoError::NonFiniteValue {
            path: path.to_path_buf(),
            row_index,
            col_index,
            raw: raw.to_string(),
        }),
    }
}

/// Reads labeled training rows from a CSV file.
///
/// Expected CSV format:
/// - Header row required; one column, named on construction, holds the label
/// - Every other column is a finite float feature
/// - Label cells are arbitrary non-empty strings, mapped to zero-based
///   indices in sorted string order. Index 0, which the ensemble returns
///   when no aggregation point reaches the quorum, is therefore the
///   lexicographically first name (`"-1"` for labels `"-1","1"`), not
///   necessarily a label spelled `"0"`
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::MissingLabelColumn`] | Label column absent from header |
/// | [`IoError::NoFeatureColumns`] | Label is the only column |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::NonFiniteValue`] | Feature cell is NaN, Inf, or unparseable |
/// | [`IoError::EmptyLabel`] | Label cell is empty |
pub struct LabeledReader {
    path: PathBuf,
    label_column: String,
}

impl LabeledReader {
    /// Create a new reader for the given CSV file path and label column.
    pub fn new(path: &Path, label_column: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            label_column: label_column.to_string(),
        }
    }

    /// Read and validate the CSV file, returning a [`LabeledTable`].
    #[instrument(skip(self), fields(path = %self.path.display(), label = %self.label_column))]
    pub fn read(&self) -> Result<LabeledTable, IoError> {
        let mut rdr = open_csv(&self.path)?;

        let header = rdr.headers().map_err(|e| csv_error(&self.path, e))?.clone();
        let expected_cols = header.len();
        let label_index = header
            .iter()
            .position(|h| h == self.label_column)
            .ok_or_else(|| IoError::MissingLabelColumn {
                path: self.path.clone(),
                column: self.label_column.clone(),
            })?;
        if expected_cols < 2 {
            return Err(IoError::NoFeatureColumns {
                path: self.path.clone(),
            });
        }
        let feature_names: Vec<String> = header
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != label_index)
            .map(|(_, h)| h.to_string())
            .collect();
        debug!(expected_cols, label_index, "read CSV header");

        let mut features = Vec::new();
        let mut raw_labels = Vec::new();
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

            let mut row = Vec::with_capacity(feature_names.len());
            for (col_index, raw) in record
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != label_index)
                .map(|(_, raw)| raw)
                .enumerate()
            {
                row.push(parse_value(&self.path, raw, row_index, col_index)?);
            }

            let label = record.get(label_index).unwrap_or("");
            if label.is_empty() {
                return Err(IoError::EmptyLabel {
                    path: self.path.clone(),
                    row_index,
                });
            }
            raw_labels.push(label.to_string());
            features.push(row);
        }

        if features.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        let class_names: Vec<String> = raw_labels
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let labels: Vec<usize> = raw_labels
            .iter()
            .map(|l| class_names.binary_search(l).unwrap_or(0))
            .collect();

        info!(
            n_samples = features.len(),
            n_features = feature_names.len(),
            n_classes = class_names.len(),
            "labeled dataset loaded"
        );

        Ok(LabeledTable::new(feature_names, class_names, features, labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn read_valid_labeled_csv() {
        let csv = "age,income,status\n30,1.5,yes\n40,2.5,no\n50,3.5,yes\n";
        let f = write_csv(csv);
        let table = LabeledReader::new(f.path(), "status").read().unwrap();
        assert_eq!(table.n_samples(), 3);
        assert_eq!(table.feature_names(), ["age", "income"]);
        assert_eq!(table.class_names(), ["no", "yes"]);
        assert_eq!(table.labels(), [1, 0, 1]);
        assert!((table.features()[1][1] - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn class_indices_follow_string_order() {
        let f = write_csv("x,label\n1.0,1\n2.0,-1\n3.0,1\n");
        let table = LabeledReader::new(f.path(), "label").read().unwrap();
        assert_eq!(table.class_names(), ["-1", "1"]);
        assert_eq!(table.labels(), [1, 0, 1]);
    }

    #[test]
    fn label_column_may_be_anywhere() {
        let csv = "class,x\nb,1.0\na,2.0\n";
        let f = write_csv(csv);
        let table = LabeledReader::new(f.path(), "class").read().unwrap();
        assert_eq!(table.feature_names(), ["x"]);
        assert_eq!(table.labels(), [1, 0]);
    }

    #[test]
    fn missing_label_column_error() {
        let f = write_csv("x,y\n1.0,2.0\n");
        let err = LabeledReader::new(f.path(), "label").read().unwrap_err();
        assert!(matches!(err, IoError::MissingLabelColumn { .. }));
    }

    #[test]
    fn no_feature_columns_error() {
        let f = write_csv("label\na\nb\n");
        let err = LabeledReader::new(f.path(), "label").read().unwrap_err();
        assert!(matches!(err, IoError::NoFeatureColumns { .. }));
    }

    #[test]
    fn empty_dataset_error() {
        let f = write_csv("x,label\n");
        let err = LabeledReader::new(f.path(), "label").read().unwrap_err();
        assert!(matches!(err, IoError::EmptyDataset { .. }));
    }

    #[test]
    fn inconsistent_row_length_error() {
        let f = write_csv("x,y,label\n1.0,2.0,a\n1.0,b\n");
        let err = LabeledReader::new(f.path(), "label").read().unwrap_err();
        assert!(matches!(err, IoError::InconsistentRowLength { row_index: 1, .. }));
    }

    #[test]
    fn non_finite_value_error() {
        let f = write_csv("x,label\nNaN,a\n");
        let err = LabeledReader::new(f.path(), "label").read().unwrap_err();
        assert!(matches!(err, IoError::NonFiniteValue { .. }));
    }

    #[test]
    fn empty_label_error() {
        let f = write_csv("x,label\n1.0,\n");
        let err = LabeledReader::new(f.path(), "label").read().unwrap_err();
        assert!(matches!(err, IoError::EmptyLabel { row_index: 0, .. }));
    }
}
