//! Confusion matrix and per-class classification metrics.

use std::fmt;

use crate::CobraError;

/// A confusion matrix for multi-class classification.
///
/// Entry `matrix[true_class][predicted_class]` counts how many samples
/// with true label `true_class` were predicted as `predicted_class`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConfusionMatrix {
    matrix: Vec<Vec<usize>>,
    n_classes: usize,
}

/// Per-class precision, recall, and F1 score.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClassMetrics {
    /// The class index.
    pub class: usize,
    /// Precision: TP / (TP + FP). 0.0 if no predictions for this class.
    pub precision: f64,
    /// Recall: TP / (TP + FN). 0.0 if no true samples for this class.
    pub recall: f64,
    /// F1: 2 * precision * recall / (precision + recall). 0.0 if both are zero.
    pub f1: f64,
    /// Number of true samples in this class.
    pub support: usize,
}

impl ConfusionMatrix {
    /// Build a confusion matrix from true and predicted labels.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CobraError::EmptyEvaluationSet`] | zero labels provided |
    /// | [`CobraError::LabelCountMismatch`] | slices differ in length |
    /// | [`CobraError::LabelOutOfRange`] | a label is `>= n_classes` |
    pub fn from_labels(
        true_labels: &[usize],
        predicted: &[usize],
        n_classes: usize,
    ) -> Result<Self, CobraError> {
        if true_labels.is_empty() {
            return Err(CobraError::EmptyEvaluationSet);
        }
        if predicted.len() != true_labels.len() {
            return Err(CobraError::LabelCountMismatch {
                n_samples: predicted.len(),
                n_labels: true_labels.len(),
            });
        }
        let mut matrix = vec![vec![0usize; n_classes]; n_classes];
        for (sample_index, (&t, &p)) in true_labels.iter().zip(predicted).enumerate() {
            if let Some(label) = [t, p].into_iter().find(|&l| l >= n_classes) {
                return Err(CobraError::LabelOutOfRange {
                    label,
                    n_classes,
                    sample_index,
                });
            }
            matrix[t][p] += 1;
        }
        Ok(Self { matrix, n_classes })
    }

    /// Overall accuracy: proportion of correct predictions.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.n_classes).map(|i| self.matrix[i][i]).sum();
        let total: usize = self.matrix.iter().flat_map(|row| row.iter()).sum();
        if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        }
    }

    /// Per-class precision, recall, F1, and support.
    #[must_use]
    pub fn class_metrics(&self) -> Vec<ClassMetrics> {
        (0..self.n_classes)
            .map(|c| {
                let tp = self.matrix[c][c];
                let predicted: usize = self.matrix.iter().map(|row| row[c]).sum();
                let support: usize = self.matrix[c].iter().sum();
                let precision = if predicted == 0 {
                    0.0
                } else {
                    tp as f64 / predicted as f64
                };
                let recall = if support == 0 {
                    0.0
                } else {
                    tp as f64 / support as f64
                };
                let f1 = if precision + recall == 0.0 {
                    0.0
                } else {
                    2.0 * precision * recall / (precision + recall)
                };
                ClassMetrics {
                    class: c,
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect()
    }

    /// Return the underlying matrix rows.
    #[must_use]
    pub fn as_rows(&self) -> &[Vec<usize>] {
        &self.matrix
    }

    /// Return the number of classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }
}

/// Renders one line per true class, `true -> counts | support`, followed
/// by the overall accuracy.
impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .matrix
            .iter()
            .flatten()
            .max()
            .map_or(1, |m| m.to_string().len());
        for (truth, row) in self.matrix.iter().enumerate() {
            let cells: Vec<String> = row.iter().map(|c| format!("{c:>width$}")).collect();
            let support: usize = row.iter().sum();
            writeln!(f, "{truth:>3} -> [{}] | {support}", cells.join(" "))?;
        }
        write!(f, "accuracy {:.4}", self.accuracy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_confusion_matrix() {
        // True: [0,0,0, 1,1,1, 2,2,2]
        // Pred: [0,0,1, 1,1,2, 2,2,0]
        let true_labels = vec![0, 0, 0, 1, 1, 1, 2, 2, 2];
        let predicted = vec![0, 0, 1, 1, 1, 2, 2, 2, 0];
        let cm = ConfusionMatrix::from_labels(&true_labels, &predicted, 3).unwrap();

        let metrics = cm.class_metrics();
        assert!((metrics[0].precision - 2.0 / 3.0).abs() < 1e-10);
        assert!((metrics[0].recall - 2.0 / 3.0).abs() < 1e-10);
        assert_eq!(metrics[0].support, 3);
        assert!((cm.accuracy() - 6.0 / 9.0).abs() < 1e-10);
        assert_eq!(cm.as_rows()[2], vec![1, 0, 2]);
    }

    #[test]
    fn zero_support_class_metrics() {
        let cm = ConfusionMatrix::from_labels(&[0, 0, 1, 1], &[0, 0, 1, 1], 3).unwrap();
        let metrics = cm.class_metrics();
        assert_eq!(metrics[2].support, 0);
        assert!(metrics[2].f1.abs() < f64::EPSILON);
        assert!((cm.accuracy() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            ConfusionMatrix::from_labels(&[], &[], 2),
            Err(CobraError::EmptyEvaluationSet)
        ));
        assert!(matches!(
            ConfusionMatrix::from_labels(&[0, 1], &[0], 2),
            Err(CobraError::LabelCountMismatch { .. })
        ));
        assert!(matches!(
            ConfusionMatrix::from_labels(&[0, 3], &[0, 1], 2),
            Err(CobraError::LabelOutOfRange { label: 3, sample_index: 1, .. })
        ));
    }

    #[test]
    fn display_formatting() {
        let cm = ConfusionMatrix::from_labels(&[0, 0, 1, 1], &[0, 1, 1, 1], 2).unwrap();
        let output = cm.to_string();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines, ["  0 -> [1 1] | 2", "  1 -> [0 2] | 2", "accuracy 0.7500"]);
    }
}
