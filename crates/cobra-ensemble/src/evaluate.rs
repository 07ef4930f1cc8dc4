//! Hold-out evaluation of the aggregate and of each machine on its own.

use std::collections::BTreeMap;

use tracing::{info, instrument};

use cobra_machines::Classifier;

use crate::{Cobra, CobraError, ConfusionMatrix};

/// Scores of a fitted ensemble on labeled samples.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Evaluation {
    /// Confusion matrix of the aggregate predictions.
    pub confusion: ConfusionMatrix,
    /// Accuracy of the aggregate predictions.
    pub accuracy: f64,
    /// Accuracy of each registered machine alone.
    pub machine_accuracy: BTreeMap<String, f64>,
    /// Mean number of selected aggregation points per sample.
    pub mean_selected: f64,
    /// Number of evaluated samples.
    pub n_samples: usize,
}

impl<C: Classifier> Cobra<C> {
    /// Score the aggregate and every machine on `features` / `labels`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CobraError::LabelCountMismatch`] | lengths differ |
    /// | [`CobraError::EmptyEvaluationSet`] | no samples |
    /// | [`CobraError::LabelOutOfRange`] | a label is outside the ensemble's classes |
    ///
    /// plus every error of [`Cobra::predict_with_info`].
    #[instrument(skip_all, fields(n_samples = features.len()))]
    pub fn evaluate(
        &self,
        features: &[Vec<f64>],
        labels: &[usize],
        quorum: Option<usize>,
    ) -> Result<Evaluation, CobraError> {
        if features.len() != labels.len() {
            return Err(CobraError::LabelCountMismatch {
                n_samples: features.len(),
                n_labels: labels.len(),
            });
        }
        if features.is_empty() {
            return Err(CobraError::EmptyEvaluationSet);
        }
        let n_classes = self.class_names().map_or(0, <[String]>::len);

        let batch = self.predict_with_info(features, quorum)?;
        let confusion = ConfusionMatrix::from_labels(labels, &batch.labels, n_classes)?;

        let mut machine_accuracy = BTreeMap::new();
        for (name, machine) in &self.machines {
            let predicted = machine.predict_batch(features)?;
            let correct = predicted.iter().zip(labels).filter(|(p, t)| p == t).count();
            machine_accuracy.insert(name.clone(), correct as f64 / labels.len() as f64);
        }

        let accuracy = confusion.accuracy();
        info!(accuracy, mean_selected = batch.mean_selected, "evaluation complete");
        Ok(Evaluation {
            confusion,
            accuracy,
            machine_accuracy,
            mean_selected: batch.mean_selected,
            n_samples: labels.len(),
        })
    }
}
