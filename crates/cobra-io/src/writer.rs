//! JSON result writer for training, prediction and evaluation outputs.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::{ExperimentName, SampleId};

/// Writes pipeline results to JSON files.
///
/// Creates the output directory on construction if it does not exist.
/// Output files are named `{experiment}_fit_report.json`,
/// `{experiment}_predictions.json` and `{experiment}_evaluation.json`.
///
/// Inputs are primitives so that the writer has no dependency on the
/// ensemble crates.
pub struct ResultWriter {
    output_dir: PathBuf,
    experiment: ExperimentName,
}

/// Per-sample diagnostics passed to [`ResultWriter::write_predictions`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PredictionExtras<'a> {
    /// Mean class distribution per sample.
    pub probabilities: Option<&'a [Vec<f64>]>,
    /// Selected aggregation indices per sample.
    pub selections: Option<&'a [Vec<usize>]>,
    /// Batch-average number of selected points.
    pub mean_selected: Option<f64>,
    /// Whether each sample got the fallback label because no aggregation
    /// point reached the quorum.
    pub fallback: Option<&'a [bool]>,
}

/// Aggregate scores passed to [`ResultWriter::write_evaluation`].
#[derive(Debug, Clone, Copy)]
pub struct EvaluationSummary<'a> {
    /// Aggregate accuracy.
    pub accuracy: f64,
    /// Mean number of selected points per sample.
    pub mean_selected: f64,
    /// Number of evaluated samples.
    pub n_samples: usize,
    /// Quorum used, if not the machine count.
    pub quorum: Option<usize>,
    /// Accuracy of each machine alone.
    pub machine_accuracy: &'a BTreeMap<String, f64>,
    /// Confusion matrix rows, `[true][predicted]`.
    pub confusion_matrix: &'a [Vec<usize>],
    /// `(precision, recall, f1, support)` per class.
    pub class_metrics: &'a [(f64, f64, f64, usize)],
}

impl ResultWriter {
    /// Create a new writer targeting the given directory and experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), experiment = %experiment))]
    pub fn new(output_dir: &Path, experiment: ExperimentName) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            experiment,
        })
    }

    fn path_for(&self, suffix: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_{suffix}.json", self.experiment.as_str()))
    }

    fn write_json(path: &Path, artifact: &impl Serialize) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(artifact).map_err(|e| IoError::SerializeJson {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, &json).map_err(|e| IoError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write a training summary to `{experiment}_fit_report.json`.
    ///
    /// `fitted` holds `(name, elapsed_ms)`, `failed` holds `(name, reason)`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::SerializeJson`] | JSON rendering failed |
    /// | [`IoError::WriteFile`] | file write failed |
    #[instrument(skip_all)]
    pub fn write_fit_report(
        &self,
        k: usize,
        l: usize,
        class_names: &[String],
        fitted: &[(String, u64)],
        failed: &[(String, String)],
    ) -> Result<PathBuf, IoError> {
        let path = self.path_for("fit_report");
        let artifact = FitArtifact {
            experiment: self.experiment.as_str(),
            k,
            l,
            class_names,
            fitted: fitted
                .iter()
                .map(|(name, elapsed_ms)| FittedEntry {
                    name,
                    elapsed_ms: *elapsed_ms,
                })
                .collect(),
            failed: failed
                .iter()
                .map(|(name, reason)| FailedEntry { name, reason })
                .collect(),
        };
        Self::write_json(&path, &artifact)?;
        info!(path = %path.display(), "fit report written");
        Ok(path)
    }

    /// Write predictions to `{experiment}_predictions.json`.
    ///
    /// `labels[i]` is the predicted class index of `sample_ids[i]`. Rows with
    /// `fallback: true` carry class index 0, which is the first class name in
    /// sorted order rather than a consensus vote.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::SerializeJson`] | JSON rendering failed |
    /// | [`IoError::WriteFile`] | file write failed |
    #[instrument(skip_all, fields(n = sample_ids.len()))]
    pub fn write_predictions(
        &self,
        sample_ids: &[SampleId],
        labels: &[usize],
        class_names: &[String],
        extras: PredictionExtras<'_>,
    ) -> Result<PathBuf, IoError> {
        let path = self.path_for("predictions");
        let predictions: Vec<PredictionEntry> = sample_ids
            .iter()
            .zip(labels)
            .enumerate()
            .map(|(i, (id, &label))| PredictionEntry {
                sample_id: id.as_str(),
                label,
                class_name: class_names.get(label).map(String::as_str),
                probabilities: extras.probabilities.and_then(|p| p.get(i)).map(Vec::as_slice),
                selected: extras.selections.and_then(|s| s.get(i)).map(Vec::as_slice),
                fallback: extras.fallback.and_then(|f| f.get(i)).copied(),
            })
            .collect();

        let artifact = PredictArtifact {
            experiment: self.experiment.as_str(),
            n_samples: predictions.len(),
            mean_selected: extras.mean_selected,
            predictions,
        };
        Self::write_json(&path, &artifact)?;
        info!(path = %path.display(), "predictions written");
        Ok(path)
    }

    /// Write evaluation results to `{experiment}_evaluation.json`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::SerializeJson`] | JSON rendering failed |
    /// | [`IoError::WriteFile`] | file write failed |
    #[instrument(skip_all)]
    pub fn write_evaluation(
        &self,
        class_names: &[String],
        summary: EvaluationSummary<'_>,
    ) -> Result<PathBuf, IoError> {
        let path = self.path_for("evaluation");
        let classes: Vec<ClassEntry> = summary
            .class_metrics
            .iter()
            .enumerate()
            .map(|(i, &(precision, recall, f1, support))| ClassEntry {
                class: i,
                name: class_names.get(i).map(String::as_str),
                precision,
                recall,
                f1,
                support,
            })
            .collect();

        let artifact = EvaluateArtifact {
            experiment: self.experiment.as_str(),
            accuracy: summary.accuracy,
            mean_selected: summary.mean_selected,
            n_samples: summary.n_samples,
            quorum: summary.quorum,
            machine_accuracy: summary.machine_accuracy,
            confusion_matrix: summary.confusion_matrix,
            class_metrics: classes,
        };
        Self::write_json(&path, &artifact)?;
        info!(path = %path.display(), "evaluation result written");
        Ok(path)
    }

    /// Return the path where the model binary should be saved.
    ///
    /// Does not write anything, just computes `{output_dir}/{experiment}_model.bin`.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_model.bin", self.experiment.as_str()))
    }
}

// --- Shadow structs for JSON serialization ---

#[derive(Serialize)]
struct FitArtifact<'a> {
    experiment: &'a str,
    k: usize,
    l: usize,
    class_names: &'a [String],
    fitted: Vec<FittedEntry<'a>>,
    failed: Vec<FailedEntry<'a>>,
}

#[derive(Serialize)]
struct FittedEntry<'a> {
    name: &'a str,
    elapsed_ms: u64,
}

#[derive(Serialize)]
struct FailedEntry<'a> {
    name: &'a str,
    reason: &'a str,
}

#[derive(Serialize)]
struct PredictArtifact<'a> {
    experiment: &'a str,
    n_samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    mean_selected: Option<f64>,
    predictions: Vec<PredictionEntry<'a>>,
}

#[derive(Serialize)]
struct PredictionEntry<'a> {
    sample_id: &'a str,
    label: usize,
    class_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    probabilities: Option<&'a [f64]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    selected: Option<&'a [usize]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback: Option<bool>,
}

#[derive(Serialize)]
struct EvaluateArtifact<'a> {
    experiment: &'a str,
    accuracy: f64,
    mean_selected: f64,
    n_samples: usize,
    quorum: Option<usize>,
    machine_accuracy: &'a BTreeMap<String, f64>,
    confusion_matrix: &'a [Vec<usize>],
    class_metrics: Vec<ClassEntry<'a>>,
}

#[derive(Serialize)]
struct ClassEntry<'a> {
    class: usize,
    name: Option<&'a str>,
    precision: f64,
    recall: f64,
    f1: f64,
    support: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    fn writer(dir: &Path, name: &str) -> ResultWriter {
        ResultWriter::new(dir, ExperimentName::new(name.into()).unwrap()).unwrap()
    }

    #[test]
    fn write_fit_report_json_structure() {
        let dir = TempDir::new().unwrap();
        let path = writer(dir.path(), "fit_test")
            .write_fit_report(
                50,
                100,
                &["a".into(), "b".into()],
                &[("tree".into(), 3), ("knn".into(), 1)],
                &[("svm".into(), "svm cannot be fitted".into())],
            )
            .unwrap();
        assert_eq!(path, dir.path().join("fit_test_fit_report.json"));

        let content = read_json(&path);
        assert_eq!(content["experiment"], "fit_test");
        assert_eq!(content["k"], 50);
        assert_eq!(content["fitted"].as_array().unwrap().len(), 2);
        assert_eq!(content["failed"][0]["name"], "svm");
    }

    #[test]
    fn write_predictions_with_extras() {
        let dir = TempDir::new().unwrap();
        let ids = vec![SampleId::new("q1".into()), SampleId::new("q2".into())];
        let proba = vec![vec![0.9, 0.1], vec![0.2, 0.8]];
        let selections = vec![vec![0, 3], vec![]];
        let fallback = [false, true];
        let extras = PredictionExtras {
            probabilities: Some(proba.as_slice()),
            selections: Some(selections.as_slice()),
            mean_selected: Some(1.0),
            fallback: Some(&fallback),
        };
        let path = writer(dir.path(), "pred_test")
            .write_predictions(&ids, &[0, 1], &["a".into(), "b".into()], extras)
            .unwrap();

        let content = read_json(&path);
        assert_eq!(content["n_samples"], 2);
        assert_eq!(content["mean_selected"], 1.0);
        let preds = content["predictions"].as_array().unwrap();
        assert_eq!(preds[0]["sample_id"], "q1");
        assert_eq!(preds[1]["class_name"], "b");
        assert_eq!(preds[0]["selected"].as_array().unwrap().len(), 2);
        assert_eq!(preds[1]["probabilities"][1], 0.8);
        assert_eq!(preds[0]["fallback"], false);
        assert_eq!(preds[1]["fallback"], true);
    }

    #[test]
    fn write_predictions_omits_missing_extras() {
        let dir = TempDir::new().unwrap();
        let ids = vec![SampleId::new("q1".into())];
        let path = writer(dir.path(), "plain")
            .write_predictions(&ids, &[0], &["a".into()], PredictionExtras::default())
            .unwrap();
        let content = read_json(&path);
        assert!(content.get("mean_selected").is_none());
        assert!(content["predictions"][0].get("probabilities").is_none());
        assert!(content["predictions"][0].get("fallback").is_none());
    }

    #[test]
    fn write_evaluation_json_structure() {
        let dir = TempDir::new().unwrap();
        let machine_accuracy: BTreeMap<String, f64> =
            [("tree".to_string(), 0.9), ("knn".to_string(), 0.95)].into();
        let summary = EvaluationSummary {
            accuracy: 0.96,
            mean_selected: 12.5,
            n_samples: 25,
            quorum: None,
            machine_accuracy: &machine_accuracy,
            confusion_matrix: &[vec![12, 1], vec![0, 12]],
            class_metrics: &[(1.0, 0.92, 0.96, 13), (0.92, 1.0, 0.96, 12)],
        };
        let path = writer(dir.path(), "eval_test")
            .write_evaluation(&["a".into(), "b".into()], summary)
            .unwrap();

        let content = read_json(&path);
        assert_eq!(content["n_samples"], 25);
        assert_eq!(content["machine_accuracy"]["knn"], 0.95);
        assert_eq!(content["class_metrics"][1]["name"], "b");
        assert!(content["quorum"].is_null());
    }

    #[test]
    fn creates_nested_output_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested").join("deep");
        let w = writer(&nested, "nested_test");
        assert!(nested.is_dir());
        assert_eq!(w.model_path(), nested.join("nested_test_model.bin"));
    }
}
