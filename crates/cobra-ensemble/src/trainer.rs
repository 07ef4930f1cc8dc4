//! Parallel fitting of the machine registry on the training subset.

use std::{collections::BTreeMap, time::Instant};

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, info, instrument, warn};

use cobra_machines::{Classifier, Learner, MachineError, TrainingData};

/// A boxed learner producing models of type `C`.
pub type DynLearner<C> = Box<dyn Learner<Model = C> + Send + Sync>;

/// Result of fitting a single learner.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FitOutcome {
    /// The machine was fitted and registered.
    Fitted {
        /// Registry name.
        name: String,
        /// Wall-clock fit time in milliseconds.
        elapsed_ms: u64,
    },
    /// The fit failed and the machine was skipped.
    Failed {
        /// Registry name.
        name: String,
        /// Rendered fit error.
        reason: String,
    },
}

impl FitOutcome {
    /// Registry name of the learner.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            FitOutcome::Fitted { name, .. } | FitOutcome::Failed { name, .. } => name,
        }
    }

    /// Return `true` if the machine was registered.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        matches!(self, FitOutcome::Fitted { .. })
    }
}

/// Per-learner outcomes of one training pass, in learner order.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FitReport {
    outcomes: Vec<FitOutcome>,
}

impl FitReport {
    /// All outcomes, in the order the learners were given.
    #[must_use]
    pub fn outcomes(&self) -> &[FitOutcome] {
        &self.outcomes
    }

    /// Names of the machines that were fitted.
    pub fn fitted(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| o.is_fitted())
            .map(FitOutcome::name)
    }

    /// `(name, reason)` of every failed fit.
    pub fn failed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|o| match o {
            FitOutcome::Failed { name, reason } => Some((name.as_str(), reason.as_str())),
            FitOutcome::Fitted { .. } => None,
        })
    }

    /// Number of machines fitted.
    #[must_use]
    pub fn n_fitted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_fitted()).count()
    }

    /// Number of failed fits.
    #[must_use]
    pub fn n_failed(&self) -> usize {
        self.outcomes.len() - self.n_fitted()
    }
}

/// Fit every learner on `data` in parallel.
///
/// Failures are logged and recorded in the report; they never abort the
/// pass. A later learner whose name repeats an earlier one replaces it.
#[instrument(skip_all, fields(n_learners = learners.len(), n_samples = data.n_samples()))]
pub(crate) fn fit_learners<C: Classifier>(
    learners: &[DynLearner<C>],
    data: &TrainingData<'_>,
) -> (BTreeMap<String, C>, FitReport) {
    let results: Vec<(String, Result<C, MachineError>, u64)> = learners
        .par_iter()
        .map(|learner| {
            let start = Instant::now();
            let fitted = learner.fit(data);
            let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
            (learner.name().to_owned(), fitted, elapsed_ms)
        })
        .collect();

    let mut machines = BTreeMap::new();
    let mut outcomes = Vec::with_capacity(results.len());
    for (name, fitted, elapsed_ms) in results {
        match fitted {
            Ok(machine) => {
                debug!(machine = %name, elapsed_ms, "machine fitted");
                if machines.insert(name.clone(), machine).is_some() {
                    warn!(machine = %name, "duplicate machine name, keeping the later fit");
                }
                outcomes.push(FitOutcome::Fitted { name, elapsed_ms });
            }
            Err(e) => {
                warn!(machine = %name, error = %e, "machine failed to fit, skipping");
                outcomes.push(FitOutcome::Failed {
                    name,
                    reason: e.to_string(),
                });
            }
        }
    }

    let report = FitReport { outcomes };
    info!(
        n_fitted = report.n_fitted(),
        n_failed = report.n_failed(),
        "training pass complete"
    );
    (machines, report)
}
