//! Consensus selection and voting.

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, instrument};

use cobra_machines::{Classifier, MachineError};

use crate::{Cobra, CobraError, agreement::AgreementTable, split::SplitData};

/// Label returned when no aggregation point reaches the quorum.
pub const FALLBACK_LABEL: usize = 0;

/// Aggregate decision for one query.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Selection {
    /// Majority label of the selected points, or [`FALLBACK_LABEL`].
    pub label: usize,
    /// Selected aggregation indices in `[0, l - k)`, ascending.
    pub points: Vec<usize>,
}

impl Selection {
    /// Return `true` if no point reached the quorum and [`FALLBACK_LABEL`]
    /// was returned instead of a vote.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.points.is_empty()
    }
}

/// Aggregate decisions for a batch, with diagnostics.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BatchPrediction {
    /// One label per query, in input order.
    pub labels: Vec<usize>,
    /// One selection per query, in input order.
    pub selections: Vec<Selection>,
    /// Mean number of selected points per processed query.
    pub mean_selected: f64,
}

/// Votes of the selected points; the lowest label wins ties.
fn majority(points: &[usize], truth: &[usize], n_classes: usize) -> usize {
    let mut votes = vec![0usize; n_classes];
    for &i in points {
        votes[truth[i]] += 1;
    }
    let mut best = 0;
    for (label, &count) in votes.iter().enumerate() {
        if count > votes[best] {
            best = label;
        }
    }
    best
}

impl<C: Classifier> Cobra<C> {
    fn ready(&self) -> Result<(&SplitData, &AgreementTable), CobraError> {
        let parts = self.split.as_ref().ok_or(CobraError::NotFitted)?;
        if self.machines.is_empty() {
            return Err(CobraError::NoMachines { failed: 0 });
        }
        let table = self.agreement.as_ref().ok_or(CobraError::AgreementNotBuilt)?;
        Ok((parts, table))
    }

    fn check_query(&self, query: &[f64], expected: usize) -> Result<(), CobraError> {
        if query.len() != expected {
            return Err(CobraError::FeatureMismatch {
                expected,
                got: query.len(),
            });
        }
        if let Some(feature_index) = query.iter().position(|v| !v.is_finite()) {
            return Err(CobraError::NonFiniteQuery { feature_index });
        }
        Ok(())
    }

    fn resolve_quorum(&self, quorum: Option<usize>) -> Result<usize, CobraError> {
        let n_machines = self.machines.len();
        let quorum = quorum.or(self.config.quorum()).unwrap_or(n_machines);
        if quorum == 0 || quorum > n_machines {
            return Err(CobraError::InvalidQuorum { quorum, n_machines });
        }
        Ok(quorum)
    }

    fn select(
        &self,
        query: &[f64],
        quorum: usize,
        parts: &SplitData,
        table: &AgreementTable,
    ) -> Result<Selection, CobraError> {
        let aggregation = parts.aggregation();
        let mut row_check = vec![0usize; aggregation.len()];
        for (name, machine) in &self.machines {
            let live = machine.predict(query)?;
            let cached = table.labels(name).ok_or(CobraError::AgreementNotBuilt)?;
            for (count, &label) in row_check.iter_mut().zip(cached) {
                if label == live {
                    *count += 1;
                }
            }
        }

        let rule = self.config.quorum_rule();
        let points: Vec<usize> = row_check
            .iter()
            .enumerate()
            .filter(|&(_, &count)| rule.selects(count, quorum))
            .map(|(i, _)| i)
            .collect();

        if points.is_empty() {
            debug!(quorum, "no aggregation point reached the quorum, using fallback label");
            return Ok(Selection {
                label: FALLBACK_LABEL,
                points,
            });
        }
        let label = majority(&points, aggregation.labels(), aggregation.n_classes());
        Ok(Selection { label, points })
    }

    /// Aggregate decision and selected points for a single query.
    ///
    /// `quorum` overrides the configured quorum; `None` falls back to the
    /// config and then to the machine count.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CobraError::NotFitted`] | no data split yet |
    /// | [`CobraError::NoMachines`] | registry is empty |
    /// | [`CobraError::AgreementNotBuilt`] | agreement table missing or stale |
    /// | [`CobraError::FeatureMismatch`] | wrong query length |
    /// | [`CobraError::NonFiniteQuery`] | NaN or infinite query value |
    /// | [`CobraError::InvalidQuorum`] | quorum outside `1..=n_machines` |
    /// | [`CobraError::Machine`] | a machine fails to predict |
    pub fn predict_one(&self, query: &[f64], quorum: Option<usize>) -> Result<Selection, CobraError> {
        let (parts, table) = self.ready()?;
        self.check_query(query, parts.aggregation().n_features())?;
        let quorum = self.resolve_quorum(quorum)?;
        self.select(query, quorum, parts, table)
    }

    /// Aggregate label for a single feature vector.
    ///
    /// # Errors
    ///
    /// See [`Cobra::predict_one`].
    pub fn predict_single(&self, query: &[f64]) -> Result<usize, CobraError> {
        self.predict_one(query, None).map(|s| s.label)
    }

    /// Aggregate labels for a batch, evaluated in parallel, order preserved.
    ///
    /// # Errors
    ///
    /// The first error of [`Cobra::predict_one`] over the batch.
    pub fn predict(&self, queries: &[Vec<f64>], quorum: Option<usize>) -> Result<Vec<usize>, CobraError> {
        Ok(self.predict_with_info(queries, quorum)?.labels)
    }

    /// Aggregate labels, selections and the mean selection size for a batch.
    ///
    /// # Errors
    ///
    /// The first error of [`Cobra::predict_one`] over the batch.
    #[instrument(skip_all, fields(n_queries = queries.len()))]
    pub fn predict_with_info(
        &self,
        queries: &[Vec<f64>],
        quorum: Option<usize>,
    ) -> Result<BatchPrediction, CobraError> {
        let (parts, table) = self.ready()?;
        let quorum = self.resolve_quorum(quorum)?;
        let n_features = parts.aggregation().n_features();

        let selections: Vec<Selection> = queries
            .par_iter()
            .map(|q| {
                self.check_query(q, n_features)?;
                self.select(q, quorum, parts, table)
            })
            .collect::<Result<_, CobraError>>()?;

        let total: usize = selections.iter().map(|s| s.points.len()).sum();
        let mean_selected = if selections.is_empty() {
            0.0
        } else {
            total as f64 / selections.len() as f64
        };
        debug!(quorum, mean_selected, "batch aggregated");

        Ok(BatchPrediction {
            labels: selections.iter().map(|s| s.label).collect(),
            selections,
            mean_selected,
        })
    }

    /// Mean class distribution over every machine with probability output.
    /// Machines without it are skipped.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CobraError::NotFitted`] | no data split yet |
    /// | [`CobraError::FeatureMismatch`] | wrong query length |
    /// | [`CobraError::NonFiniteQuery`] | NaN or infinite query value |
    /// | [`CobraError::NoConfidenceSource`] | no machine supports probabilities |
    /// | [`CobraError::ProbabilityLengthMismatch`] | a distribution has the wrong class count |
    /// | [`CobraError::Machine`] | a machine fails for another reason |
    pub fn predict_proba(&self, query: &[f64]) -> Result<Vec<f64>, CobraError> {
        let parts = self.split.as_ref().ok_or(CobraError::NotFitted)?;
        self.check_query(query, parts.aggregation().n_features())?;

        let n_classes = parts.aggregation().n_classes();
        let mut sum = vec![0.0; n_classes];
        let mut n_sources = 0usize;
        for (name, machine) in &self.machines {
            match machine.predict_proba(query) {
                Ok(proba) => {
                    if proba.len() != n_classes {
                        return Err(CobraError::ProbabilityLengthMismatch {
                            name: name.clone(),
                            expected: n_classes,
                            got: proba.len(),
                        });
                    }
                    for (s, p) in sum.iter_mut().zip(&proba) {
                        *s += p;
                    }
                    n_sources += 1;
                }
                Err(MachineError::Unsupported { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        if n_sources == 0 {
            return Err(CobraError::NoConfidenceSource);
        }
        sum.iter_mut().for_each(|s| *s /= n_sources as f64);
        Ok(sum)
    }

    /// Row-wise [`Cobra::predict_proba`], evaluated in parallel.
    ///
    /// # Errors
    ///
    /// The first error of [`Cobra::predict_proba`] over the batch.
    pub fn predict_proba_batch(&self, queries: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, CobraError> {
        queries.par_iter().map(|q| self.predict_proba(q)).collect()
    }
}
