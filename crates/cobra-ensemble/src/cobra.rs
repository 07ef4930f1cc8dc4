//! The ensemble: machine registry, data split and cached agreement state.

use std::collections::BTreeMap;

use tracing::{debug, info, instrument};

use cobra_machines::{Classifier, Machine};

use crate::{
    CobraConfig, CobraError, Dataset,
    agreement::{AgreementTable, ConfidenceTable},
    split::{SplitData, split},
    trainer::{DynLearner, FitReport, fit_learners},
};

/// A COBRA classifier ensemble.
///
/// The typical sequence is [`Cobra::split_data`], [`Cobra::load_learners`]
/// (or [`Cobra::load_default`]), then
/// [`Cobra::load_machine_predictions`]; [`Cobra::fit`] runs all three.
/// Any change to the registry or the aggregation subset drops the agreement
/// table, and prediction fails with [`CobraError::AgreementNotBuilt`] until
/// it is rebuilt.
///
/// `C` is the machine type. The default, [`Machine`], covers every built-in
/// learner and is serializable.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Cobra<C = Machine> {
    pub(crate) config: CobraConfig,
    pub(crate) split: Option<SplitData>,
    pub(crate) machines: BTreeMap<String, C>,
    pub(crate) agreement: Option<AgreementTable>,
    pub(crate) confidences: Option<ConfidenceTable>,
}

impl<C: Classifier> Cobra<C> {
    /// Create an empty ensemble.
    #[must_use]
    pub fn new(config: CobraConfig) -> Self {
        Self {
            config,
            split: None,
            machines: BTreeMap::new(),
            agreement: None,
            confidences: None,
        }
    }

    /// Split `dataset` into the training and aggregation subsets according
    /// to the configured [`SplitConfig`](crate::SplitConfig) and seed.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CobraError::InvalidSplit`] | bounds resolve to `k > l` |
    /// | [`CobraError::EmptyAggregationSubset`] | `k == l` |
    #[instrument(skip_all, fields(n = dataset.len()))]
    pub fn split_data(&mut self, dataset: &Dataset) -> Result<(), CobraError> {
        let parts = split(dataset, self.config.split(), self.config.seed())?;
        self.install_split(parts)
    }

    /// Use pre-split subsets instead of splitting a dataset.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CobraError::SubsetWidthMismatch`] | subsets differ in feature count |
    /// | [`CobraError::SubsetClassMismatch`] | subsets differ in class names |
    /// | [`CobraError::EmptyAggregationSubset`] | `aggregation` is empty |
    pub fn set_subsets(&mut self, training: Dataset, aggregation: Dataset) -> Result<(), CobraError> {
        self.install_split(SplitData::new(training, aggregation)?)
    }

    fn install_split(&mut self, parts: SplitData) -> Result<(), CobraError> {
        if parts.aggregation().is_empty() {
            return Err(CobraError::EmptyAggregationSubset);
        }
        info!(k = parts.k(), l = parts.l(), "data split installed");
        self.split = Some(parts);
        self.invalidate();
        Ok(())
    }

    /// Fit `learners` on the training subset and register every machine
    /// that fits. Failed fits are logged and listed in the report.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CobraError::NotFitted`] | no data split yet |
    /// | [`CobraError::EmptyTrainingSubset`] | `k == 0` |
    /// | [`CobraError::NoMachines`] | no learner fitted |
    pub fn load_learners(&mut self, learners: &[DynLearner<C>]) -> Result<FitReport, CobraError> {
        let parts = self.split.as_ref().ok_or(CobraError::NotFitted)?;
        let data = parts.training().training_data()?;
        let (fitted, report) = fit_learners(learners, &data);
        if report.n_fitted() == 0 {
            return Err(CobraError::NoMachines {
                failed: report.n_failed(),
            });
        }
        self.machines.extend(fitted);
        self.invalidate();
        Ok(report)
    }

    /// Register an already trained machine under `name`, replacing any
    /// machine of the same name.
    ///
    /// # Errors
    ///
    /// Returns [`CobraError::FeatureMismatch`] when data is already split and
    /// the machine expects a different feature count.
    pub fn load_machine(&mut self, name: impl Into<String>, machine: C) -> Result<(), CobraError> {
        let name = name.into();
        if let Some(expected) = self.n_features()
            && machine.n_features() != expected
        {
            return Err(CobraError::FeatureMismatch {
                expected,
                got: machine.n_features(),
            });
        }
        debug!(machine = %name, "machine registered");
        self.machines.insert(name, machine);
        self.invalidate();
        Ok(())
    }

    /// Split, fit `learners` and build the agreement table.
    ///
    /// # Errors
    ///
    /// Any error of [`Cobra::split_data`], [`Cobra::load_learners`] or
    /// [`Cobra::load_machine_predictions`].
    pub fn fit_with(
        &mut self,
        dataset: &Dataset,
        learners: &[DynLearner<C>],
    ) -> Result<FitReport, CobraError> {
        self.split_data(dataset)?;
        let report = self.load_learners(learners)?;
        self.load_machine_predictions()?;
        Ok(report)
    }

    pub(crate) fn invalidate(&mut self) {
        if self.agreement.take().is_some() {
            debug!("agreement table invalidated");
        }
        self.confidences = None;
    }

    /// Registered machine names, sorted.
    #[must_use]
    pub fn machine_names(&self) -> Vec<&str> {
        self.machines.keys().map(String::as_str).collect()
    }

    /// Number of registered machines.
    #[must_use]
    pub fn n_machines(&self) -> usize {
        self.machines.len()
    }

    /// Look up a registered machine.
    #[must_use]
    pub fn machine(&self, name: &str) -> Option<&C> {
        self.machines.get(name)
    }

    /// The current split, if any.
    #[must_use]
    pub fn split(&self) -> Option<&SplitData> {
        self.split.as_ref()
    }

    /// The agreement table, if built and current.
    #[must_use]
    pub fn agreement(&self) -> Option<&AgreementTable> {
        self.agreement.as_ref()
    }

    /// The confidence table, if built and current.
    #[must_use]
    pub fn confidences(&self) -> Option<&ConfidenceTable> {
        self.confidences.as_ref()
    }

    /// Return the configuration.
    #[must_use]
    pub fn config(&self) -> &CobraConfig {
        &self.config
    }

    /// Class names of the split data.
    #[must_use]
    pub fn class_names(&self) -> Option<&[String]> {
        self.split.as_ref().map(|s| s.aggregation().class_names())
    }

    /// Feature count of the split data.
    #[must_use]
    pub fn n_features(&self) -> Option<usize> {
        self.split.as_ref().map(|s| s.aggregation().n_features())
    }
}

impl Cobra<Machine> {
    /// Fit the configured [`Preset`](crate::Preset), seeding every learner
    /// with the ensemble seed.
    ///
    /// # Errors
    ///
    /// See [`Cobra::load_learners`].
    pub fn load_default(&mut self) -> Result<FitReport, CobraError> {
        let seed = self.config.seed();
        let learners: Vec<DynLearner<Machine>> = self
            .config
            .preset()
            .kinds()
            .into_iter()
            .map(|kind| kind.learner(seed))
            .collect();
        info!(preset = %self.config.preset(), "fitting preset machines");
        self.load_learners(&learners)
    }

    /// Split `dataset`, fit the configured preset and build the agreement
    /// table.
    ///
    /// # Errors
    ///
    /// Any error of [`Cobra::split_data`], [`Cobra::load_default`] or
    /// [`Cobra::load_machine_predictions`].
    pub fn fit(&mut self, dataset: &Dataset) -> Result<FitReport, CobraError> {
        self.split_data(dataset)?;
        let report = self.load_default()?;
        self.load_machine_predictions()?;
        Ok(report)
    }
}
