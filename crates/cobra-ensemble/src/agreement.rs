//! Cached machine outputs over the aggregation subset.

use std::collections::BTreeMap;

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use cobra_machines::{Classifier, MachineError};

use crate::{Cobra, CobraError};

/// Every machine's predicted label on every aggregation point, in
/// aggregation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AgreementTable {
    labels: BTreeMap<String, Vec<usize>>,
}

impl AgreementTable {
    /// Wrap a precomputed `name -> labels` map.
    #[must_use]
    pub fn new(labels: BTreeMap<String, Vec<usize>>) -> Self {
        Self { labels }
    }

    /// Cached labels of one machine.
    #[must_use]
    pub fn labels(&self, name: &str) -> Option<&[usize]> {
        self.labels.get(name).map(Vec::as_slice)
    }

    /// `(name, labels)` pairs, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.labels.iter().map(|(n, l)| (n.as_str(), l.as_slice()))
    }

    /// Number of machines in the table.
    #[must_use]
    pub fn n_machines(&self) -> usize {
        self.labels.len()
    }

    /// Number of aggregation points covered.
    #[must_use]
    pub fn n_points(&self) -> usize {
        self.labels.values().next().map_or(0, Vec::len)
    }
}

/// Per-point confidence output of one machine.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Confidence {
    /// Class probability rows.
    Probabilities(Vec<Vec<f64>>),
    /// Decision-margin rows, for machines without probabilities.
    Margins(Vec<Vec<f64>>),
}

impl Confidence {
    /// The rows, whichever kind they are.
    #[must_use]
    pub fn rows(&self) -> &[Vec<f64>] {
        match self {
            Confidence::Probabilities(rows) | Confidence::Margins(rows) => rows,
        }
    }
}

/// Confidence outputs over the aggregation subset, keyed by machine name.
/// Machines with neither capability are absent.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConfidenceTable {
    rows: BTreeMap<String, Confidence>,
}

impl ConfidenceTable {
    /// Confidence rows of one machine.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Confidence> {
        self.rows.get(name)
    }

    /// `(name, confidence)` pairs, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Confidence)> {
        self.rows.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// Number of machines with a confidence output.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Return `true` if no machine produced a confidence output.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Probabilities if supported, else margins, else `None`.
fn confidence_rows<C: Classifier>(
    machine: &C,
    rows: &[Vec<f64>],
) -> Result<Option<Confidence>, MachineError> {
    match rows
        .iter()
        .map(|r| machine.predict_proba(r))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(proba) => return Ok(Some(Confidence::Probabilities(proba))),
        Err(MachineError::Unsupported { .. }) => {}
        Err(e) => return Err(e),
    }
    match rows
        .iter()
        .map(|r| machine.decision_function(r))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(margins) => Ok(Some(Confidence::Margins(margins))),
        Err(MachineError::Unsupported { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

impl<C: Classifier> Cobra<C> {
    /// Record every machine's label on every aggregation point.
    ///
    /// Must be called again after any change to the registry or the split.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CobraError::NotFitted`] | no data split yet |
    /// | [`CobraError::NoMachines`] | registry is empty |
    /// | [`CobraError::Machine`] | a machine fails to predict |
    #[instrument(skip_all, fields(n_machines = self.machines.len()))]
    pub fn load_machine_predictions(&mut self) -> Result<(), CobraError> {
        let parts = self.split.as_ref().ok_or(CobraError::NotFitted)?;
        if self.machines.is_empty() {
            return Err(CobraError::NoMachines { failed: 0 });
        }
        let rows = parts.aggregation().features();
        let labels: BTreeMap<String, Vec<usize>> = self
            .machines
            .par_iter()
            .map(|(name, machine)| {
                machine
                    .predict_batch(rows)
                    .map(|predicted| (name.clone(), predicted))
            })
            .collect::<Result<_, MachineError>>()?;

        info!(n_points = rows.len(), "agreement table built");
        self.agreement = Some(AgreementTable::new(labels));
        Ok(())
    }

    /// Install a precomputed agreement table.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CobraError::NotFitted`] | no data split yet |
    /// | [`CobraError::UnknownTableMachine`] | table names an unregistered machine |
    /// | [`CobraError::MissingTableMachine`] | a registered machine has no entry |
    /// | [`CobraError::TableLengthMismatch`] | an entry's length differs from the aggregation subset |
    pub fn load_machine_predictions_from(&mut self, table: AgreementTable) -> Result<(), CobraError> {
        let parts = self.split.as_ref().ok_or(CobraError::NotFitted)?;
        let expected = parts.aggregation().len();
        for (name, labels) in table.iter() {
            if !self.machines.contains_key(name) {
                return Err(CobraError::UnknownTableMachine { name: name.to_owned() });
            }
            if labels.len() != expected {
                return Err(CobraError::TableLengthMismatch {
                    name: name.to_owned(),
                    expected,
                    got: labels.len(),
                });
            }
        }
        if let Some(name) = self.machines.keys().find(|n| table.labels(n).is_none()) {
            return Err(CobraError::MissingTableMachine { name: name.clone() });
        }
        debug!(n_machines = table.n_machines(), "agreement table installed");
        self.agreement = Some(table);
        Ok(())
    }

    /// Record each machine's class probabilities on every aggregation point,
    /// or its decision margins when probabilities are unsupported. Machines
    /// with neither are skipped.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CobraError::NotFitted`] | no data split yet |
    /// | [`CobraError::Machine`] | a machine fails for a reason other than an unsupported capability |
    #[instrument(skip_all, fields(n_machines = self.machines.len()))]
    pub fn load_machine_confidences(&mut self) -> Result<(), CobraError> {
        let parts = self.split.as_ref().ok_or(CobraError::NotFitted)?;
        let rows = parts.aggregation().features();
        let mut table = BTreeMap::new();
        for (name, machine) in &self.machines {
            match confidence_rows(machine, rows)? {
                Some(confidence) => {
                    table.insert(name.clone(), confidence);
                }
                None => debug!(machine = %name, "no confidence output, skipping"),
            }
        }
        info!(n_with_confidence = table.len(), "confidence table built");
        self.confidences = Some(ConfidenceTable { rows: table });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cobra_machines::MachineKind;

    use super::*;
    use crate::{CobraConfig, Dataset, Preset};

    fn fitted() -> Cobra {
        let features = (0..30)
            .map(|i| vec![(i % 2) as f64 * 3.0 + (i % 4) as f64 * 0.1])
            .collect();
        let labels = (0..30).map(|i| i % 2).collect();
        let ds = Dataset::new(features, labels).unwrap();
        let preset = Preset::Custom(vec![MachineKind::Tree, MachineKind::Svm, MachineKind::Sgd]);
        let mut cobra: Cobra = Cobra::new(CobraConfig::new().with_preset(preset));
        cobra.fit(&ds).unwrap();
        cobra
    }

    #[test]
    fn table_covers_every_machine_and_point() {
        let cobra = fitted();
        let table = cobra.agreement().unwrap();
        assert_eq!(table.n_machines(), 3);
        for (_, labels) in table.iter() {
            assert_eq!(labels.len(), 15);
        }
    }

    #[test]
    fn precomputed_table_is_validated() {
        let mut cobra = fitted();
        let good = cobra.agreement().unwrap().clone();

        let mut unknown = BTreeMap::new();
        for (name, labels) in good.iter() {
            unknown.insert(name.to_owned(), labels.to_vec());
        }
        unknown.insert("forest".to_owned(), vec![0; 15]);
        let err = cobra
            .load_machine_predictions_from(AgreementTable::new(unknown))
            .unwrap_err();
        assert!(matches!(err, CobraError::UnknownTableMachine { name } if name == "forest"));

        let mut short = BTreeMap::new();
        short.insert("tree".to_owned(), vec![0; 3]);
        let err = cobra
            .load_machine_predictions_from(AgreementTable::new(short))
            .unwrap_err();
        assert!(matches!(err, CobraError::TableLengthMismatch { expected: 15, got: 3, .. }));

        let mut partial = BTreeMap::new();
        partial.insert("tree".to_owned(), vec![0; 15]);
        let err = cobra
            .load_machine_predictions_from(AgreementTable::new(partial))
            .unwrap_err();
        assert!(matches!(err, CobraError::MissingTableMachine { .. }));

        cobra.load_machine_predictions_from(good).unwrap();
    }

    #[test]
    fn confidences_fall_back_to_margins() {
        let mut cobra = fitted();
        cobra.load_machine_confidences().unwrap();
        let table = cobra.confidences().unwrap();
        assert_eq!(table.len(), 3);
        assert!(matches!(table.get("tree"), Some(Confidence::Probabilities(_))));
        assert!(matches!(table.get("svm"), Some(Confidence::Margins(_))));
        assert!(matches!(table.get("sgd"), Some(Confidence::Margins(_))));
        assert_eq!(table.get("svm").unwrap().rows().len(), 15);
    }
}
