use std::{fmt, str::FromStr};

use cobra_machines::{MachineKind, UnknownMachine};

use crate::split::SplitConfig;

/// Named machine list used by [`Cobra::load_default`](crate::Cobra::load_default).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Preset {
    /// `sgd`, `tree`, `knn`, `svm`.
    Basic,
    /// `tree`, `knn`, `svm`, `logreg`, `naive_bayes`, `lda`, `neural_network`.
    Advanced,
    /// An explicit list.
    Custom(Vec<MachineKind>),
}

impl Preset {
    /// Machine kinds in fit order.
    #[must_use]
    pub fn kinds(&self) -> Vec<MachineKind> {
        match self {
            Preset::Basic => MachineKind::basic(),
            Preset::Advanced => MachineKind::advanced(),
            Preset::Custom(kinds) => kinds.clone(),
        }
    }

    /// Parse a comma-separated list of machine names into a custom preset.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownMachine`] for the first unrecognized name.
    pub fn from_names(names: &str) -> Result<Self, UnknownMachine> {
        names
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<MachineKind>, _>>()
            .map(Preset::Custom)
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preset::Basic => f.write_str("basic"),
            Preset::Advanced => f.write_str("advanced"),
            Preset::Custom(kinds) => {
                let names: Vec<&str> = kinds.iter().map(|k| k.name()).collect();
                f.write_str(&names.join(","))
            }
        }
    }
}

impl FromStr for Preset {
    type Err = UnknownMachine;

    /// `"basic"`, `"advanced"`, or a comma-separated machine list.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Preset::Basic),
            "advanced" => Ok(Preset::Advanced),
            other => Preset::from_names(other),
        }
    }
}

/// How a point's agreement count is compared with the quorum `M`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum QuorumRule {
    /// Select points agreed on by exactly `M` machines.
    Exact,
    /// Select points agreed on by at least `M` machines. The selection then
    /// shrinks monotonically as `M` grows.
    AtLeast,
}

impl QuorumRule {
    pub(crate) fn selects(self, agreeing: usize, quorum: usize) -> bool {
        match self {
            QuorumRule::Exact => agreeing == quorum,
            QuorumRule::AtLeast => agreeing >= quorum,
        }
    }
}

/// Configuration for a COBRA ensemble.
///
/// Construct via [`CobraConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter     | Default                  |
/// |---------------|--------------------------|
/// | `seed`        | 42                       |
/// | `preset`      | `Basic`                  |
/// | `split`       | `SplitConfig::default()` |
/// | `quorum`      | `None` (all machines)    |
/// | `quorum_rule` | `Exact`                  |
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CobraConfig {
    seed: u64,
    preset: Preset,
    split: SplitConfig,
    quorum: Option<usize>,
    quorum_rule: QuorumRule,
}

impl CobraConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            seed: 42,
            preset: Preset::Basic,
            split: SplitConfig::new(),
            quorum: None,
            quorum_rule: QuorumRule::Exact,
        }
    }

    /// Set the seed shared by shuffling and every seeded learner.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the default machine list.
    #[must_use]
    pub fn with_preset(mut self, preset: Preset) -> Self {
        self.preset = preset;
        self
    }

    /// Set the split policy.
    #[must_use]
    pub fn with_split(mut self, split: SplitConfig) -> Self {
        self.split = split;
        self
    }

    /// Set the default quorum. `None` means every registered machine.
    #[must_use]
    pub fn with_quorum(mut self, quorum: Option<usize>) -> Self {
        self.quorum = quorum;
        self
    }

    /// Set the quorum comparison rule.
    #[must_use]
    pub fn with_quorum_rule(mut self, quorum_rule: QuorumRule) -> Self {
        self.quorum_rule = quorum_rule;
        self
    }

    /// Return the seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Return the default machine list.
    #[must_use]
    pub fn preset(&self) -> &Preset {
        &self.preset
    }

    /// Return the split policy.
    #[must_use]
    pub fn split(&self) -> &SplitConfig {
        &self.split
    }

    /// Return the default quorum, if set.
    #[must_use]
    pub fn quorum(&self) -> Option<usize> {
        self.quorum
    }

    /// Return the quorum comparison rule.
    #[must_use]
    pub fn quorum_rule(&self) -> QuorumRule {
        self.quorum_rule
    }
}

impl Default for CobraConfig {
    fn default() -> Self {
        Self::new()
    }
}
