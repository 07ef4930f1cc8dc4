//! Closed set of built-in machines and the name registry used by presets.

use std::{fmt, str::FromStr};

use crate::{
    DecisionTree, DecisionTreeConfig, Knn, KnnConfig, Lda, LdaConfig, Logistic, LogisticConfig,
    MachineError, Mlp, MlpConfig, NaiveBayes, NaiveBayesConfig, Sgd, SgdConfig, Svm, SvmConfig,
    classifier::{Classifier, Learner, TrainingData},
};

/// Any fitted built-in classifier.
///
/// Serializable as a whole, so an ensemble of `Machine`s can be persisted
/// without trait objects.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Machine {
    /// CART decision tree.
    Tree(DecisionTree),
    /// k-nearest neighbors.
    Knn(Knn),
    /// RBF support vector classifier.
    Svm(Svm),
    /// SGD linear classifier.
    Sgd(Sgd),
    /// Multinomial logistic regression.
    Logistic(Logistic),
    /// Gaussian naive Bayes.
    NaiveBayes(NaiveBayes),
    /// Linear discriminant analysis.
    Lda(Lda),
    /// One-hidden-layer perceptron.
    Mlp(Mlp),
}

macro_rules! dispatch {
    ($self:ident, $m:ident => $body:expr) => {
        match $self {
            Machine::Tree($m) => $body,
            Machine::Knn($m) => $body,
            Machine::Svm($m) => $body,
            Machine::Sgd($m) => $body,
            Machine::Logistic($m) => $body,
            Machine::NaiveBayes($m) => $body,
            Machine::Lda($m) => $body,
            Machine::Mlp($m) => $body,
        }
    };
}

impl Machine {
    /// Kind of the wrapped model.
    #[must_use]
    pub fn kind(&self) -> MachineKind {
        match self {
            Machine::Tree(_) => MachineKind::Tree,
            Machine::Knn(_) => MachineKind::Knn,
            Machine::Svm(_) => MachineKind::Svm,
            Machine::Sgd(_) => MachineKind::Sgd,
            Machine::Logistic(_) => MachineKind::Logistic,
            Machine::NaiveBayes(_) => MachineKind::NaiveBayes,
            Machine::Lda(_) => MachineKind::Lda,
            Machine::Mlp(_) => MachineKind::NeuralNetwork,
        }
    }
}

impl Classifier for Machine {
    fn n_features(&self) -> usize {
        dispatch!(self, m => m.n_features())
    }

    fn n_classes(&self) -> usize {
        dispatch!(self, m => m.n_classes())
    }

    fn predict(&self, sample: &[f64]) -> Result<usize, MachineError> {
        dispatch!(self, m => m.predict(sample))
    }

    fn predict_proba(&self, sample: &[f64]) -> Result<Vec<f64>, MachineError> {
        dispatch!(self, m => m.predict_proba(sample))
    }

    fn decision_function(&self, sample: &[f64]) -> Result<Vec<f64>, MachineError> {
        dispatch!(self, m => m.decision_function(sample))
    }

    fn predict_batch(&self, samples: &[Vec<f64>]) -> Result<Vec<usize>, MachineError> {
        dispatch!(self, m => m.predict_batch(samples))
    }
}

macro_rules! impl_from {
    ($($variant:ident($model:ty)),* $(,)?) => {
        $(
            impl From<$model> for Machine {
                fn from(model: $model) -> Self {
                    Machine::$variant(model)
                }
            }
        )*
    };
}

impl_from!(
    Tree(DecisionTree),
    Knn(Knn),
    Svm(Svm),
    Sgd(Sgd),
    Logistic(Logistic),
    NaiveBayes(NaiveBayes),
    Lda(Lda),
    Mlp(Mlp),
);

/// Registry name of a built-in machine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub enum MachineKind {
    /// `"tree"`
    Tree,
    /// `"knn"`
    Knn,
    /// `"svm"`
    Svm,
    /// `"sgd"`
    Sgd,
    /// `"logreg"`
    Logistic,
    /// `"naive_bayes"`
    NaiveBayes,
    /// `"lda"`
    Lda,
    /// `"neural_network"`
    NeuralNetwork,
}

impl MachineKind {
    /// Every built-in kind.
    pub const ALL: [MachineKind; 8] = [
        MachineKind::Tree,
        MachineKind::Knn,
        MachineKind::Svm,
        MachineKind::Sgd,
        MachineKind::Logistic,
        MachineKind::NaiveBayes,
        MachineKind::Lda,
        MachineKind::NeuralNetwork,
    ];

    /// Registry name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            MachineKind::Tree => "tree",
            MachineKind::Knn => "knn",
            MachineKind::Svm => "svm",
            MachineKind::Sgd => "sgd",
            MachineKind::Logistic => "logreg",
            MachineKind::NaiveBayes => "naive_bayes",
            MachineKind::Lda => "lda",
            MachineKind::NeuralNetwork => "neural_network",
        }
    }

    /// The four-machine default preset.
    #[must_use]
    pub fn basic() -> Vec<MachineKind> {
        vec![
            MachineKind::Sgd,
            MachineKind::Tree,
            MachineKind::Knn,
            MachineKind::Svm,
        ]
    }

    /// The seven-machine extended preset.
    #[must_use]
    pub fn advanced() -> Vec<MachineKind> {
        vec![
            MachineKind::Tree,
            MachineKind::Knn,
            MachineKind::Svm,
            MachineKind::Logistic,
            MachineKind::NaiveBayes,
            MachineKind::Lda,
            MachineKind::NeuralNetwork,
        ]
    }

    /// Default learner for this kind. `seed` drives any randomness.
    #[must_use]
    pub fn learner(self, seed: u64) -> Box<dyn Learner<Model = Machine> + Send + Sync> {
        match self {
            MachineKind::Tree => Box::new(IntoMachine(DecisionTreeConfig::new().with_seed(seed))),
            MachineKind::Knn => Box::new(IntoMachine(KnnConfig::new())),
            MachineKind::Svm => Box::new(IntoMachine(SvmConfig::new().with_seed(seed))),
            MachineKind::Sgd => Box::new(IntoMachine(SgdConfig::new().with_seed(seed))),
            MachineKind::Logistic => Box::new(IntoMachine(LogisticConfig::new())),
            MachineKind::NaiveBayes => Box::new(IntoMachine(NaiveBayesConfig::new())),
            MachineKind::Lda => Box::new(IntoMachine(LdaConfig::new())),
            MachineKind::NeuralNetwork => Box::new(IntoMachine(MlpConfig::new().with_seed(seed))),
        }
    }
}

impl fmt::Display for MachineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown machine name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown machine '{0}', expected one of: tree, knn, svm, sgd, logreg, naive_bayes, lda, neural_network")]
pub struct UnknownMachine(pub String);

impl FromStr for MachineKind {
    type Err = UnknownMachine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MachineKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| UnknownMachine(s.to_owned()))
    }
}

/// Adapts any learner whose model converts into [`Machine`].
#[derive(Debug, Clone)]
pub struct IntoMachine<L>(pub L);

impl<L> Learner for IntoMachine<L>
where
    L: Learner,
    L::Model: Into<Machine>,
{
    type Model = Machine;

    fn name(&self) -> &str {
        self.0.name()
    }

    fn fit(&self, data: &TrainingData<'_>) -> Result<Machine, MachineError> {
        self.0.fit(data).map(Into::into)
    }
}
