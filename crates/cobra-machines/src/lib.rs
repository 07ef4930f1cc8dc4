//! Base classifiers for COBRA aggregation.
//!
//! Every machine implements the [`Classifier`] capability trait: `predict` is
//! mandatory, `predict_proba` and `decision_function` are optional. Unfitted
//! configurations implement [`Learner`]. The [`Machine`] enum wraps every
//! built-in model so that an ensemble can be serialized as a whole, and
//! [`MachineKind`] maps registry names such as `"svm"` to default learners.

mod classifier;
mod error;
mod knn;
mod lda;
mod linalg;
mod logistic;
mod machine;
mod mlp;
mod naive_bayes;
mod node;
mod sgd;
mod split;
mod svm;
mod tree;

pub use classifier::{Classifier, Learner, TrainingData};
pub use error::{Capability, MachineError};
pub use knn::{DistanceMetric, Knn, KnnConfig};
pub use lda::{Lda, LdaConfig};
pub use logistic::{Logistic, LogisticConfig};
pub use machine::{IntoMachine, Machine, MachineKind, UnknownMachine};
pub use mlp::{Mlp, MlpConfig};
pub use naive_bayes::{NaiveBayes, NaiveBayesConfig};
pub use node::{FeatureIndex, Node, NodeIndex};
pub use sgd::{Sgd, SgdConfig, SgdLoss};
pub use split::SplitCriterion;
pub use svm::{Gamma, MAX_KERNEL_SAMPLES, Svm, SvmConfig};
pub use tree::{DecisionTree, DecisionTreeConfig};
