use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::{
    MachineError,
    classifier::{Classifier, Learner, TrainingData, check_sample},
    node::{Node, NodeIndex},
    split::{SplitCriterion, SplitSearch},
};

/// Configuration for a CART decision tree.
///
/// Construct via [`DecisionTreeConfig::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter           | Default               |
/// |---------------------|-----------------------|
/// | `criterion`         | `Gini`                |
/// | `max_depth`         | `None` (unlimited)    |
/// | `min_samples_split` | 2                     |
/// | `min_samples_leaf`  | 1                     |
/// | `max_features`      | `None` (all features) |
/// | `seed`              | 42                    |
#[derive(Debug, Clone)]
pub struct DecisionTreeConfig {
    criterion: SplitCriterion,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    max_features: Option<usize>,
    seed: u64,
}

impl DecisionTreeConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            criterion: SplitCriterion::Gini,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 42,
        }
    }

    /// Set the split quality criterion.
    #[must_use]
    pub fn with_criterion(mut self, criterion: SplitCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Set the maximum tree depth.
    ///
    /// `Some(d)` limits depth to `d` levels (root is depth 0).
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum number of samples required to attempt a split.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Set the minimum number of samples required in each leaf after a split.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set the number of features sampled at each split. `None` uses all.
    #[must_use]
    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the split criterion.
    #[must_use]
    pub fn criterion(&self) -> SplitCriterion {
        self.criterion
    }

    /// Return the maximum depth limit, if any.
    #[must_use]
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Train a decision tree.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---|---|
    /// | [`MachineError::InvalidMaxDepth`] | `max_depth` is `Some(0)` |
    /// | [`MachineError::InvalidMinSamplesSplit`] | `min_samples_split` < 2 |
    /// | [`MachineError::InvalidMinSamplesLeaf`] | `min_samples_leaf` < 1 |
    /// | [`MachineError::InvalidMaxFeatures`] | `max_features` outside [1, n_features] |
    #[instrument(skip_all, fields(n_samples = data.n_samples()))]
    pub fn fit(&self, data: &TrainingData<'_>) -> Result<DecisionTree, MachineError> {
        if self.max_depth == Some(0) {
            return Err(MachineError::InvalidMaxDepth { max_depth: 0 });
        }
        if self.min_samples_split < 2 {
            return Err(MachineError::InvalidMinSamplesSplit {
                min_samples_split: self.min_samples_split,
            });
        }
        if self.min_samples_leaf < 1 {
            return Err(MachineError::InvalidMinSamplesLeaf {
                min_samples_leaf: self.min_samples_leaf,
            });
        }
        let n_features = data.n_features();
        let max_features = self.max_features.unwrap_or(n_features);
        if max_features == 0 || max_features > n_features {
            return Err(MachineError::InvalidMaxFeatures {
                max_features,
                n_features,
            });
        }

        // Column-major copy for the split scan.
        let columns: Vec<Vec<f64>> = (0..n_features)
            .map(|f| data.features().iter().map(|row| row[f]).collect())
            .collect();

        let mut builder = TreeBuilder {
            config: self,
            search: SplitSearch {
                columns: &columns,
                labels: data.labels(),
                n_classes: data.n_classes(),
                criterion: self.criterion,
                max_features,
                min_samples_leaf: self.min_samples_leaf,
            },
            rng: ChaCha8Rng::seed_from_u64(self.seed),
            arena: Vec::new(),
        };
        let samples: Vec<usize> = (0..data.n_samples()).collect();
        builder.grow(&samples, 0);

        let tree = DecisionTree {
            nodes: builder.arena,
            n_features,
            n_classes: data.n_classes(),
        };
        debug!(n_nodes = tree.n_nodes(), depth = tree.depth(), "decision tree built");
        Ok(tree)
    }
}

impl Default for DecisionTreeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Learner for DecisionTreeConfig {
    type Model = DecisionTree;

    fn name(&self) -> &str {
        "tree"
    }

    fn fit(&self, data: &TrainingData<'_>) -> Result<DecisionTree, MachineError> {
        DecisionTreeConfig::fit(self, data)
    }
}

struct TreeBuilder<'a> {
    config: &'a DecisionTreeConfig,
    search: SplitSearch<'a>,
    rng: ChaCha8Rng,
    arena: Vec<Node>,
}

impl TreeBuilder<'_> {
    /// Grow the subtree for `samples` and return its root index.
    fn grow(&mut self, samples: &[usize], depth: usize) -> NodeIndex {
        let n_samples = samples.len();
        let mut class_counts = vec![0usize; self.search.n_classes];
        for &s in samples {
            class_counts[self.search.labels[s]] += 1;
        }

        let pure = class_counts.iter().filter(|&&c| c > 0).count() <= 1;
        let too_few = n_samples < self.config.min_samples_split;
        let too_deep = self.config.max_depth.is_some_and(|d| depth >= d);

        let split = if pure || too_few || too_deep {
            None
        } else {
            self.search.best(samples, &mut self.rng)
        };

        let Some(split) = split else {
            return self.push_leaf(&class_counts, n_samples);
        };

        // Reserve the slot so children get higher indices, then patch.
        let idx = self.arena.len();
        self.arena.push(Node::Leaf {
            prediction: 0,
            distribution: Vec::new(),
            n_samples,
        });
        let left = self.grow(&split.left, depth + 1);
        let right = self.grow(&split.right, depth + 1);
        self.arena[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
            n_samples,
        };
        NodeIndex::new(idx)
    }

    fn push_leaf(&mut self, class_counts: &[usize], n_samples: usize) -> NodeIndex {
        let total = n_samples.max(1) as f64;
        let distribution: Vec<f64> = class_counts.iter().map(|&c| c as f64 / total).collect();
        let mut prediction = 0;
        for (class, &count) in class_counts.iter().enumerate() {
            if count > class_counts[prediction] {
                prediction = class;
            }
        }
        let idx = self.arena.len();
        self.arena.push(Node::Leaf {
            prediction,
            distribution,
            n_samples,
        });
        NodeIndex::new(idx)
    }
}

/// A fitted CART decision tree.
///
/// Stored as an arena `Vec<Node>` with index references; the root is index 0.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    n_features: usize,
    n_classes: usize,
}

impl DecisionTree {
    /// Return the total number of nodes in the tree.
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the number of leaf nodes.
    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Return the maximum depth of the tree. A single leaf has depth 0.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut max_depth = 0usize;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, d)) = stack.pop() {
            match self.nodes.get(idx) {
                Some(Node::Split { left, right, .. }) => {
                    stack.push((left.index(), d + 1));
                    stack.push((right.index(), d + 1));
                }
                Some(Node::Leaf { .. }) => max_depth = max_depth.max(d),
                None => {}
            }
        }
        max_depth
    }

    /// Walk from the root to the leaf that `sample` lands in.
    fn leaf(&self, sample: &[f64]) -> Result<&Node, MachineError> {
        check_sample(sample, self.n_features)?;
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if sample[feature.index()] <= *threshold {
                        left.index()
                    } else {
                        right.index()
                    };
                }
                leaf @ Node::Leaf { .. } => return Ok(leaf),
            }
        }
    }
}

impl Classifier for DecisionTree {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict(&self, sample: &[f64]) -> Result<usize, MachineError> {
        match self.leaf(sample)? {
            Node::Leaf { prediction, .. } => Ok(*prediction),
            Node::Split { .. } => unreachable!("leaf() always ends at a leaf"),
        }
    }

    /// Leaf class frequencies, length `n_classes`, summing to 1.
    fn predict_proba(&self, sample: &[f64]) -> Result<Vec<f64>, MachineError> {
        match self.leaf(sample)? {
            Node::Leaf { distribution, .. } => Ok(distribution.clone()),
            Node::Split { .. } => unreachable!("leaf() always ends at a leaf"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit(features: &[Vec<f64>], labels: &[usize], config: DecisionTreeConfig) -> DecisionTree {
        let n_classes = labels.iter().max().map_or(1, |m| m + 1);
        let data = TrainingData::new(features, labels, n_classes).unwrap();
        config.fit(&data).unwrap()
    }

    fn separable() -> (Vec<Vec<f64>>, Vec<usize>) {
        let features = vec![
            vec![1.0, 0.0],
            vec![2.0, 0.0],
            vec![3.0, 0.0],
            vec![10.0, 0.0],
            vec![11.0, 0.0],
            vec![12.0, 0.0],
        ];
        (features, vec![0, 0, 0, 1, 1, 1])
    }

    #[test]
    fn pure_dataset_single_leaf() {
        let features = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let tree = fit(&features, &[0, 0, 0], DecisionTreeConfig::new());
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(tree.predict(&[2.0, 3.0]).unwrap(), 0);
    }

    #[test]
    fn linearly_separable_correct_split() {
        let (features, labels) = separable();
        let tree = fit(&features, &labels, DecisionTreeConfig::new());
        assert_eq!(tree.predict(&[2.0, 0.0]).unwrap(), 0);
        assert_eq!(tree.predict(&[11.0, 0.0]).unwrap(), 1);
    }

    #[test]
    fn xor_needs_depth_at_least_2() {
        let features = vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
        ];
        let tree = fit(&features, &[0, 1, 1, 0], DecisionTreeConfig::new());
        assert!(tree.depth() >= 2);
        assert_eq!(tree.predict(&[1.0, 0.0]).unwrap(), 1);
    }

    #[test]
    fn predict_proba_has_declared_width() {
        let (features, labels) = separable();
        let data = TrainingData::new(&features, &labels, 3).unwrap();
        let tree = DecisionTreeConfig::new().fit(&data).unwrap();
        let proba = tree.predict_proba(&[5.0, 0.0]).unwrap();
        assert_eq!(proba.len(), 3);
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-10);
        assert_eq!(proba[2], 0.0);
    }

    #[test]
    fn max_depth_limits_tree() {
        let features = vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
        ];
        let tree = fit(
            &features,
            &[0, 1, 1, 0],
            DecisionTreeConfig::new().with_max_depth(Some(1)),
        );
        assert!(tree.depth() <= 1);
    }

    #[test]
    fn deterministic_with_same_seed() {
        let (features, labels) = separable();
        let a = fit(&features, &labels, DecisionTreeConfig::new().with_seed(123));
        let b = fit(&features, &labels, DecisionTreeConfig::new().with_seed(123));
        for sample in &features {
            assert_eq!(a.predict(sample).unwrap(), b.predict(sample).unwrap());
        }
    }

    #[test]
    fn prediction_feature_mismatch() {
        let (features, labels) = separable();
        let tree = fit(&features, &labels, DecisionTreeConfig::new());
        let err = tree.predict(&[1.0]).unwrap_err();
        assert!(matches!(
            err,
            MachineError::PredictionFeatureMismatch { expected: 2, got: 1 }
        ));
    }

    #[test]
    fn invalid_config_rejected() {
        let (features, labels) = separable();
        let data = TrainingData::new(&features, &labels, 2).unwrap();
        assert!(matches!(
            DecisionTreeConfig::new().with_max_depth(Some(0)).fit(&data),
            Err(MachineError::InvalidMaxDepth { .. })
        ));
        assert!(matches!(
            DecisionTreeConfig::new().with_max_features(Some(3)).fit(&data),
            Err(MachineError::InvalidMaxFeatures { max_features: 3, n_features: 2 })
        ));
    }
}
