use std::fmt;

/// Zero-based feature column index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct FeatureIndex(usize);

impl FeatureIndex {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based feature column index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FeatureIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index into the node arena of a [`DecisionTree`](crate::DecisionTree).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    serde::Serialize, serde::Deserialize,
)]
pub struct NodeIndex(usize);

impl NodeIndex {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A node in a decision tree arena.
///
/// Children are referenced by [`NodeIndex`], so a tree is a flat `Vec<Node>`
/// that serializes without any pointer fix-up.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Node {
    /// An interior split node: `sample[feature] <= threshold` goes left.
    Split {
        /// Feature used for the split.
        feature: FeatureIndex,
        /// Split threshold.
        threshold: f64,
        /// Left child.
        left: NodeIndex,
        /// Right child.
        right: NodeIndex,
        /// Number of training samples that reached this node.
        n_samples: usize,
    },
    /// A terminal leaf node.
    Leaf {
        /// Majority class (lowest label on ties).
        prediction: usize,
        /// Class frequencies of the training samples in this leaf.
        distribution: Vec<f64>,
        /// Number of training samples in this leaf.
        n_samples: usize,
    },
}

impl Node {
    /// Return the number of training samples that reached this node.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        match self {
            Node::Split { n_samples, .. } | Node::Leaf { n_samples, .. } => *n_samples,
        }
    }

    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_accessors() {
        let leaf = Node::Leaf {
            prediction: 1,
            distribution: vec![0.25, 0.75],
            n_samples: 4,
        };
        assert!(leaf.is_leaf());
        assert_eq!(leaf.n_samples(), 4);
    }

    #[test]
    fn split_accessors() {
        let split = Node::Split {
            feature: FeatureIndex::new(2),
            threshold: 0.5,
            left: NodeIndex::new(1),
            right: NodeIndex::new(2),
            n_samples: 9,
        };
        assert!(!split.is_leaf());
        assert_eq!(split.n_samples(), 9);
        assert_eq!(format!("{}", FeatureIndex::new(2)), "2");
    }
}
