use rand::Rng;

use crate::node::FeatureIndex;

/// Criterion for measuring the quality of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SplitCriterion {
    /// Gini impurity: 1 - Σ(p_i²)
    Gini,
    /// Information entropy: -Σ(p_i · ln(p_i))
    Entropy,
}

impl SplitCriterion {
    /// Impurity of a node from its class counts. Zero for an empty node.
    #[must_use]
    pub fn impurity(&self, class_counts: &[usize], n_samples: usize) -> f64 {
        if n_samples == 0 {
            return 0.0;
        }
        let n = n_samples as f64;
        match self {
            SplitCriterion::Gini => {
                1.0 - class_counts
                    .iter()
                    .map(|&c| {
                        let p = c as f64 / n;
                        p * p
                    })
                    .sum::<f64>()
            }
            SplitCriterion::Entropy => -class_counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.ln()
                })
                .sum::<f64>(),
        }
    }
}

/// The winning split for one node.
#[derive(Debug, Clone)]
pub(crate) struct CandidateSplit {
    pub(crate) feature: FeatureIndex,
    pub(crate) threshold: f64,
    pub(crate) left: Vec<usize>,
    pub(crate) right: Vec<usize>,
}

/// Per-node split search parameters.
pub(crate) struct SplitSearch<'a> {
    /// Column-major: `columns[feature_idx][sample_idx]`.
    pub(crate) columns: &'a [Vec<f64>],
    pub(crate) labels: &'a [usize],
    pub(crate) n_classes: usize,
    pub(crate) criterion: SplitCriterion,
    pub(crate) max_features: usize,
    pub(crate) min_samples_leaf: usize,
}

impl SplitSearch<'_> {
    /// Find the best threshold split over a random subset of `max_features`
    /// columns.
    ///
    /// Each candidate column is sorted once and scanned left to right with
    /// incremental class counts. The split maximizing the weighted impurity
    /// decrease wins. Returns `None` when every candidate column is constant
    /// over `samples` or every boundary violates `min_samples_leaf`.
    pub(crate) fn best(&self, samples: &[usize], rng: &mut impl Rng) -> Option<CandidateSplit> {
        let n_features = self.columns.len();
        let n_samples = samples.len();
        if n_samples < 2 || n_features == 0 {
            return None;
        }

        let mut parent_counts = vec![0usize; self.n_classes];
        for &s in samples {
            parent_counts[self.labels[s]] += 1;
        }
        let parent = self.criterion.impurity(&parent_counts, n_samples) * n_samples as f64;

        // Partial Fisher-Yates over the column order.
        let mut order: Vec<usize> = (0..n_features).collect();
        let take = self.max_features.min(n_features);
        for i in 0..take {
            let j = rng.gen_range(i..n_features);
            order.swap(i, j);
        }

        let mut best: Option<(f64, usize, f64)> = None;
        for &feature in &order[..take] {
            let column = &self.columns[feature];
            let mut sorted: Vec<(f64, usize)> = samples.iter().map(|&s| (column[s], s)).collect();
            sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            let mut left_counts = vec![0usize; self.n_classes];
            let mut right_counts = parent_counts.clone();
            for i in 0..n_samples - 1 {
                let (value, s) = sorted[i];
                left_counts[self.labels[s]] += 1;
                right_counts[self.labels[s]] -= 1;

                let next = sorted[i + 1].0;
                if value == next {
                    continue;
                }
                let n_left = i + 1;
                let n_right = n_samples - n_left;
                if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                    continue;
                }

                let decrease = parent
                    - self.criterion.impurity(&left_counts, n_left) * n_left as f64
                    - self.criterion.impurity(&right_counts, n_right) * n_right as f64;
                if best.is_none_or(|(d, _, _)| decrease > d) {
                    best = Some((decrease, feature, (value + next) / 2.0));
                }
            }
        }

        let (_, feature, threshold) = best?;
        let column = &self.columns[feature];
        let (left, right): (Vec<usize>, Vec<usize>) =
            samples.iter().partition(|&&s| column[s] <= threshold);

        Some(CandidateSplit {
            feature: FeatureIndex::new(feature),
            threshold,
            left,
            right,
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn search<'a>(
        columns: &'a [Vec<f64>],
        labels: &'a [usize],
        min_samples_leaf: usize,
    ) -> SplitSearch<'a> {
        SplitSearch {
            columns,
            labels,
            n_classes: 2,
            criterion: SplitCriterion::Gini,
            max_features: columns.len(),
            min_samples_leaf,
        }
    }

    #[test]
    fn gini_binary_balanced() {
        assert!((SplitCriterion::Gini.impurity(&[5, 5], 10) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn entropy_binary_balanced() {
        let imp = SplitCriterion::Entropy.impurity(&[5, 5], 10);
        assert!((imp - 2.0_f64.ln()).abs() < 1e-10);
    }

    #[test]
    fn pure_node_has_zero_impurity() {
        assert_eq!(SplitCriterion::Gini.impurity(&[0, 7], 7), 0.0);
        assert_eq!(SplitCriterion::Entropy.impurity(&[7, 0], 7), 0.0);
    }

    #[test]
    fn separable_column_splits_between_groups() {
        let columns = vec![vec![1.0, 2.0, 3.0, 10.0, 11.0, 12.0]];
        let labels = vec![0, 0, 0, 1, 1, 1];
        let samples: Vec<usize> = (0..6).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let split = search(&columns, &labels, 1)
            .best(&samples, &mut rng)
            .expect("should find a split");
        assert_eq!(split.feature.index(), 0);
        assert!(split.threshold > 3.0 && split.threshold < 10.0);
        assert_eq!(split.left, vec![0, 1, 2]);
        assert_eq!(split.right, vec![3, 4, 5]);
    }

    #[test]
    fn constant_column_has_no_split() {
        let columns = vec![vec![5.0; 4]];
        let labels = vec![0, 0, 1, 1];
        let samples: Vec<usize> = (0..4).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(search(&columns, &labels, 1).best(&samples, &mut rng).is_none());
    }

    #[test]
    fn min_samples_leaf_enforced() {
        let columns = vec![vec![1.0, 10.0]];
        let labels = vec![0, 1];
        let samples = vec![0, 1];
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(search(&columns, &labels, 2).best(&samples, &mut rng).is_none());
    }
}
