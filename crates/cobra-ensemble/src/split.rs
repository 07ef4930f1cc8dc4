use rand::{SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::{CobraError, Dataset};

/// Split bounds and shuffling policy.
///
/// `k` is the machine-training subset size and `l` the end index of the
/// aggregation subset: training = rows `[0, k)`, aggregation = rows `[k, l)`.
///
/// | Given | Resolved |
/// |---|---|
/// | neither | `k = n / 2`, `l = n` |
/// | only `k` | `l = n` |
/// | only `l` | `l = min(l, n)`, `k = n - l` |
/// | both | `l = min(l, n)` |
///
/// # Defaults
///
/// | Parameter | Default |
/// |-----------|---------|
/// | `k`       | `None`  |
/// | `l`       | `None`  |
/// | `shuffle` | `true`  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SplitConfig {
    k: Option<usize>,
    l: Option<usize>,
    shuffle: bool,
}

impl SplitConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            k: None,
            l: None,
            shuffle: true,
        }
    }

    /// Set the training subset size.
    #[must_use]
    pub fn with_k(mut self, k: Option<usize>) -> Self {
        self.k = k;
        self
    }

    /// Set the aggregation subset end index.
    #[must_use]
    pub fn with_l(mut self, l: Option<usize>) -> Self {
        self.l = l;
        self
    }

    /// Enable or disable shuffling before the split.
    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Return the requested training subset size.
    #[must_use]
    pub fn k(&self) -> Option<usize> {
        self.k
    }

    /// Return the requested aggregation end index.
    #[must_use]
    pub fn l(&self) -> Option<usize> {
        self.l
    }

    /// Return whether rows are shuffled before splitting.
    #[must_use]
    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    /// Resolve `(k, l)` for a dataset of `n` rows.
    ///
    /// # Errors
    ///
    /// Returns [`CobraError::InvalidSplit`] when the resolved `k > l`.
    pub fn resolve(&self, n: usize) -> Result<(usize, usize), CobraError> {
        let (k, l) = match (self.k, self.l) {
            (None, None) => (n / 2, n),
            (Some(k), None) => (k, n),
            (None, Some(l)) => {
                let l = l.min(n);
                (n - l, l)
            }
            (Some(k), Some(l)) => (k, l.min(n)),
        };
        if k > l {
            return Err(CobraError::InvalidSplit { k, l, n });
        }
        Ok((k, l))
    }
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// The machine-training subset and the aggregation subset.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SplitData {
    training: Dataset,
    aggregation: Dataset,
}

impl SplitData {
    /// Pair two pre-split subsets.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`CobraError::SubsetWidthMismatch`] | subsets differ in feature count |
    /// | [`CobraError::SubsetClassMismatch`] | subsets differ in class names |
    pub fn new(training: Dataset, aggregation: Dataset) -> Result<Self, CobraError> {
        if training.n_features() != aggregation.n_features() {
            return Err(CobraError::SubsetWidthMismatch {
                training: training.n_features(),
                aggregation: aggregation.n_features(),
            });
        }
        if training.class_names() != aggregation.class_names() {
            return Err(CobraError::SubsetClassMismatch {
                training: training.class_names().to_vec(),
                aggregation: aggregation.class_names().to_vec(),
            });
        }
        Ok(Self {
            training,
            aggregation,
        })
    }

    /// Rows used to fit the machines.
    #[must_use]
    pub fn training(&self) -> &Dataset {
        &self.training
    }

    /// Rows used for point selection and voting.
    #[must_use]
    pub fn aggregation(&self) -> &Dataset {
        &self.aggregation
    }

    /// Return the training subset size `k`.
    #[must_use]
    pub fn k(&self) -> usize {
        self.training.len()
    }

    /// Return the aggregation end index `l`.
    #[must_use]
    pub fn l(&self) -> usize {
        self.training.len() + self.aggregation.len()
    }
}

/// Shuffle (optionally) and partition `dataset`.
///
/// The same `seed` always yields the same permutation. Rows at or beyond
/// `l` are dropped.
///
/// # Errors
///
/// Returns [`CobraError::InvalidSplit`] when the bounds resolve to `k > l`.
#[instrument(skip_all, fields(n = dataset.len(), seed = seed))]
pub fn split(dataset: &Dataset, config: &SplitConfig, seed: u64) -> Result<SplitData, CobraError> {
    let n = dataset.len();
    let (k, l) = config.resolve(n)?;

    let mut order: Vec<usize> = (0..n).collect();
    if config.shuffle {
        order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    }

    debug!(k, l, shuffled = config.shuffle, "dataset split");
    Ok(SplitData {
        training: dataset.subset(&order[..k]),
        aggregation: dataset.subset(&order[k..l]),
    })
}
