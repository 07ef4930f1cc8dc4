//! Small dense-vector helpers shared by the linear and kernel machines.

/// Dot product of two equal-length slices.
#[inline]
pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Squared Euclidean distance.
#[inline]
pub(crate) fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Index of the first maximum. Ties resolve to the lowest index.
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0usize;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Numerically stable softmax, in place.
///
/// Entries equal to `f64::NEG_INFINITY` receive probability zero.
pub(crate) fn softmax_in_place(values: &mut [f64]) {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        let uniform = 1.0 / values.len() as f64;
        values.iter_mut().for_each(|v| *v = uniform);
        return;
    }
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    values.iter_mut().for_each(|v| *v /= sum);
}

/// Invert a square matrix with Gauss-Jordan elimination and partial pivoting.
///
/// Returns `None` when a pivot falls below `1e-12` in absolute value.
pub(crate) fn invert(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = matrix.len();
    let mut aug: Vec<Vec<f64>> = matrix
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut r = row.clone();
            r.extend((0..n).map(|j| if i == j { 1.0 } else { 0.0 }));
            r
        })
        .collect();

    for col in 0..n {
        let pivot_row = (col..n).max_by(|&a, &b| aug[a][col].abs().total_cmp(&aug[b][col].abs()))?;
        if aug[pivot_row][col].abs() < 1e-12 {
            return None;
        }
        aug.swap(col, pivot_row);

        let pivot = aug[col][col];
        aug[col].iter_mut().for_each(|v| *v /= pivot);

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            if factor == 0.0 {
                continue;
            }
            for k in 0..2 * n {
                aug[row][k] -= factor * aug[col][k];
            }
        }
    }

    Some(aug.into_iter().map(|row| row[n..].to_vec()).collect())
}

/// Per-feature standardization to zero mean and unit variance.
///
/// Constant columns keep a scale of 1.0 so they map to zero.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct Standardizer {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl Standardizer {
    /// Learn column means and standard deviations from row-major data.
    pub(crate) fn fit(features: &[Vec<f64>]) -> Self {
        let n_features = features.first().map_or(0, Vec::len);
        let n = features.len().max(1) as f64;
        let mut means = vec![0.0; n_features];
        for row in features {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);

        let mut scales = vec![0.0; n_features];
        for row in features {
            for ((s, v), m) in scales.iter_mut().zip(row).zip(&means) {
                *s += (v - m) * (v - m);
            }
        }
        for s in &mut scales {
            let std = (*s / n).sqrt();
            *s = if std > 1e-12 { std } else { 1.0 };
        }
        Self { means, scales }
    }

    /// Standardize a single sample.
    pub(crate) fn transform(&self, sample: &[f64]) -> Vec<f64> {
        sample
            .iter()
            .zip(&self.means)
            .zip(&self.scales)
            .map(|((v, m), s)| (v - m) / s)
            .collect()
    }

    /// Standardize every row.
    pub(crate) fn transform_all(&self, features: &[Vec<f64>]) -> Vec<Vec<f64>> {
        features.iter().map(|row| self.transform(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_prefers_first_on_tie() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), 1);
        assert_eq!(argmax(&[1.0]), 0);
    }

    #[test]
    fn softmax_sums_to_one() {
        let mut v = vec![1.0, 2.0, 3.0];
        softmax_in_place(&mut v);
        assert!((v.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(v[2] > v[1] && v[1] > v[0]);
    }

    #[test]
    fn softmax_masks_negative_infinity() {
        let mut v = vec![0.0, f64::NEG_INFINITY, 0.0];
        softmax_in_place(&mut v);
        assert_eq!(v[1], 0.0);
        assert!((v[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn invert_two_by_two() {
        let m = vec![vec![4.0, 7.0], vec![2.0, 6.0]];
        let inv = invert(&m).unwrap();
        assert!((inv[0][0] - 0.6).abs() < 1e-10);
        assert!((inv[0][1] + 0.7).abs() < 1e-10);
        assert!((inv[1][0] + 0.2).abs() < 1e-10);
        assert!((inv[1][1] - 0.4).abs() < 1e-10);
    }

    #[test]
    fn invert_singular_is_none() {
        let m = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(invert(&m).is_none());
    }

    #[test]
    fn standardizer_constant_column_maps_to_zero() {
        let data = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let s = Standardizer::fit(&data);
        let t = s.transform(&[2.0, 5.0]);
        assert!(t[0].abs() < 1e-12);
        assert!(t[1].abs() < 1e-12);
    }
}
