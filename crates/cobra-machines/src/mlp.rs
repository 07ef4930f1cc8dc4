use rand::{Rng, SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, instrument};

use crate::{
    MachineError,
    classifier::{Classifier, Learner, TrainingData, check_sample},
    linalg::{Standardizer, argmax, dot, softmax_in_place},
};

/// Configuration for a one-hidden-layer perceptron with ReLU activations and
/// a softmax output, trained by minibatch SGD with momentum.
///
/// # Defaults
///
/// | Parameter       | Default |
/// |-----------------|---------|
/// | `hidden_units`  | 32      |
/// | `learning_rate` | 0.05    |
/// | `momentum`      | 0.9     |
/// | `epochs`        | 200     |
/// | `batch_size`    | 32      |
/// | `l2`            | 1e-4    |
/// | `seed`          | 42      |
#[derive(Debug, Clone)]
pub struct MlpConfig {
    hidden_units: usize,
    learning_rate: f64,
    momentum: f64,
    epochs: usize,
    batch_size: usize,
    l2: f64,
    seed: u64,
}

impl MlpConfig {
    /// Create a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hidden_units: 32,
            learning_rate: 0.05,
            momentum: 0.9,
            epochs: 200,
            batch_size: 32,
            l2: 1e-4,
            seed: 42,
        }
    }

    /// Set the hidden layer width.
    #[must_use]
    pub fn with_hidden_units(mut self, hidden_units: usize) -> Self {
        self.hidden_units = hidden_units;
        self
    }

    /// Set the step size.
    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the number of passes over the training set.
    #[must_use]
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set the minibatch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the random seed for initialization and shuffling.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> Result<(), MachineError> {
        let reject = |parameter, value: String, expected| {
            Err(MachineError::InvalidParameter {
                machine: "neural_network",
                parameter,
                value,
                expected,
            })
        };
        if self.hidden_units == 0 {
            return reject("hidden_units", "0".to_owned(), "at least 1");
        }
        if self.batch_size == 0 {
            return reject("batch_size", "0".to_owned(), "at least 1");
        }
        if !(self.learning_rate > 0.0) {
            return reject("learning_rate", self.learning_rate.to_string(), "a value > 0");
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return reject("momentum", self.momentum.to_string(), "a value in [0, 1)");
        }
        Ok(())
    }

    /// Train the network.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::InvalidParameter`] for a zero layer width or
    /// batch size, a non-positive learning rate, or momentum outside `[0, 1)`.
    #[instrument(skip_all, fields(n_samples = data.n_samples(), hidden = self.hidden_units))]
    pub fn fit(&self, data: &TrainingData<'_>) -> Result<Mlp, MachineError> {
        self.validate()?;
        let scaler = Standardizer::fit(data.features());
        let x = scaler.transform_all(data.features());
        let labels = data.labels();
        let p = data.n_features();
        let h = self.hidden_units;
        let k = data.n_classes();

        let mut active = vec![false; k];
        for c in data.present_classes() {
            active[c] = true;
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut net = Mlp {
            scaler,
            w1: xavier(&mut rng, h, p),
            b1: vec![0.0; h],
            w2: xavier(&mut rng, k, h),
            b2: vec![0.0; k],
            active,
            n_features: p,
        };

        let mut velocity = Gradients::zeros(h, p, k);
        let mut order: Vec<usize> = (0..x.len()).collect();
        let mut last_loss = 0.0;

        for _ in 0..self.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;
            for batch in order.chunks(self.batch_size) {
                let mut grads = Gradients::zeros(h, p, k);
                for &i in batch {
                    epoch_loss += net.backprop(&x[i], labels[i], &mut grads);
                }
                net.step(&grads, &mut velocity, batch.len() as f64, self);
            }
            last_loss = epoch_loss / x.len() as f64;
        }
        debug!(epochs = self.epochs, loss = last_loss, "mlp trained");
        Ok(net)
    }
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Learner for MlpConfig {
    type Model = Mlp;

    fn name(&self) -> &str {
        "neural_network"
    }

    fn fit(&self, data: &TrainingData<'_>) -> Result<Mlp, MachineError> {
        MlpConfig::fit(self, data)
    }
}

/// Xavier/Glorot uniform initialization for a `rows x cols` weight matrix.
fn xavier(rng: &mut ChaCha8Rng, rows: usize, cols: usize) -> Vec<Vec<f64>> {
    let limit = (6.0 / (rows + cols) as f64).sqrt();
    (0..rows)
        .map(|_| (0..cols).map(|_| rng.gen_range(-limit..limit)).collect())
        .collect()
}

struct Gradients {
    w1: Vec<Vec<f64>>,
    b1: Vec<f64>,
    w2: Vec<Vec<f64>>,
    b2: Vec<f64>,
}

impl Gradients {
    fn zeros(h: usize, p: usize, k: usize) -> Self {
        Self {
            w1: vec![vec![0.0; p]; h],
            b1: vec![0.0; h],
            w2: vec![vec![0.0; h]; k],
            b2: vec![0.0; k],
        }
    }
}

/// A fitted multilayer perceptron.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Mlp {
    scaler: Standardizer,
    w1: Vec<Vec<f64>>,
    b1: Vec<f64>,
    w2: Vec<Vec<f64>>,
    b2: Vec<f64>,
    active: Vec<bool>,
    n_features: usize,
}

impl Mlp {
    /// Hidden activations and masked output logits for a standardized input.
    fn forward(&self, z: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let hidden: Vec<f64> = self
            .w1
            .iter()
            .zip(&self.b1)
            .map(|(w, b)| (dot(w, z) + b).max(0.0))
            .collect();
        let logits = self
            .w2
            .iter()
            .zip(&self.b2)
            .zip(&self.active)
            .map(|((w, b), &on)| if on { dot(w, &hidden) + b } else { f64::NEG_INFINITY })
            .collect();
        (hidden, logits)
    }

    /// Accumulate cross-entropy gradients for one sample; returns its loss.
    fn backprop(&self, z: &[f64], label: usize, grads: &mut Gradients) -> f64 {
        let (hidden, mut out) = self.forward(z);
        softmax_in_place(&mut out);
        let loss = -out[label].max(1e-15).ln();
        out[label] -= 1.0;

        let mut d_hidden = vec![0.0; hidden.len()];
        for (c, &d) in out.iter().enumerate() {
            if d == 0.0 {
                continue;
            }
            grads.b2[c] += d;
            for (j, &a) in hidden.iter().enumerate() {
                grads.w2[c][j] += d * a;
                d_hidden[j] += d * self.w2[c][j];
            }
        }
        for (j, &a) in hidden.iter().enumerate() {
            if a <= 0.0 {
                continue;
            }
            grads.b1[j] += d_hidden[j];
            for (g, &v) in grads.w1[j].iter_mut().zip(z) {
                *g += d_hidden[j] * v;
            }
        }
        loss
    }

    fn step(&mut self, grads: &Gradients, velocity: &mut Gradients, batch: f64, config: &MlpConfig) {
        let lr = config.learning_rate;
        let mu = config.momentum;
        let update = |w: &mut f64, v: &mut f64, g: f64, decay: f64| {
            *v = mu * *v - lr * (g / batch + decay * *w);
            *w += *v;
        };
        for ((w_row, v_row), g_row) in self.w1.iter_mut().zip(&mut velocity.w1).zip(&grads.w1) {
            for ((w, v), &g) in w_row.iter_mut().zip(v_row).zip(g_row) {
                update(w, v, g, config.l2);
            }
        }
        for ((w, v), &g) in self.b1.iter_mut().zip(&mut velocity.b1).zip(&grads.b1) {
            update(w, v, g, 0.0);
        }
        for ((w_row, v_row), g_row) in self.w2.iter_mut().zip(&mut velocity.w2).zip(&grads.w2) {
            for ((w, v), &g) in w_row.iter_mut().zip(v_row).zip(g_row) {
                update(w, v, g, config.l2);
            }
        }
        for ((w, v), &g) in self.b2.iter_mut().zip(&mut velocity.b2).zip(&grads.b2) {
            update(w, v, g, 0.0);
        }
    }
}

impl Classifier for Mlp {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn n_classes(&self) -> usize {
        self.b2.len()
    }

    fn predict(&self, sample: &[f64]) -> Result<usize, MachineError> {
        Ok(argmax(&self.predict_proba(sample)?))
    }

    fn predict_proba(&self, sample: &[f64]) -> Result<Vec<f64>, MachineError> {
        check_sample(sample, self.n_features)?;
        let (_, mut out) = self.forward(&self.scaler.transform(sample));
        softmax_in_place(&mut out);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xor_cloud() -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for &(cx, cy, label) in &[(0.0, 0.0, 0), (1.0, 1.0, 0), (0.0, 1.0, 1), (1.0, 0.0, 1)] {
            for &(dx, dy) in &[(0.0, 0.0), (0.05, 0.0), (0.0, 0.05), (-0.05, 0.0), (0.0, -0.05)] {
                features.push(vec![cx + dx, cy + dy]);
                labels.push(label);
            }
        }
        (features, labels)
    }

    #[test]
    fn learns_xor() {
        let (features, labels) = xor_cloud();
        let data = TrainingData::new(&features, &labels, 2).unwrap();
        let mlp = MlpConfig::new().with_epochs(1000).fit(&data).unwrap();
        assert_eq!(mlp.predict(&[0.0, 0.0]).unwrap(), 0);
        assert_eq!(mlp.predict(&[1.0, 1.0]).unwrap(), 0);
        assert_eq!(mlp.predict(&[0.0, 1.0]).unwrap(), 1);
        assert_eq!(mlp.predict(&[1.0, 0.0]).unwrap(), 1);
    }

    #[test]
    fn proba_masks_absent_classes() {
        let (features, labels) = xor_cloud();
        let data = TrainingData::new(&features, &labels, 3).unwrap();
        let mlp = MlpConfig::new().with_epochs(5).fit(&data).unwrap();
        let p = mlp.predict_proba(&[0.5, 0.5]).unwrap();
        assert_eq!(p.len(), 3);
        assert_eq!(p[2], 0.0);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn deterministic_with_same_seed() {
        let (features, labels) = xor_cloud();
        let data = TrainingData::new(&features, &labels, 2).unwrap();
        let a = MlpConfig::new().with_epochs(10).with_seed(3).fit(&data).unwrap();
        let b = MlpConfig::new().with_epochs(10).with_seed(3).fit(&data).unwrap();
        assert_eq!(
            a.predict_proba(&[0.3, 0.7]).unwrap(),
            b.predict_proba(&[0.3, 0.7]).unwrap()
        );
    }

    #[test]
    fn zero_hidden_units_rejected() {
        let (features, labels) = xor_cloud();
        let data = TrainingData::new(&features, &labels, 2).unwrap();
        assert!(matches!(
            MlpConfig::new().with_hidden_units(0).fit(&data),
            Err(MachineError::InvalidParameter { parameter: "hidden_units", .. })
        ));
    }
}
