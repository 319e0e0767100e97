//! Dense layer and dropout.
//!
//! A [`Layer`] owns its parameters and activation. The per-sample
//! `forward`/`backward` pair is the training hot path and is allocation-free;
//! `forward_rows` evaluates a whole block of samples at once for inference.

use rand::Rng;
use rand::distributions::{Distribution, Uniform};

use crate::matmul::affine_rows;
use crate::{Activation, Error, Result};

/// Weight initialization scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Init {
    /// Xavier/Glorot uniform, `U(-sqrt(6 / (in + out)), +sqrt(6 / (in + out)))`.
    Xavier,
    /// He/Kaiming uniform, `U(-sqrt(6 / in), +sqrt(6 / in))`.
    He,
}

impl Init {
    /// Default scheme for an activation.
    #[inline]
    pub fn for_activation(act: Activation) -> Self {
        match act {
            Activation::Tanh | Activation::Sigmoid | Activation::Identity => Init::Xavier,
            Activation::ReLU | Activation::LeakyReLU { .. } => Init::He,
        }
    }

    fn limit(self, in_dim: usize, out_dim: usize) -> f32 {
        match self {
            Init::Xavier => (6.0 / (in_dim + out_dim) as f32).sqrt(),
            Init::He => (6.0 / in_dim as f32).sqrt(),
        }
    }
}

/// Fully connected layer: `y = activation(W x + b)`.
#[derive(Debug, Clone)]
pub struct Layer {
    in_dim: usize,
    out_dim: usize,
    activation: Activation,
    /// Row-major matrix with shape (out_dim, in_dim).
    weights: Vec<f32>,
    biases: Vec<f32>,
}

impl Layer {
    /// Random weights drawn from `init`, zero biases.
    pub fn new_with_rng<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        init: Init,
        activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }
        activation.validate()?;

        let limit = init.limit(in_dim, out_dim);
        let dist = Uniform::new_inclusive(-limit, limit);
        let weights = (0..in_dim * out_dim).map(|_| dist.sample(rng)).collect();

        Ok(Self {
            in_dim,
            out_dim,
            activation,
            weights,
            biases: vec![0.0; out_dim],
        })
    }

    /// Build a layer from explicit parameters.
    pub fn from_parts(
        in_dim: usize,
        out_dim: usize,
        activation: Activation,
        weights: Vec<f32>,
        biases: Vec<f32>,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }
        if weights.len() != in_dim * out_dim {
            return Err(Error::InvalidConfig(format!(
                "weights length {} does not match out_dim * in_dim ({out_dim} * {in_dim})",
                weights.len()
            )));
        }
        if biases.len() != out_dim {
            return Err(Error::InvalidConfig(format!(
                "biases length {} does not match out_dim {out_dim}",
                biases.len()
            )));
        }
        if weights.iter().chain(&biases).any(|v| !v.is_finite()) {
            return Err(Error::InvalidConfig(
                "layer parameters must be finite".to_owned(),
            ));
        }
        activation.validate()?;

        Ok(Self {
            in_dim,
            out_dim,
            activation,
            weights,
            biases,
        })
    }

    #[inline]
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[inline]
    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    #[inline]
    pub fn weights_mut(&mut self) -> &mut [f32] {
        &mut self.weights
    }

    #[inline]
    pub fn biases_mut(&mut self) -> &mut [f32] {
        &mut self.biases
    }

    #[inline]
    pub fn num_params(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    /// Forward pass for a single sample.
    ///
    /// Shape contract: `inputs.len() == in_dim`, `outputs.len() == out_dim`.
    #[inline]
    pub fn forward(&self, inputs: &[f32], outputs: &mut [f32]) {
        debug_assert_eq!(inputs.len(), self.in_dim);
        debug_assert_eq!(outputs.len(), self.out_dim);

        for (o, out) in outputs.iter_mut().enumerate() {
            let row = &self.weights[o * self.in_dim..(o + 1) * self.in_dim];
            let mut sum = self.biases[o];
            for (&w, &x) in row.iter().zip(inputs) {
                sum = w.mul_add(x, sum);
            }
            *out = self.activation.forward(sum);
        }
    }

    /// Forward pass for a row-major block of `rows` samples.
    ///
    /// Shape contract: `inputs.len() == rows * in_dim`, `outputs.len() == rows * out_dim`.
    pub fn forward_rows(&self, inputs: &[f32], rows: usize, outputs: &mut [f32]) {
        affine_rows(inputs, rows, self.in_dim, &self.weights, &self.biases, outputs);
        self.activation.apply(outputs);
    }

    /// Backward pass for a single sample.
    ///
    /// Accumulate semantics for parameters: `d_weights` and `d_biases` are *added
    /// to*, so a mini-batch can sum per-sample gradients into one buffer. `d_inputs`
    /// is overwritten.
    ///
    /// `d_outputs` is the upstream gradient `dL/d(outputs)`, where `outputs` are the
    /// post-activation values produced by `forward` for the same `inputs`.
    #[inline]
    pub fn backward(
        &self,
        inputs: &[f32],
        outputs: &[f32],
        d_outputs: &[f32],
        d_inputs: &mut [f32],
        d_weights: &mut [f32],
        d_biases: &mut [f32],
    ) {
        debug_assert_eq!(inputs.len(), self.in_dim);
        debug_assert_eq!(outputs.len(), self.out_dim);
        debug_assert_eq!(d_outputs.len(), self.out_dim);
        debug_assert_eq!(d_inputs.len(), self.in_dim);
        debug_assert_eq!(d_weights.len(), self.weights.len());
        debug_assert_eq!(d_biases.len(), self.out_dim);

        d_inputs.fill(0.0);

        for o in 0..self.out_dim {
            let d_z = d_outputs[o] * self.activation.grad_from_output(outputs[o]);
            d_biases[o] += d_z;

            let row = o * self.in_dim;
            for i in 0..self.in_dim {
                d_weights[row + i] = d_z.mul_add(inputs[i], d_weights[row + i]);
                d_inputs[i] = self.weights[row + i].mul_add(d_z, d_inputs[i]);
            }
        }
    }

    /// `param -= lr * step` for every weight and bias.
    #[inline]
    pub(crate) fn apply_step(&mut self, d_weights: &[f32], d_biases: &[f32], lr: f32) {
        debug_assert_eq!(d_weights.len(), self.weights.len());
        debug_assert_eq!(d_biases.len(), self.biases.len());

        for (w, &g) in self.weights.iter_mut().zip(d_weights) {
            *w -= lr * g;
        }
        for (b, &g) in self.biases.iter_mut().zip(d_biases) {
            *b -= lr * g;
        }
    }
}

/// Inverted dropout.
///
/// During training each unit is kept with probability `1 - rate` and kept units
/// are scaled by `1 / (1 - rate)`, so inference is the identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dropout {
    rate: f32,
}

impl Dropout {
    pub fn new(rate: f32) -> Result<Self> {
        if !(rate.is_finite() && (0.0..1.0).contains(&rate)) {
            return Err(Error::InvalidConfig(format!(
                "dropout rate must be in [0, 1), got {rate}"
            )));
        }
        Ok(Self { rate })
    }

    #[inline]
    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Draw a fresh mask and apply it to `values` in place.
    ///
    /// `mask` receives the per-unit multiplier (`0` or `1 / (1 - rate)`) so the
    /// backward pass can reuse it.
    #[inline]
    pub fn forward_train<R: Rng + ?Sized>(&self, values: &mut [f32], mask: &mut [f32], rng: &mut R) {
        debug_assert_eq!(values.len(), mask.len());

        if self.rate == 0.0 {
            mask.fill(1.0);
            return;
        }

        let keep = 1.0 - self.rate;
        let scale = 1.0 / keep;
        for (v, m) in values.iter_mut().zip(mask.iter_mut()) {
            *m = if rng.r#gen::<f32>() < keep { scale } else { 0.0 };
            *v *= *m;
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn init_respects_limits() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = Layer::new_with_rng(8, 4, Init::Xavier, Activation::Tanh, &mut rng).unwrap();
        let limit = (6.0_f32 / 12.0).sqrt();
        assert!(layer.weights().iter().all(|w| w.abs() <= limit));
        assert!(layer.biases().iter().all(|&b| b == 0.0));
        assert_eq!(layer.num_params(), 8 * 4 + 4);
    }

    #[test]
    fn from_parts_validates_lengths_and_finiteness() {
        assert!(Layer::from_parts(2, 1, Activation::Identity, vec![1.0, 2.0], vec![0.0]).is_ok());
        assert!(Layer::from_parts(2, 1, Activation::Identity, vec![1.0], vec![0.0]).is_err());
        assert!(
            Layer::from_parts(2, 1, Activation::Identity, vec![1.0, f32::INFINITY], vec![0.0])
                .is_err()
        );
    }

    #[test]
    fn forward_rows_matches_per_sample_forward() {
        let mut rng = StdRng::seed_from_u64(1);
        let layer = Layer::new_with_rng(3, 2, Init::He, Activation::ReLU, &mut rng).unwrap();
        let x = [0.5_f32, -1.0, 2.0, 1.5, 0.0, -0.5];

        let mut batched = [0.0_f32; 4];
        layer.forward_rows(&x, 2, &mut batched);

        let mut single = [0.0_f32; 2];
        for r in 0..2 {
            layer.forward(&x[r * 3..(r + 1) * 3], &mut single);
            assert!((single[0] - batched[r * 2]).abs() < 1e-5);
            assert!((single[1] - batched[r * 2 + 1]).abs() < 1e-5);
        }
    }

    #[test]
    fn backward_accumulates_parameter_gradients() {
        let layer =
            Layer::from_parts(1, 1, Activation::Identity, vec![2.0], vec![0.0]).unwrap();
        let mut d_in = [0.0_f32];
        let mut d_w = [0.0_f32];
        let mut d_b = [0.0_f32];

        layer.backward(&[3.0], &[6.0], &[1.0], &mut d_in, &mut d_w, &mut d_b);
        layer.backward(&[3.0], &[6.0], &[1.0], &mut d_in, &mut d_w, &mut d_b);

        assert_eq!(d_w, [6.0]);
        assert_eq!(d_b, [2.0]);
        assert_eq!(d_in, [2.0]);
    }

    #[test]
    fn dropout_rate_bounds() {
        assert!(Dropout::new(0.0).is_ok());
        assert!(Dropout::new(0.99).is_ok());
        assert!(Dropout::new(1.0).is_err());
        assert!(Dropout::new(-0.1).is_err());
    }

    #[test]
    fn dropout_mask_is_zero_or_scaled() {
        let mut rng = StdRng::seed_from_u64(3);
        let drop = Dropout::new(0.5).unwrap();
        let mut values = vec![1.0_f32; 256];
        let mut mask = vec![0.0_f32; 256];
        drop.forward_train(&mut values, &mut mask, &mut rng);

        assert!(mask.iter().all(|&m| m == 0.0 || m == 2.0));
        assert_eq!(values, mask);
        let kept = mask.iter().filter(|&&m| m > 0.0).count();
        assert!(kept > 64 && kept < 192, "kept={kept}");
    }
}
