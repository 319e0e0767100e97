//! Feed-forward network of dense + dropout blocks.
//!
//! A [`Network`] is an ordered list of [`Block`]s. Each block is a dense layer
//! optionally followed by dropout. Every dense layer carries an L2 *activity*
//! penalty: for a sample, the network objective adds `l2 * Σ y²` over the
//! post-activation outputs `y` of every dense layer.
//!
//! Buffers are allocated once ([`Scratch`], [`Gradients`]) and reused across
//! samples, so the per-sample forward/backward path does not allocate.
//!
//! The low-level `forward*`/`backward` methods panic on shape misuse; the
//! shape-checked entry point is [`Network::predict`].

use rand::Rng;

use crate::layer::{Dropout, Layer};
use crate::{Error, Matrix, Result};

/// Rows evaluated per block during batched inference.
pub const PREDICT_CHUNK_ROWS: usize = 256;

/// A dense layer and its optional trailing dropout.
#[derive(Debug, Clone)]
pub struct Block {
    pub dense: Layer,
    pub dropout: Option<Dropout>,
}

#[derive(Debug, Clone)]
pub struct Network {
    blocks: Vec<Block>,
    activity_l2: f32,
}

/// Per-sample forward buffers.
#[derive(Debug, Clone)]
pub struct Scratch {
    /// Post-activation outputs of each dense layer (before dropout).
    activations: Vec<Vec<f32>>,
    /// Dropout multipliers for each block (all ones at inference).
    masks: Vec<Vec<f32>>,
    /// Block outputs after dropout; the input of the next block.
    outputs: Vec<Vec<f32>>,
    penalty: f32,
}

/// Accumulated parameter gradients plus backprop work buffers.
#[derive(Debug, Clone)]
pub struct Gradients {
    d_weights: Vec<Vec<f32>>,
    d_biases: Vec<Vec<f32>>,
    // Gradient w.r.t. each block output; the last one is the loss gradient.
    d_outputs: Vec<Vec<f32>>,
    d_activation: Vec<Vec<f32>>,
    d_input: Vec<f32>,
}

impl Network {
    /// Assemble a network from blocks.
    ///
    /// Consecutive blocks must agree on dimensions.
    pub fn from_blocks(blocks: Vec<Block>, activity_l2: f32) -> Result<Self> {
        if blocks.is_empty() {
            return Err(Error::InvalidConfig(
                "network must have at least one layer".to_owned(),
            ));
        }
        if !(activity_l2.is_finite() && activity_l2 >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "l2 penalty must be finite and >= 0, got {activity_l2}"
            )));
        }
        for (i, pair) in blocks.windows(2).enumerate() {
            let (prev, next) = (&pair[0].dense, &pair[1].dense);
            if prev.out_dim() != next.in_dim() {
                return Err(Error::InvalidConfig(format!(
                    "layer {} in_dim {} does not match previous out_dim {}",
                    i + 1,
                    next.in_dim(),
                    prev.out_dim()
                )));
            }
        }
        Ok(Self {
            blocks,
            activity_l2,
        })
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.blocks[0].dense.in_dim()
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.blocks[self.blocks.len() - 1].dense.out_dim()
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn activity_l2(&self) -> f32 {
        self.activity_l2
    }

    #[inline]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    #[inline]
    pub fn layer(&self, idx: usize) -> Option<&Layer> {
        self.blocks.get(idx).map(|b| &b.dense)
    }

    #[inline]
    pub fn layer_mut(&mut self, idx: usize) -> Option<&mut Layer> {
        self.blocks.get_mut(idx).map(|b| &mut b.dense)
    }

    /// Widths of every dense layer, in order.
    pub fn widths(&self) -> Vec<usize> {
        self.blocks.iter().map(|b| b.dense.out_dim()).collect()
    }

    pub fn num_params(&self) -> usize {
        self.blocks.iter().map(|b| b.dense.num_params()).sum()
    }

    pub fn scratch(&self) -> Scratch {
        Scratch::new(self)
    }

    pub fn gradients(&self) -> Gradients {
        Gradients::new(self)
    }

    /// Inference forward pass for one sample (dropout disabled).
    ///
    /// The activity penalty of this pass is available via [`Scratch::penalty`].
    pub fn forward<'a>(&self, input: &[f32], scratch: &'a mut Scratch) -> &'a [f32] {
        self.check_forward_shapes(input, scratch);

        let mut penalty = 0.0_f32;
        for (idx, block) in self.blocks.iter().enumerate() {
            let prev: &[f32] = if idx == 0 {
                input
            } else {
                &scratch.outputs[idx - 1]
            };
            block.dense.forward(prev, &mut scratch.activations[idx]);
            penalty += self.activity_l2 * sum_sq(&scratch.activations[idx]);

            scratch.masks[idx].fill(1.0);
            let (acts, outs) = (&scratch.activations[idx], &mut scratch.outputs[idx]);
            outs.copy_from_slice(acts);
        }
        scratch.penalty = penalty;

        scratch.output()
    }

    /// Training forward pass for one sample: dropout masks are drawn from `rng`.
    pub fn forward_train<'a, R: Rng + ?Sized>(
        &self,
        input: &[f32],
        scratch: &'a mut Scratch,
        rng: &mut R,
    ) -> &'a [f32] {
        self.check_forward_shapes(input, scratch);

        let mut penalty = 0.0_f32;
        for (idx, block) in self.blocks.iter().enumerate() {
            let prev: &[f32] = if idx == 0 {
                input
            } else {
                &scratch.outputs[idx - 1]
            };
            block.dense.forward(prev, &mut scratch.activations[idx]);
            penalty += self.activity_l2 * sum_sq(&scratch.activations[idx]);

            let outs = &mut scratch.outputs[idx];
            outs.copy_from_slice(&scratch.activations[idx]);
            match block.dropout {
                Some(dropout) => dropout.forward_train(outs, &mut scratch.masks[idx], rng),
                None => scratch.masks[idx].fill(1.0),
            }
        }
        scratch.penalty = penalty;

        scratch.output()
    }

    /// Backward pass for one sample.
    ///
    /// Call after a forward pass with the same `input` and `scratch`, and after
    /// writing `dL/d(output)` into [`Gradients::d_output_mut`]. The activity penalty
    /// gradient is added here. Parameter gradients are *accumulated* into `grads`.
    pub fn backward<'a>(&self, input: &[f32], scratch: &Scratch, grads: &'a mut Gradients) -> &'a [f32] {
        assert_eq!(
            input.len(),
            self.input_dim(),
            "input len {} does not match network input_dim {}",
            input.len(),
            self.input_dim()
        );
        assert_eq!(
            grads.d_weights.len(),
            self.blocks.len(),
            "grads has {} layers, network has {}",
            grads.d_weights.len(),
            self.blocks.len()
        );

        let two_l2 = 2.0 * self.activity_l2;
        for idx in (0..self.blocks.len()).rev() {
            let layer = &self.blocks[idx].dense;
            let y = &scratch.activations[idx];
            let mask = &scratch.masks[idx];

            // Through dropout, plus the activity penalty on y.
            {
                let d_y = &mut grads.d_activation[idx];
                let d_out = &grads.d_outputs[idx];
                for i in 0..d_y.len() {
                    d_y[i] = d_out[i].mul_add(mask[i], two_l2 * y[i]);
                }
            }

            let layer_input: &[f32] = if idx == 0 {
                input
            } else {
                &scratch.outputs[idx - 1]
            };

            if idx == 0 {
                layer.backward(
                    layer_input,
                    y,
                    &grads.d_activation[0],
                    &mut grads.d_input,
                    &mut grads.d_weights[0],
                    &mut grads.d_biases[0],
                );
            } else {
                let (left, _) = grads.d_outputs.split_at_mut(idx);
                layer.backward(
                    layer_input,
                    y,
                    &grads.d_activation[idx],
                    &mut left[idx - 1],
                    &mut grads.d_weights[idx],
                    &mut grads.d_biases[idx],
                );
            }
        }

        &grads.d_input
    }

    /// Shape-checked batched inference.
    ///
    /// Rows are evaluated in blocks of [`PREDICT_CHUNK_ROWS`], so working memory is
    /// bounded by the chunk size regardless of `x.rows()`.
    pub fn predict(&self, x: &Matrix) -> Result<Matrix> {
        if x.cols() != self.input_dim() {
            return Err(Error::ShapeMismatch {
                expected: self.input_dim(),
                actual: x.cols(),
            });
        }

        let out_dim = self.output_dim();
        let mut out = vec![0.0_f32; x.rows() * out_dim];
        let max_width = self
            .blocks
            .iter()
            .map(|b| b.dense.in_dim().max(b.dense.out_dim()))
            .max()
            .unwrap_or(out_dim);
        let mut cur = Vec::with_capacity(PREDICT_CHUNK_ROWS * max_width);
        let mut next = Vec::with_capacity(PREDICT_CHUNK_ROWS * max_width);

        let mut start = 0;
        while start < x.rows() {
            let end = (start + PREDICT_CHUNK_ROWS).min(x.rows());
            let rows = end - start;

            cur.clear();
            cur.extend_from_slice(x.row_block(start, end));
            for block in &self.blocks {
                next.clear();
                next.resize(rows * block.dense.out_dim(), 0.0);
                block.dense.forward_rows(&cur, rows, &mut next);
                std::mem::swap(&mut cur, &mut next);
            }
            out[start * out_dim..end * out_dim].copy_from_slice(&cur);
            start = end;
        }

        Matrix::from_flat(out, out_dim)
    }

    fn check_forward_shapes(&self, input: &[f32], scratch: &Scratch) {
        assert_eq!(
            input.len(),
            self.input_dim(),
            "input len {} does not match network input_dim {}",
            input.len(),
            self.input_dim()
        );
        assert_eq!(
            scratch.activations.len(),
            self.blocks.len(),
            "scratch has {} layers, network has {}",
            scratch.activations.len(),
            self.blocks.len()
        );
        for (idx, block) in self.blocks.iter().enumerate() {
            assert_eq!(
                scratch.activations[idx].len(),
                block.dense.out_dim(),
                "scratch layer {idx} len {} does not match layer out_dim {}",
                scratch.activations[idx].len(),
                block.dense.out_dim()
            );
        }
    }
}

impl Scratch {
    pub fn new(net: &Network) -> Self {
        let widths = net.widths();
        Self {
            activations: widths.iter().map(|&w| vec![0.0; w]).collect(),
            masks: widths.iter().map(|&w| vec![1.0; w]).collect(),
            outputs: widths.iter().map(|&w| vec![0.0; w]).collect(),
            penalty: 0.0,
        }
    }

    /// Output of the most recent forward pass.
    #[inline]
    pub fn output(&self) -> &[f32] {
        self.outputs
            .last()
            .expect("scratch must have at least one layer")
    }

    /// Activity penalty of the most recent forward pass.
    #[inline]
    pub fn penalty(&self) -> f32 {
        self.penalty
    }
}

impl Gradients {
    pub fn new(net: &Network) -> Self {
        let widths = net.widths();
        Self {
            d_weights: net
                .blocks
                .iter()
                .map(|b| vec![0.0; b.dense.in_dim() * b.dense.out_dim()])
                .collect(),
            d_biases: widths.iter().map(|&w| vec![0.0; w]).collect(),
            d_outputs: widths.iter().map(|&w| vec![0.0; w]).collect(),
            d_activation: widths.iter().map(|&w| vec![0.0; w]).collect(),
            d_input: vec![0.0; net.input_dim()],
        }
    }

    /// Reset accumulated parameter gradients.
    pub fn zero(&mut self) {
        for g in self.d_weights.iter_mut().chain(self.d_biases.iter_mut()) {
            g.fill(0.0);
        }
    }

    /// Multiply accumulated parameter gradients by `factor` (e.g. `1 / batch`).
    pub fn scale(&mut self, factor: f32) {
        for g in self.d_weights.iter_mut().chain(self.d_biases.iter_mut()) {
            for v in g.iter_mut() {
                *v *= factor;
            }
        }
    }

    /// Buffer for `dL/d(output)` of the final layer.
    #[inline]
    pub fn d_output_mut(&mut self) -> &mut [f32] {
        self.d_outputs
            .last_mut()
            .expect("gradients must have at least one layer")
    }

    #[inline]
    pub fn d_weights(&self, layer_idx: usize) -> &[f32] {
        &self.d_weights[layer_idx]
    }

    #[inline]
    pub fn d_biases(&self, layer_idx: usize) -> &[f32] {
        &self.d_biases[layer_idx]
    }

    #[inline]
    pub fn d_weights_mut(&mut self, layer_idx: usize) -> &mut [f32] {
        &mut self.d_weights[layer_idx]
    }

    #[inline]
    pub fn d_biases_mut(&mut self, layer_idx: usize) -> &mut [f32] {
        &mut self.d_biases[layer_idx]
    }
}

#[inline]
fn sum_sq(xs: &[f32]) -> f32 {
    xs.iter().fold(0.0, |acc, &x| x.mul_add(x, acc))
}
