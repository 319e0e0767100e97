//! The seam between the detector and the numeric backend.
//!
//! The detector only needs three capabilities from a backend: build an untrained
//! model for an [`Architecture`], train it to reconstruct a matrix, and run
//! inference. [`DenseEngine`] provides them with this crate's own dense network;
//! other backends can be plugged in through [`crate::AutoEncoder::with_engine`].

use rand::rngs::StdRng;

use crate::builder::{Architecture, Compiled};
use crate::train::{self, History, TrainConfig};
use crate::{Matrix, Result};

pub trait Engine {
    /// Trained (or trainable) model handle.
    type Model: Clone + Send + Sync;

    /// Build an untrained model. Weight init may draw from `rng`.
    fn build(&self, arch: &Architecture, rng: &mut StdRng) -> Result<Self::Model>;

    /// Fit `model` to reconstruct the rows of `x`.
    fn train(
        &self,
        model: &mut Self::Model,
        x: &Matrix,
        cfg: &TrainConfig,
        rng: &mut StdRng,
    ) -> Result<History>;

    /// Reconstruct every row of `x`, preserving row order.
    fn predict(&self, model: &Self::Model, x: &Matrix) -> Result<Matrix>;
}

/// Default backend: the in-crate dense network trained by [`train::train`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseEngine;

impl Engine for DenseEngine {
    type Model = Compiled;

    fn build(&self, arch: &Architecture, rng: &mut StdRng) -> Result<Compiled> {
        arch.compile(rng)
    }

    fn train(
        &self,
        model: &mut Compiled,
        x: &Matrix,
        cfg: &TrainConfig,
        rng: &mut StdRng,
    ) -> Result<History> {
        train::train(model, x, cfg, rng)
    }

    fn predict(&self, model: &Compiled, x: &Matrix) -> Result<Matrix> {
        model.network.predict(x)
    }
}
