//! Reconstruction-error outlier detection.
//!
//! `ae-outlier` fits a small, symmetric dense autoencoder to a tabular dataset and
//! scores every sample by how far its reconstruction lands from the original.
//! Samples that follow the dominant, compressible structure of the data are
//! reconstructed well; outliers are not.
//!
//! # Pipeline
//!
//! - [`Standardizer`]: per-feature mean/scale, fit once, reused at scoring time.
//! - [`Architecture`] / [`NetworkBuilder`]: the encoder/decoder stack
//!   (dense + dropout blocks with an L2 activity penalty), compiled with a
//!   [`Loss`] and an [`Optimizer`].
//! - [`train::train`]: shuffled mini-batch training with a fixed hold-out slice
//!   for validation loss.
//! - [`score::reconstruction_distances`]: per-row Euclidean residuals.
//! - [`Calibration`]: contamination threshold and binary labels.
//! - [`AutoEncoder`]: the detector that wires all of the above together.
//!
//! # Panics vs `Result`
//!
//! The per-sample hot path ([`Network::forward`], [`Network::forward_train`],
//! [`Network::backward`]) treats shape mismatches as programmer error and panics
//! via `assert!`. Everything reachable from [`AutoEncoder`] validates its inputs
//! and returns [`Result`].
//!
//! # Data layout
//!
//! - Scalars are `f32`.
//! - [`Matrix`] stores samples contiguously in row-major layout.
//! - Layer weights are row-major with shape `(out_dim, in_dim)`.
//!
//! # Quick start
//!
//! ```rust
//! use ae_outlier::{AutoEncoder, AutoEncoderConfig, Matrix};
//!
//! # fn main() -> ae_outlier::Result<()> {
//! let mut rows: Vec<Vec<f32>> = (0..60)
//!     .map(|i| {
//!         let t = i as f32 / 60.0;
//!         vec![t, 2.0 * t, 1.0 - t, 0.5]
//!     })
//!     .collect();
//! rows.push(vec![3.0, -4.0, 8.0, 0.5]);
//! let x = Matrix::from_rows(&rows)?;
//!
//! let mut detector = AutoEncoder::new(
//!     AutoEncoderConfig::default()
//!         .with_hidden_layer_widths([3, 2, 3])
//!         .with_epochs(20)
//!         .with_random_seed(7),
//! )?;
//! let fitted = detector.fit(&x)?;
//! assert_eq!(fitted.decision_scores.len(), 61);
//! assert_eq!(fitted.effective_hidden_widths, vec![4, 3, 2, 3]);
//!
//! let labels = detector.predict(&x)?;
//! assert_eq!(labels.len(), 61);
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! The crate emits [`tracing`] events (network compilation, fit milestones,
//! per-epoch losses) and never installs a subscriber itself.

pub mod activation;
pub mod builder;
pub mod calibration;
pub mod data;
pub mod detector;
pub mod engine;
pub mod error;
pub mod layer;
pub mod loss;
pub(crate) mod matmul;
pub mod network;
pub mod optim;
pub mod score;
pub mod standardize;
pub mod train;

pub use activation::Activation;
pub use builder::{Architecture, Compiled, NetworkBuilder};
pub use calibration::Calibration;
pub use data::Matrix;
pub use detector::{AutoEncoder, AutoEncoderConfig, FittedState};
pub use engine::{DenseEngine, Engine};
pub use error::{Error, Result};
pub use layer::{Dropout, Init, Layer};
pub use loss::Loss;
pub use network::{Block, Gradients, Network, Scratch};
pub use optim::{Optimizer, OptimizerState};
pub use standardize::Standardizer;
pub use train::{EpochRecord, History, TrainConfig, Verbosity};
