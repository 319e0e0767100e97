//! Unsupervised reconstruction training.
//!
//! The input matrix is both feature and target: the network learns to reproduce
//! each row. Rows are never copied or reordered; training walks a shuffled
//! *index view* of the matrix.
//!
//! Split policy: the index permutation is shuffled once, and its trailing
//! `n - floor(n * (1 - validation_fraction))` positions are held out for the
//! whole run (the Keras `validation_split` rule). Held-out rows only
//! feed the per-epoch validation loss. The remaining positions are reshuffled
//! every epoch and consumed in `batch_size` groups; each group produces one
//! optimizer step from batch-averaged gradients.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::builder::Compiled;
use crate::{Error, Matrix, Result};

/// How much the training loop reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Verbosity {
    /// Per-epoch records are logged at `trace` level only.
    #[default]
    Silent,
    /// One `info` event per epoch.
    PerEpoch,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_fraction: f64,
    pub verbosity: Verbosity,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 32,
            validation_fraction: 0.1,
            verbosity: Verbosity::Silent,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be > 0".to_owned()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        if !(self.validation_fraction.is_finite() && (0.0..1.0).contains(&self.validation_fraction)) {
            return Err(Error::InvalidConfig(format!(
                "validation_fraction must be in [0, 1), got {}",
                self.validation_fraction
            )));
        }
        Ok(())
    }

    /// Number of rows held out from `n`: `n - floor(n * (1 - validation_fraction))`.
    #[inline]
    pub fn holdout_len(&self, n: usize) -> usize {
        let kept = (n as f64 * (1.0 - self.validation_fraction)).floor() as usize;
        n - kept.min(n)
    }
}

/// Losses observed during one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EpochRecord {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Mean objective (reconstruction loss plus activity penalty) over the
    /// training rows, with dropout active.
    pub train_loss: f32,
    /// Same objective over held-out rows in inference mode; `None` when nothing
    /// is held out.
    pub val_loss: Option<f32>,
}

/// Ordered per-epoch training records.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct History {
    pub epochs: Vec<EpochRecord>,
}

impl History {
    #[inline]
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.epochs.last()
    }

    pub fn train_losses(&self) -> Vec<f32> {
        self.epochs.iter().map(|r| r.train_loss).collect()
    }

    pub fn val_losses(&self) -> Vec<Option<f32>> {
        self.epochs.iter().map(|r| r.val_loss).collect()
    }
}

/// Train `compiled` to reconstruct the rows of `x`.
///
/// `rng` drives the split, the per-epoch shuffles and the dropout masks.
pub fn train<R: Rng + ?Sized>(
    compiled: &mut Compiled,
    x: &Matrix,
    cfg: &TrainConfig,
    rng: &mut R,
) -> Result<History> {
    cfg.validate()?;
    if x.is_empty() {
        return Err(Error::InvalidData("training matrix must not be empty".to_owned()));
    }
    if x.cols() != compiled.network.input_dim() {
        return Err(Error::ShapeMismatch {
            expected: compiled.network.input_dim(),
            actual: x.cols(),
        });
    }

    let n = x.rows();
    let n_val = cfg.holdout_len(n);
    if n_val >= n {
        return Err(Error::InvalidData(format!(
            "validation_fraction {} leaves no training rows out of {n}",
            cfg.validation_fraction
        )));
    }

    let mut order = shuffled_order(n, rng);
    let (train_idx, val_idx) = order.split_at_mut(n - n_val);

    tracing::debug!(
        train_rows = train_idx.len(),
        val_rows = val_idx.len(),
        epochs = cfg.epochs,
        batch_size = cfg.batch_size,
        "starting reconstruction training"
    );

    let Compiled {
        network,
        loss,
        optimizer,
        learning_rate,
    } = compiled;

    let mut scratch = network.scratch();
    let mut grads = network.gradients();
    let mut history = History {
        epochs: Vec::with_capacity(cfg.epochs),
    };

    for epoch in 1..=cfg.epochs {
        train_idx.shuffle(rng);

        let mut total = 0.0_f64;
        for batch in train_idx.chunks(cfg.batch_size) {
            grads.zero();
            for &row in batch.iter() {
                let input = x.row(row);
                let pred = network.forward_train(input, &mut scratch, rng);
                let sample_loss = loss.backward(pred, input, grads.d_output_mut());
                total += f64::from(sample_loss + scratch.penalty());
                network.backward(input, &scratch, &mut grads);
            }
            grads.scale(1.0 / batch.len() as f32);
            optimizer.step(network, &mut grads, *learning_rate);
        }
        let train_loss = (total / train_idx.len() as f64) as f32;

        if !train_loss.is_finite() {
            return Err(Error::Diverged {
                epoch,
                loss: train_loss,
            });
        }

        let val_loss = if val_idx.is_empty() {
            None
        } else {
            let mut val_total = 0.0_f64;
            for &row in val_idx.iter() {
                let input = x.row(row);
                let pred = network.forward(input, &mut scratch);
                val_total += f64::from(loss.forward(pred, input) + scratch.penalty());
            }
            Some((val_total / val_idx.len() as f64) as f32)
        };

        match cfg.verbosity {
            Verbosity::PerEpoch => tracing::info!(
                epoch,
                epochs = cfg.epochs,
                train_loss,
                val_loss = ?val_loss,
                "epoch finished"
            ),
            Verbosity::Silent => tracing::trace!(epoch, train_loss, val_loss = ?val_loss, "epoch finished"),
        }

        history.epochs.push(EpochRecord {
            epoch,
            train_loss,
            val_loss,
        });
    }

    Ok(history)
}

/// A random permutation of `0..n`. Training takes the leading positions, the
/// hold-out the trailing ones.
fn shuffled_order<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    order
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::builder::Architecture;
    use crate::{Activation, Loss, Optimizer};

    fn compiled(features: usize, widths: Vec<usize>, dropout: f32, rng: &mut StdRng) -> Compiled {
        Architecture {
            feature_count: features,
            effective_hidden_widths: widths,
            hidden_activation: Activation::Tanh,
            output_activation: Activation::Identity,
            dropout_rate: dropout,
            l2_penalty: 0.0,
            loss: Loss::Mse,
            optimizer: Optimizer::adam(),
            learning_rate: 1e-2,
        }
        .compile(rng)
        .unwrap()
    }

    fn toy_matrix(rows: usize) -> Matrix {
        let values = (0..rows)
            .flat_map(|i| {
                let t = i as f32 / rows as f32;
                [t, 1.0 - t, 0.5 * t]
            })
            .collect();
        Matrix::from_flat(values, 3).unwrap()
    }

    #[test]
    fn records_one_entry_per_epoch() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut c = compiled(3, vec![3, 2, 3], 0.0, &mut rng);
        let cfg = TrainConfig {
            epochs: 7,
            batch_size: 4,
            validation_fraction: 0.2,
            verbosity: Verbosity::Silent,
        };
        let history = train(&mut c, &toy_matrix(20), &cfg, &mut rng).unwrap();

        assert_eq!(history.len(), 7);
        let epochs: Vec<usize> = history.epochs.iter().map(|r| r.epoch).collect();
        assert_eq!(epochs, (1..=7).collect::<Vec<_>>());
        assert!(history.epochs.iter().all(|r| r.val_loss.is_some()));
    }

    #[test]
    fn no_holdout_means_no_validation_loss() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut c = compiled(3, vec![3, 3], 0.0, &mut rng);
        let cfg = TrainConfig {
            epochs: 2,
            batch_size: 8,
            validation_fraction: 0.0,
            verbosity: Verbosity::PerEpoch,
        };
        let history = train(&mut c, &toy_matrix(10), &cfg, &mut rng).unwrap();
        assert!(history.val_losses().iter().all(Option::is_none));
    }

    #[test]
    fn training_reduces_reconstruction_loss() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut c = compiled(3, vec![3, 2, 3], 0.0, &mut rng);
        let cfg = TrainConfig {
            epochs: 200,
            batch_size: 8,
            validation_fraction: 0.0,
            verbosity: Verbosity::Silent,
        };
        let history = train(&mut c, &toy_matrix(32), &cfg, &mut rng).unwrap();
        let losses = history.train_losses();
        assert!(losses[losses.len() - 1] < losses[0] * 0.5, "losses: {:?}", &losses[..3]);
    }

    #[test]
    fn holdout_must_leave_training_rows() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut c = compiled(3, vec![3], 0.0, &mut rng);
        let cfg = TrainConfig {
            epochs: 1,
            batch_size: 1,
            validation_fraction: 0.5,
            verbosity: Verbosity::Silent,
        };
        // 3 - floor(1.5) = 2 rows held out, one left to train on.
        assert!(train(&mut c, &toy_matrix(3), &cfg, &mut rng).is_ok());
        // 1 - floor(0.5) = 1: nothing left to train on.
        assert!(matches!(
            train(&mut c, &toy_matrix(1), &cfg, &mut rng),
            Err(Error::InvalidData(_))
        ));

        let bad = TrainConfig {
            validation_fraction: 1.0,
            ..cfg
        };
        assert!(train(&mut c, &toy_matrix(4), &bad, &mut rng).is_err());
    }

    #[test]
    fn split_is_reproducible_for_a_seed() {
        let run = || {
            let mut rng = StdRng::seed_from_u64(11);
            let mut c = compiled(3, vec![3, 2, 3], 0.2, &mut rng);
            let cfg = TrainConfig {
                epochs: 3,
                batch_size: 4,
                validation_fraction: 0.25,
                verbosity: Verbosity::Silent,
            };
            train(&mut c, &toy_matrix(16), &cfg, &mut rng).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn holdout_len_follows_keras_validation_split() {
        let cfg = |validation_fraction| TrainConfig {
            validation_fraction,
            ..TrainConfig::default()
        };
        assert_eq!(cfg(0.15).holdout_len(10), 2);
        assert_eq!(cfg(0.1).holdout_len(10), 1);
        assert_eq!(cfg(0.1).holdout_len(51), 6);
        assert_eq!(cfg(0.0).holdout_len(10), 0);
        assert_eq!(cfg(0.5).holdout_len(0), 0);
    }

    #[test]
    fn shuffled_order_partitions_rows() {
        let mut rng = StdRng::seed_from_u64(21);
        let n = 17;
        let n_val = TrainConfig::default().holdout_len(n);
        let order = shuffled_order(n, &mut rng);
        let (train_idx, val_idx) = order.split_at(n - n_val);

        assert_eq!(val_idx.len(), 2);
        assert!(train_idx.iter().all(|i| !val_idx.contains(i)));
        let mut all = order.clone();
        all.sort_unstable();
        assert_eq!(all, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn held_out_rows_never_update_parameters() {
        let arch = Architecture {
            feature_count: 2,
            effective_hidden_widths: vec![2],
            hidden_activation: Activation::Identity,
            output_activation: Activation::Identity,
            dropout_rate: 0.0,
            l2_penalty: 0.0,
            loss: Loss::Mse,
            optimizer: Optimizer::Sgd,
            learning_rate: 0.1,
        };
        let cfg = TrainConfig {
            epochs: 500,
            batch_size: 1,
            validation_fraction: 0.5,
            verbosity: Verbosity::Silent,
        };

        let mut rng = StdRng::seed_from_u64(8);
        let base = arch.compile(&mut rng).unwrap();

        // Same RNG state as `train` will see, so the same row is held out.
        let order = shuffled_order(2, &mut rng.clone());
        let held = order[1];

        let x = Matrix::from_rows(&[[1.0_f32, 0.0], [0.0, 1.0]]).unwrap();
        let mut x_moved = x.clone();
        x_moved.row_mut(held).copy_from_slice(&[5.0, -3.0]);

        let mut a = base.clone();
        let mut b = base;
        let history_a = train(&mut a, &x, &cfg, &mut rng.clone()).unwrap();
        let history_b = train(&mut b, &x_moved, &cfg, &mut rng.clone()).unwrap();

        for idx in 0..a.network.num_layers() {
            let (la, lb) = (a.network.layer(idx).unwrap(), b.network.layer(idx).unwrap());
            assert_eq!(la.weights(), lb.weights(), "layer {idx} weights");
            assert_eq!(la.biases(), lb.biases(), "layer {idx} biases");
        }

        let first = history_a.epochs[0];
        let last = history_a.last().copied().unwrap();
        assert!(last.train_loss < 1e-4, "first={first:?} last={last:?}");
        assert!(last.train_loss < first.train_loss);
        assert_eq!(history_a.train_losses(), history_b.train_losses());
        assert_ne!(history_a.val_losses(), history_b.val_losses());
    }
}
