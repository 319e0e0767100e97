//! The reconstruction-error outlier detector.
//!
//! [`AutoEncoder`] ties the pieces together:
//!
//! 1. validate the configuration eagerly in [`AutoEncoder::new`];
//! 2. on [`AutoEncoder::fit`], standardize the data once, build the symmetric
//!    network for the observed feature count, train it on a shuffled index view,
//!    reconstruct the standardized rows in their original order and turn the
//!    residuals into `decision_scores`;
//! 3. derive the contamination threshold and training labels;
//! 4. on [`AutoEncoder::score`], push new rows through the stored standardizer
//!    and the trained network and return their reconstruction distances.
//!
//! Refitting policy: a successful `fit` replaces all fitted state. A failed `fit`
//! leaves the previous state untouched.

use std::fmt;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::builder::Architecture;
use crate::calibration::{self, Calibration};
use crate::engine::{DenseEngine, Engine};
use crate::score::reconstruction_distances;
use crate::standardize::Standardizer;
use crate::train::{History, TrainConfig, Verbosity};
use crate::{Activation, Error, Loss, Matrix, Optimizer, Result};

/// Detector configuration.
///
/// Defaults mirror the common autoencoder detector setup: widths
/// `[64, 32, 32, 64]`, ReLU hidden layers, sigmoid output, MSE, Adam,
/// 100 epochs of batch 32, dropout 0.2, activity L2 0.1, 10% validation
/// hold-out, standardized inputs and 10% contamination.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AutoEncoderConfig {
    /// Hidden layer widths; must read the same forwards and backwards.
    pub hidden_layer_widths: Vec<usize>,
    pub hidden_activation: Activation,
    pub output_activation: Activation,
    pub loss: Loss,
    pub optimizer: Optimizer,
    pub learning_rate: f32,
    pub epochs: usize,
    pub batch_size: usize,
    /// In `[0, 1)`.
    pub dropout_rate: f32,
    /// Activity penalty on every dense layer's outputs; `>= 0`.
    pub l2_penalty: f32,
    /// In `[0, 1)`.
    pub validation_fraction: f64,
    pub standardize_inputs: bool,
    pub verbosity: Verbosity,
    /// Seed for weight init, shuffling and dropout. `None` draws from OS entropy.
    pub random_seed: Option<u64>,
    /// Expected share of outliers, in `(0, 0.5]`.
    pub contamination: f32,
}

impl Default for AutoEncoderConfig {
    fn default() -> Self {
        Self {
            hidden_layer_widths: vec![64, 32, 32, 64],
            hidden_activation: Activation::ReLU,
            output_activation: Activation::Sigmoid,
            loss: Loss::Mse,
            optimizer: Optimizer::adam(),
            learning_rate: 1e-3,
            epochs: 100,
            batch_size: 32,
            dropout_rate: 0.2,
            l2_penalty: 0.1,
            validation_fraction: 0.1,
            standardize_inputs: true,
            verbosity: Verbosity::Silent,
            random_seed: None,
            contamination: 0.1,
        }
    }
}

impl AutoEncoderConfig {
    pub fn with_hidden_layer_widths(mut self, widths: impl Into<Vec<usize>>) -> Self {
        self.hidden_layer_widths = widths.into();
        self
    }

    pub fn with_activations(mut self, hidden: Activation, output: Activation) -> Self {
        self.hidden_activation = hidden;
        self.output_activation = output;
        self
    }

    pub fn with_loss(mut self, loss: Loss) -> Self {
        self.loss = loss;
        self
    }

    pub fn with_optimizer(mut self, optimizer: Optimizer, learning_rate: f32) -> Self {
        self.optimizer = optimizer;
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_dropout_rate(mut self, rate: f32) -> Self {
        self.dropout_rate = rate;
        self
    }

    pub fn with_l2_penalty(mut self, penalty: f32) -> Self {
        self.l2_penalty = penalty;
        self
    }

    pub fn with_validation_fraction(mut self, fraction: f64) -> Self {
        self.validation_fraction = fraction;
        self
    }

    pub fn with_standardize_inputs(mut self, standardize: bool) -> Self {
        self.standardize_inputs = standardize;
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn with_contamination(mut self, contamination: f32) -> Self {
        self.contamination = contamination;
        self
    }

    /// Check every construction-time invariant.
    pub fn validate(&self) -> Result<()> {
        let widths = &self.hidden_layer_widths;
        if widths.is_empty() {
            return Err(Error::InvalidConfig(
                "hidden_layer_widths must not be empty".to_owned(),
            ));
        }
        if let Some(pos) = widths.iter().position(|&w| w == 0) {
            return Err(Error::InvalidConfig(format!(
                "hidden layer widths must be > 0, got 0 at position {pos}"
            )));
        }
        if !widths.iter().eq(widths.iter().rev()) {
            return Err(Error::InvalidConfig(format!(
                "hidden layer widths must be symmetric, got {widths:?}"
            )));
        }

        self.hidden_activation.validate()?;
        self.output_activation.validate()?;
        self.optimizer.validate()?;
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning_rate must be finite and > 0, got {}",
                self.learning_rate
            )));
        }

        check_in_range("dropout_rate", self.dropout_rate, 0.0, 1.0)?;
        if !(self.l2_penalty.is_finite() && self.l2_penalty >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "l2_penalty must be finite and >= 0, got {}",
                self.l2_penalty
            )));
        }
        self.train_config().validate()?;
        calibration::check_contamination(self.contamination)
    }

    fn train_config(&self) -> TrainConfig {
        TrainConfig {
            epochs: self.epochs,
            batch_size: self.batch_size,
            validation_fraction: self.validation_fraction,
            verbosity: self.verbosity,
        }
    }
}

/// Fails unless `low <= value < high`.
pub fn check_in_range(name: &str, value: f32, low: f32, high: f32) -> Result<()> {
    if !(value.is_finite() && value >= low && value < high) {
        return Err(Error::InvalidConfig(format!(
            "{name} must be in [{low}, {high}), got {value}"
        )));
    }
    Ok(())
}

/// Everything produced by one successful `fit`.
#[derive(Debug, Clone)]
pub struct FittedState<M> {
    pub feature_count: usize,
    pub sample_count: usize,
    /// `feature_count` followed by the configured hidden widths.
    pub effective_hidden_widths: Vec<usize>,
    /// Median of the configured hidden widths.
    pub encoding_width: f64,
    /// `floor(feature_count / encoding_width)`.
    pub compression_ratio: f64,
    pub standardizer: Option<Standardizer>,
    pub model: M,
    pub history: History,
    /// One score per training row, in the original row order.
    pub decision_scores: Vec<f32>,
    pub threshold: f32,
    pub labels: Vec<u8>,
}

/// Reconstruction-error outlier detector.
///
/// ```rust
/// use ae_outlier::{AutoEncoder, AutoEncoderConfig, Matrix};
///
/// # fn main() -> ae_outlier::Result<()> {
/// let mut rows: Vec<[f32; 2]> = (0..40).map(|i| [i as f32 * 0.01, i as f32 * 0.01]).collect();
/// rows.push([5.0, -5.0]);
/// let x = Matrix::from_rows(&rows)?;
///
/// let config = AutoEncoderConfig::default()
///     .with_hidden_layer_widths([2, 1, 2])
///     .with_epochs(5)
///     .with_random_seed(0);
/// let mut detector = AutoEncoder::new(config)?;
/// detector.fit(&x)?;
///
/// let scores = detector.score(&x)?;
/// assert_eq!(scores.len(), 41);
/// # Ok(())
/// # }
/// ```
pub struct AutoEncoder<E: Engine = DenseEngine> {
    config: AutoEncoderConfig,
    engine: E,
    fitted: Option<FittedState<E::Model>>,
}

impl<E: Engine + Clone> Clone for AutoEncoder<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            engine: self.engine.clone(),
            fitted: self.fitted.clone(),
        }
    }
}

impl<E: Engine> fmt::Debug for AutoEncoder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoEncoder")
            .field("config", &self.config)
            .field("fitted", &self.is_fitted())
            .finish_non_exhaustive()
    }
}

impl AutoEncoder<DenseEngine> {
    /// Validate `config` and create an unfitted detector.
    pub fn new(config: AutoEncoderConfig) -> Result<Self> {
        Self::with_engine(config, DenseEngine)
    }
}

impl<E: Engine> AutoEncoder<E> {
    /// Like [`AutoEncoder::new`], with a caller-provided backend.
    pub fn with_engine(config: AutoEncoderConfig, engine: E) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            engine,
            fitted: None,
        })
    }

    #[inline]
    pub fn config(&self) -> &AutoEncoderConfig {
        &self.config
    }

    #[inline]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    #[inline]
    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Fitted state, or [`Error::NotFitted`].
    pub fn fitted(&self) -> Result<&FittedState<E::Model>> {
        self.fitted.as_ref().ok_or(Error::NotFitted)
    }

    pub fn decision_scores(&self) -> Result<&[f32]> {
        Ok(&self.fitted()?.decision_scores)
    }

    pub fn labels(&self) -> Result<&[u8]> {
        Ok(&self.fitted()?.labels)
    }

    pub fn threshold(&self) -> Result<f32> {
        Ok(self.fitted()?.threshold)
    }

    pub fn history(&self) -> Result<&History> {
        Ok(&self.fitted()?.history)
    }

    pub fn effective_hidden_widths(&self) -> Result<&[usize]> {
        Ok(&self.fitted()?.effective_hidden_widths)
    }

    pub fn encoding_width(&self) -> Result<f64> {
        Ok(self.fitted()?.encoding_width)
    }

    pub fn compression_ratio(&self) -> Result<f64> {
        Ok(self.fitted()?.compression_ratio)
    }

    /// Fit the detector on `x` (rows are samples).
    pub fn fit(&mut self, x: &Matrix) -> Result<&FittedState<E::Model>> {
        x.ensure_finite_non_empty()?;
        let (sample_count, feature_count) = x.shape();
        let cfg = &self.config;

        let min_width = cfg
            .hidden_layer_widths
            .iter()
            .copied()
            .min()
            .ok_or_else(|| Error::InvalidConfig("hidden_layer_widths must not be empty".to_owned()))?;
        if min_width > feature_count {
            return Err(Error::InvalidData(format!(
                "narrowest hidden layer ({min_width}) exceeds the number of features ({feature_count})"
            )));
        }

        let (x_norm, standardizer) = if cfg.standardize_inputs {
            let (z, state) = Standardizer::fit_transform(x)?;
            (z, Some(state))
        } else {
            (x.clone(), None)
        };

        let effective_hidden_widths: Vec<usize> = std::iter::once(feature_count)
            .chain(cfg.hidden_layer_widths.iter().copied())
            .collect();
        let encoding_width = median(&cfg.hidden_layer_widths);
        let compression_ratio = (feature_count as f64 / encoding_width).floor();

        tracing::debug!(
            samples = sample_count,
            features = feature_count,
            widths = ?effective_hidden_widths,
            encoding_width,
            compression_ratio,
            "fitting reconstruction detector"
        );

        let arch = Architecture {
            feature_count,
            effective_hidden_widths: effective_hidden_widths.clone(),
            hidden_activation: cfg.hidden_activation,
            output_activation: cfg.output_activation,
            dropout_rate: cfg.dropout_rate,
            l2_penalty: cfg.l2_penalty,
            loss: cfg.loss,
            optimizer: cfg.optimizer,
            learning_rate: cfg.learning_rate,
        };

        let mut rng = match cfg.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut model = self.engine.build(&arch, &mut rng)?;
        let history = self
            .engine
            .train(&mut model, &x_norm, &cfg.train_config(), &mut rng)?;

        // Score the same normalized matrix the network was trained on, in the
        // caller's row order.
        let reconstructed = self.engine.predict(&model, &x_norm)?;
        let decision_scores = reconstruction_distances(&x_norm, &reconstructed)?;
        let Calibration { threshold, labels } =
            Calibration::from_scores(&decision_scores, cfg.contamination)?;

        tracing::debug!(
            threshold,
            outliers = labels.iter().filter(|&&l| l == 1).count(),
            "detector fitted"
        );

        let state = FittedState {
            feature_count,
            sample_count,
            effective_hidden_widths,
            encoding_width,
            compression_ratio,
            standardizer,
            model,
            history,
            decision_scores,
            threshold,
            labels,
        };
        Ok(&*self.fitted.insert(state))
    }

    /// Reconstruction distance of every row of `x` under the fitted model.
    ///
    /// Pure with respect to the detector: fitted state is only read.
    pub fn score(&self, x: &Matrix) -> Result<Vec<f32>> {
        let fitted = self.fitted()?;
        if x.cols() != fitted.feature_count {
            return Err(Error::ShapeMismatch {
                expected: fitted.feature_count,
                actual: x.cols(),
            });
        }
        x.ensure_finite_non_empty()?;

        let x_norm = match &fitted.standardizer {
            Some(state) => state.transform(x)?,
            None => x.clone(),
        };
        let reconstructed = self.engine.predict(&fitted.model, &x_norm)?;
        reconstruction_distances(&x_norm, &reconstructed)
    }

    /// Outlier scores for `x`; same as [`AutoEncoder::score`].
    #[inline]
    pub fn decision_function(&self, x: &Matrix) -> Result<Vec<f32>> {
        self.score(x)
    }

    /// Binary labels for `x` (1 = outlier) using the threshold learned at fit time.
    pub fn predict(&self, x: &Matrix) -> Result<Vec<u8>> {
        let threshold = self.threshold()?;
        Ok(self
            .score(x)?
            .into_iter()
            .map(|s| calibration::label(s, threshold))
            .collect())
    }

    /// Fit on `x` and return its training labels.
    pub fn fit_predict(&mut self, x: &Matrix) -> Result<Vec<u8>> {
        Ok(self.fit(x)?.labels.clone())
    }
}

/// Median of the widths; the mean of the two middle values for even lengths.
fn median(widths: &[usize]) -> f64 {
    let mut sorted = widths.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len().is_multiple_of(2) {
        (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
    } else {
        sorted[mid] as f64
    }
}
