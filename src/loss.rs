//! Reconstruction losses.
//!
//! The autoencoder is trained to reproduce its own input, so every loss here
//! compares a reconstruction against the original (standardized) sample. Each loss
//! comes in two forms: a value-only function used for monitoring, and a `_backward`
//! variant that also writes `dL/d(pred)` into a caller-provided buffer.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Supported reconstruction objectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Loss {
    /// Mean squared error: `mean((pred - target)^2)`.
    #[default]
    Mse,
    /// Mean absolute error: `mean(|pred - target|)`.
    Mae,
}

impl Loss {
    /// Loss value for a single sample.
    ///
    /// Shape contract: `pred.len() == target.len()`.
    #[inline]
    pub fn forward(self, pred: &[f32], target: &[f32]) -> f32 {
        match self {
            Loss::Mse => mse(pred, target),
            Loss::Mae => mae(pred, target),
        }
    }

    /// Loss value plus gradient with respect to `pred`.
    ///
    /// Shape contract: `pred`, `target` and `d_pred` all have the same length.
    #[inline]
    pub fn backward(self, pred: &[f32], target: &[f32], d_pred: &mut [f32]) -> f32 {
        match self {
            Loss::Mse => mse_backward(pred, target, d_pred),
            Loss::Mae => mae_backward(pred, target, d_pred),
        }
    }
}

impl fmt::Display for Loss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loss::Mse => f.write_str("mean_squared_error"),
            Loss::Mae => f.write_str("mean_absolute_error"),
        }
    }
}

impl FromStr for Loss {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mse" | "mean_squared_error" => Ok(Loss::Mse),
            "mae" | "mean_absolute_error" => Ok(Loss::Mae),
            other => Err(Error::InvalidConfig(format!("unknown loss '{other}'"))),
        }
    }
}

#[inline]
fn check_lens(pred: &[f32], target: &[f32]) {
    assert_eq!(
        pred.len(),
        target.len(),
        "pred len {} does not match target len {}",
        pred.len(),
        target.len()
    );
}

/// Mean squared error.
#[inline]
pub fn mse(pred: &[f32], target: &[f32]) -> f32 {
    check_lens(pred, target);
    if pred.is_empty() {
        return 0.0;
    }

    let mut sum_sq = 0.0_f32;
    for (&p, &t) in pred.iter().zip(target) {
        let diff = p - t;
        sum_sq = diff.mul_add(diff, sum_sq);
    }
    sum_sq / pred.len() as f32
}

/// MSE plus gradient: `d_pred[i] = 2 (pred[i] - target[i]) / N`.
#[inline]
pub fn mse_backward(pred: &[f32], target: &[f32], d_pred: &mut [f32]) -> f32 {
    check_lens(pred, target);
    assert_eq!(
        pred.len(),
        d_pred.len(),
        "pred len {} does not match d_pred len {}",
        pred.len(),
        d_pred.len()
    );
    if pred.is_empty() {
        return 0.0;
    }

    let inv_n = 1.0 / pred.len() as f32;
    let mut sum_sq = 0.0_f32;
    for i in 0..pred.len() {
        let diff = pred[i] - target[i];
        sum_sq = diff.mul_add(diff, sum_sq);
        d_pred[i] = 2.0 * diff * inv_n;
    }
    sum_sq * inv_n
}

/// Mean absolute error.
#[inline]
pub fn mae(pred: &[f32], target: &[f32]) -> f32 {
    check_lens(pred, target);
    if pred.is_empty() {
        return 0.0;
    }

    let sum: f32 = pred.iter().zip(target).map(|(p, t)| (p - t).abs()).sum();
    sum / pred.len() as f32
}

/// MAE plus (sub)gradient. The subgradient at `pred == target` is zero.
#[inline]
pub fn mae_backward(pred: &[f32], target: &[f32], d_pred: &mut [f32]) -> f32 {
    check_lens(pred, target);
    assert_eq!(
        pred.len(),
        d_pred.len(),
        "pred len {} does not match d_pred len {}",
        pred.len(),
        d_pred.len()
    );
    if pred.is_empty() {
        return 0.0;
    }

    let inv_n = 1.0 / pred.len() as f32;
    let mut sum = 0.0_f32;
    for i in 0..pred.len() {
        let diff = pred[i] - target[i];
        sum += diff.abs();
        d_pred[i] = if diff > 0.0 {
            inv_n
        } else if diff < 0.0 {
            -inv_n
        } else {
            0.0
        };
    }
    sum * inv_n
}
