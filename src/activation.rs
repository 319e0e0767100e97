//! Activation functions.
//!
//! Each dense layer computes `z = W x + b` and then `y = activation(z)`. Only the
//! post-activation outputs `y` are cached during training; every supported
//! activation can express its derivative in terms of `y`, so backprop never needs
//! a separate `z` buffer.
//!
//! Activations are usually picked by name when configuring a detector:
//!
//! ```rust
//! use ae_outlier::Activation;
//!
//! let act: Activation = "relu".parse().unwrap();
//! assert_eq!(act, Activation::ReLU);
//! assert_eq!(act.to_string(), "relu");
//! ```

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Element-wise activation function.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum Activation {
    Tanh,
    #[cfg_attr(feature = "serde", serde(rename = "relu"))]
    ReLU,
    #[cfg_attr(feature = "serde", serde(rename = "leaky_relu"))]
    LeakyReLU { alpha: f32 },
    Sigmoid,
    Identity,
}

impl Activation {
    /// Validate activation parameters.
    pub fn validate(self) -> Result<()> {
        if let Activation::LeakyReLU { alpha } = self {
            if !(alpha.is_finite() && alpha >= 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "leaky ReLU alpha must be finite and >= 0, got {alpha}"
                )));
            }
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn forward(self, x: f32) -> f32 {
        match self {
            Activation::Tanh => x.tanh(),
            Activation::ReLU => x.max(0.0),
            Activation::LeakyReLU { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
            Activation::Sigmoid => sigmoid(x),
            Activation::Identity => x,
        }
    }

    /// Derivative with respect to the pre-activation, expressed through the cached
    /// output `y`.
    #[inline]
    pub(crate) fn grad_from_output(self, y: f32) -> f32 {
        match self {
            Activation::Tanh => 1.0 - y * y,
            Activation::ReLU => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::LeakyReLU { alpha } => {
                if y > 0.0 {
                    1.0
                } else {
                    alpha
                }
            }
            Activation::Sigmoid => y * (1.0 - y),
            Activation::Identity => 1.0,
        }
    }

    /// Apply the activation in place over a whole buffer.
    #[inline]
    pub(crate) fn apply(self, values: &mut [f32]) {
        for v in values {
            *v = self.forward(*v);
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activation::Tanh => f.write_str("tanh"),
            Activation::ReLU => f.write_str("relu"),
            Activation::LeakyReLU { alpha } => write!(f, "leaky_relu({alpha})"),
            Activation::Sigmoid => f.write_str("sigmoid"),
            Activation::Identity => f.write_str("linear"),
        }
    }
}

impl FromStr for Activation {
    type Err = Error;

    /// Parses the usual identifiers (`relu`, `sigmoid`, `tanh`, `linear`,
    /// `leaky_relu`). `leaky_relu` uses a slope of 0.3.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tanh" => Ok(Activation::Tanh),
            "relu" => Ok(Activation::ReLU),
            "leaky_relu" | "leakyrelu" => Ok(Activation::LeakyReLU { alpha: 0.3 }),
            "sigmoid" | "logistic" => Ok(Activation::Sigmoid),
            "linear" | "identity" => Ok(Activation::Identity),
            other => Err(Error::InvalidConfig(format!("unknown activation '{other}'"))),
        }
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    // Numerically stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}
