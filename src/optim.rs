//! Optimizers.
//!
//! [`Optimizer`] is the configuration value (which update rule, with which
//! hyperparameters). [`OptimizerState`] is the per-network state allocated from
//! it when a network is compiled; the training loop owns it and reuses it across
//! steps.

use std::str::FromStr;

use crate::network::Gradients;
use crate::{Error, Network, Result};

/// Parameter-update rule.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum Optimizer {
    /// Plain SGD.
    Sgd,
    /// SGD with momentum.
    SgdMomentum { momentum: f32 },
    /// Adam (bias-corrected).
    Adam { beta1: f32, beta2: f32, eps: f32 },
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::adam()
    }
}

impl Optimizer {
    /// Adam with the usual defaults (`0.9`, `0.999`, `1e-7`).
    pub const fn adam() -> Self {
        Optimizer::Adam {
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-7,
        }
    }

    /// Validate optimizer hyperparameters.
    pub fn validate(self) -> Result<()> {
        match self {
            Optimizer::Sgd => Ok(()),
            Optimizer::SgdMomentum { momentum } => check_unit("momentum", momentum),
            Optimizer::Adam { beta1, beta2, eps } => {
                check_unit("adam beta1", beta1)?;
                check_unit("adam beta2", beta2)?;
                if !(eps.is_finite() && eps > 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "adam eps must be finite and > 0, got {eps}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Allocate optimizer state for `net`.
    pub fn state(self, net: &Network) -> Result<OptimizerState> {
        self.validate()?;

        Ok(match self {
            Optimizer::Sgd => OptimizerState::Sgd,
            Optimizer::SgdMomentum { momentum } => OptimizerState::SgdMomentum {
                momentum,
                velocity: ParamBuffers::zeros_like(net),
            },
            Optimizer::Adam { beta1, beta2, eps } => OptimizerState::Adam {
                beta1,
                beta2,
                eps,
                beta1_pow: 1.0,
                beta2_pow: 1.0,
                m: ParamBuffers::zeros_like(net),
                v: ParamBuffers::zeros_like(net),
            },
        })
    }
}

impl FromStr for Optimizer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sgd" => Ok(Optimizer::Sgd),
            "momentum" => Ok(Optimizer::SgdMomentum { momentum: 0.9 }),
            "adam" => Ok(Optimizer::adam()),
            other => Err(Error::InvalidConfig(format!("unknown optimizer '{other}'"))),
        }
    }
}

fn check_unit(name: &str, value: f32) -> Result<()> {
    if !(value.is_finite() && (0.0..1.0).contains(&value)) {
        return Err(Error::InvalidConfig(format!(
            "{name} must be finite and in [0,1), got {value}"
        )));
    }
    Ok(())
}

/// One buffer per layer for weights and for biases.
#[derive(Debug, Clone, Default)]
pub struct ParamBuffers {
    weights: Vec<Vec<f32>>,
    biases: Vec<Vec<f32>>,
}

impl ParamBuffers {
    fn zeros_like(net: &Network) -> Self {
        let mut weights = Vec::with_capacity(net.num_layers());
        let mut biases = Vec::with_capacity(net.num_layers());
        for block in net.blocks() {
            weights.push(vec![0.0; block.dense.weights().len()]);
            biases.push(vec![0.0; block.dense.out_dim()]);
        }
        Self { weights, biases }
    }
}

/// Owned optimizer state.
#[derive(Debug, Clone, Default)]
pub enum OptimizerState {
    #[default]
    Sgd,
    SgdMomentum {
        momentum: f32,
        velocity: ParamBuffers,
    },
    Adam {
        beta1: f32,
        beta2: f32,
        eps: f32,
        beta1_pow: f32,
        beta2_pow: f32,
        m: ParamBuffers,
        v: ParamBuffers,
    },
}

impl OptimizerState {
    /// Apply one update using (batch-averaged) gradients.
    ///
    /// `grads` is used as scratch space: momentum and Adam overwrite it with the
    /// update direction before applying it.
    pub fn step(&mut self, net: &mut Network, grads: &mut Gradients, lr: f32) {
        assert!(lr.is_finite() && lr > 0.0, "lr must be finite and > 0");

        match self {
            OptimizerState::Sgd => {}
            OptimizerState::SgdMomentum { momentum, velocity } => {
                for layer_idx in 0..net.num_layers() {
                    momentum_update(*momentum, &mut velocity.weights[layer_idx], grads.d_weights_mut(layer_idx));
                    momentum_update(*momentum, &mut velocity.biases[layer_idx], grads.d_biases_mut(layer_idx));
                }
            }
            OptimizerState::Adam {
                beta1,
                beta2,
                eps,
                beta1_pow,
                beta2_pow,
                m,
                v,
            } => {
                *beta1_pow *= *beta1;
                *beta2_pow *= *beta2;
                let moments = AdamMoments {
                    beta1: *beta1,
                    beta2: *beta2,
                    eps: *eps,
                    corr1: 1.0 - *beta1_pow,
                    corr2: 1.0 - *beta2_pow,
                };

                for layer_idx in 0..net.num_layers() {
                    moments.update(
                        &mut m.weights[layer_idx],
                        &mut v.weights[layer_idx],
                        grads.d_weights_mut(layer_idx),
                    );
                    moments.update(
                        &mut m.biases[layer_idx],
                        &mut v.biases[layer_idx],
                        grads.d_biases_mut(layer_idx),
                    );
                }
            }
        }

        for layer_idx in 0..net.num_layers() {
            let layer = net.layer_mut(layer_idx).expect("layer idx must be valid");
            layer.apply_step(grads.d_weights(layer_idx), grads.d_biases(layer_idx), lr);
        }
    }
}

#[inline]
fn momentum_update(momentum: f32, velocity: &mut [f32], grad: &mut [f32]) {
    for (v, g) in velocity.iter_mut().zip(grad.iter_mut()) {
        *v = momentum * *v + *g;
        *g = *v;
    }
}

struct AdamMoments {
    beta1: f32,
    beta2: f32,
    eps: f32,
    corr1: f32,
    corr2: f32,
}

impl AdamMoments {
    #[inline]
    fn update(&self, m: &mut [f32], v: &mut [f32], grad: &mut [f32]) {
        for i in 0..grad.len() {
            let g = grad[i];
            m[i] = self.beta1 * m[i] + (1.0 - self.beta1) * g;
            v[i] = self.beta2 * v[i] + (1.0 - self.beta2) * g * g;
            let m_hat = m[i] / self.corr1;
            let v_hat = v[i] / self.corr2;
            grad[i] = m_hat / (v_hat.sqrt() + self.eps);
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::layer::Layer;
    use crate::network::Block;
    use crate::Activation;

    fn scalar_net(w: f32, b: f32) -> Network {
        let layer = Layer::from_parts(1, 1, Activation::Identity, vec![w], vec![b]).unwrap();
        Network::from_blocks(
            vec![Block {
                dense: layer,
                dropout: None,
            }],
            0.0,
        )
        .unwrap()
    }

    fn params(net: &Network) -> (f32, f32) {
        let layer = net.layer(0).unwrap();
        (layer.weights()[0], layer.biases()[0])
    }

    #[test]
    fn validation_rejects_bad_hyperparams() {
        assert!(Optimizer::SgdMomentum { momentum: 1.0 }.validate().is_err());
        assert!(Optimizer::SgdMomentum { momentum: -0.1 }.validate().is_err());
        assert!(
            Optimizer::Adam {
                beta1: 0.9,
                beta2: 0.999,
                eps: 0.0
            }
            .validate()
            .is_err()
        );
        assert!(Optimizer::adam().validate().is_ok());
        assert_eq!("adam".parse::<Optimizer>().unwrap(), Optimizer::adam());
        assert!("lbfgs".parse::<Optimizer>().is_err());
    }

    #[test]
    fn sgd_step_moves_against_gradient() {
        let mut net = scalar_net(1.0, 2.0);
        let mut grads = net.gradients();
        grads.d_weights_mut(0)[0] = 3.0;
        grads.d_biases_mut(0)[0] = 4.0;

        let mut opt = Optimizer::Sgd.state(&net).unwrap();
        opt.step(&mut net, &mut grads, 0.1);

        let (w, b) = params(&net);
        assert!((w - 0.7).abs() < 1e-6);
        assert!((b - 1.6).abs() < 1e-6);
    }

    #[test]
    fn momentum_accumulates_velocity() {
        let mut net = scalar_net(0.0, 0.0);
        let mut opt = Optimizer::SgdMomentum { momentum: 0.5 }.state(&net).unwrap();

        for _ in 0..2 {
            let mut grads = net.gradients();
            grads.d_weights_mut(0)[0] = 1.0;
            opt.step(&mut net, &mut grads, 1.0);
        }

        // v1 = 1, v2 = 0.5 + 1 = 1.5
        let (w, _) = params(&net);
        assert!((w - (-2.5)).abs() < 1e-6);
    }

    #[test]
    fn adam_first_step_is_normalized() {
        let mut net = scalar_net(1.0, 1.0);
        let mut grads = net.gradients();
        grads.d_weights_mut(0)[0] = 1.0;
        grads.d_biases_mut(0)[0] = 1.0;

        let mut opt = Optimizer::Adam {
            beta1: 0.9,
            beta2: 0.999,
            eps: 1.0,
        }
        .state(&net)
        .unwrap();
        opt.step(&mut net, &mut grads, 0.1);

        // Bias-corrected unit gradient with eps = 1 gives a step of 0.5 * lr.
        let (w, b) = params(&net);
        assert!((w - 0.95).abs() < 1e-6);
        assert!((b - 0.95).abs() < 1e-6);
    }

    #[test]
    fn state_matches_network_shape() {
        let mut rng = StdRng::seed_from_u64(0);
        let layer = Layer::new_with_rng(3, 2, crate::Init::He, Activation::ReLU, &mut rng).unwrap();
        let net = Network::from_blocks(
            vec![Block {
                dense: layer,
                dropout: None,
            }],
            0.0,
        )
        .unwrap();
        match Optimizer::adam().state(&net).unwrap() {
            OptimizerState::Adam { m, v, .. } => {
                assert_eq!(m.weights[0].len(), 6);
                assert_eq!(v.biases[0].len(), 2);
            }
            other => panic!("unexpected state {other:?}"),
        }
    }
}
