//! Network construction.
//!
//! [`NetworkBuilder`] is the general way to describe a stack of dense layers,
//! with dropout and an activity penalty. [`Architecture`] describes the
//! symmetric encoder/decoder that the detector instantiates, and
//! [`Architecture::compile`] turns it into a [`Compiled`] network: untrained
//! weights plus the loss and optimizer state it will be trained with.
//!
//! Weight init follows the activation: Xavier/Glorot for `tanh`, `sigmoid` and
//! `identity`, He/Kaiming for the ReLU family.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::layer::{Dropout, Init, Layer};
use crate::network::Block;
use crate::optim::OptimizerState;
use crate::{Activation, Error, Loss, Network, Optimizer, Result};

#[derive(Debug, Clone, Copy)]
struct LayerSpec {
    out_dim: usize,
    activation: Activation,
    dropout: Option<f32>,
}

/// Builder for a [`Network`].
///
/// ```rust
/// use ae_outlier::{Activation, NetworkBuilder};
///
/// # fn main() -> ae_outlier::Result<()> {
/// let net = NetworkBuilder::new(4)?
///     .add_dense(2, Activation::ReLU)?
///     .add_dropout(0.1)?
///     .add_dense(4, Activation::Sigmoid)?
///     .activity_l2(0.01)?
///     .build_with_seed(0)?;
/// assert_eq!(net.widths(), vec![2, 4]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct NetworkBuilder {
    input_dim: usize,
    layers: Vec<LayerSpec>,
    activity_l2: f32,
}

impl NetworkBuilder {
    /// Start building a network that accepts inputs of length `input_dim`.
    pub fn new(input_dim: usize) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidConfig("input_dim must be > 0".to_owned()));
        }
        Ok(Self {
            input_dim,
            layers: Vec::new(),
            activity_l2: 0.0,
        })
    }

    /// Append a dense layer with `out_dim` outputs.
    pub fn add_dense(mut self, out_dim: usize, activation: Activation) -> Result<Self> {
        if out_dim == 0 {
            return Err(Error::InvalidConfig("layer width must be > 0".to_owned()));
        }
        activation.validate()?;

        self.layers.push(LayerSpec {
            out_dim,
            activation,
            dropout: None,
        });
        Ok(self)
    }

    /// Put dropout after the most recently added dense layer.
    pub fn add_dropout(mut self, rate: f32) -> Result<Self> {
        Dropout::new(rate)?;
        let Some(last) = self.layers.last_mut() else {
            return Err(Error::InvalidConfig(
                "dropout must follow a dense layer".to_owned(),
            ));
        };
        last.dropout = Some(rate);
        Ok(self)
    }

    /// L2 activity penalty applied to every dense layer's outputs.
    pub fn activity_l2(mut self, penalty: f32) -> Result<Self> {
        if !(penalty.is_finite() && penalty >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "l2 penalty must be finite and >= 0, got {penalty}"
            )));
        }
        self.activity_l2 = penalty;
        Ok(self)
    }

    /// Build using a deterministic seed.
    pub fn build_with_seed(self, seed: u64) -> Result<Network> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.build_with_rng(&mut rng)
    }

    /// Build using the provided RNG.
    pub fn build_with_rng<R: Rng + ?Sized>(self, rng: &mut R) -> Result<Network> {
        if self.layers.is_empty() {
            return Err(Error::InvalidConfig(
                "network must have at least one layer".to_owned(),
            ));
        }

        let mut blocks = Vec::with_capacity(self.layers.len());
        let mut in_dim = self.input_dim;
        for spec in self.layers {
            let init = Init::for_activation(spec.activation);
            let dense = Layer::new_with_rng(in_dim, spec.out_dim, init, spec.activation, rng)?;
            let dropout = spec.dropout.map(Dropout::new).transpose()?;
            blocks.push(Block { dense, dropout });
            in_dim = spec.out_dim;
        }

        Network::from_blocks(blocks, self.activity_l2)
    }
}

/// Description of the symmetric reconstruction network.
#[derive(Debug, Clone, PartialEq)]
pub struct Architecture {
    pub feature_count: usize,
    /// Hidden widths with `feature_count` already prepended.
    pub effective_hidden_widths: Vec<usize>,
    pub hidden_activation: Activation,
    pub output_activation: Activation,
    pub dropout_rate: f32,
    pub l2_penalty: f32,
    pub loss: Loss,
    pub optimizer: Optimizer,
    pub learning_rate: f32,
}

/// An untrained network bound to its objective and optimizer state.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub network: Network,
    pub loss: Loss,
    pub optimizer: OptimizerState,
    pub learning_rate: f32,
}

impl Architecture {
    /// Lay out the dense stack as a [`NetworkBuilder`].
    ///
    /// Every hidden width becomes a dense layer followed by dropout; the final
    /// dense layer maps back to `feature_count` with `output_activation`.
    pub fn builder(&self) -> Result<NetworkBuilder> {
        if self.feature_count == 0 {
            return Err(Error::InvalidConfig("feature_count must be > 0".to_owned()));
        }
        if self.effective_hidden_widths.is_empty() {
            return Err(Error::InvalidConfig(
                "hidden layer widths must not be empty".to_owned(),
            ));
        }

        let mut b = NetworkBuilder::new(self.feature_count)?.activity_l2(self.l2_penalty)?;
        for &width in &self.effective_hidden_widths {
            b = b
                .add_dense(width, self.hidden_activation)?
                .add_dropout(self.dropout_rate)?;
        }
        b.add_dense(self.feature_count, self.output_activation)
    }

    /// Build the network and attach loss and freshly allocated optimizer state.
    pub fn compile<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Compiled> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be finite and > 0, got {}",
                self.learning_rate
            )));
        }

        let network = self.builder()?.build_with_rng(rng)?;
        let optimizer = self.optimizer.state(&network)?;
        tracing::debug!(
            widths = ?network.widths(),
            params = network.num_params(),
            loss = %self.loss,
            "compiled reconstruction network"
        );

        Ok(Compiled {
            network,
            loss: self.loss,
            optimizer,
            learning_rate: self.learning_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arch(widths: Vec<usize>) -> Architecture {
        Architecture {
            feature_count: 6,
            effective_hidden_widths: widths,
            hidden_activation: Activation::ReLU,
            output_activation: Activation::Sigmoid,
            dropout_rate: 0.2,
            l2_penalty: 0.1,
            loss: Loss::Mse,
            optimizer: Optimizer::adam(),
            learning_rate: 1e-3,
        }
    }

    #[test]
    fn builds_hidden_dropout_pairs_then_output() {
        let mut rng = StdRng::seed_from_u64(0);
        let compiled = arch(vec![6, 4, 2, 4]).compile(&mut rng).unwrap();
        let net = &compiled.network;

        assert_eq!(net.widths(), vec![6, 4, 2, 4, 6]);
        assert_eq!(net.input_dim(), 6);
        assert_eq!(net.output_dim(), 6);
        assert!((net.activity_l2() - 0.1).abs() < 1e-7);

        let blocks = net.blocks();
        for block in &blocks[..4] {
            assert_eq!(block.dense.activation(), Activation::ReLU);
            assert_eq!(block.dropout.map(|d| d.rate()), Some(0.2));
        }
        let out = &blocks[4];
        assert_eq!(out.dense.activation(), Activation::Sigmoid);
        assert!(out.dropout.is_none());
    }

    #[test]
    fn rejects_empty_or_zero_widths() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(arch(vec![]).compile(&mut rng).is_err());
        assert!(arch(vec![6, 0, 6]).compile(&mut rng).is_err());
    }

    #[test]
    fn same_seed_same_weights() {
        let a = arch(vec![6, 3, 6]).compile(&mut StdRng::seed_from_u64(5)).unwrap();
        let b = arch(vec![6, 3, 6]).compile(&mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(
            a.network.layer(1).unwrap().weights(),
            b.network.layer(1).unwrap().weights()
        );
    }

    #[test]
    fn dropout_requires_a_preceding_layer() {
        assert!(NetworkBuilder::new(3).unwrap().add_dropout(0.1).is_err());
        assert!(
            NetworkBuilder::new(3)
                .unwrap()
                .add_dense(2, Activation::Tanh)
                .unwrap()
                .add_dropout(1.0)
                .is_err()
        );
    }
}
