// External imports
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::Backend;
use burn::tensor::{activation, Tensor};
use serde::{Deserialize, Serialize};

// Internal imports
use super::step_2_lstm_cell::LstmCell;
use crate::constants::{DEFAULT_DROPOUT, DEFAULT_HIDDEN_SIZE, DEFAULT_MERGE_HIDDEN_SIZE, L2_REGULARIZATION};
use crate::error::{DiskFailureError, Result};

/// Architecture hyper-parameters, stored alongside saved weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Sensor features per time step
    pub input_size: usize,
    /// Units per LSTM layer
    pub hidden_size: usize,
    /// Number of stacked LSTM layers
    pub num_layers: usize,
    /// Width of the auxiliary per-disk input; 0 for a sequence-only model
    pub static_size: usize,
    /// Units of the dense layer that merges the LSTM output with the static input
    pub merge_hidden_size: usize,
    pub dropout: f64,
    /// L2 penalty applied to the output layer weights
    pub regularization: f64,
}

impl ModelConfig {
    pub fn new(input_size: usize) -> Self {
        Self {
            input_size,
            hidden_size: DEFAULT_HIDDEN_SIZE,
            num_layers: 1,
            static_size: 0,
            merge_hidden_size: DEFAULT_MERGE_HIDDEN_SIZE,
            dropout: DEFAULT_DROPOUT,
            regularization: L2_REGULARIZATION,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 || self.hidden_size == 0 || self.num_layers == 0 {
            return Err(DiskFailureError::InvalidConfig(format!(
                "input_size, hidden_size and num_layers must be positive: {:?}",
                self
            )));
        }
        if self.static_size > 0 && self.merge_hidden_size == 0 {
            return Err(DiskFailureError::InvalidConfig(
                "merge_hidden_size must be positive when static inputs are used".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(DiskFailureError::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> DiskFailureLstm<B> {
        DiskFailureLstm::new(self, device)
    }
}

/// Recurrent binary classifier over per-disk sensor windows
///
/// Stacked LSTM layers read the sequence; the final hidden state is optionally
/// concatenated with the per-disk static input and passed through a dense ReLU
/// layer, then mapped to a single failure logit.
#[derive(Module, Debug)]
pub struct DiskFailureLstm<B: Backend> {
    layers: Vec<LstmCell<B>>,
    dropout: Dropout,
    merge: Option<Linear<B>>,
    output: Linear<B>,
    static_size: usize,
    regularization: f64,
}

impl<B: Backend> DiskFailureLstm<B> {
    pub fn new(config: &ModelConfig, device: &B::Device) -> Self {
        let layers = (0..config.num_layers)
            .map(|layer| {
                let input_size = if layer == 0 {
                    config.input_size
                } else {
                    config.hidden_size
                };
                LstmCell::new(input_size, config.hidden_size, device)
            })
            .collect();

        let (merge, head_size) = if config.static_size > 0 {
            let merge = LinearConfig::new(
                config.hidden_size + config.static_size,
                config.merge_hidden_size,
            )
            .init(device);
            (Some(merge), config.merge_hidden_size)
        } else {
            (None, config.hidden_size)
        };

        Self {
            layers,
            dropout: DropoutConfig::new(config.dropout).init(),
            merge,
            output: LinearConfig::new(head_size, 1).init(device),
            static_size: config.static_size,
            regularization: config.regularization,
        }
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |layer| layer.input_size())
    }

    pub fn static_size(&self) -> usize {
        self.static_size
    }

    /// Failure logits of shape `[batch, 1]`
    ///
    /// `static_features` must be given exactly when the model was built with a
    /// non-zero `static_size`.
    pub fn forward(&self, sequences: Tensor<B, 3>, static_features: Option<Tensor<B, 2>>) -> Tensor<B, 2> {
        let mut x = sequences;
        let last_layer = self.layers.len().saturating_sub(1);
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if i < last_layer {
                x = self.dropout.forward(x);
            }
        }

        // Keep only the last time step
        let [batch_size, seq_len, hidden_size] = x.dims();
        let last = x.narrow(1, seq_len - 1, 1).reshape([batch_size, hidden_size]);

        let features = match (&self.merge, static_features) {
            (Some(merge), Some(aux)) => activation::relu(merge.forward(Tensor::cat(vec![last, aux], 1))),
            _ => last,
        };

        self.output.forward(self.dropout.forward(features))
    }

    /// Failure probabilities of shape `[batch, 1]`
    pub fn predict_proba(&self, sequences: Tensor<B, 3>, static_features: Option<Tensor<B, 2>>) -> Tensor<B, 2> {
        activation::sigmoid(self.forward(sequences, static_features))
    }

    /// Calculates L2 regularization penalty on the output layer weights
    pub fn l2_penalty(&self) -> Tensor<B, 1> {
        let weights = self.output.weight.val();
        (weights.clone() * weights).sum().mul_scalar(self.regularization)
    }

    /// Binary cross-entropy on logits plus the L2 penalty
    ///
    /// Uses `max(x, 0) - x * y + ln(1 + exp(-|x|))`, which stays finite for
    /// large logits. Positive examples are weighted by `positive_weight` to
    /// offset the rarity of failed disks.
    pub fn bce_loss(&self, logits: Tensor<B, 2>, targets: Tensor<B, 2>, positive_weight: f64) -> Tensor<B, 1> {
        let per_example = logits.clone().clamp_min(0.0) - logits.clone() * targets.clone()
            + logits.abs().neg().exp().log1p();

        let weights = targets.mul_scalar(positive_weight - 1.0).add_scalar(1.0);
        let loss = (per_example * weights).mean();

        if self.regularization > 0.0 {
            loss + self.l2_penalty()
        } else {
            loss
        }
    }
}
