//! Hooks invoked by the training loop between epochs.
//!
//! Callbacks observe the model; they never modify its parameters. They run
//! synchronously after each epoch, on the non-autodiff view of the model.

pub mod auc_history;
pub mod model_checkpoint;

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::lstm::step_1_tensor_preparation::DiskDataset;
use crate::lstm::step_3_lstm_model_arch::DiskFailureLstm;

pub use auc_history::{AucHistory, EpochAuc};
pub use model_checkpoint::ModelCheckpoint;

/// Losses reported for a finished epoch (epochs count from 1)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochLogs {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: Option<f64>,
}

/// What a callback can see at an epoch boundary
pub struct EpochContext<'a, B: Backend> {
    pub model: &'a DiskFailureLstm<B>,
    pub validation: Option<&'a DiskDataset>,
    pub device: &'a B::Device,
}

pub trait EpochCallback<B: Backend> {
    fn on_train_begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, context: &EpochContext<'_, B>) -> Result<()>;
}
