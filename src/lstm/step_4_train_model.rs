// External imports
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

// Internal imports
use super::step_1_tensor_preparation::DiskDataset;
use super::step_3_lstm_model_arch::{DiskFailureLstm, ModelConfig};
use super::step_5_prediction::{dataset_loss, ensure_compatible};
use crate::callbacks::{EpochCallback, EpochContext, EpochLogs};
use crate::constants::{PREDICTION_BATCH_SIZE, VALIDATION_SPLIT_RATIO};
use crate::error::{DiskFailureError, Result};

/// Configuration for training the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub batch_size: usize,
    pub epochs: usize,
    /// Fraction of disks held out for validation
    pub validation_split: f64,
    /// Epochs without improvement before stopping; 0 disables early stopping
    pub patience: usize,
    /// Minimum improvement of the monitored loss
    pub min_delta: f64,
    /// Loss weight of failed disks relative to healthy ones
    pub positive_weight: f64,
    /// Seed for batch shuffling
    pub seed: u64,
    /// Save a checkpoint every N epochs; 0 disables checkpoints
    pub checkpoint_epochs: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            batch_size: 32,
            epochs: 10,
            validation_split: VALIDATION_SPLIT_RATIO,
            patience: 0,
            min_delta: 0.001,
            positive_weight: 1.0,
            seed: 42,
            checkpoint_epochs: 5,
        }
    }
}

impl TrainingConfig {
    /// Read a JSON config; missing fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.epochs == 0 {
            return Err(DiskFailureError::InvalidConfig(
                "batch_size and epochs must be positive".into(),
            ));
        }
        if !(self.learning_rate > 0.0) {
            return Err(DiskFailureError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.positive_weight > 0.0) {
            return Err(DiskFailureError::InvalidConfig(format!(
                "positive_weight must be positive, got {}",
                self.positive_weight
            )));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(DiskFailureError::InvalidConfig(format!(
                "validation_split must be in [0, 1), got {}",
                self.validation_split
            )));
        }
        Ok(())
    }
}

/// Per-epoch losses of a finished run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochLogs>,
    pub best_epoch: Option<usize>,
    pub stopped_early: bool,
}

impl TrainingHistory {
    pub fn train_losses(&self) -> Vec<f64> {
        self.epochs.iter().map(|logs| logs.train_loss).collect()
    }

    pub fn val_losses(&self) -> Vec<Option<f64>> {
        self.epochs.iter().map(|logs| logs.val_loss).collect()
    }
}

/// Train a new model with Adam on shuffled mini-batches
///
/// After every epoch the validation loss is computed on the non-autodiff view
/// of the model and each callback runs with that view and the validation set.
/// With `patience > 0` training stops once the monitored loss (validation loss,
/// or training loss without validation data) stops improving, and the best
/// weights are restored.
pub fn train_model<B: AutodiffBackend>(
    train: &DiskDataset,
    validation: Option<&DiskDataset>,
    model_config: &ModelConfig,
    config: &TrainingConfig,
    callbacks: &mut [&mut dyn EpochCallback<B::InnerBackend>],
    device: &B::Device,
) -> Result<(DiskFailureLstm<B>, TrainingHistory)> {
    config.validate()?;
    model_config.validate()?;
    if train.is_empty() {
        return Err(DiskFailureError::InvalidData("Training set is empty".into()));
    }

    let mut model = model_config.init::<B>(device);
    ensure_compatible(&model, train)?;
    if let Some(validation) = validation {
        ensure_compatible(&model, validation)?;
    }
    let validation = validation.filter(|v| !v.is_empty());

    info!(
        "Training on {} disks ({} failed), validating on {} disks",
        train.len(),
        train.positive_count(),
        validation.map_or(0, |v| v.len())
    );

    let mut optimizer = AdamConfig::new().init();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut indices: Vec<usize> = (0..train.len()).collect();

    let mut history = TrainingHistory::default();
    let mut best_loss = f64::INFINITY;
    let mut best_model: Option<DiskFailureLstm<B>> = None;
    let mut epochs_no_improve = 0;

    for callback in callbacks.iter_mut() {
        callback.on_train_begin()?;
    }

    for epoch in 1..=config.epochs {
        indices.shuffle(&mut rng);

        let mut epoch_loss = 0.0;
        for batch_indices in indices.chunks(config.batch_size) {
            let batch = train.batch::<B>(batch_indices, device);
            let logits = model.forward(batch.sequences, batch.static_features);
            let loss = model.bce_loss(logits, batch.labels, config.positive_weight);
            epoch_loss += loss.clone().into_scalar().elem::<f64>() * batch_indices.len() as f64;

            // Backward pass and optimizer step
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(config.learning_rate, model, grads);
        }
        let train_loss = epoch_loss / train.len() as f64;

        // Validation pass without autodiff; dropout is inactive here
        let valid_model = model.valid();
        let val_loss = match validation {
            Some(v) => Some(dataset_loss(
                &valid_model,
                v,
                PREDICTION_BATCH_SIZE,
                config.positive_weight,
                device,
            )?),
            None => None,
        };

        let logs = EpochLogs {
            epoch,
            train_loss,
            val_loss,
        };
        match val_loss {
            Some(val_loss) => info!(
                "Epoch {}/{} - loss: {:.6} - val_loss: {:.6}",
                epoch, config.epochs, train_loss, val_loss
            ),
            None => info!("Epoch {}/{} - loss: {:.6}", epoch, config.epochs, train_loss),
        }

        let context = EpochContext {
            model: &valid_model,
            validation,
            device,
        };
        for callback in callbacks.iter_mut() {
            callback.on_epoch_end(&logs, &context)?;
        }
        history.epochs.push(logs);

        // Early stopping logic
        let monitored = val_loss.unwrap_or(train_loss);
        if best_loss - monitored > config.min_delta {
            best_loss = monitored;
            history.best_epoch = Some(epoch);
            epochs_no_improve = 0;
            if config.patience > 0 {
                best_model = Some(model.clone());
            }
        } else {
            epochs_no_improve += 1;
            debug!("No improvement for {} epoch(s)", epochs_no_improve);
            if config.patience > 0 && epochs_no_improve >= config.patience {
                info!(
                    "Early stopping triggered at epoch {} (best loss = {:.6} at epoch {:?})",
                    epoch, best_loss, history.best_epoch
                );
                history.stopped_early = true;
                if let Some(best) = best_model.take() {
                    model = best;
                }
                break;
            }
        }
    }

    info!("Training completed after {} epochs", history.epochs.len());
    Ok((model, history))
}
