use burn::tensor::backend::Backend;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{EpochCallback, EpochContext, EpochLogs};
use crate::constants::PREDICTION_BATCH_SIZE;
use crate::error::{DiskFailureError, Result};
use crate::lstm::step_5_prediction::predict_proba;
use crate::metrics::roc_auc;

/// Validation AUC recorded after one epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochAuc {
    pub epoch: usize,
    /// NaN when the validation set was missing or held a single class
    pub auc: f64,
}

/// Records the validation ROC AUC after every epoch
#[derive(Debug, Clone)]
pub struct AucHistory {
    history: Vec<EpochAuc>,
    batch_size: usize,
    verbose: bool,
}

impl Default for AucHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl AucHistory {
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
            batch_size: PREDICTION_BATCH_SIZE,
            verbose: true,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Log each epoch's AUC at info level
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn history(&self) -> &[EpochAuc] {
        &self.history
    }

    /// AUC values in epoch order
    pub fn values(&self) -> Vec<f64> {
        self.history.iter().map(|entry| entry.auc).collect()
    }

    /// Highest defined AUC seen so far
    pub fn best(&self) -> Option<EpochAuc> {
        self.history
            .iter()
            .filter(|entry| !entry.auc.is_nan())
            .copied()
            .max_by(|a, b| a.auc.total_cmp(&b.auc))
    }

    pub fn last(&self) -> Option<EpochAuc> {
        self.history.last().copied()
    }
}

impl<B: Backend> EpochCallback<B> for AucHistory {
    fn on_train_begin(&mut self) -> Result<()> {
        self.history.clear();
        Ok(())
    }

    fn on_epoch_end(&mut self, logs: &EpochLogs, context: &EpochContext<'_, B>) -> Result<()> {
        let auc = match context.validation {
            Some(validation) if !validation.is_empty() => {
                let probabilities = predict_proba(context.model, validation, self.batch_size, context.device)?;
                match roc_auc(&probabilities, &validation.labels) {
                    Ok(auc) if auc.is_nan() => {
                        warn!(
                            "Epoch {}: validation set has a single class, AUC is undefined",
                            logs.epoch
                        );
                        auc
                    }
                    Ok(auc) => auc,
                    Err(DiskFailureError::InvalidMetricInput(reason)) => {
                        warn!("Epoch {}: AUC not computed, {}", logs.epoch, reason);
                        f64::NAN
                    }
                    Err(e) => return Err(e),
                }
            }
            _ => {
                warn!("Epoch {}: no validation data, AUC not computed", logs.epoch);
                f64::NAN
            }
        };

        if self.verbose {
            info!("Epoch {} validation AUC: {:.4}", logs.epoch, auc);
        }
        self.history.push(EpochAuc {
            epoch: logs.epoch,
            auc,
        });
        Ok(())
    }
}
