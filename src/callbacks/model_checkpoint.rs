use burn::tensor::backend::Backend;
use std::path::PathBuf;

use super::{EpochCallback, EpochContext, EpochLogs};
use crate::error::{DiskFailureError, Result};
use crate::lstm::step_6_model_serialization::ModelMetadata;
use crate::util::model_utils::save_model_checkpoint;

/// Saves the model and its metadata every `every_epochs` epochs
#[derive(Debug, Clone)]
pub struct ModelCheckpoint {
    model_dir: PathBuf,
    model_name: String,
    every_epochs: usize,
    metadata: ModelMetadata,
    saved: Vec<PathBuf>,
}

impl ModelCheckpoint {
    /// `every_epochs` of 0 disables saving
    pub fn new(model_dir: impl Into<PathBuf>, model_name: &str, every_epochs: usize, metadata: ModelMetadata) -> Self {
        Self {
            model_dir: model_dir.into(),
            model_name: model_name.to_string(),
            every_epochs,
            metadata,
            saved: Vec::new(),
        }
    }

    /// Base paths of the checkpoints written so far
    pub fn saved(&self) -> &[PathBuf] {
        &self.saved
    }
}

impl<B: Backend> EpochCallback<B> for ModelCheckpoint {
    fn on_epoch_end(&mut self, logs: &EpochLogs, context: &EpochContext<'_, B>) -> Result<()> {
        if self.every_epochs == 0 || logs.epoch % self.every_epochs != 0 {
            return Ok(());
        }

        let path = save_model_checkpoint(
            context.model,
            &self.metadata,
            &self.model_dir,
            &self.model_name,
            logs.epoch,
        )
        .map_err(|e| DiskFailureError::Record(format!("{:#}", e)))?;
        self.saved.push(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lstm::step_1_tensor_preparation::{DatasetSpec, NormalizationParams};
    use crate::lstm::step_3_lstm_model_arch::ModelConfig;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use tempfile::tempdir;

    #[test]
    fn saves_on_interval_only() {
        let temp_dir = tempdir().unwrap();
        let device = NdArrayDevice::Cpu;
        let config = ModelConfig::new(2);
        let model = config.init::<NdArray>(&device);
        let metadata = ModelMetadata::new(
            config,
            DatasetSpec {
                sequence_features: vec!["x".into(), "y".into()],
                static_features: Vec::new(),
                sequence_length: 3,
            },
            NormalizationParams::default(),
        );
        let context = EpochContext {
            model: &model,
            validation: None,
            device: &device,
        };

        let mut checkpoint = ModelCheckpoint::new(temp_dir.path(), "ckpt", 2, metadata);
        for epoch in 1..=5 {
            let logs = EpochLogs {
                epoch,
                train_loss: 0.1,
                val_loss: None,
            };
            checkpoint.on_epoch_end(&logs, &context).unwrap();
        }

        assert_eq!(checkpoint.saved().len(), 2);
        assert!(temp_dir.path().join("ckpt_epoch_2.bin").exists());
        assert!(temp_dir.path().join("ckpt_epoch_4.meta.json").exists());
        assert!(!temp_dir.path().join("ckpt_epoch_5.bin").exists());
    }
}
