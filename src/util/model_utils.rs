use anyhow::{Context, Result};
use burn::prelude::Backend;
use chrono::{DateTime, Local};
use log::info;
use std::path::{Path, PathBuf};

use crate::lstm::step_3_lstm_model_arch::DiskFailureLstm;
use crate::lstm::step_6_model_serialization::{
    load_metadata, load_model_with_metadata, save_model_with_metadata, ModelMetadata,
};

/// Base path (without extension) of a named model inside `model_dir`
pub fn get_model_path(model_dir: impl AsRef<Path>, model_name: &str) -> PathBuf {
    model_dir.as_ref().join(model_name)
}

/// Save a trained model with its metadata under `model_dir`
pub fn save_trained_model<B: Backend>(
    model: &DiskFailureLstm<B>,
    metadata: &ModelMetadata,
    model_dir: impl AsRef<Path>,
    model_name: &str,
) -> Result<PathBuf> {
    std::fs::create_dir_all(model_dir.as_ref()).context("Failed to create models directory")?;

    let model_path = get_model_path(model_dir, model_name);
    save_model_with_metadata(model, metadata, &model_path).context("Failed to save model")?;

    info!("Model saved successfully to: {}", model_path.display());
    Ok(model_path)
}

/// Load a trained model with its metadata from `model_dir`
pub fn load_trained_model<B: Backend>(
    model_dir: impl AsRef<Path>,
    model_name: &str,
    device: &B::Device,
) -> Result<(DiskFailureLstm<B>, ModelMetadata)> {
    let model_path = get_model_path(model_dir, model_name);
    info!("Loading model from: {}", model_path.display());
    load_model_with_metadata(&model_path, device).context("Failed to load model")
}

/// Save a model checkpoint during training as `<model_name>_epoch_<epoch>`
pub fn save_model_checkpoint<B: Backend>(
    model: &DiskFailureLstm<B>,
    metadata: &ModelMetadata,
    model_dir: impl AsRef<Path>,
    model_name: &str,
    epoch: usize,
) -> Result<PathBuf> {
    let checkpoint_name = format!("{}_epoch_{}", model_name, epoch);
    save_trained_model(model, metadata, model_dir, &checkpoint_name)
}

/// True when the saved model was written by this crate version today
pub fn is_model_version_current(model_base_path: &Path, current_version: &str) -> bool {
    let Ok(metadata) = load_metadata(model_base_path) else {
        return false;
    };
    if metadata.version != current_version {
        return false;
    }

    match DateTime::from_timestamp(metadata.timestamp as i64, 0) {
        Some(saved) => saved.with_timezone(&Local).date_naive() == Local::now().date_naive(),
        None => false,
    }
}

/// True when a current model with the same architecture, inputs and scaling is already saved
pub fn is_model_current(model_base_path: &Path, requested: &ModelMetadata) -> bool {
    if !is_model_version_current(model_base_path, &requested.version) {
        return false;
    }
    match load_metadata(model_base_path) {
        Ok(saved) => {
            saved.model == requested.model
                && saved.dataset == requested.dataset
                && saved.normalization == requested.normalization
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lstm::step_1_tensor_preparation::{DatasetSpec, NormalizationParams};
    use crate::lstm::step_3_lstm_model_arch::ModelConfig;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use tempfile::tempdir;

    fn metadata() -> ModelMetadata {
        ModelMetadata::new(
            ModelConfig::new(3),
            DatasetSpec {
                sequence_features: vec!["a".into(), "b".into(), "c".into()],
                static_features: Vec::new(),
                sequence_length: 5,
            },
            NormalizationParams::default(),
        )
    }

    #[test]
    fn test_model_save_load() -> Result<()> {
        let temp_dir = tempdir()?;
        let device = NdArrayDevice::Cpu;
        let meta = metadata();
        let model = meta.model.init::<NdArray>(&device);

        let saved_path = save_trained_model(&model, &meta, temp_dir.path(), "test_model")?;
        assert!(saved_path.with_extension("bin").exists());
        assert!(saved_path.with_extension("meta.json").exists());

        let (loaded_model, loaded_meta) = load_trained_model::<NdArray>(temp_dir.path(), "test_model", &device)?;
        assert_eq!(loaded_meta.model, meta.model);
        assert_eq!(loaded_model.input_size(), 3);
        Ok(())
    }

    #[test]
    fn test_model_checkpoint() -> Result<()> {
        let temp_dir = tempdir()?;
        let device = NdArrayDevice::Cpu;
        let meta = metadata();
        let model = meta.model.init::<NdArray>(&device);

        let saved_path = save_model_checkpoint(&model, &meta, temp_dir.path(), "test_model", 4)?;
        assert_eq!(saved_path, temp_dir.path().join("test_model_epoch_4"));
        assert!(saved_path.with_extension("bin").exists());
        Ok(())
    }

    #[test]
    fn version_check_requires_matching_version() -> Result<()> {
        let temp_dir = tempdir()?;
        let device = NdArrayDevice::Cpu;
        let meta = metadata();
        let model = meta.model.init::<NdArray>(&device);
        let path = save_trained_model(&model, &meta, temp_dir.path(), "current")?;

        assert!(is_model_version_current(&path, &meta.version));
        assert!(!is_model_version_current(&path, "0.0.0-other"));
        assert!(!is_model_version_current(&temp_dir.path().join("missing"), &meta.version));
        Ok(())
    }

    #[test]
    fn changed_architecture_is_not_current() -> Result<()> {
        let temp_dir = tempdir()?;
        let device = NdArrayDevice::Cpu;
        let meta = metadata();
        let model = meta.model.init::<NdArray>(&device);
        let path = save_trained_model(&model, &meta, temp_dir.path(), "current")?;
        assert!(is_model_current(&path, &meta));

        let mut deeper = meta.clone();
        deeper.model.num_layers = 2;
        assert!(!is_model_current(&path, &deeper));

        let mut multi_input = meta.clone();
        multi_input.model.static_size = 1;
        multi_input.dataset.static_features = vec!["capacity_tb".into()];
        assert!(!is_model_current(&path, &multi_input));

        let mut longer = meta.clone();
        longer.dataset.sequence_length = 10;
        assert!(!is_model_current(&path, &longer));
        Ok(())
    }
}
