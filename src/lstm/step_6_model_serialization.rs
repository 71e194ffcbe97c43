use anyhow::{Context, Result};
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::SystemTime;

use super::step_1_tensor_preparation::{DatasetSpec, NormalizationParams};
use super::step_3_lstm_model_arch::{DiskFailureLstm, ModelConfig};
use crate::built_info;

/// Everything needed to rebuild a saved model and feed it new data
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModelMetadata {
    pub version: String,
    pub timestamp: u64,
    pub model: ModelConfig,
    pub dataset: DatasetSpec,
    pub normalization: NormalizationParams,
}

impl ModelMetadata {
    pub fn new(model: ModelConfig, dataset: DatasetSpec, normalization: NormalizationParams) -> Self {
        Self {
            version: built_info::PKG_VERSION.to_string(),
            timestamp: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            model,
            dataset,
            normalization,
        }
    }
}

/// Save the model weights (`.bin`) and metadata (`.meta.json`) next to each other
pub fn save_model_with_metadata<B: Backend>(
    model: &DiskFailureLstm<B>,
    metadata: &ModelMetadata,
    path: impl AsRef<Path>,
) -> Result<()> {
    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent).context("Failed to create model parent directory")?;
    }

    let model_path = path.as_ref().with_extension("bin");
    model
        .clone()
        .save_file::<BinFileRecorder<FullPrecisionSettings>, _>(&model_path, &Default::default())
        .context("Failed to save model")?;

    let metadata_path = path.as_ref().with_extension("meta.json");
    let metadata_json = serde_json::to_string_pretty(metadata).context("Failed to serialize metadata")?;
    std::fs::write(&metadata_path, metadata_json).context("Failed to write metadata file")?;

    info!("Saved model to {}", model_path.display());
    Ok(())
}

pub fn load_metadata(path: impl AsRef<Path>) -> Result<ModelMetadata> {
    let metadata_path = path.as_ref().with_extension("meta.json");
    let metadata_json = std::fs::read_to_string(&metadata_path)
        .with_context(|| format!("Failed to read metadata file {}", metadata_path.display()))?;
    serde_json::from_str(&metadata_json).context("Failed to parse metadata")
}

/// Load a model, rebuilding its architecture from the stored metadata
pub fn load_model_with_metadata<B: Backend>(
    path: impl AsRef<Path>,
    device: &B::Device,
) -> Result<(DiskFailureLstm<B>, ModelMetadata)> {
    let metadata = load_metadata(&path)?;
    metadata.model.validate()?;

    let model_path = path.as_ref().with_extension("bin");
    let model = metadata
        .model
        .init::<B>(device)
        .load_file::<BinFileRecorder<FullPrecisionSettings>, _>(&model_path, &Default::default(), device)
        .with_context(|| format!("Failed to load model weights from {}", model_path.display()))?;

    Ok((model, metadata))
}

/// Check that both files exist and the metadata parses
pub fn verify_model(path: impl AsRef<Path>) -> Result<bool> {
    let model_path = path.as_ref().with_extension("bin");
    let metadata_path = path.as_ref().with_extension("meta.json");
    if !model_path.exists() || !metadata_path.exists() {
        return Ok(false);
    }

    load_metadata(path)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Tensor;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn metadata(config: ModelConfig) -> ModelMetadata {
        let mut ranges = BTreeMap::new();
        ranges.insert("smart_5_raw".to_string(), (0.0, 120.0));
        ModelMetadata::new(
            config,
            DatasetSpec {
                sequence_features: vec!["smart_5_raw".into(), "smart_197_raw".into()],
                static_features: vec!["capacity_tb".into()],
                sequence_length: 4,
            },
            NormalizationParams { ranges },
        )
    }

    #[test]
    fn test_model_serialization_with_metadata() -> Result<()> {
        let temp_dir = tempdir()?;
        let model_base_path = temp_dir.path().join("nested").join("test_model");
        let device = NdArrayDevice::Cpu;

        let mut config = ModelConfig::new(2);
        config.num_layers = 2;
        config.static_size = 1;
        let model = config.init::<NdArray>(&device);
        let meta = metadata(config);

        save_model_with_metadata(&model, &meta, &model_base_path)?;
        assert!(model_base_path.with_extension("bin").exists());
        assert!(model_base_path.with_extension("meta.json").exists());

        let (loaded, loaded_meta): (DiskFailureLstm<NdArray>, ModelMetadata) =
            load_model_with_metadata(&model_base_path, &device)?;
        assert_eq!(loaded_meta, meta);
        assert_eq!(loaded.num_layers(), 2);

        // Weights survive the round trip
        let x = Tensor::<NdArray, 3>::ones([3, 4, 2], &device);
        let aux = Tensor::<NdArray, 2>::ones([3, 1], &device);
        let before = model.predict_proba(x.clone(), Some(aux.clone())).into_data().to_vec::<f32>().unwrap();
        let after = loaded.predict_proba(x, Some(aux)).into_data().to_vec::<f32>().unwrap();
        for (a, b) in before.iter().zip(&after) {
            assert!((a - b).abs() < 1e-6);
        }

        assert!(verify_model(&model_base_path)?);
        Ok(())
    }

    #[test]
    fn normalization_ranges_reload_bit_exact() -> Result<()> {
        let temp_dir = tempdir()?;
        let base = temp_dir.path().join("exact");
        let device = NdArrayDevice::Cpu;
        let mut meta = metadata(ModelConfig::new(2));
        meta.normalization
            .ranges
            .insert("smart_9_raw".to_string(), (1268.1684311633257, 40_123.456789012345));
        let model = meta.model.init::<NdArray>(&device);

        save_model_with_metadata(&model, &meta, &base)?;
        let loaded = load_metadata(&base)?;
        let (min, max) = loaded.normalization.ranges["smart_9_raw"];
        assert_eq!(min.to_bits(), 1268.1684311633257f64.to_bits());
        assert_eq!(max.to_bits(), 40_123.456789012345f64.to_bits());
        assert_eq!(loaded, meta);
        Ok(())
    }

    #[test]
    fn verify_reports_missing_files() -> Result<()> {
        let temp_dir = tempdir()?;
        assert!(!verify_model(temp_dir.path().join("absent"))?);
        Ok(())
    }

    #[test]
    fn load_fails_without_weights() -> Result<()> {
        let temp_dir = tempdir()?;
        let base = temp_dir.path().join("only_meta");
        let meta = metadata(ModelConfig::new(2));
        std::fs::write(base.with_extension("meta.json"), serde_json::to_string(&meta)?)?;

        let result = load_model_with_metadata::<NdArray>(&base, &NdArrayDevice::Cpu);
        assert!(result.is_err());
        Ok(())
    }
}
