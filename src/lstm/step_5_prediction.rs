// External imports
use burn::tensor::backend::Backend;
use burn::tensor::ElementConversion;
use log::info;
use serde::{Deserialize, Serialize};

// Internal imports
use super::step_1_tensor_preparation::DiskDataset;
use super::step_3_lstm_model_arch::DiskFailureLstm;
use crate::error::{DiskFailureError, Result};
use crate::metrics::{roc_auc, ConfusionMatrix};

/// Summary of a model scored against a labelled dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub samples: usize,
    pub positives: usize,
    /// NaN when the dataset holds a single class
    pub auc: f64,
    pub loss: f64,
    pub threshold: f64,
    pub confusion: ConfusionMatrix,
}

/// Fail early when the dataset's inputs do not fit the model's input layers
pub fn ensure_compatible<B: Backend>(model: &DiskFailureLstm<B>, dataset: &DiskDataset) -> Result<()> {
    if model.input_size() != dataset.num_features() {
        return Err(DiskFailureError::IncompatibleModel(format!(
            "model expects {} sequence features, dataset has {}",
            model.input_size(),
            dataset.num_features()
        )));
    }
    if model.static_size() != dataset.static_size() {
        return Err(DiskFailureError::IncompatibleModel(format!(
            "model expects {} static features, dataset has {}",
            model.static_size(),
            dataset.static_size()
        )));
    }
    Ok(())
}

/// Failure probability for every disk in the dataset, in dataset order
pub fn predict_proba<B: Backend>(
    model: &DiskFailureLstm<B>,
    dataset: &DiskDataset,
    batch_size: usize,
    device: &B::Device,
) -> Result<Vec<f32>> {
    ensure_compatible(model, dataset)?;
    let batch_size = batch_size.max(1);

    let mut probabilities = Vec::with_capacity(dataset.len());
    let indices: Vec<usize> = (0..dataset.len()).collect();
    for chunk in indices.chunks(batch_size) {
        let batch = dataset.batch::<B>(chunk, device);
        let probs = model.predict_proba(batch.sequences, batch.static_features);
        let values = probs
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| DiskFailureError::Tensor(format!("{:?}", e)))?;
        probabilities.extend(values);
    }
    Ok(probabilities)
}

/// Mean loss (including the L2 term) over the dataset, weighting batches by size
pub fn dataset_loss<B: Backend>(
    model: &DiskFailureLstm<B>,
    dataset: &DiskDataset,
    batch_size: usize,
    positive_weight: f64,
    device: &B::Device,
) -> Result<f64> {
    ensure_compatible(model, dataset)?;
    if dataset.is_empty() {
        return Ok(f64::NAN);
    }
    let batch_size = batch_size.max(1);

    let mut total = 0.0;
    let indices: Vec<usize> = (0..dataset.len()).collect();
    for chunk in indices.chunks(batch_size) {
        let batch = dataset.batch::<B>(chunk, device);
        let logits = model.forward(batch.sequences, batch.static_features);
        let loss: f64 = model
            .bce_loss(logits, batch.labels, positive_weight)
            .into_scalar()
            .elem::<f64>();
        total += loss * chunk.len() as f64;
    }
    Ok(total / dataset.len() as f64)
}

/// Score the model on a dataset: AUC, loss and a thresholded confusion matrix
pub fn evaluate_model<B: Backend>(
    model: &DiskFailureLstm<B>,
    dataset: &DiskDataset,
    batch_size: usize,
    threshold: f64,
    device: &B::Device,
) -> Result<EvaluationReport> {
    let probabilities = predict_proba(model, dataset, batch_size, device)?;
    let auc = roc_auc(&probabilities, &dataset.labels)?;
    let confusion = ConfusionMatrix::from_scores(&probabilities, &dataset.labels, threshold)?;
    let loss = dataset_loss(model, dataset, batch_size, 1.0, device)?;

    let report = EvaluationReport {
        samples: dataset.len(),
        positives: dataset.positive_count(),
        auc,
        loss,
        threshold,
        confusion,
    };
    info!(
        "Evaluated {} disks ({} failed): AUC {:.4}, loss {:.4}, recall {:.3}, precision {:.3}",
        report.samples,
        report.positives,
        report.auc,
        report.loss,
        report.confusion.recall(),
        report.confusion.precision()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lstm::step_1_tensor_preparation::{dataframe_to_dataset, DatasetSpec};
    use crate::lstm::step_3_lstm_model_arch::ModelConfig;
    use burn_ndarray::{NdArray, NdArrayDevice};
    use polars::prelude::*;

    fn dataset(with_static: bool) -> DiskDataset {
        let df = df!(
            "disk_id" => ["a", "a", "b", "b", "c", "c"],
            "step" => [0i64, 1, 0, 1, 0, 1],
            "smart_5_raw" => [0.0, 0.1, 0.8, 0.9, 0.2, 0.1],
            "capacity_tb" => [0.5, 0.5, 1.0, 1.0, 0.0, 0.0],
            "failure" => [0i64, 0, 0, 1, 0, 0]
        )
        .unwrap();
        let spec = DatasetSpec {
            sequence_features: vec!["smart_5_raw".into()],
            static_features: if with_static {
                vec!["capacity_tb".into()]
            } else {
                Vec::new()
            },
            sequence_length: 2,
        };
        dataframe_to_dataset(&df, &spec).unwrap()
    }

    #[test]
    fn predicts_one_probability_per_disk_across_batches() {
        let device = NdArrayDevice::Cpu;
        let data = dataset(false);
        let model = ModelConfig::new(1).init::<NdArray>(&device);

        let probs = predict_proba(&model, &data, 2, &device).unwrap();
        assert_eq!(probs.len(), 3);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));

        // batching must not change the result
        let single = predict_proba(&model, &data, 100, &device).unwrap();
        for (a, b) in probs.iter().zip(&single) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn rejects_mismatched_inputs() {
        let device = NdArrayDevice::Cpu;
        let sequence_only = ModelConfig::new(1).init::<NdArray>(&device);
        assert!(predict_proba(&sequence_only, &dataset(true), 8, &device).is_err());

        let wide = ModelConfig::new(4).init::<NdArray>(&device);
        assert!(predict_proba(&wide, &dataset(false), 8, &device).is_err());
    }

    #[test]
    fn evaluation_report_covers_dataset() {
        let device = NdArrayDevice::Cpu;
        let data = dataset(true);
        let mut config = ModelConfig::new(1);
        config.static_size = 1;
        let model = config.init::<NdArray>(&device);

        let report = evaluate_model(&model, &data, 2, 0.5, &device).unwrap();
        assert_eq!(report.samples, 3);
        assert_eq!(report.positives, 1);
        assert_eq!(report.confusion.total(), 3);
        assert!((0.0..=1.0).contains(&report.auc));
        assert!(report.loss.is_finite() && report.loss > 0.0);
    }
}
