// External imports
use burn::module::AutodiffModule;
use burn_autodiff::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
use polars::prelude::*;
use tempfile::tempdir;

// Internal imports
use crate::callbacks::{AucHistory, EpochCallback, ModelCheckpoint};
use crate::constants::{DECISION_THRESHOLD, SMART_FEATURES, STATIC_FEATURES};
use crate::lstm::step_1_tensor_preparation::{
    dataframe_to_dataset, fit_normalization, infer_sequence_features, normalize_features, split_data,
    DatasetSpec, DiskDataset, NormalizationParams,
};
use crate::lstm::step_3_lstm_model_arch::ModelConfig;
use crate::lstm::step_4_train_model::{train_model, TrainingConfig};
use crate::lstm::step_5_prediction::{evaluate_model, predict_proba};
use crate::lstm::step_6_model_serialization::ModelMetadata;
use crate::util::file_utils::{read_disk_csv, write_csv};
use crate::util::model_utils::{load_trained_model, save_trained_model};
use crate::util::synthetic_data::{generate_disk_dataframe, SyntheticConfig};

type TrainBackend = Autodiff<NdArray<f32>>;
type InferenceBackend = NdArray<f32>;

fn write_fleet(path: &std::path::Path) {
    let config = SyntheticConfig {
        n_disks: 40,
        min_steps: 6,
        max_steps: 14,
        failure_rate: 0.3,
        seed: 3,
    };
    let mut df = generate_disk_dataframe(&config).unwrap();
    write_csv(&mut df, path).unwrap();
}

fn prepare(df: &mut DataFrame) -> (DatasetSpec, NormalizationParams, DiskDataset) {
    let static_features: Vec<String> = STATIC_FEATURES.iter().map(|s| s.to_string()).collect();
    let sequence_features = infer_sequence_features(df, &static_features);
    let columns: Vec<String> = sequence_features.iter().chain(&static_features).cloned().collect();
    let normalization = fit_normalization(df, &columns).unwrap();
    normalize_features(df, &normalization).unwrap();

    let spec = DatasetSpec {
        sequence_features,
        static_features,
        sequence_length: 8,
    };
    let dataset = dataframe_to_dataset(df, &spec).unwrap();
    (spec, normalization, dataset)
}

#[test]
fn csv_features_are_inferred_and_windowed() {
    let dir = tempdir().unwrap();
    let csv_path = dir.path().join("fleet.csv");
    write_fleet(&csv_path);

    let mut df = read_disk_csv(&csv_path).unwrap();
    let (spec, _, dataset) = prepare(&mut df);

    let expected: Vec<String> = SMART_FEATURES.iter().map(|s| s.to_string()).collect();
    assert_eq!(spec.sequence_features, expected);
    assert_eq!(dataset.len(), 40);
    assert_eq!(dataset.positive_count(), 12);
    assert_eq!(dataset.sequences.shape(), &[40, 8, SMART_FEATURES.len()]);
    assert_eq!(dataset.static_size(), 1);
}

#[test]
fn train_save_load_and_evaluate() {
    let dir = tempdir().unwrap();
    let csv_path = dir.path().join("fleet.csv");
    let model_dir = dir.path().join("models");
    write_fleet(&csv_path);

    let mut df = read_disk_csv(&csv_path).unwrap();
    let (spec, normalization, full) = prepare(&mut df);
    let (train_set, val_set) = split_data(&full.shuffled(1), 0.25).unwrap();
    assert_eq!(train_set.len(), 30);
    assert_eq!(val_set.len(), 10);

    let mut model_config = ModelConfig::new(spec.sequence_features.len());
    model_config.hidden_size = 8;
    model_config.static_size = spec.static_features.len();
    model_config.dropout = 0.0;
    let training = TrainingConfig {
        epochs: 2,
        batch_size: 8,
        learning_rate: 0.01,
        checkpoint_epochs: 1,
        ..Default::default()
    };
    let metadata = ModelMetadata::new(model_config.clone(), spec, normalization);

    let device = NdArrayDevice::Cpu;
    let mut auc_history = AucHistory::new().with_verbose(false);
    let mut checkpoint = ModelCheckpoint::new(&model_dir, "fleet", training.checkpoint_epochs, metadata.clone());
    let mut callbacks: [&mut dyn EpochCallback<InferenceBackend>; 2] = [&mut auc_history, &mut checkpoint];
    let (model, history) = train_model::<TrainBackend>(
        &train_set,
        Some(&val_set),
        &model_config,
        &training,
        &mut callbacks,
        &device,
    )
    .unwrap();

    assert_eq!(history.epochs.len(), 2);
    assert_eq!(auc_history.history().len(), 2);
    for entry in auc_history.history() {
        assert!(entry.auc.is_nan() || (0.0..=1.0).contains(&entry.auc));
    }
    assert_eq!(checkpoint.saved().len(), 2);
    assert!(model_dir.join("fleet_epoch_1.bin").exists());

    let trained = model.valid();
    save_trained_model(&trained, &metadata, &model_dir, "fleet").unwrap();
    let (loaded, loaded_meta) = load_trained_model::<InferenceBackend>(&model_dir, "fleet", &device).unwrap();
    assert_eq!(loaded_meta.model, model_config);

    // Fresh CSV read scaled with the stored parameters reproduces the training windows
    let mut fresh = read_disk_csv(&csv_path).unwrap();
    normalize_features(&mut fresh, &loaded_meta.normalization).unwrap();
    let reloaded = dataframe_to_dataset(&fresh, &loaded_meta.dataset).unwrap();
    assert_eq!(reloaded.disk_ids, full.disk_ids);
    assert_eq!(reloaded.sequences, full.sequences);

    let before = predict_proba(&trained, &full, 16, &device).unwrap();
    let after = predict_proba(&loaded, &reloaded, 16, &device).unwrap();
    for (a, b) in before.iter().zip(&after) {
        assert!((a - b).abs() < 1e-5);
    }

    let report = evaluate_model(&loaded, &val_set, 16, DECISION_THRESHOLD, &device).unwrap();
    assert_eq!(report.samples, 10);
    assert_eq!(report.confusion.total(), 10);
    assert!(report.loss.is_finite());
}
