use anyhow::Result;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::callbacks::EpochAuc;
use crate::lstm::step_3_lstm_model_arch::ModelConfig;
use crate::lstm::step_4_train_model::{TrainingConfig, TrainingHistory};
use crate::lstm::step_5_prediction::EvaluationReport;

/// Summary of one training run, written as JSON next to other runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelExperiment {
    pub timestamp: String,
    pub model_name: String,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub static_size: usize,
    pub dropout: f64,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub positive_weight: f64,
    pub epochs_run: usize,
    pub stopped_early: bool,
    pub train_losses: Vec<f64>,
    pub val_losses: Vec<Option<f64>>,
    pub val_aucs: Vec<Option<f64>>,
    pub best_val_auc: Option<f64>,
    /// Validation scores of the model that was saved
    pub final_val_auc: Option<f64>,
    pub final_val_loss: Option<f64>,
    pub training_time_seconds: Option<f64>,
    pub notes: String,
}

impl ModelExperiment {
    pub fn new(model_name: &str, model: &ModelConfig, training: &TrainingConfig) -> Self {
        Self {
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            model_name: model_name.to_string(),
            hidden_size: model.hidden_size,
            num_layers: model.num_layers,
            static_size: model.static_size,
            dropout: model.dropout,
            batch_size: training.batch_size,
            learning_rate: training.learning_rate,
            positive_weight: training.positive_weight,
            epochs_run: 0,
            stopped_early: false,
            train_losses: Vec::new(),
            val_losses: Vec::new(),
            val_aucs: Vec::new(),
            best_val_auc: None,
            final_val_auc: None,
            final_val_loss: None,
            training_time_seconds: None,
            notes: String::new(),
        }
    }

    /// Copy per-epoch losses and AUCs from a finished run
    ///
    /// NaN AUCs are stored as `null` since JSON has no NaN.
    pub fn record_history(&mut self, history: &TrainingHistory, aucs: &[EpochAuc]) {
        self.epochs_run = history.epochs.len();
        self.stopped_early = history.stopped_early;
        self.train_losses = history.train_losses();
        self.val_losses = history.val_losses();
        self.val_aucs = aucs
            .iter()
            .map(|e| if e.auc.is_nan() { None } else { Some(e.auc) })
            .collect();
        self.best_val_auc = self.val_aucs.iter().flatten().copied().reduce(f64::max);
    }

    pub fn record_evaluation(&mut self, report: &EvaluationReport) {
        self.final_val_auc = Some(report.auc).filter(|auc| !auc.is_nan());
        self.final_val_loss = Some(report.loss).filter(|loss| loss.is_finite());
    }

    pub fn set_training_time(&mut self, seconds: f64) {
        self.training_time_seconds = Some(seconds);
    }

    pub fn add_note(&mut self, note: &str) {
        if !self.notes.is_empty() {
            self.notes.push('\n');
        }
        self.notes.push_str(note);
    }

    pub fn save(&self, experiment_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(experiment_dir)?;

        let filename = format!(
            "{}_h{}_l{}_d{}_experiment.json",
            self.model_name,
            self.hidden_size,
            self.num_layers,
            (self.dropout * 100.0).round() as i32,
        );
        let file_path = experiment_dir.join(filename);

        let json = serde_json::to_string_pretty(&self)?;
        let mut file = fs::File::create(&file_path)?;
        file.write_all(json.as_bytes())?;

        Ok(file_path)
    }
}

/// Create a timestamped run directory under `base_dir`
pub fn create_experiment_dir(base_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let dir = base_dir
        .as_ref()
        .join(Local::now().format("%Y%m%d_%H%M%S").to_string());
    fs::create_dir_all(&dir)?;
    Ok(dir)
}
