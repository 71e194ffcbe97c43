// External crates
use anyhow::{bail, Context, Result};
use burn::module::AutodiffModule;
use burn_autodiff::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

// Local modules
use disk_failure_rnn::callbacks::{AucHistory, EpochCallback, ModelCheckpoint};
use disk_failure_rnn::constants::{
    DECISION_THRESHOLD, DEFAULT_DROPOUT, DEFAULT_HIDDEN_SIZE, EXPERIMENT_PATH, MODEL_FILE_NAME, MODEL_PATH,
    PREDICTION_BATCH_SIZE, SEQUENCE_LENGTH, STATIC_FEATURES,
};
use disk_failure_rnn::lstm::{
    step_1_tensor_preparation::{
        dataframe_to_dataset, fit_normalization, infer_sequence_features, normalize_features, split_data,
        DatasetSpec, NormalizationParams,
    },
    step_3_lstm_model_arch::ModelConfig,
    step_4_train_model::{train_model, TrainingConfig},
    step_5_prediction::evaluate_model,
    step_6_model_serialization::ModelMetadata,
};
use disk_failure_rnn::built_info;
use disk_failure_rnn::util::{
    file_utils::{read_disk_csv, write_csv},
    model_logger::{create_experiment_dir, ModelExperiment},
    model_utils::{get_model_path, is_model_current, load_trained_model, save_trained_model},
    synthetic_data::{generate_disk_dataframe, SyntheticConfig},
};

type TrainBackend = Autodiff<NdArray<f32>>;
type InferenceBackend = NdArray<f32>;

#[derive(Parser)]
#[command(name = "disk-failure-rnn")]
#[command(about = "Predict disk failures from SMART time series with an LSTM")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a synthetic SMART dataset to CSV
    Synth {
        /// Output CSV file
        #[arg(short, long, default_value = "data/disks.csv")]
        output: PathBuf,

        #[arg(long, default_value_t = 200)]
        disks: usize,

        #[arg(long, default_value_t = 10)]
        min_steps: usize,

        #[arg(long, default_value_t = 40)]
        max_steps: usize,

        /// Fraction of disks that fail at the end of their history
        #[arg(long, default_value_t = 0.2)]
        failure_rate: f64,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// Train a model and report validation AUC after every epoch
    Train(TrainArgs),

    /// Score a saved model on a labelled CSV file
    Evaluate {
        /// Input CSV file
        data: PathBuf,

        #[arg(long, default_value = MODEL_PATH)]
        model_dir: PathBuf,

        #[arg(long, default_value = MODEL_FILE_NAME)]
        model_name: String,

        /// Probability at or above which a disk is predicted to fail
        #[arg(long, default_value_t = DECISION_THRESHOLD)]
        threshold: f64,
    },
}

#[derive(Args)]
struct TrainArgs {
    /// Input CSV file
    data: PathBuf,

    /// JSON training config; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = MODEL_PATH)]
    model_dir: PathBuf,

    #[arg(long, default_value = MODEL_FILE_NAME)]
    model_name: String,

    #[arg(long, default_value_t = SEQUENCE_LENGTH)]
    sequence_length: usize,

    #[arg(long, default_value_t = DEFAULT_HIDDEN_SIZE)]
    hidden_size: usize,

    /// Number of stacked LSTM layers
    #[arg(long, default_value_t = 1)]
    layers: usize,

    #[arg(long, default_value_t = DEFAULT_DROPOUT)]
    dropout: f64,

    /// Merge per-disk static features into the recurrent output
    #[arg(long)]
    multi_input: bool,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    #[arg(long)]
    positive_weight: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Retrain even if a current model already exists
    #[arg(long)]
    force: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Synth {
            output,
            disks,
            min_steps,
            max_steps,
            failure_rate,
            seed,
        } => {
            let config = SyntheticConfig {
                n_disks: disks,
                min_steps,
                max_steps,
                failure_rate,
                seed,
            };
            let mut df = generate_disk_dataframe(&config).context("Failed to generate synthetic data")?;
            write_csv(&mut df, &output).context("Failed to write synthetic data")?;
            println!("Wrote {} rows for {} disks to {}", df.height(), disks, output.display());
        }
        Commands::Train(args) => train(args)?,
        Commands::Evaluate {
            data,
            model_dir,
            model_name,
            threshold,
        } => evaluate(&data, &model_dir, &model_name, threshold)?,
    }
    Ok(())
}

/// Merge the optional JSON config with command-line overrides
fn training_config(args: &TrainArgs) -> Result<TrainingConfig> {
    let mut config = match &args.config {
        Some(path) => TrainingConfig::from_json_file(path)
            .with_context(|| format!("Failed to read training config {}", path.display()))?,
        None => TrainingConfig::default(),
    };
    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(learning_rate) = args.learning_rate {
        config.learning_rate = learning_rate;
    }
    if let Some(positive_weight) = args.positive_weight {
        config.positive_weight = positive_weight;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.validate()?;
    Ok(config)
}

fn train(args: TrainArgs) -> Result<()> {
    let training = training_config(&args)?;
    let mut df = read_disk_csv(&args.data).context("Failed to load training data")?;

    let static_features: Vec<String> = if args.multi_input {
        STATIC_FEATURES.iter().map(|name| name.to_string()).collect()
    } else {
        Vec::new()
    };
    let sequence_features = infer_sequence_features(&df, &static_features);
    if sequence_features.is_empty() {
        bail!("No numeric sequence features found in {}", args.data.display());
    }
    info!("Sequence features: {:?}", sequence_features);

    let normalized_columns: Vec<String> = sequence_features.iter().chain(&static_features).cloned().collect();
    let normalization = fit_normalization(&df, &normalized_columns)?;
    normalize_features(&mut df, &normalization)?;

    let dataset_spec = DatasetSpec {
        sequence_features,
        static_features,
        sequence_length: args.sequence_length,
    };
    let mut model_config = ModelConfig::new(dataset_spec.sequence_features.len());
    model_config.hidden_size = args.hidden_size;
    model_config.num_layers = args.layers;
    model_config.dropout = args.dropout;
    model_config.static_size = dataset_spec.static_features.len();

    let dataset = dataframe_to_dataset(&df, &dataset_spec)?.shuffled(training.seed);
    let metadata = ModelMetadata::new(model_config.clone(), dataset_spec, normalization);

    let model_path = get_model_path(&args.model_dir, &args.model_name);
    if !args.force && is_model_current(&model_path, &metadata) {
        info!(
            "Model at {} is current for this configuration (version {}); use --force to retrain",
            model_path.display(),
            built_info::PKG_VERSION
        );
        return Ok(());
    }

    let (train_set, val_set) = split_data(&dataset, training.validation_split)?;
    if val_set.is_empty() {
        warn!("Validation set is empty; AUC will be recorded as NaN");
    }

    let mut auc_history = AucHistory::new();
    let mut checkpoint = ModelCheckpoint::new(
        &args.model_dir,
        &args.model_name,
        training.checkpoint_epochs,
        metadata.clone(),
    );
    let mut callbacks: [&mut dyn EpochCallback<InferenceBackend>; 2] = [&mut auc_history, &mut checkpoint];

    let device = NdArrayDevice::Cpu;
    let start = Instant::now();
    let (model, history) = train_model::<TrainBackend>(
        &train_set,
        Some(&val_set),
        &model_config,
        &training,
        &mut callbacks,
        &device,
    )?;
    let elapsed = start.elapsed().as_secs_f64();

    let saved_path = save_trained_model(&model, &metadata, &args.model_dir, &args.model_name)?;

    let mut experiment = ModelExperiment::new(&args.model_name, &model_config, &training);
    experiment.record_history(&history, auc_history.history());
    experiment.set_training_time(elapsed);
    if !val_set.is_empty() {
        let report = evaluate_model(&model.valid(), &val_set, PREDICTION_BATCH_SIZE, DECISION_THRESHOLD, &device)?;
        experiment.record_evaluation(&report);
    }
    if history.stopped_early {
        experiment.add_note(&format!("Stopped early; best epoch {:?}", history.best_epoch));
    }
    let experiment_dir = create_experiment_dir(EXPERIMENT_PATH)?;
    let experiment_path = experiment.save(&experiment_dir)?;

    match auc_history.best() {
        Some(best) => println!("Best validation AUC {:.4} at epoch {}", best.auc, best.epoch),
        None => println!("Validation AUC was undefined for every epoch"),
    }
    println!("Model saved at: {}", saved_path.display());
    println!("Experiment log: {}", experiment_path.display());
    Ok(())
}

fn prepare_evaluation_frame(data: &Path, normalization: &NormalizationParams) -> Result<DataFrame> {
    let mut df = read_disk_csv(data).context("Failed to load evaluation data")?;
    normalize_features(&mut df, normalization)?;
    Ok(df)
}

fn evaluate(data: &Path, model_dir: &Path, model_name: &str, threshold: f64) -> Result<()> {
    let device = NdArrayDevice::Cpu;
    let (model, metadata) = load_trained_model::<InferenceBackend>(model_dir, model_name, &device)?;
    if metadata.version != built_info::PKG_VERSION {
        warn!(
            "Model was saved by version {}, running {}",
            metadata.version,
            built_info::PKG_VERSION
        );
    }

    let df = prepare_evaluation_frame(data, &metadata.normalization)?;
    let dataset = dataframe_to_dataset(&df, &metadata.dataset)?;
    let report = evaluate_model(&model, &dataset, PREDICTION_BATCH_SIZE, threshold, &device)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
