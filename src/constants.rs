// Column names of the disk time-series frame
pub const DISK_ID_COLUMN: &str = "disk_id";
pub const STEP_COLUMN: &str = "step";
pub const LABEL_COLUMN: &str = "failure";

// SMART attributes produced by the synthetic generator
pub const SMART_FEATURES: [&str; 5] = [
    "smart_5_raw",   // reallocated sectors
    "smart_9_raw",   // power-on hours
    "smart_187_raw", // reported uncorrectable errors
    "smart_194_raw", // temperature
    "smart_197_raw", // current pending sectors
];
pub const STATIC_FEATURES: [&str; 1] = ["capacity_tb"];

// Model parameters
pub const SEQUENCE_LENGTH: usize = 20; // Number of time steps per disk window
pub const DEFAULT_HIDDEN_SIZE: usize = 32;
pub const DEFAULT_MERGE_HIDDEN_SIZE: usize = 16;
pub const DEFAULT_DROPOUT: f64 = 0.2;
pub const L2_REGULARIZATION: f64 = 0.0001;

// Data preprocessing
pub const VALIDATION_SPLIT_RATIO: f64 = 0.2; // 20% of disks for validation
pub const PREDICTION_BATCH_SIZE: usize = 256;
pub const DECISION_THRESHOLD: f64 = 0.5;

// Model paths
pub const MODEL_PATH: &str = "models";
pub const MODEL_FILE_NAME: &str = "disk_failure_lstm";
pub const EXPERIMENT_PATH: &str = "experiments";
