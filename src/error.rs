use polars::error::PolarsError;
use thiserror::Error;

/// Errors raised by the disk failure pipeline
#[derive(Debug, Error)]
pub enum DiskFailureError {
    #[error("data error: {0}")]
    Polars(#[from] PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid dataset: {0}")]
    InvalidData(String),

    #[error("invalid metric input: {0}")]
    InvalidMetricInput(String),

    #[error("model is incompatible with dataset: {0}")]
    IncompatibleModel(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("tensor conversion failed: {0}")]
    Tensor(String),

    #[error("model record error: {0}")]
    Record(String),
}

pub type Result<T> = std::result::Result<T, DiskFailureError>;
