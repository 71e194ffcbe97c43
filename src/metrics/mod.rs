//! Ranking and threshold metrics for binary failure predictions.
pub mod auc;
pub mod confusion;

pub use auc::roc_auc;
pub use confusion::ConfusionMatrix;
