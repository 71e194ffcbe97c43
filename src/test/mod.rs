/// End-to-end tests for the disk failure pipeline
///
/// * `pipeline_tests` - Synthetic CSV through training with AUC callbacks, checkpointing,
///   saving, reloading and evaluation
pub mod pipeline_tests;
