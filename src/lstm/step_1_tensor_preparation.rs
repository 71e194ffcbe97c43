// External crates
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use log::{debug, info, warn};
use ndarray::{Array2, Array3, Axis};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;

// Internal modules
use crate::constants::{DISK_ID_COLUMN, LABEL_COLUMN, STEP_COLUMN};
use crate::error::{DiskFailureError, Result};

/// Which columns feed the network and how long each disk window is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub sequence_features: Vec<String>,
    pub static_features: Vec<String>,
    pub sequence_length: usize,
}

/// Per-column min/max used to scale features into [0, 1]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationParams {
    pub ranges: BTreeMap<String, (f64, f64)>,
}

/// One window per disk, ready to be batched into tensors
#[derive(Debug, Clone)]
pub struct DiskDataset {
    /// `[disks, sequence_length, features]`, left-padded with zeros
    pub sequences: Array3<f32>,
    /// `[disks, static_features]`, present for multi-input models
    pub static_features: Option<Array2<f32>>,
    pub labels: Vec<u8>,
    pub disk_ids: Vec<String>,
}

/// Tensors for a single forward pass
#[derive(Debug, Clone)]
pub struct DiskBatch<B: Backend> {
    pub sequences: Tensor<B, 3>,
    pub static_features: Option<Tensor<B, 2>>,
    /// `[batch, 1]` with values 0.0 or 1.0
    pub labels: Tensor<B, 2>,
}

impl DiskDataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.sequences.dim().2
    }

    pub fn static_size(&self) -> usize {
        self.static_features.as_ref().map_or(0, |s| s.ncols())
    }

    pub fn positive_count(&self) -> usize {
        self.labels.iter().filter(|&&label| label == 1).count()
    }

    /// Copy out the disks at `indices`, in that order
    pub fn subset(&self, indices: &[usize]) -> DiskDataset {
        DiskDataset {
            sequences: self.sequences.select(Axis(0), indices),
            static_features: self
                .static_features
                .as_ref()
                .map(|s| s.select(Axis(0), indices)),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            disk_ids: indices.iter().map(|&i| self.disk_ids[i].clone()).collect(),
        }
    }

    /// Reorder disks with a seeded shuffle, so a tail split sees both classes
    pub fn shuffled(&self, seed: u64) -> DiskDataset {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(seed));
        self.subset(&indices)
    }

    /// Build the tensors for the disks at `indices`
    pub fn batch<B: Backend>(&self, indices: &[usize], device: &B::Device) -> DiskBatch<B> {
        let (_, seq_len, num_features) = self.sequences.dim();

        let mut flat = Vec::with_capacity(indices.len() * seq_len * num_features);
        for &i in indices {
            flat.extend(self.sequences.index_axis(Axis(0), i).iter().copied());
        }
        let sequences = Tensor::<B, 3>::from_data(
            TensorData::new(flat, [indices.len(), seq_len, num_features]),
            device,
        );

        let static_features = self.static_features.as_ref().map(|s| {
            let width = s.ncols();
            let mut flat = Vec::with_capacity(indices.len() * width);
            for &i in indices {
                flat.extend(s.row(i).iter().copied());
            }
            Tensor::<B, 2>::from_data(TensorData::new(flat, [indices.len(), width]), device)
        });

        let labels: Vec<f32> = indices.iter().map(|&i| f32::from(self.labels[i])).collect();
        let labels = Tensor::<B, 2>::from_data(TensorData::new(labels, [indices.len(), 1]), device);

        DiskBatch {
            sequences,
            static_features,
            labels,
        }
    }
}

/// Splits the dataset into training and validation sets
///
/// The last `validation_split` fraction of disks becomes the validation set,
/// without shuffling. Shuffle beforehand with [`DiskDataset::shuffled`] when
/// the input is ordered by label.
pub fn split_data(dataset: &DiskDataset, validation_split: f64) -> Result<(DiskDataset, DiskDataset)> {
    if dataset.is_empty() {
        return Err(DiskFailureError::InvalidData("Empty dataset".into()));
    }
    if !(0.0..1.0).contains(&validation_split) {
        return Err(DiskFailureError::InvalidConfig(format!(
            "Validation split must be in [0.0, 1.0), got {}",
            validation_split
        )));
    }

    let n_samples = dataset.len();
    let split_idx = (n_samples as f64 * (1.0 - validation_split)) as usize;
    if split_idx == 0 {
        return Err(DiskFailureError::InvalidData(format!(
            "Validation split {} leaves no training disks out of {}",
            validation_split, n_samples
        )));
    }

    let train_indices: Vec<usize> = (0..split_idx).collect();
    let val_indices: Vec<usize> = (split_idx..n_samples).collect();
    Ok((dataset.subset(&train_indices), dataset.subset(&val_indices)))
}

/// Counts null values in the specified DataFrame columns
///
/// Returns an error if one of the columns does not exist.
pub fn check_for_nulls(df: &DataFrame, columns: &[String]) -> PolarsResult<usize> {
    let mut null_count = 0;
    for col in columns {
        null_count += df.column(col)?.null_count();
    }
    Ok(null_count)
}

/// Numeric columns other than the identifier, ordering, label and static columns
pub fn infer_sequence_features(df: &DataFrame, static_features: &[String]) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|column| {
            matches!(
                column.dtype(),
                DataType::Float64
                    | DataType::Float32
                    | DataType::Int64
                    | DataType::Int32
                    | DataType::UInt64
                    | DataType::UInt32
            )
        })
        .map(|column| column.name().to_string())
        .filter(|name| {
            name != DISK_ID_COLUMN
                && name != STEP_COLUMN
                && name != LABEL_COLUMN
                && !static_features.contains(name)
        })
        .collect()
}

/// Compute min/max for each column, ignoring nulls
pub fn fit_normalization(df: &DataFrame, columns: &[String]) -> PolarsResult<NormalizationParams> {
    let mut ranges = BTreeMap::new();
    for col in columns {
        let series = df
            .column(col)?
            .as_materialized_series()
            .cast(&DataType::Float64)?;
        let (min, max) = match (series.min::<f64>()?, series.max::<f64>()?) {
            (Some(min), Some(max)) => (min, max),
            _ => {
                return Err(PolarsError::ComputeError(
                    format!("Column '{}' has no values to normalize", col).into(),
                ))
            }
        };
        ranges.insert(col.clone(), (min, max));
    }
    Ok(NormalizationParams { ranges })
}

/// Min-max scale every column listed in `params`
///
/// Constant columns become 0. Values outside the fitted range (for example at
/// evaluation time) are scaled with the same formula and may leave [0, 1].
pub fn normalize_features(df: &mut DataFrame, params: &NormalizationParams) -> PolarsResult<()> {
    for (col, &(min, max)) in &params.ranges {
        let series = df
            .column(col)?
            .as_materialized_series()
            .cast(&DataType::Float64)?;

        let range = max - min;
        if range.abs() < f64::EPSILON {
            let constant_series = Series::new(PlSmallStr::from(col.as_str()), vec![0.0f64; df.height()]);
            df.replace(col, constant_series)?;
            continue;
        }

        let normalized = (series - min) / range;
        df.replace(col, normalized)?;
    }
    Ok(())
}

fn column_as_f32(df: &DataFrame, name: &str) -> PolarsResult<Vec<f32>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(series
        .f64()?
        .into_iter()
        .map(|value| value.unwrap_or(0.0) as f32)
        .collect())
}

/// Contiguous row ranges sharing the same disk id (frame must be sorted by id)
fn disk_row_ranges(ids: &[String]) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    for i in 1..=ids.len() {
        if i == ids.len() || ids[i] != ids[start] {
            ranges.push(start..i);
            start = i;
        }
    }
    ranges
}

/// Converts a per-row disk frame into one labelled window per disk
///
/// Rows with nulls in the used columns are dropped. Each disk contributes its
/// last `sequence_length` rows, left-padded with zeros when its history is
/// shorter. A disk is labelled positive if any of its rows reports a failure.
pub fn dataframe_to_dataset(df: &DataFrame, spec: &DatasetSpec) -> Result<DiskDataset> {
    if spec.sequence_length == 0 {
        return Err(DiskFailureError::InvalidConfig(
            "Sequence length must be at least 1".into(),
        ));
    }
    if spec.sequence_features.is_empty() {
        return Err(DiskFailureError::InvalidConfig(
            "At least one sequence feature is required".into(),
        ));
    }

    let mut used_columns: Vec<String> = vec![DISK_ID_COLUMN.to_string(), LABEL_COLUMN.to_string()];
    used_columns.extend(spec.sequence_features.iter().cloned());
    used_columns.extend(spec.static_features.iter().cloned());
    let has_step = df.schema().contains(STEP_COLUMN);
    if has_step {
        used_columns.push(STEP_COLUMN.to_string());
    }

    let null_count = check_for_nulls(df, &used_columns)?;
    let df = if null_count > 0 {
        let cleaned = df.drop_nulls(Some(&used_columns[..]))?;
        warn!(
            "Dropped {} rows containing {} null values",
            df.height() - cleaned.height(),
            null_count
        );
        cleaned
    } else {
        df.clone()
    };
    if df.height() == 0 {
        return Err(DiskFailureError::InvalidData("No rows left to build windows from".into()));
    }

    // Stable sort keeps file order within a disk when there is no step column
    let sort_columns = if has_step {
        vec![DISK_ID_COLUMN, STEP_COLUMN]
    } else {
        vec![DISK_ID_COLUMN]
    };
    let df = df.sort(
        sort_columns,
        SortMultipleOptions::default().with_maintain_order(true),
    )?;

    let ids: Vec<String> = df
        .column(DISK_ID_COLUMN)?
        .as_materialized_series()
        .cast(&DataType::String)?
        .str()?
        .into_iter()
        .map(|id| id.unwrap_or_default().to_string())
        .collect();
    let failures = column_as_f32(&df, LABEL_COLUMN)?;

    // Row-major [rows, features] matrices shared by the window builders
    let num_features = spec.sequence_features.len();
    let feature_columns = spec
        .sequence_features
        .iter()
        .map(|name| column_as_f32(&df, name))
        .collect::<PolarsResult<Vec<_>>>()?;
    let mut rows = vec![0.0f32; df.height() * num_features];
    for (j, values) in feature_columns.iter().enumerate() {
        for (i, &value) in values.iter().enumerate() {
            rows[i * num_features + j] = value;
        }
    }
    let static_columns = spec
        .static_features
        .iter()
        .map(|name| column_as_f32(&df, name))
        .collect::<PolarsResult<Vec<_>>>()?;

    let disks = disk_row_ranges(&ids);
    let seq_len = spec.sequence_length;
    debug!("Building {} windows of length {}", disks.len(), seq_len);

    let windows: Vec<Vec<f32>> = disks
        .par_iter()
        .map(|range| {
            let mut window = vec![0.0f32; seq_len * num_features];
            let take = range.len().min(seq_len);
            let first_row = range.end - take;
            let offset = seq_len - take;
            window[offset * num_features..]
                .copy_from_slice(&rows[first_row * num_features..range.end * num_features]);
            window
        })
        .collect();

    let flat: Vec<f32> = windows.into_iter().flatten().collect();
    let sequences = Array3::from_shape_vec((disks.len(), seq_len, num_features), flat)
        .map_err(|e| DiskFailureError::InvalidData(e.to_string()))?;

    let static_features = if static_columns.is_empty() {
        None
    } else {
        let width = static_columns.len();
        let values: Vec<f32> = disks
            .iter()
            .flat_map(|range| static_columns.iter().map(move |column| column[range.start]))
            .collect();
        Some(
            Array2::from_shape_vec((disks.len(), width), values)
                .map_err(|e| DiskFailureError::InvalidData(e.to_string()))?,
        )
    };

    let labels: Vec<u8> = disks
        .iter()
        .map(|range| u8::from(failures[range.clone()].iter().any(|&f| f > 0.5)))
        .collect();
    let disk_ids: Vec<String> = disks.iter().map(|range| ids[range.start].clone()).collect();

    let dataset = DiskDataset {
        sequences,
        static_features,
        labels,
        disk_ids,
    };
    info!(
        "Prepared {} disk windows ({} failed) with {} sequence and {} static features",
        dataset.len(),
        dataset.positive_count(),
        dataset.num_features(),
        dataset.static_size()
    );
    Ok(dataset)
}
