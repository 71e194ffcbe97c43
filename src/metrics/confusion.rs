use serde::{Deserialize, Serialize};

use crate::error::{DiskFailureError, Result};

/// Counts of a thresholded binary classifier against true labels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    /// Classify each score as positive when it is at or above `threshold`
    pub fn from_scores<S>(scores: &[S], labels: &[u8], threshold: f64) -> Result<Self>
    where
        S: Copy + Into<f64>,
    {
        if scores.len() != labels.len() {
            return Err(DiskFailureError::InvalidMetricInput(format!(
                "{} scores but {} labels",
                scores.len(),
                labels.len()
            )));
        }

        let mut matrix = Self::default();
        for (&score, &label) in scores.iter().zip(labels) {
            let predicted = score.into() >= threshold;
            match (predicted, label) {
                (true, 1) => matrix.true_positives += 1,
                (true, 0) => matrix.false_positives += 1,
                (false, 0) => matrix.true_negatives += 1,
                (false, 1) => matrix.false_negatives += 1,
                (_, other) => {
                    return Err(DiskFailureError::InvalidMetricInput(format!(
                        "label {} is not 0 or 1",
                        other
                    )))
                }
            }
        }
        Ok(matrix)
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    /// Harmonic mean of precision and recall; NaN when either is undefined
    pub fn f1(&self) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        if precision + recall == 0.0 {
            return 0.0;
        }
        2.0 * precision * recall / (precision + recall)
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        f64::NAN
    } else {
        numerator as f64 / denominator as f64
    }
}
