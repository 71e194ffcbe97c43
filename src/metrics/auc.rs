//! ROC AUC via the Mann-Whitney U statistic.
//!
//! Sorts once and scans tie groups, so the cost is O(n log n) in the number of
//! scored examples.

use std::cmp::Ordering;

use crate::error::{DiskFailureError, Result};

/// Area under the ROC curve for binary `labels` (0 or 1) ranked by `scores`.
///
/// Equals the probability that a random positive example scores above a random
/// negative one, with a positive/negative tie counting as one half.
///
/// Returns `Ok(f64::NAN)` when the labels do not contain both classes (including
/// empty input), since the curve is undefined there.
///
/// # Errors
///
/// Fails when the slices differ in length, when a label is not 0 or 1, or when
/// a score is not finite.
pub fn roc_auc<S>(scores: &[S], labels: &[u8]) -> Result<f64>
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

    let mut ranked: Vec<(f64, u8)> = Vec::with_capacity(scores.len());
    for (i, (&score, &label)) in scores.iter().zip(labels).enumerate() {
        let score: f64 = score.into();
        if !score.is_finite() {
            return Err(DiskFailureError::InvalidMetricInput(format!(
                "score at index {} is not finite ({})",
                i, score
            )));
        }
        if label > 1 {
            return Err(DiskFailureError::InvalidMetricInput(format!(
                "label at index {} is {}, expected 0 or 1",
                i, label
            )));
        }
        ranked.push((score, label));
    }

    let positives = ranked.iter().filter(|(_, label)| *label == 1).count();
    let negatives = ranked.len() - positives;
    if positives == 0 || negatives == 0 {
        return Ok(f64::NAN);
    }

    ranked.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    // Sum of (1-based, tie-averaged) ranks held by positive examples
    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < ranked.len() {
        let mut end = start + 1;
        while end < ranked.len() && ranked[end].0 == ranked[start].0 {
            end += 1;
        }
        let average_rank = (start + 1 + end) as f64 / 2.0;
        let group_positives = ranked[start..end]
            .iter()
            .filter(|(_, label)| *label == 1)
            .count();
        positive_rank_sum += average_rank * group_positives as f64;
        start = end;
    }

    let p = positives as f64;
    let n = negatives as f64;
    let u = positive_rank_sum - p * (p + 1.0) / 2.0;
    Ok((u / (p * n)).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Quadratic pairwise count, used as an oracle for small inputs
    fn pairwise_auc(scores: &[f64], labels: &[u8]) -> f64 {
        let mut concordant = 0.0;
        let mut pairs = 0.0;
        for (i, &si) in scores.iter().enumerate() {
            if labels[i] != 1 {
                continue;
            }
            for (j, &sj) in scores.iter().enumerate() {
                if labels[j] != 0 {
                    continue;
                }
                pairs += 1.0;
                if si > sj {
                    concordant += 1.0;
                } else if si == sj {
                    concordant += 0.5;
                }
            }
        }
        concordant / pairs
    }

    #[test]
    fn perfect_ranking() {
        let auc = roc_auc(&[0.9, 0.1, 0.8, 0.2], &[1, 0, 1, 0]).unwrap();
        assert!((auc - 1.0).abs() < 1e-12, "expected 1.0, got {auc}");
    }

    #[test]
    fn inverted_ranking() {
        let auc = roc_auc(&[0.1, 0.9, 0.2, 0.8], &[1, 0, 1, 0]).unwrap();
        assert!(auc.abs() < 1e-12, "expected 0.0, got {auc}");
    }

    #[test]
    fn tie_counts_half() {
        let auc = roc_auc(&[0.5, 0.5], &[1, 0]).unwrap();
        assert!((auc - 0.5).abs() < 1e-12, "expected 0.5, got {auc}");
    }

    #[test]
    fn known_value_with_interleaving() {
        // pos = [3, 5], neg = [1, 2, 4]: 5 of 6 pairs concordant
        let auc = roc_auc(&[3.0, 5.0, 1.0, 2.0, 4.0], &[1, 1, 0, 0, 0]).unwrap();
        assert!((auc - 5.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn single_class_is_nan() {
        assert!(roc_auc(&[0.2, 0.4, 0.6], &[0, 0, 0]).unwrap().is_nan());
        assert!(roc_auc(&[0.2, 0.4, 0.6], &[1, 1, 1]).unwrap().is_nan());
        assert!(roc_auc::<f64>(&[], &[]).unwrap().is_nan());
    }

    #[test]
    fn accepts_f32_predictions() {
        let scores: Vec<f32> = vec![0.7, 0.3, 0.6, 0.4];
        let auc = roc_auc(&scores, &[1, 0, 0, 1]).unwrap();
        assert!((auc - 0.75).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(roc_auc(&[0.1, 0.2], &[1]).is_err());
        assert!(roc_auc(&[0.1, 0.2], &[1, 2]).is_err());
        assert!(roc_auc(&[f64::NAN, 0.2], &[1, 0]).is_err());
        assert!(roc_auc(&[f64::INFINITY, 0.2], &[1, 0]).is_err());
    }

    #[test]
    fn matches_pairwise_count_with_ties() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let n = rng.random_range(2..60usize);
            // Coarse scores so that tie groups are common
            let scores: Vec<f64> = (0..n).map(|_| rng.random_range(0..8u32) as f64 / 8.0).collect();
            let mut labels: Vec<u8> = (0..n).map(|_| rng.random_range(0..2)).collect();
            labels[0] = 0;
            labels[1] = 1;

            let fast = roc_auc(&scores, &labels).unwrap();
            let slow = pairwise_auc(&scores, &labels);
            assert!((fast - slow).abs() < 1e-9, "fast={fast} slow={slow}");
            assert!((0.0..=1.0).contains(&fast));
        }
    }

    #[test]
    fn invariant_under_monotonic_transform() {
        let mut rng = StdRng::seed_from_u64(11);
        let scores: Vec<f64> = (0..200).map(|_| rng.random::<f64>()).collect();
        let labels: Vec<u8> = scores
            .iter()
            .map(|s| u8::from(rng.random::<f64>() < *s))
            .collect();

        let base = roc_auc(&scores, &labels).unwrap();
        let scaled: Vec<f64> = scores.iter().map(|s| 3.5 * s - 10.0).collect();
        let squashed: Vec<f64> = scores.iter().map(|s| (s * 4.0).exp()).collect();

        assert!((base - roc_auc(&scaled, &labels).unwrap()).abs() < 1e-12);
        assert!((base - roc_auc(&squashed, &labels).unwrap()).abs() < 1e-12);
    }
}
