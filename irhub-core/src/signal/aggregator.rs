//! Multi-frame aggregation: collapses several raw captures of "the same"
//! button press into one representative pulse train plus a quality score.
//!
//! Grounded on
//! `original_source/backend/electronics/ir_signal_aggregator.py`:
//! frames are clustered by `(len, sign_pattern)` (in practice just `len`,
//! since a normalized train always starts on a pulse and therefore has a
//! fully length-determined sign pattern — the extra key is kept for
//! parity with frames that could in principle disagree), the largest
//! cluster meeting `min_match_ratio` of the input frame count wins, and
//! each output position is the rounded median of that cluster's values at
//! that position.

use std::collections::HashMap;

use crate::error::DomainError;

/// Result of aggregating several normalized pulse trains into one.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateResult {
  pub pulses: Vec<i64>,
  pub sample_count: usize,
  pub quality_score: f64,
}

/// Aggregates `frames` (each already normalized by
/// [`crate::signal::codec::parse_and_normalize`]) into a single
/// representative train.
///
/// `round_to_us` rounds each aggregated position to the nearest multiple
/// of itself (pass `1` for no rounding). `min_match_ratio` is the minimum
/// fraction of `frames` the dominant cluster must contain.
pub fn aggregate(frames: &[Vec<i64>], round_to_us: i64, min_match_ratio: f64) -> Result<AggregateResult, DomainError> {
  if frames.is_empty() {
    return Err(DomainError::signal_shape("no frames to aggregate"));
  }

  let required = ((frames.len() as f64) * min_match_ratio).ceil().max(1.0) as usize;

  let mut clusters: HashMap<(usize, Vec<bool>), Vec<&Vec<i64>>> = HashMap::new();
  for frame in frames {
    let key = (frame.len(), frame.iter().map(|v| *v >= 0).collect::<Vec<_>>());
    clusters.entry(key).or_default().push(frame);
  }

  let dominant = clusters
    .values()
    .filter(|cluster| cluster.len() >= required)
    .max_by_key(|cluster| cluster.len())
    .ok_or_else(|| {
      DomainError::signal_shape(format!(
        "no dominant cluster of at least {required} matching frame(s) out of {}",
        frames.len()
      ))
    })?;

  let len = dominant[0].len();
  let mut aggregated = Vec::with_capacity(len);
  for position in 0..len {
    let mut values: Vec<i64> = dominant.iter().map(|frame| frame[position]).collect();
    values.sort_unstable();
    let median = median_of_sorted(&values);
    aggregated.push(round_to_nearest(median, round_to_us));
  }

  let mut total_error = 0.0f64;
  let mut total_samples = 0usize;
  for frame in dominant {
    for (position, value) in frame.iter().enumerate() {
      total_error += (*value - aggregated[position]).unsigned_abs() as f64;
      total_samples += 1;
    }
  }
  let mean_error_us = if total_samples > 0 { total_error / total_samples as f64 } else { 0.0 };
  let quality_score = (1.0 - (mean_error_us / 500.0).min(1.0)).max(0.0);

  Ok(AggregateResult { pulses: aggregated, sample_count: dominant.len(), quality_score })
}

fn median_of_sorted(sorted: &[i64]) -> i64 {
  let mid = sorted.len() / 2;
  if sorted.len() % 2 == 1 {
    sorted[mid]
  } else {
    // Truncated-toward-zero average of the two central values, matching
    // Python's `int(sum / 2)`.
    let sum = sorted[mid - 1] + sorted[mid];
    sum / 2
  }
}

fn round_to_nearest(value: i64, round_to_us: i64) -> i64 {
  if round_to_us <= 1 {
    return value;
  }
  let half = round_to_us / 2;
  let sign = if value < 0 { -1 } else { 1 };
  let magnitude = value.abs();
  let rounded = ((magnitude + half) / round_to_us) * round_to_us;
  sign * rounded.max(1)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn aggregates_matching_frames_by_median() {
    let frames = vec![
      vec![9000i64, -4500, 560, -560],
      vec![9010, -4490, 555, -565],
      vec![8990, -4510, 565, -555],
    ];
    let result = aggregate(&frames, 1, 0.6).unwrap();
    assert_eq!(result.sample_count, 3);
    assert_eq!(result.pulses, vec![9000, -4500, 560, -560]);
    assert!(result.quality_score > 0.9);
  }

  #[test]
  fn rejects_when_no_cluster_meets_ratio() {
    let frames = vec![vec![9000i64, -4500], vec![1000, -500], vec![2000, -600]];
    assert!(aggregate(&frames, 1, 0.9).is_err());
  }

  #[test]
  fn rounds_to_nearest_requested_step() {
    let frames = vec![vec![9003i64, -4497], vec![9007, -4503]];
    let result = aggregate(&frames, 10, 0.5).unwrap();
    assert_eq!(result.pulses, vec![9000, -4500]);
  }

  #[test]
  fn median_of_even_cluster_truncates_toward_zero() {
    assert_eq!(median_of_sorted(&[1, 2]), 1);
    assert_eq!(median_of_sorted(&[-1, -2]), -1);
  }

  #[test]
  fn round_to_nearest_never_rounds_down_to_zero() {
    assert_eq!(round_to_nearest(2, 10), 1);
    assert_eq!(round_to_nearest(-2, 10), -1);
  }
}
