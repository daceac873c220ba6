//! Hold-signal extraction: splits a series of captured frames into the
//! first frame (sent once when a button-hold begins) and an aggregated
//! repeat frame (sent on a loop while the button stays held).
//!
//! Grounded on
//! `original_source/backend/electronics/ir_hold_extractor.py::extract`.

use crate::signal::aggregator::aggregate;
use crate::error::DomainError;

/// Result of splitting a hold capture into its initial and repeat frames.
#[derive(Clone, Debug, PartialEq)]
pub struct HoldExtractResult {
  pub hold_initial: Vec<i64>,
  pub hold_repeat: Option<Vec<i64>>,
  pub sample_count_hold: usize,
  pub quality_score_hold: Option<f64>,
}

/// `frames[0]` is always the hold-initial frame. Any further frames are
/// aggregated into the hold-repeat frame; if there are none, the button
/// was held only briefly enough to capture a single frame and there is no
/// repeat.
pub fn extract(frames: &[Vec<i64>], round_to_us: i64, min_match_ratio: f64) -> Result<HoldExtractResult, DomainError> {
  let (first, rest) = frames.split_first().ok_or_else(|| DomainError::signal_shape("hold capture produced no frames"))?;

  if rest.is_empty() {
    return Ok(HoldExtractResult {
      hold_initial: first.clone(),
      hold_repeat: None,
      sample_count_hold: 1,
      quality_score_hold: None,
    });
  }

  let aggregated = aggregate(rest, round_to_us, min_match_ratio)?;
  Ok(HoldExtractResult {
    hold_initial: first.clone(),
    hold_repeat: Some(aggregated.pulses),
    sample_count_hold: 1 + aggregated.sample_count,
    quality_score_hold: Some(aggregated.quality_score),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn single_frame_has_no_repeat() {
    let frames = vec![vec![9000i64, -4500, 560, -560]];
    let result = extract(&frames, 1, 0.6).unwrap();
    assert_eq!(result.hold_repeat, None);
    assert_eq!(result.sample_count_hold, 1);
  }

  #[test]
  fn multiple_frames_aggregate_the_remainder() {
    let frames = vec![
      vec![9000i64, -2250, 560, -560],
      vec![560i64, -1690, 560, -560],
      vec![562i64, -1688, 558, -562],
      vec![558i64, -1692, 562, -558],
    ];
    let result = extract(&frames, 1, 0.6).unwrap();
    assert_eq!(result.hold_initial, frames[0]);
    assert!(result.hold_repeat.is_some());
    assert_eq!(result.sample_count_hold, 4);
  }
}
