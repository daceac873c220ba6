//! Hold-repeat gap estimation.
//!
//! Grounded on
//! `ir_learning_service.py::_resolve_hold_gap_candidates`/
//! `_estimate_hold_gap_us`: the caller gathers gap candidates, preferring
//! the trailing space already present at the end of each captured repeat
//! frame over a fallback of inter-frame timestamp deltas, and this
//! function collapses the candidates into one `hold_gap_us` value. With
//! three or more candidates the largest (an outlier caused by scheduling
//! jitter) is dropped before taking the median; with exactly two, the
//! smaller is kept; with one, it passes through unchanged.

/// Collapses hold-repeat gap candidates (in microseconds) into a single
/// estimate, or `None` if there are no candidates at all.
pub fn estimate_hold_gap_us(candidates: &[i64]) -> Option<i64> {
  if candidates.is_empty() {
    return None;
  }
  if candidates.len() == 1 {
    return Some(candidates[0]);
  }
  if candidates.len() == 2 {
    return Some(*candidates.iter().min().unwrap());
  }

  let mut sorted = candidates.to_vec();
  sorted.sort_unstable();
  sorted.pop(); // drop the largest as an outlier
  let mid = sorted.len() / 2;
  let median = if sorted.len() % 2 == 1 {
    sorted[mid]
  } else {
    (sorted[mid - 1] + sorted[mid]) / 2
  };
  Some(median)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn single_candidate_passes_through() {
    assert_eq!(estimate_hold_gap_us(&[1690]), Some(1690));
  }

  #[test]
  fn two_candidates_take_the_smaller() {
    assert_eq!(estimate_hold_gap_us(&[1690, 1720]), Some(1690));
  }

  #[test]
  fn three_or_more_drop_outlier_then_median() {
    assert_eq!(estimate_hold_gap_us(&[1690, 1700, 1710, 5000]), Some(1700));
  }

  #[test]
  fn no_candidates_is_none() {
    assert_eq!(estimate_hold_gap_us(&[]), None);
  }
}
