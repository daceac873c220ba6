//! Pure computations backing the sender service (C13): how many repeat
//! frames to emit to cover a requested hold duration.
//!
//! Grounded on `original_source/backend/electronics/ir_sender_service.py`:
//! `_estimate_repeat_count`.

/// Estimates how many repeat frames are needed to cover `hold_us` of
/// total hold time, given each repeat frame (including its trailing gap)
/// takes `repeat_us + gap_us`. The initial frame is not counted here; the
/// caller always sends it first and accounts for its duration separately.
pub fn estimate_repeat_count(remaining_us: i64, repeat_us: i64, gap_us: i64) -> u32 {
  let repeat_period_us = (repeat_us + gap_us).max(1);
  let count = (remaining_us as f64 / repeat_period_us as f64).ceil() as i64;
  count.max(1) as u32
}

/// Builds the list of pulse trains `ir-ctl` should send in order: the
/// initial frame once, followed by `repeat_count` copies of the repeat
/// frame.
pub fn build_hold_file_list<'a>(initial: &'a [i64], repeat: &'a [i64], repeat_count: u32) -> Vec<&'a [i64]> {
  let mut files = Vec::with_capacity(1 + repeat_count as usize);
  files.push(initial);
  for _ in 0..repeat_count {
    files.push(repeat);
  }
  files
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn estimates_minimum_one_repeat() {
    assert_eq!(estimate_repeat_count(100, 1000, 500), 1);
  }

  #[test]
  fn estimates_several_repeats() {
    // repeat_period = 1500us; 3000/1500 = 2 repeats exactly.
    assert_eq!(estimate_repeat_count(3000, 1000, 500), 2);
    // 3001/1500 rounds up to 3.
    assert_eq!(estimate_repeat_count(3001, 1000, 500), 3);
  }

  #[test]
  fn builds_file_list_with_initial_first() {
    let initial = vec![1i64, -1];
    let repeat = vec![2i64, -2];
    let files = build_hold_file_list(&initial, &repeat, 3);
    assert_eq!(files.len(), 4);
    assert_eq!(files[0], &initial[..]);
    assert_eq!(files[1], &repeat[..]);
  }
}
