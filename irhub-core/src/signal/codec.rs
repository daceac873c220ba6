//! Pulse/space codec.
//!
//! An IR signal is represented in memory as a sequence of signed
//! microsecond durations: positive entries are pulses (carrier on),
//! negative entries are spaces (carrier off). This is the representation
//! stored in `button_signals.press_initial`/`hold_initial` and the one the
//! aggregator and hold extractor operate on.
//!
//! Grounded on `original_source/backend/electronics/ir_signal_parser.py`:
//! `parse_and_normalize` parses and normalizes a raw capture in one pass,
//! `to_pulse_space_text` renders the signed form back to text for storage,
//! and `encode_pulses`/`decode_pulses` convert to/from the unsigned,
//! strictly-alternating-starting-on-a-pulse format the `ir-ctl` subprocess
//! reads and writes on disk.

use crate::error::DomainError;

/// Parses a raw, possibly-noisy capture of signed microsecond tokens and
/// normalizes it:
///
/// 1. Adjacent same-sign entries are merged (summed) — a capture can
///    report a pulse or space as two or more consecutive readings of the
///    same sign due to sampling artifacts.
/// 2. Trailing space (negative) entries are stripped — trailing silence
///    carries no information.
/// 3. The result must strictly alternate sign after merging.
/// 4. The result must start on a pulse (positive entry).
///
/// Also returns `tail_gap_us`: the magnitude of the raw (pre-normalization)
/// trailing token, if it was a space, used by hold-gap estimation when a
/// capture's tail silence is the only signal of the real inter-frame gap.
pub fn parse_and_normalize(text: &str) -> Result<(Vec<i64>, Option<i64>), DomainError> {
  let raw = parse_tokens(text);
  let tail_gap_us = raw.last().copied().filter(|v| *v < 0).map(|v| v.unsigned_abs() as i64);
  let pulses = normalize(raw)?;
  Ok((pulses, tail_gap_us))
}

/// Tokenizes a raw capture. Mirrors `_parse_tokens`: besides bare signed
/// integers, accepts `pulse N`/`space N` word pairs and silently skips
/// `carrier`/`frequency` metadata pairs (and any other unrecognized
/// token) rather than erroring, matching the original's lenient
/// `try/except: pass` token walk.
fn parse_tokens(text: &str) -> Vec<i64> {
  let tokens: Vec<&str> = text.split_whitespace().collect();
  let mut out = Vec::with_capacity(tokens.len());
  let mut i = 0;
  while i < tokens.len() {
    let token = tokens[i];
    if token.starts_with('+') || token.starts_with('-') {
      if let Ok(value) = token.parse::<i64>() {
        out.push(value);
      }
      i += 1;
      continue;
    }
    let lower = token.to_ascii_lowercase();
    if lower == "pulse" || lower == "space" {
      if let Some(next) = tokens.get(i + 1) {
        if let Ok(value) = next.parse::<i64>() {
          out.push(if lower == "pulse" { value } else { -value });
        }
      }
      i += 2;
      continue;
    }
    if lower == "carrier" || lower == "frequency" {
      i += 2;
      continue;
    }
    if let Ok(value) = token.parse::<i64>() {
      out.push(value);
      i += 1;
      continue;
    }
    i += 1;
  }
  out
}

fn normalize(raw: Vec<i64>) -> Result<Vec<i64>, DomainError> {
  if raw.is_empty() {
    return Err(DomainError::signal_shape("pulse train is empty"));
  }

  // Merge adjacent same-sign entries.
  let mut merged: Vec<i64> = Vec::with_capacity(raw.len());
  for value in raw {
    if value == 0 {
      continue;
    }
    match merged.last_mut() {
      Some(last) if last.signum() == value.signum() => *last += value,
      _ => merged.push(value),
    }
  }

  // Strip trailing space (negative) entries.
  while matches!(merged.last(), Some(v) if *v < 0) {
    merged.pop();
  }

  if merged.is_empty() {
    return Err(DomainError::signal_shape("pulse train is empty after normalization"));
  }

  if merged[0] < 0 {
    return Err(DomainError::signal_shape("pulse train must start on a pulse"));
  }

  for window in merged.windows(2) {
    if window[0].signum() == window[1].signum() {
      return Err(DomainError::signal_shape("pulse train does not alternate sign after merging"));
    }
  }

  Ok(merged)
}

/// Renders a normalized signed pulse train back to its canonical storage
/// text: whitespace-separated signed decimal integers.
pub fn to_pulse_space_text(pulses: &[i64]) -> String {
  pulses.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
}

/// Converts a normalized signed pulse train to the unsigned,
/// strictly-alternating format `ir-ctl` expects on disk: one duration per
/// line, all positive, implicitly alternating pulse/space starting with a
/// pulse.
pub fn encode_pulses(pulses: &[i64]) -> Result<String, DomainError> {
  if pulses.is_empty() || pulses[0] < 0 {
    return Err(DomainError::signal_shape("pulse train must start on a pulse"));
  }
  Ok(pulses.iter().map(|v| v.unsigned_abs().to_string()).collect::<Vec<_>>().join("\n"))
}

/// Parses `ir-ctl`'s unsigned, alternating-starting-on-a-pulse format back
/// into our signed in-memory representation.
pub fn decode_pulses(text: &str) -> Result<Vec<i64>, DomainError> {
  let mut out = Vec::new();
  for (index, line) in text.lines().map(str::trim).filter(|l| !l.is_empty()).enumerate() {
    let magnitude: i64 = line
      .parse()
      .map_err(|_| DomainError::signal_shape(format!("invalid pulse duration: {line:?}")))?;
    if magnitude < 0 {
      return Err(DomainError::signal_shape("ir-ctl durations must be non-negative"));
    }
    let signed = if index % 2 == 0 { magnitude } else { -magnitude };
    out.push(signed);
  }
  if out.is_empty() {
    return Err(DomainError::signal_shape("decoded pulse train is empty"));
  }
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn merges_adjacent_same_sign_entries() {
    let (pulses, _) = parse_and_normalize("4000 2000 -4500 500 -500").unwrap();
    assert_eq!(pulses, vec![6000, -4500, 500, -500]);
  }

  #[test]
  fn strips_trailing_spaces() {
    let (pulses, _) = parse_and_normalize("9000 -4500 560 -560 -40000").unwrap();
    assert_eq!(pulses, vec![9000, -4500, 560, -560]);
  }

  #[test]
  fn rejects_leading_space() {
    assert!(parse_and_normalize("-4500 9000").is_err());
  }

  #[test]
  fn rejects_empty_train() {
    assert!(parse_and_normalize("").is_err());
    assert!(parse_and_normalize("-100 -200").is_err());
  }

  #[test]
  fn pulse_space_text_round_trips() {
    let pulses = vec![9000i64, -4500, 560, -560];
    let text = to_pulse_space_text(&pulses);
    assert_eq!(parse_and_normalize(&text).unwrap().0, pulses);
  }

  #[test]
  fn accepts_pulse_space_word_pairs_and_skips_metadata() {
    let (pulses, _) = parse_and_normalize("carrier 38000 pulse 9000 space 4500 pulse 560 space 560").unwrap();
    assert_eq!(pulses, vec![9000, -4500, 560, -560]);
  }

  #[test]
  fn reports_tail_gap_from_trailing_space_token() {
    let (pulses, tail_gap_us) = parse_and_normalize("9000 -4500 560 -560 -12000").unwrap();
    assert_eq!(pulses, vec![9000, -4500, 560, -560]);
    assert_eq!(tail_gap_us, Some(12000));
  }

  #[test]
  fn tail_gap_is_none_when_last_token_is_a_pulse() {
    let (_, tail_gap_us) = parse_and_normalize("9000 -4500 560").unwrap();
    assert_eq!(tail_gap_us, None);
  }

  #[test]
  fn encode_decode_pulses_round_trip() {
    let pulses = vec![9000i64, -4500, 560, -560, 1690];
    let encoded = encode_pulses(&pulses).unwrap();
    assert_eq!(decode_pulses(&encoded).unwrap(), pulses);
  }
}
