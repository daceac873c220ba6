//! Learning service (C12): owns the single active learning session,
//! drives press/hold capture against the remote's resolved agent, and
//! persists the aggregated result to the catalog.
//!
//! Grounded on `original_source/backend/electronics/ir_learning_service.py`.
//! Hold-gap estimation prefers the tail gap reported alongside each
//! capture (`_resolve_hold_gap_candidates`'s primary branch) and only
//! falls back to frame-arrival timestamps when no capture reported one.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use regex::Regex;
use serde::Serialize;

use irhub_core::error::DomainError;
use irhub_core::signal::{aggregator, gap, hold};

use crate::broadcaster::StatusBroadcaster;
use crate::db::buttons::Button;
use crate::db::signals::ButtonSignals;
use crate::db::Catalog;
use crate::registry::AgentRegistry;

#[derive(Clone, Copy, Debug)]
pub struct LearningTuning {
  pub aggregate_round_to_us: i64,
  pub aggregate_min_match_ratio: f64,
  pub hold_idle_timeout_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
struct SessionLogEntry {
  timestamp: chrono::DateTime<chrono::Utc>,
  message: String,
}

struct LearningSession {
  remote_id: i64,
  remote_name: String,
  extend: bool,
  started_at: chrono::DateTime<chrono::Utc>,
  next_button_index: u32,
  last_button_id: Option<i64>,
  last_button_name: Option<String>,
  logs: Vec<SessionLogEntry>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LearningStatus {
  pub learn_enabled: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub remote_id: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub remote_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub extend: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub started_at: Option<chrono::DateTime<chrono::Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub last_button_id: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub last_button_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub next_button_index: Option<u32>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub logs: Vec<SessionLogEntry>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CaptureOutcome {
  pub remote_id: i64,
  pub button: Button,
  pub signals: ButtonSignals,
}

pub struct LearningService {
  catalog: Arc<Catalog>,
  registry: Arc<AgentRegistry>,
  broadcaster: Arc<StatusBroadcaster>,
  tuning: Mutex<LearningTuning>,
  session: Mutex<Option<LearningSession>>,
}

impl LearningService {
  pub fn new(catalog: Arc<Catalog>, registry: Arc<AgentRegistry>, broadcaster: Arc<StatusBroadcaster>, tuning: LearningTuning) -> Self {
    Self { catalog, registry, broadcaster, tuning: Mutex::new(tuning), session: Mutex::new(None) }
  }

  pub fn apply_tuning(&self, tuning: LearningTuning) {
    *self.tuning.lock().expect("lock poisoned") = tuning;
  }

  pub fn status(&self) -> LearningStatus {
    let session = self.session.lock().expect("lock poisoned");
    Self::session_to_status(session.as_ref())
  }

  fn session_to_status(session: Option<&LearningSession>) -> LearningStatus {
    match session {
      None => LearningStatus { learn_enabled: false, remote_id: None, remote_name: None, extend: None, started_at: None, last_button_id: None, last_button_name: None, next_button_index: None, logs: Vec::new() },
      Some(s) => LearningStatus {
        learn_enabled: true,
        remote_id: Some(s.remote_id),
        remote_name: Some(s.remote_name.clone()),
        extend: Some(s.extend),
        started_at: Some(s.started_at),
        last_button_id: s.last_button_id,
        last_button_name: s.last_button_name.clone(),
        next_button_index: Some(s.next_button_index),
        logs: s.logs.clone(),
      },
    }
  }

  pub fn start(&self, remote_id: i64, extend: bool) -> Result<LearningStatus, DomainError> {
    {
      let session = self.session.lock().expect("lock poisoned");
      if session.is_some() {
        return Err(DomainError::conflict("learning_active", "a learning session is already running"));
      }
    }

    let remote = self.catalog.get_remote(remote_id)?;
    if !extend {
      self.catalog.clear_buttons(remote_id)?;
    }
    let next_index = if extend { self.compute_next_button_index(remote_id)? } else { 1 };

    let session = LearningSession {
      remote_id,
      remote_name: remote.name,
      extend,
      started_at: chrono::Utc::now(),
      next_button_index: next_index,
      last_button_id: None,
      last_button_name: None,
      logs: vec![SessionLogEntry { timestamp: chrono::Utc::now(), message: "learning session started".to_owned() }],
    };
    let status = Self::session_to_status(Some(&session));
    *self.session.lock().expect("lock poisoned") = Some(session);
    self.publish();
    Ok(status)
  }

  pub fn stop(&self) -> LearningStatus {
    let had_session = self.session.lock().expect("lock poisoned").take().is_some();
    if had_session {
      self.publish();
    }
    LearningStatus { learn_enabled: false, remote_id: None, remote_name: None, extend: None, started_at: None, last_button_id: None, last_button_name: None, next_button_index: None, logs: Vec::new() }
  }

  pub async fn capture_press(&self, remote_id: i64, takes: u32, timeout_ms: u64, overwrite: bool, button_name: Option<&str>) -> Result<CaptureOutcome, DomainError> {
    if takes == 0 {
      return Err(DomainError::validation("takes must be > 0"));
    }
    if timeout_ms == 0 {
      return Err(DomainError::validation("timeout_ms must be > 0"));
    }
    self.ensure_session_for_remote(remote_id)?;

    let name = self.resolve_press_button_name(remote_id, button_name)?;
    let auto_generated = button_name.map(str::trim).unwrap_or("").is_empty();

    let existing_button = self.catalog.get_button_by_name(remote_id, &name)?;
    if let Some(existing) = &existing_button {
      if self.catalog.get_signals(existing.id)?.is_some() && !overwrite {
        return Err(DomainError::conflict("press_exists", "press signal already exists (set overwrite=true to replace)"));
      }
    }

    let remote = self.catalog.get_remote(remote_id)?;
    let agent = self.registry.resolve_agent_for_remote(&remote)?;

    let tuning = *self.tuning.lock().expect("lock poisoned");
    let mut frames = Vec::with_capacity(takes as usize);
    for _ in 0..takes {
      let (frame, _tail_gap_us) = agent.learn_capture(timeout_ms, false).await?;
      frames.push(frame);
    }

    let aggregated = aggregator::aggregate(&frames, tuning.aggregate_round_to_us, tuning.aggregate_min_match_ratio)?;

    let button = match existing_button {
      Some(button) => button,
      None => {
        let created = self.catalog.create_button(remote_id, &name)?;
        if auto_generated {
          self.bump_next_button_index(remote_id);
        }
        created
      }
    };

    let press_initial = irhub_core::signal::codec::to_pulse_space_text(&aggregated.pulses);
    let signals = self.catalog.upsert_press(button.id, &press_initial, None, aggregated.sample_count as i64, Some(aggregated.quality_score), "signed_us_v1")?;

    self.set_last_button(remote_id, button.id, &button.name);
    self.log(remote_id, format!("capture press finished for button {} (quality {:.2})", button.id, aggregated.quality_score));

    Ok(CaptureOutcome { remote_id, button, signals })
  }

  pub async fn capture_hold(&self, remote_id: i64, timeout_ms: u64, overwrite: bool, button_name: Option<&str>) -> Result<CaptureOutcome, DomainError> {
    if timeout_ms == 0 {
      return Err(DomainError::validation("timeout_ms must be > 0"));
    }
    self.ensure_session_for_remote(remote_id)?;

    let button = self.resolve_hold_button(remote_id, button_name)?;
    let existing_signals = self.catalog.get_signals(button.id)?.ok_or_else(|| DomainError::conflict("press_required", "press must be captured before hold can be captured"))?;
    let has_hold = existing_signals.hold_initial.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false);
    if has_hold && !overwrite {
      return Err(DomainError::conflict("hold_exists", "hold signal already exists (set overwrite=true to replace)"));
    }

    let remote = self.catalog.get_remote(remote_id)?;
    let agent = self.registry.resolve_agent_for_remote(&remote)?;
    let tuning = *self.tuning.lock().expect("lock poisoned");

    let deadline = Instant::now() + std::time::Duration::from_millis(timeout_ms);
    let mut frames = Vec::new();
    let mut frame_times = Vec::new();
    let mut tail_gaps: Vec<Option<i64>> = Vec::new();

    let (first, first_tail_gap) = agent.learn_capture(timeout_ms, false).await?;
    frames.push(first);
    frame_times.push(Instant::now());
    tail_gaps.push(first_tail_gap);

    loop {
      let remaining_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64;
      if remaining_ms == 0 {
        break;
      }
      let per_call_timeout_ms = remaining_ms.min(tuning.hold_idle_timeout_ms);
      match agent.learn_capture(per_call_timeout_ms, false).await {
        Ok((frame, tail_gap_us)) => {
          frames.push(frame);
          frame_times.push(Instant::now());
          tail_gaps.push(tail_gap_us);
        }
        Err(e) if e.kind == irhub_core::error::ErrorKind::Timeout => break,
        Err(e) => return Err(e),
      }
    }

    if frames.len() < 2 {
      return Err(DomainError::validation("hold capture needs at least 2 frames; hold the button longer or increase timeout_ms"));
    }

    let extracted = hold::extract(&frames, tuning.aggregate_round_to_us, tuning.aggregate_min_match_ratio)?;
    let hold_repeat = extracted.hold_repeat.ok_or_else(|| DomainError::validation("failed to extract a repeat frame from the hold capture"))?;

    let gap_candidates = resolve_hold_gap_candidates(&tail_gaps, &frames, &frame_times);
    let hold_gap_us = gap::estimate_hold_gap_us(&gap_candidates).ok_or_else(|| DomainError::validation("failed to infer hold gap from capture; hold longer and try again"))?;

    let hold_initial_text = irhub_core::signal::codec::to_pulse_space_text(&extracted.hold_initial);
    let hold_repeat_text = irhub_core::signal::codec::to_pulse_space_text(&hold_repeat);
    let signals = self.catalog.update_hold(button.id, &hold_initial_text, Some(&hold_repeat_text), Some(hold_gap_us), extracted.sample_count_hold as i64, extracted.quality_score_hold)?;

    self.set_last_button(remote_id, button.id, &button.name);
    self.log(remote_id, format!("capture hold finished for button {} (quality {:?}, gap {}us)", button.id, extracted.quality_score_hold, hold_gap_us));

    Ok(CaptureOutcome { remote_id, button, signals })
  }

  fn ensure_session_for_remote(&self, remote_id: i64) -> Result<(), DomainError> {
    let session = self.session.lock().expect("lock poisoned");
    let session = session.as_ref().ok_or_else(|| DomainError::conflict("not_learning", "learning session is not running"))?;
    if session.remote_id != remote_id {
      return Err(DomainError::conflict("wrong_remote", "learning session is running for a different remote"));
    }
    Ok(())
  }

  fn resolve_press_button_name(&self, remote_id: i64, button_name: Option<&str>) -> Result<String, DomainError> {
    if let Some(name) = button_name.map(str::trim).filter(|s| !s.is_empty()) {
      return Ok(name.to_owned());
    }
    let session = self.session.lock().expect("lock poisoned");
    let session = session.as_ref().ok_or_else(|| DomainError::conflict("not_learning", "learning session is not running"))?;
    let _ = remote_id;
    Ok(format!("BTN_{:04}", session.next_button_index))
  }

  fn resolve_hold_button(&self, remote_id: i64, button_name: Option<&str>) -> Result<Button, DomainError> {
    if let Some(name) = button_name.map(str::trim).filter(|s| !s.is_empty()) {
      return self.catalog.get_button_by_name(remote_id, name)?.ok_or_else(|| DomainError::validation("unknown button name"));
    }
    let session = self.session.lock().expect("lock poisoned");
    let session = session.as_ref().ok_or_else(|| DomainError::conflict("not_learning", "learning session is not running"))?;
    let button_id = session.last_button_id.ok_or_else(|| DomainError::validation("button_name is required (no previous button in session)"))?;
    drop(session);
    let button = self.catalog.get_button(button_id)?.ok_or_else(|| DomainError::not_found("unknown button_id"))?;
    if button.remote_id != remote_id {
      return Err(DomainError::conflict("wrong_remote", "last button belongs to a different remote"));
    }
    Ok(button)
  }

  fn compute_next_button_index(&self, remote_id: i64) -> Result<u32, DomainError> {
    let pattern = Regex::new(r"^BTN_(\d{4})$").expect("valid regex");
    let buttons = self.catalog.list_buttons(remote_id)?;
    let best = buttons
      .iter()
      .filter_map(|b| pattern.captures(&b.button.name))
      .filter_map(|c| c[1].parse::<u32>().ok())
      .max()
      .unwrap_or(0);
    Ok(if best > 0 { best + 1 } else { 1 })
  }

  fn bump_next_button_index(&self, remote_id: i64) {
    let mut session = self.session.lock().expect("lock poisoned");
    if let Some(session) = session.as_mut() {
      if session.remote_id == remote_id {
        session.next_button_index += 1;
      }
    }
  }

  fn set_last_button(&self, remote_id: i64, button_id: i64, button_name: &str) {
    let mut session = self.session.lock().expect("lock poisoned");
    if let Some(session) = session.as_mut() {
      if session.remote_id == remote_id {
        session.last_button_id = Some(button_id);
        session.last_button_name = Some(button_name.to_owned());
      }
    }
    drop(session);
    self.publish();
  }

  fn log(&self, remote_id: i64, message: String) {
    let mut session = self.session.lock().expect("lock poisoned");
    if let Some(session) = session.as_mut() {
      if session.remote_id == remote_id {
        session.logs.push(SessionLogEntry { timestamp: chrono::Utc::now(), message });
      }
    }
  }

  fn publish(&self) {
    let snapshot = crate::broadcaster::StatusSnapshot { agents: self.catalog.list_agents().unwrap_or_default(), pairing: crate::pairing::PairingStatus { open: false, session_id: None, expires_at: None } };
    self.broadcaster.broadcast(snapshot);
  }
}

/// Resolves hold-gap candidates, preferring explicit tail gaps reported
/// alongside each capture and only falling back to frame-arrival timing
/// when none were reported. Mirrors `_resolve_hold_gap_candidates`.
fn resolve_hold_gap_candidates(tail_gaps: &[Option<i64>], frames: &[Vec<i64>], frame_times: &[Instant]) -> Vec<i64> {
  let mut tail_candidates: Vec<i64> = tail_gaps.iter().skip(1).filter_map(|g| g.filter(|v| *v > 0)).collect();
  if tail_candidates.is_empty() {
    if let Some(first) = tail_gaps.first().and_then(|g| g.filter(|v| *v > 0)) {
      tail_candidates = vec![first];
    }
  }
  if !tail_candidates.is_empty() {
    return tail_candidates;
  }

  if frames.len() < 2 || frame_times.len() < 2 {
    return Vec::new();
  }
  let durations: Vec<i64> = frames.iter().map(|frame| frame.iter().map(|v| v.unsigned_abs() as i64).sum()).collect();
  let mut candidates = Vec::new();
  for idx in 1..frames.len() {
    let delta_us = frame_times[idx].duration_since(frame_times[idx - 1]).as_micros() as i64;
    let gap_us = delta_us - durations[idx];
    if gap_us > 0 {
      candidates.push(gap_us);
    }
  }
  candidates
}
