//! Sender service (C13): resolves a button's stored signal and transmits
//! it through its remote's agent.
//!
//! Grounded on `original_source/backend/electronics/ir_sender_service.py`.

use std::sync::Arc;

use serde::Serialize;

use irhub_core::error::DomainError;
use irhub_core::protocol::SendMode;
use irhub_core::signal::codec::parse_and_normalize;
use irhub_core::signal::sender::{build_hold_file_list, estimate_repeat_count};

use crate::db::Catalog;
use crate::registry::AgentRegistry;

#[derive(Clone, Debug, Serialize)]
pub struct SendOutcome {
  pub button_id: i64,
  pub mode: SendMode,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub hold_ms: Option<u32>,
  pub carrier_hz: Option<i64>,
  pub duty_cycle: Option<i64>,
  pub gap_us: Option<i64>,
  pub repeats: u32,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub stdout: String,
  #[serde(skip_serializing_if = "String::is_empty")]
  pub stderr: String,
}

pub struct IrSenderService {
  catalog: Arc<Catalog>,
  registry: Arc<AgentRegistry>,
}

impl IrSenderService {
  pub fn new(catalog: Arc<Catalog>, registry: Arc<AgentRegistry>) -> Self {
    Self { catalog, registry }
  }

  pub async fn send(&self, button_id: i64, mode: SendMode, hold_ms: Option<u32>) -> Result<SendOutcome, DomainError> {
    let button = self.catalog.get_button(button_id)?;
    let signals = self.catalog.get_signals(button_id)?.ok_or_else(|| DomainError::validation("no signals for button"))?;
    let remote = self.catalog.get_remote(button.remote_id)?;
    let agent = self.registry.resolve_agent_for_remote(&remote)?;

    match mode {
      SendMode::Press => {
        let (press_initial, _) = parse_and_normalize(&signals.press_initial)?;
        let (stdout, stderr) = agent.send(std::slice::from_ref(&press_initial), None, remote.carrier_hz.map(|v| v as u32), remote.duty_cycle.map(|v| v as u8), None).await?;
        Ok(SendOutcome { button_id, mode, hold_ms: None, carrier_hz: remote.carrier_hz, duty_cycle: remote.duty_cycle, gap_us: None, repeats: 0, stdout, stderr })
      }
      SendMode::Hold => {
        let hold_ms = hold_ms.filter(|v| *v > 0).ok_or_else(|| DomainError::validation("hold_ms is required for mode=hold"))?;

        let hold_initial_text = signals.hold_initial.as_deref().unwrap_or("").trim().to_owned();
        let hold_repeat_text = signals.hold_repeat.as_deref().unwrap_or("").trim().to_owned();
        if hold_initial_text.is_empty() || hold_repeat_text.is_empty() {
          return Err(DomainError::validation("hold signals are missing for this button"));
        }
        let hold_gap_us = signals.hold_gap_us.filter(|v| *v > 0).ok_or_else(|| DomainError::validation("hold gap is missing for this button; re-capture hold to compute it"))?;

        let (hold_initial, _) = parse_and_normalize(&hold_initial_text)?;
        let (hold_repeat, _) = parse_and_normalize(&hold_repeat_text)?;

        let initial_us: i64 = hold_initial.iter().map(|v| v.unsigned_abs() as i64).sum();
        let repeat_us: i64 = hold_repeat.iter().map(|v| v.unsigned_abs() as i64).sum();
        let target_us = hold_ms as i64 * 1000;
        let remaining_us = (target_us - initial_us).max(0);
        let repeat_count = estimate_repeat_count(remaining_us, repeat_us, hold_gap_us);

        let frames: Vec<Vec<i64>> = build_hold_file_list(&hold_initial, &hold_repeat, repeat_count).into_iter().map(|f| f.to_vec()).collect();
        let (stdout, stderr) = agent.send(&frames, Some(hold_gap_us), remote.carrier_hz.map(|v| v as u32), remote.duty_cycle.map(|v| v as u8), Some(hold_ms)).await?;

        Ok(SendOutcome { button_id, mode, hold_ms: Some(hold_ms), carrier_hz: remote.carrier_hz, duty_cycle: remote.duty_cycle, gap_us: Some(hold_gap_us), repeats: repeat_count, stdout, stderr })
      }
    }
  }
}
