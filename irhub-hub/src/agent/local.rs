//! A co-located agent wrapping an `irhub_core::signal::engine::IrHardwareEngine`
//! directly, for a hub that is also physically attached to an IR
//! transceiver. Grounded on
//! `original_source/backend/agents/local_agent.py`.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map};

use irhub_core::error::DomainError;
use irhub_core::protocol::{AgentStatus, BusyState};
use irhub_core::signal::codec::parse_and_normalize;
use irhub_core::signal::engine::IrHardwareEngine;

use crate::agent::Agent;

pub struct LocalAgent {
  agent_id: String,
  name: String,
  engine: IrHardwareEngine,
  learning_active: Mutex<bool>,
}

impl LocalAgent {
  pub fn new(agent_id: impl Into<String>, name: impl Into<String>, engine: IrHardwareEngine) -> Self {
    Self { agent_id: agent_id.into(), name: name.into(), engine, learning_active: Mutex::new(false) }
  }

  fn capabilities() -> Map<String, serde_json::Value> {
    let mut caps = Map::new();
    caps.insert("canLearn".to_owned(), json!(true));
    caps.insert("formatRaw".to_owned(), json!(true));
    caps.insert("maxPayloadBytes".to_owned(), json!(65536));
    caps
  }
}

#[async_trait]
impl Agent for LocalAgent {
  fn agent_id(&self) -> &str {
    &self.agent_id
  }

  fn transport(&self) -> &'static str {
    "local"
  }

  async fn send(&self, frames: &[Vec<i64>], gap_us: Option<i64>, carrier_hz: Option<u32>, duty_cycle: Option<u8>, _hold_ms: Option<u32>) -> Result<(String, String), DomainError> {
    {
      let learning = self.learning_active.lock().expect("lock poisoned");
      if *learning {
        return Err(DomainError::conflict("learning_active", "cannot send while learning is active"));
      }
    }
    let engine = self.engine.clone();
    let owned: Vec<Vec<i64>> = frames.to_vec();
    tokio::task::spawn_blocking(move || {
      let refs: Vec<&[i64]> = owned.iter().map(|v| v.as_slice()).collect();
      engine.send_pulse_space_files(&refs, gap_us, carrier_hz, duty_cycle, None)
    })
    .await
    .map_err(|e| DomainError::engine_failure(format!("send task panicked: {e}")))?
  }

  async fn learn_start(&self) -> Result<(), DomainError> {
    *self.learning_active.lock().expect("lock poisoned") = true;
    Ok(())
  }

  async fn learn_stop(&self) -> Result<(), DomainError> {
    *self.learning_active.lock().expect("lock poisoned") = false;
    Ok(())
  }

  async fn learn_capture(&self, timeout_ms: u64, wideband: bool) -> Result<(Vec<i64>, Option<i64>), DomainError> {
    if timeout_ms == 0 {
      return Err(DomainError::validation("timeout_ms must be > 0"));
    }
    {
      let learning = self.learning_active.lock().expect("lock poisoned");
      if !*learning {
        return Err(DomainError::conflict("not_learning", "learning session is not running"));
      }
    }
    let engine = self.engine.clone();
    let (raw, _stdout, _stderr) = tokio::task::spawn_blocking(move || engine.receive_one_message(timeout_ms, wideband))
      .await
      .map_err(|e| DomainError::engine_failure(format!("capture task panicked: {e}")))??;
    parse_and_normalize(&raw)
  }

  async fn get_status(&self) -> Result<AgentStatus, DomainError> {
    let learning = *self.learning_active.lock().expect("lock poisoned");
    Ok(AgentStatus {
      agent_id: self.agent_id.clone(),
      name: self.name.clone(),
      transport: "local".to_owned(),
      status: "online".to_owned(),
      busy: BusyState { learning, sending: false },
      capabilities: Self::capabilities(),
    })
  }
}
