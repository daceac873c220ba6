//! A remote agent process reachable only over MQTT, speaking the C8
//! command/response RPC through a shared [`CommandClient`].
//!
//! Grounded on `original_source/backend/agents/mqtt_agent.py`: every
//! method is a thin delegation to the transport, with no local state of
//! its own beyond what identifies the agent. Unlike [`super::local::LocalAgent`],
//! a remote agent keeps no catalog, so `send`/`learn_capture` exchange
//! raw pulse frames rather than button references over the wire.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use irhub_core::error::DomainError;
use irhub_core::protocol::AgentStatus;

use crate::agent::Agent;
use crate::rpc::{self, CommandClient};

pub struct MqttAgent {
  agent_id: String,
  name: String,
  command_client: Arc<CommandClient>,
}

impl MqttAgent {
  pub fn new(agent_id: impl Into<String>, name: impl Into<String>, command_client: Arc<CommandClient>) -> Self {
    Self { agent_id: agent_id.into(), name: name.into(), command_client }
  }
}

#[async_trait]
impl Agent for MqttAgent {
  fn agent_id(&self) -> &str {
    &self.agent_id
  }

  fn transport(&self) -> &'static str {
    "mqtt"
  }

  async fn send(&self, frames: &[Vec<i64>], gap_us: Option<i64>, carrier_hz: Option<u32>, duty_cycle: Option<u8>, hold_ms: Option<u32>) -> Result<(String, String), DomainError> {
    let payload = json!({
      "frames": frames,
      "gap_us": gap_us,
      "carrier_hz": carrier_hz,
      "duty_cycle": duty_cycle,
    });
    let result = self.command_client.send(&self.agent_id, payload, rpc::send_timeout(hold_ms)).await?;
    let stdout = result.get("stdout").and_then(|v| v.as_str()).unwrap_or_default().to_owned();
    let stderr = result.get("stderr").and_then(|v| v.as_str()).unwrap_or_default().to_owned();
    Ok((stdout, stderr))
  }

  async fn learn_start(&self) -> Result<(), DomainError> {
    self.command_client.learn_start(&self.agent_id, json!({})).await?;
    Ok(())
  }

  async fn learn_stop(&self) -> Result<(), DomainError> {
    self.command_client.learn_stop(&self.agent_id, json!({})).await?;
    Ok(())
  }

  async fn learn_capture(&self, timeout_ms: u64, wideband: bool) -> Result<(Vec<i64>, Option<i64>), DomainError> {
    let payload = json!({ "timeout_ms": timeout_ms, "wideband": wideband });
    let result = self.command_client.learn_capture(&self.agent_id, payload, rpc::learn_capture_timeout(timeout_ms)).await?;
    let Value::Array(items) = result.get("frame").cloned().unwrap_or(Value::Null) else {
      return Err(DomainError::signal_shape("agent did not return a pulse frame"));
    };
    let pulses = items
      .into_iter()
      .map(|v| v.as_i64().ok_or_else(|| DomainError::signal_shape("frame contained a non-integer pulse value")))
      .collect::<Result<Vec<i64>, DomainError>>()?;
    let tail_gap_us = result.get("tail_gap_us").and_then(|v| v.as_i64());
    Ok((pulses, tail_gap_us))
  }

  async fn get_status(&self) -> Result<AgentStatus, DomainError> {
    // The MQTT transport has no synchronous status RPC; status for remote
    // agents is driven by their retained `ir/agents/{id}/state` messages
    // and the catalog row updated from pairing, not queried live here.
    Ok(AgentStatus {
      agent_id: self.agent_id.clone(),
      name: self.name.clone(),
      transport: "mqtt".to_owned(),
      status: "unknown".to_owned(),
      busy: Default::default(),
      capabilities: Map::new(),
    })
  }
}
