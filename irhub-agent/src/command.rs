//! Command dispatch (C8), agent side: subscribes on
//! `ir/agents/{agent_id}/cmd/#`, executes `send`/`learn_start`/
//! `learn_capture`/`learn_stop`/`runtime_debug_get`/`runtime_debug_set`,
//! and publishes a `CommandResponse` back to the requesting hub.
//!
//! Grounded on
//! `original_source/backend/connections/agent_command_handler.py`. Unlike
//! the original's `send`, which hands the payload straight to a
//! catalog-aware `LocalAgent`, this handler only ever sees raw pulse
//! frames: `irhub-hub`'s own `IrSenderService` (see `irhub-hub/src/sender.rs`)
//! already resolves button references into frames before a command ever
//! reaches the wire, for local and MQTT agents alike, so there is no
//! button catalog to keep in sync on the agent side at all.

use std::sync::{Arc, Mutex};

use rumqttc::{AsyncClient, QoS};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use irhub_core::error::{DomainError, ErrorKind};
use irhub_core::protocol::{parse_debug_flag, CommandErrorPayload, CommandRequest, CommandResponse};
use irhub_core::signal::engine::IrHardwareEngine;

use crate::log_reporter::LogReporter;
use crate::runtime_state::RuntimeStatePublisher;

#[derive(Deserialize)]
struct SendPayload {
  frames: Vec<Vec<i64>>,
  #[serde(default)]
  gap_us: Option<i64>,
  #[serde(default)]
  carrier_hz: Option<u32>,
  #[serde(default)]
  duty_cycle: Option<u8>,
}

#[derive(Deserialize)]
struct LearnCapturePayload {
  timeout_ms: u64,
  #[serde(default)]
  wideband: bool,
}

pub struct CommandHandler {
  client: AsyncClient,
  engine: IrHardwareEngine,
  state: Arc<RuntimeStatePublisher>,
  logs: Arc<LogReporter>,
  agent_uid: String,
  learning_active: Mutex<bool>,
}

impl CommandHandler {
  pub fn new(client: AsyncClient, engine: IrHardwareEngine, state: Arc<RuntimeStatePublisher>, logs: Arc<LogReporter>, agent_uid: impl Into<String>) -> Arc<Self> {
    Arc::new(Self { client, engine, state, logs, agent_uid: agent_uid.into(), learning_active: Mutex::new(false) })
  }

  pub fn command_wildcard(&self) -> String {
    format!("ir/agents/{}/cmd/#", self.agent_uid)
  }

  /// Dispatched by the MQTT event-loop task for anything under
  /// `ir/agents/{own_uid}/cmd/#`.
  pub async fn handle_command(&self, topic: &str, payload: &[u8]) {
    let Some((agent_from_topic, command)) = parse_command_topic(topic) else { return };
    if agent_from_topic != self.agent_uid {
      return;
    }

    let Ok(request) = serde_json::from_slice::<CommandRequest>(payload) else {
      self.logs.warn("command", "received a command with an unparseable envelope", None, Some("bad_envelope"), Map::new()).await;
      return;
    };
    if request.request_id.is_empty() || request.hub_id.is_empty() {
      self.logs.warn("command", "received a command with an empty request_id/hub_id", None, Some("bad_envelope"), Map::new()).await;
      return;
    }

    let bound_hub = self.state.binding_data().ok().map(|b| b.pairing_hub_id);
    if bound_hub.as_deref() != Some(request.hub_id.as_str()) {
      self.logs.warn("command", "dropped a command from a hub we are not paired with", Some(&request.request_id), Some("unbound_hub"), Map::new()).await;
      return;
    }

    self.logs.debug("command", &format!("executing {command}"), Map::new()).await;
    let outcome = self.execute_command(&command, request.payload.clone()).await;
    let response = match outcome {
      Ok(result) => CommandResponse { request_id: request.request_id.clone(), ok: true, result: Some(result), error: None },
      Err(err) => {
        self.logs.warn("command", &format!("{command} failed: {}", err.message), Some(&request.request_id), Some(&err.code), Map::new()).await;
        CommandResponse { request_id: request.request_id.clone(), ok: false, result: None, error: Some(agent_error_payload(&err)) }
      }
    };

    let topic = format!("ir/hubs/{}/agents/{}/resp/{}", request.hub_id, self.agent_uid, request.request_id);
    let Ok(body) = serde_json::to_vec(&response) else { return };
    if let Err(e) = self.client.publish(topic, QoS::AtLeastOnce, false, body).await {
      self.logs.warn("command", "failed to publish command response", Some(&request.request_id), None, Map::new()).await;
      let _ = e;
    }
  }

  async fn execute_command(&self, command: &str, payload: Value) -> Result<Value, DomainError> {
    match command {
      "send" => self.handle_send(payload).await,
      "learn_start" => {
        *self.learning_active.lock().expect("lock poisoned") = true;
        Ok(json!({ "ok": true }))
      }
      "learn_stop" => {
        *self.learning_active.lock().expect("lock poisoned") = false;
        Ok(json!({ "ok": true }))
      }
      "learn_capture" => self.handle_learn_capture(payload).await,
      "runtime_debug_get" => Ok(json!({ "debug": self.state.debug_enabled()? })),
      "runtime_debug_set" => self.handle_runtime_debug_set(payload).await,
      other => Err(DomainError::validation(format!("unknown command '{other}'"))),
    }
  }

  async fn handle_send(&self, payload: Value) -> Result<Value, DomainError> {
    let send: SendPayload = serde_json::from_value(payload).map_err(|e| DomainError::validation(format!("invalid send payload: {e}")))?;
    {
      let learning = self.learning_active.lock().expect("lock poisoned");
      if *learning {
        return Err(DomainError::conflict("learning_active", "cannot send while learning is active"));
      }
    }
    let engine = self.engine.clone();
    let frames = send.frames;
    let (stdout, stderr) = tokio::task::spawn_blocking(move || {
      let refs: Vec<&[i64]> = frames.iter().map(|v| v.as_slice()).collect();
      engine.send_pulse_space_files(&refs, send.gap_us, send.carrier_hz, send.duty_cycle, None)
    })
    .await
    .map_err(|e| DomainError::engine_failure(format!("send task panicked: {e}")))??;
    Ok(json!({ "stdout": stdout, "stderr": stderr }))
  }

  async fn handle_learn_capture(&self, payload: Value) -> Result<Value, DomainError> {
    let capture: LearnCapturePayload = serde_json::from_value(payload).map_err(|e| DomainError::validation(format!("invalid learn_capture payload: {e}")))?;
    if capture.timeout_ms == 0 {
      return Err(DomainError::validation("timeout_ms must be > 0"));
    }
    {
      let learning = self.learning_active.lock().expect("lock poisoned");
      if !*learning {
        return Err(DomainError::conflict("not_learning", "learning session is not running"));
      }
    }
    let engine = self.engine.clone();
    let (raw, stdout, stderr) = tokio::task::spawn_blocking(move || engine.receive_one_message(capture.timeout_ms, capture.wideband))
      .await
      .map_err(|e| DomainError::engine_failure(format!("capture task panicked: {e}")))??;
    if !stdout.trim().is_empty() {
      self.logs.debug("command", &format!("ir-ctl stdout: {}", stdout.trim()), Map::new()).await;
    }
    if !stderr.trim().is_empty() {
      self.logs.debug("command", &format!("ir-ctl stderr: {}", stderr.trim()), Map::new()).await;
    }
    let (frame, tail_gap_us) = irhub_core::signal::codec::parse_and_normalize(&raw)?;
    Ok(json!({ "frame": frame, "tail_gap_us": tail_gap_us }))
  }

  async fn handle_runtime_debug_set(&self, payload: Value) -> Result<Value, DomainError> {
    let debug_value = payload.get("debug").cloned().ok_or_else(|| DomainError::validation("runtime_debug_set requires a 'debug' field"))?;
    let enabled = parse_debug_flag(&debug_value)?;
    let enabled = self.state.set_debug(enabled).await?;
    Ok(json!({ "debug": enabled }))
  }
}

/// Maps an internal [`ErrorKind`] to the HTTP-flavored status the original
/// `agent_command_handler.py` attaches to a failed response, by exception
/// class (`TimeoutError`, `ValueError`, `RuntimeError`, else). This is
/// deliberately separate from [`DomainError::status_code`]: that one
/// answers "what HTTP status would the hub's own REST API return", this
/// one answers "what did the original agent put in a command error", and
/// the two diverge (e.g. a timeout is 504 on the hub's API but 408 here).
fn agent_error_payload(err: &DomainError) -> CommandErrorPayload {
  let status_code = match err.kind {
    ErrorKind::Timeout => 408,
    ErrorKind::Validation => 400,
    ErrorKind::Conflict | ErrorKind::EngineFailure => 409,
    _ => 500,
  };
  CommandErrorPayload { code: err.code.clone(), message: err.message.clone(), status_code }
}

/// Parses `ir/agents/{agent_id}/cmd/{command...}`, joining any trailing
/// segments with `/` (the shape spec.md's prose and
/// `agent_command_handler.py::_parse_command_topic` both use, e.g.
/// `runtime/debug/set`) and then normalizing by replacing `/` with `_` so
/// it matches the single underscored segment `irhub-hub/src/rpc.rs`
/// actually publishes (`runtime_debug_set`). Accepting either convention
/// keeps the agent compatible with both without the hub needing to change.
fn parse_command_topic(topic: &str) -> Option<(String, String)> {
  let parts: Vec<&str> = topic.split('/').collect();
  if parts.len() < 5 || parts[0] != "ir" || parts[1] != "agents" || parts[3] != "cmd" {
    return None;
  }
  let command = parts[4..].join("/").replace('/', "_");
  if command.is_empty() {
    return None;
  }
  Some((parts[2].to_owned(), command))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_underscored_single_segment_command() {
    assert_eq!(parse_command_topic("ir/agents/agent-1/cmd/send"), Some(("agent-1".to_owned(), "send".to_owned())));
  }

  #[test]
  fn parses_and_normalizes_slash_separated_command() {
    assert_eq!(parse_command_topic("ir/agents/agent-1/cmd/runtime/debug/set"), Some(("agent-1".to_owned(), "runtime_debug_set".to_owned())));
  }

  #[test]
  fn rejects_topic_missing_command() {
    assert_eq!(parse_command_topic("ir/agents/agent-1/cmd"), None);
  }
}
