//! Wire message shapes shared by the hub and the agent.
//!
//! Per the "define tagged variants/structs... with explicit serde" redesign
//! flag, every MQTT/HTTP payload this workspace exchanges is a concrete
//! `struct`/`enum` with `#[derive(Serialize, Deserialize)]` rather than a
//! loosely-typed JSON blob, mirroring the teacher's own wire types
//! (`BrokerMessage`, `HeartbeatMessage` in `libcdp::comm::broker_api`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DomainError;

// ---------------------------------------------------------------------
// MQTT command RPC (C8)
// ---------------------------------------------------------------------

/// Carried on `ir/agents/{agent_id}/cmd/{command}`.
///
/// Grounded on `agent_command_client_hub.py::_request` (the envelope the
/// hub builds) and `agent_command_handler.py::_on_command` (the envelope
/// the agent parses).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandRequest {
  pub request_id: String,
  pub hub_id: String,
  pub requested_at: DateTime<Utc>,
  #[serde(flatten)]
  pub payload: Value,
}

/// Carried on `ir/hubs/{hub_id}/agents/{agent_id}/resp/{request_id}`.
///
/// Grounded on `agent_command_client_hub.py::_on_response` /
/// `agent_command_handler.py`'s response publication.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandResponse {
  pub request_id: String,
  pub ok: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub result: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<CommandErrorPayload>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommandErrorPayload {
  pub code: String,
  pub message: String,
  pub status_code: u16,
}

impl From<&DomainError> for CommandErrorPayload {
  fn from(err: &DomainError) -> Self {
    Self { code: err.code.clone(), message: err.message.clone(), status_code: err.status_code() }
  }
}

/// Payload for the `send` command: transmit a button's stored signal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SendCommandPayload {
  pub button_id: i64,
  pub mode: SendMode,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hold_ms: Option<u32>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendMode {
  Press,
  Hold,
}

/// Payload for the `learn_start` command.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LearnStartPayload {
  pub remote_id: i64,
  #[serde(default)]
  pub extend: bool,
}

/// Payload for the `learn_capture` command.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LearnCapturePayload {
  pub mode: SendMode,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub button_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub takes: Option<u32>,
  pub timeout_ms: u64,
  #[serde(default)]
  pub overwrite: bool,
}

/// Payload for the `runtime/debug/set` command.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetDebugPayload {
  pub debug: Value,
}

/// Accepts the loose boolean/int/float/string forms the original
/// `_parse_debug_flag` allows.
pub fn parse_debug_flag(value: &Value) -> Result<bool, DomainError> {
  match value {
    Value::Bool(b) => Ok(*b),
    Value::Number(n) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
    Value::String(s) => {
      let normalized = s.trim().to_ascii_lowercase();
      match normalized.as_str() {
        "1" | "true" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "no" | "n" | "off" => Ok(false),
        other => Err(DomainError::validation(format!("cannot parse debug flag: {other:?}"))),
      }
    }
    other => Err(DomainError::validation(format!("cannot parse debug flag: {other:?}"))),
  }
}

// ---------------------------------------------------------------------
// Pairing (C9)
// ---------------------------------------------------------------------

/// Carried retained on `ir/pairing/open`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PairingOpenPayload {
  pub session_id: String,
  pub nonce: String,
  pub expires_at: DateTime<Utc>,
  pub sw_version: String,
}

/// Carried on `ir/pairing/offer/{session_id}/{agent_id}` (not retained).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PairingOfferPayload {
  pub session_id: String,
  pub nonce: String,
  pub agent_uid: String,
  pub readable_name: String,
  pub base_topic: String,
  pub sw_version: String,
  pub can_send: bool,
  pub can_learn: bool,
  pub offered_at: DateTime<Utc>,
}

/// Carried on `ir/pairing/accept/{session_id}/{agent_id}` (not retained).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PairingAcceptPayload {
  pub session_id: String,
  pub nonce: String,
  pub hub_id: String,
  pub hub_topic: String,
  pub hub_name: String,
  pub accepted_at: DateTime<Utc>,
}

/// Carried retained on `ir/pairing/unpair/{agent_id}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnpairCommandPayload {
  pub command_id: String,
  pub agent_uid: String,
  pub hub_id: String,
  pub hub_topic: String,
  pub requested_at: DateTime<Utc>,
}

/// Carried on `ir/pairing/unpair_ack/{agent_id}` (not retained).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnpairAckPayload {
  pub agent_uid: String,
  pub command_id: String,
  pub acked_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------
// Agent runtime state (C10)
// ---------------------------------------------------------------------

/// Carried retained on `ir/agents/{agent_id}/state`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RuntimeState {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pairing_hub_id: Option<String>,
  #[serde(default)]
  pub debug: bool,
}

// ---------------------------------------------------------------------
// Agent status/capabilities (C7, supplemented per SPEC_FULL.md §C.1)
// ---------------------------------------------------------------------

#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BusyState {
  pub learning: bool,
  pub sending: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentStatus {
  pub agent_id: String,
  pub name: String,
  pub transport: String,
  pub status: String,
  pub busy: BusyState,
  #[serde(default)]
  pub capabilities: Map<String, Value>,
}
