//! MQTT command RPC client (C8, hub side).
//!
//! Grounded on
//! `original_source/backend/connections/agent_command_client_hub.py`:
//! each call builds a `request_id`, registers a waiter keyed by it,
//! publishes to `ir/agents/{agent_id}/cmd/{command}`, and waits (with a
//! per-command default timeout) for a response on
//! `ir/hubs/{hub_id}/agents/{agent_id}/resp/{request_id}`. The
//! `threading.Event`/dict-based waiter table becomes a
//! `HashMap<String, oneshot::Sender<CommandResponse>>` behind a `Mutex`,
//! the idiomatic async-Rust analogue.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use rumqttc::{AsyncClient, QoS};
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use irhub_core::error::DomainError;
use irhub_core::protocol::{CommandErrorPayload, CommandRequest, CommandResponse};

pub const COMMAND_TOPIC_PREFIX: &str = "ir/agents";
pub const RESPONSE_TOPIC_PREFIX: &str = "ir/hubs";

const LEARN_START_TIMEOUT: Duration = Duration::from_secs(8);
const LEARN_STOP_TIMEOUT: Duration = Duration::from_secs(8);

/// `max(12s, hold_ms/1000 + 5s)` (spec.md §4.7). `hold_ms` is `None` for a
/// press send, which just uses the 12s floor.
pub fn send_timeout(hold_ms: Option<u32>) -> Duration {
  let from_hold = hold_ms.map(|ms| ms as u64 / 1000 + 5).unwrap_or(0);
  Duration::from_secs(from_hold.max(12))
}

/// `max(5s, timeout_ms/1000 + 5s)` (spec.md §4.7).
pub fn learn_capture_timeout(timeout_ms: u64) -> Duration {
  Duration::from_secs((timeout_ms / 1000 + 5).max(5))
}

struct PendingWaiter {
  agent_id: String,
  tx: oneshot::Sender<CommandResponse>,
}

/// Issues MQTT command/response RPCs against remote agents.
pub struct CommandClient {
  client: AsyncClient,
  hub_id: String,
  pending: Mutex<HashMap<String, PendingWaiter>>,
}

impl CommandClient {
  pub fn new(client: AsyncClient, hub_id: impl Into<String>) -> Self {
    Self { client, hub_id: hub_id.into(), pending: Mutex::new(HashMap::new()) }
  }

  pub fn response_wildcard(&self) -> String {
    format!("{RESPONSE_TOPIC_PREFIX}/{}/agents/+/resp/+", self.hub_id)
  }

  /// Dispatched by the MQTT event-loop task for every message received on
  /// [`Self::response_wildcard`].
  pub fn handle_response(&self, topic: &str, payload: &[u8]) {
    let Some((_hub_id, agent_id, request_id)) = parse_response_topic(topic) else { return };
    let Ok(response) = serde_json::from_slice::<CommandResponse>(payload) else { return };
    if response.request_id != request_id {
      return;
    }
    let mut pending = self.pending.lock().expect("lock poisoned");
    if let Some(waiter) = pending.remove(&request_id) {
      if waiter.agent_id == agent_id {
        let _ = waiter.tx.send(response);
      } else {
        pending.insert(request_id, waiter);
      }
    }
  }

  /// Completes every outstanding waiter with a synthetic timeout error,
  /// so nothing blocks forever across a shutdown (per spec.md §9's
  /// "complete all pending RPC waiters with a shutdown sentinel").
  pub fn shutdown(&self) {
    let mut pending = self.pending.lock().expect("lock poisoned");
    for (request_id, waiter) in pending.drain() {
      let _ = waiter.tx.send(CommandResponse {
        request_id,
        ok: false,
        result: None,
        error: Some(CommandErrorPayload { code: "shutting_down".to_owned(), message: "hub is shutting down".to_owned(), status_code: 503 }),
      });
    }
  }

  pub async fn send(&self, agent_id: &str, payload: Value, timeout: Duration) -> Result<Value, DomainError> {
    self.request(agent_id, "send", payload, timeout).await
  }

  pub async fn learn_start(&self, agent_id: &str, payload: Value) -> Result<Value, DomainError> {
    self.request(agent_id, "learn_start", payload, LEARN_START_TIMEOUT).await
  }

  pub async fn learn_capture(&self, agent_id: &str, payload: Value, timeout: Duration) -> Result<Value, DomainError> {
    self.request(agent_id, "learn_capture", payload, timeout).await
  }

  pub async fn learn_stop(&self, agent_id: &str, payload: Value) -> Result<Value, DomainError> {
    self.request(agent_id, "learn_stop", payload, LEARN_STOP_TIMEOUT).await
  }

  async fn request(&self, agent_id: &str, command: &str, payload: Value, timeout: Duration) -> Result<Value, DomainError> {
    let request_id = Uuid::new_v4().simple().to_string();
    let envelope = CommandRequest { request_id: request_id.clone(), hub_id: self.hub_id.clone(), requested_at: chrono::Utc::now(), payload };

    let (tx, rx) = oneshot::channel();
    {
      let mut pending = self.pending.lock().expect("lock poisoned");
      pending.insert(request_id.clone(), PendingWaiter { agent_id: agent_id.to_owned(), tx });
    }

    let topic = format!("{COMMAND_TOPIC_PREFIX}/{agent_id}/cmd/{command}");
    let body = serde_json::to_vec(&envelope).map_err(|e| DomainError::validation(format!("failed to encode command: {e}")))?;
    if self.client.publish(topic, QoS::AtLeastOnce, false, body).await.is_err() {
      self.pending.lock().expect("lock poisoned").remove(&request_id);
      return Err(DomainError::agent_routing("publish_failed", "failed to publish command to agent"));
    }

    let response = match tokio::time::timeout(timeout, rx).await {
      Ok(Ok(response)) => response,
      _ => {
        self.pending.lock().expect("lock poisoned").remove(&request_id);
        return Err(DomainError::timeout("agent_timeout", "agent did not respond in time"));
      }
    };

    if response.ok {
      Ok(response.result.unwrap_or(Value::Null))
    } else {
      let error = response.error.unwrap_or(CommandErrorPayload { code: "unknown_error".to_owned(), message: "agent reported failure with no detail".to_owned(), status_code: 500 });
      Err(DomainError::agent_routing(error.code, error.message))
    }
  }
}

/// Parses `ir/hubs/{hub_id}/agents/{agent_id}/resp/{request_id}`.
fn parse_response_topic(topic: &str) -> Option<(String, String, String)> {
  let parts: Vec<&str> = topic.split('/').collect();
  if parts.len() != 7 || parts[0] != "ir" || parts[1] != "hubs" || parts[3] != "agents" || parts[5] != "resp" {
    return None;
  }
  Some((parts[2].to_owned(), parts[4].to_owned(), parts[6].to_owned()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_response_topic() {
    let parsed = parse_response_topic("ir/hubs/hub-1/agents/agent-7/resp/abc123").unwrap();
    assert_eq!(parsed, ("hub-1".to_owned(), "agent-7".to_owned(), "abc123".to_owned()));
  }

  #[test]
  fn rejects_malformed_topic() {
    assert!(parse_response_topic("ir/hubs/hub-1/agents/agent-7/resp").is_none());
    assert!(parse_response_topic("ir/agents/agent-7/cmd/send").is_none());
  }
}
