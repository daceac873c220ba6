//! Log fan-out (C11), hub side: ingests log events from the co-located
//! local agent and from MQTT agents' `ir/agents/{id}/logs` topic, keeps a
//! bounded per-agent history, and streams new events to WebSocket
//! subscribers.
//!
//! Grounded on `original_source/backend/connections/agent_log_hub.py`.
//! The original's manual `Set[WebSocket]` plus
//! `asyncio.run_coroutine_threadsafe` fan-out becomes a
//! `tokio::sync::broadcast` channel per agent — the idiomatic Rust
//! analogue of "post into the async runtime from anywhere", per the
//! "async-from-sync fan-out" redesign flag.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::broadcast;

use irhub_core::log::{LogEvent, LogLevel};

use crate::db::Catalog;

pub const LOG_TOPIC_WILDCARD: &str = "ir/agents/+/logs";
const MAX_LOGS_PER_AGENT: usize = 100;

struct AgentLogs {
  history: VecDeque<LogEvent>,
  sender: broadcast::Sender<LogEvent>,
}

impl Default for AgentLogs {
  fn default() -> Self {
    let (sender, _) = broadcast::channel(MAX_LOGS_PER_AGENT);
    Self { history: VecDeque::with_capacity(MAX_LOGS_PER_AGENT), sender }
  }
}

pub struct LogHub {
  catalog: std::sync::Arc<Catalog>,
  local_agent_id: Option<String>,
  agents: Mutex<HashMap<String, AgentLogs>>,
}

impl LogHub {
  pub fn new(catalog: std::sync::Arc<Catalog>, local_agent_id: Option<String>) -> Self {
    Self { catalog, local_agent_id, agents: Mutex::new(HashMap::new()) }
  }

  pub fn can_stream_agent(&self, agent_id: &str) -> bool {
    let agent_id = agent_id.trim();
    if agent_id.is_empty() {
      return false;
    }
    match self.catalog.get_agent(agent_id) {
      Ok(Some(agent)) => !agent.pending && matches!(agent.transport.as_str(), "local" | "mqtt"),
      _ => false,
    }
  }

  /// Subscribes to live events for `agent_id`, creating its channel if
  /// this is the first subscriber.
  pub fn subscribe(&self, agent_id: &str) -> broadcast::Receiver<LogEvent> {
    let mut agents = self.agents.lock().expect("lock poisoned");
    agents.entry(agent_id.to_owned()).or_default().sender.subscribe()
  }

  pub fn snapshot(&self, agent_id: &str, limit: usize) -> Vec<LogEvent> {
    let bounded_limit = limit.clamp(1, MAX_LOGS_PER_AGENT);
    let agents = self.agents.lock().expect("lock poisoned");
    let Some(entry) = agents.get(agent_id) else { return Vec::new() };
    entry.history.iter().rev().take(bounded_limit).rev().cloned().collect()
  }

  pub fn clear_agent_logs(&self, agent_id: &str) {
    self.agents.lock().expect("lock poisoned").remove(agent_id);
  }

  /// Called directly by the co-located [`crate::agent::local::LocalAgent`]
  /// whenever it logs something of its own.
  pub fn record_local(&self, agent_id: &str, event: LogEvent) {
    if self.local_agent_id.as_deref() != Some(agent_id) {
      return;
    }
    if !self.is_tracked_local_agent(agent_id) {
      return;
    }
    self.append(agent_id, event);
  }

  /// Dispatched by the MQTT event-loop task for [`LOG_TOPIC_WILDCARD`].
  pub fn handle_agent_log(&self, topic: &str, payload: &[u8]) {
    let Some(agent_id) = parse_agent_id(topic) else { return };
    if !self.is_tracked_mqtt_agent(&agent_id) {
      return;
    }
    let Ok(raw) = serde_json::from_slice::<Value>(payload) else { return };
    let Some(event) = normalize_event(&raw) else { return };
    self.append(&agent_id, event);
  }

  fn is_tracked_local_agent(&self, agent_id: &str) -> bool {
    if self.local_agent_id.as_deref() != Some(agent_id) {
      return false;
    }
    matches!(self.catalog.get_agent(agent_id), Ok(Some(agent)) if !agent.pending && agent.transport == "local")
  }

  fn is_tracked_mqtt_agent(&self, agent_id: &str) -> bool {
    matches!(self.catalog.get_agent(agent_id), Ok(Some(agent)) if !agent.pending && agent.transport == "mqtt")
  }

  fn append(&self, agent_id: &str, event: LogEvent) {
    let mut agents = self.agents.lock().expect("lock poisoned");
    let entry = agents.entry(agent_id.to_owned()).or_default();
    if entry.history.len() >= MAX_LOGS_PER_AGENT {
      entry.history.pop_front();
    }
    entry.history.push_back(event.clone());
    let _ = entry.sender.send(event);
  }
}

fn parse_agent_id(topic: &str) -> Option<String> {
  let parts: Vec<&str> = topic.split('/').collect();
  if parts.len() != 4 || parts[0] != "ir" || parts[1] != "agents" || parts[3] != "logs" {
    return None;
  }
  Some(parts[2].to_owned())
}

/// Re-validates an externally-supplied payload into a [`LogEvent`],
/// dropping it if it has no usable `message`.
fn normalize_event(payload: &Value) -> Option<LogEvent> {
  let message = payload.get("message").and_then(Value::as_str).unwrap_or("").trim();
  if message.is_empty() {
    return None;
  }
  let level = match payload.get("level").and_then(Value::as_str).unwrap_or("").trim().to_ascii_lowercase().as_str() {
    "debug" => LogLevel::Debug,
    "warn" | "warning" => LogLevel::Warn,
    "error" => LogLevel::Error,
    _ => LogLevel::Info,
  };
  let category = payload.get("category").and_then(Value::as_str).unwrap_or("runtime");
  let request_id = payload.get("request_id").and_then(Value::as_str);
  let error_code = payload.get("error_code").and_then(Value::as_str);
  let meta = payload.get("meta").and_then(Value::as_object).cloned().unwrap_or_default();
  Some(LogEvent::new(level, category, message, request_id, error_code, meta))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn parses_agent_id_from_topic() {
    assert_eq!(parse_agent_id("ir/agents/agent-1/logs"), Some("agent-1".to_owned()));
    assert_eq!(parse_agent_id("ir/agents/agent-1/state"), None);
  }

  #[test]
  fn drops_events_with_no_message() {
    assert!(normalize_event(&json!({"level": "info"})).is_none());
  }

  #[test]
  fn normalizes_warning_alias_to_warn() {
    let event = normalize_event(&json!({"message": "hi", "level": "warning"})).unwrap();
    assert_eq!(event.level, LogLevel::Warn);
  }

  #[tokio::test]
  async fn snapshot_respects_insertion_order_and_cap() {
    let catalog = std::sync::Arc::new(Catalog::open_in_memory().unwrap());
    catalog.upsert_agent("agent-1", Some("Agent 1"), "local", "online", true, true, None, None, None, None, None).unwrap();
    let hub = LogHub::new(catalog, Some("agent-1".to_owned()));
    for i in 0..5 {
      hub.record_local("agent-1", LogEvent::new(LogLevel::Info, "runtime", &format!("event {i}"), None, None, Default::default()));
    }
    let snapshot = hub.snapshot("agent-1", 3);
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot[2].message, "event 4");
  }
}
