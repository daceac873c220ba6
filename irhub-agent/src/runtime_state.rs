//! Agent runtime state store (C10): wraps [`AgentStateStore`] with the
//! "mutate then publish a retained snapshot" behavior spec.md §4.10
//! requires, plus the debug-change observer the log reporter hooks into
//! to raise/lower its minimum dispatch level.
//!
//! Grounded on
//! `original_source/backend/connections/agent_runtime_state_store.py`.
//! Unlike the original, startup does not wait up to 1 s for the broker to
//! echo back our own retained message: since the authoritative copy is
//! the local SQLite row (SPEC_FULL.md §C.3), not the broker's retained
//! message, we publish our current state directly instead of bootstrapping
//! from a self-subscribe round trip that only mattered for the original's
//! settings-store-less agent.

use std::sync::{Arc, Mutex};

use rumqttc::{AsyncClient, QoS};
use tracing::warn;

use irhub_core::error::DomainError;
use irhub_core::protocol::RuntimeState;

use crate::state::{AgentStateStore, BindingData};

type DebugChangeHandler = Box<dyn Fn(bool) + Send + Sync>;

pub struct RuntimeStatePublisher {
  client: AsyncClient,
  state: Arc<AgentStateStore>,
  agent_id: String,
  debug_change_handler: Mutex<Option<DebugChangeHandler>>,
}

impl RuntimeStatePublisher {
  pub fn new(client: AsyncClient, state: Arc<AgentStateStore>, agent_id: impl Into<String>) -> Self {
    Self { client, state, agent_id: agent_id.into(), debug_change_handler: Mutex::new(None) }
  }

  pub fn set_debug_change_handler(&self, handler: impl Fn(bool) + Send + Sync + 'static) {
    *self.debug_change_handler.lock().expect("lock poisoned") = Some(Box::new(handler));
  }

  fn state_topic(&self) -> String {
    format!("ir/agents/{}/state", self.agent_id)
  }

  pub fn is_bound(&self) -> Result<bool, DomainError> {
    self.state.is_bound()
  }

  pub fn binding_data(&self) -> Result<BindingData, DomainError> {
    self.state.binding_data()
  }

  pub fn debug_enabled(&self) -> Result<bool, DomainError> {
    self.state.debug_enabled()
  }

  /// Publishes the current `{pairing_hub_id, debug}` snapshot, retained.
  /// Call once at startup so the agent's presence/state is visible even
  /// before any mutation happens.
  pub async fn publish(&self) -> Result<(), DomainError> {
    let state: RuntimeState = self.state.runtime_state()?;
    let body = serde_json::to_vec(&state).map_err(|e| DomainError::validation(format!("failed to encode runtime state: {e}")))?;
    self
      .client
      .publish(self.state_topic(), QoS::AtLeastOnce, true, body)
      .await
      .map_err(|e| DomainError::agent_routing("mqtt_publish_failed", format!("failed to publish runtime state: {e}")))
  }

  #[allow(clippy::too_many_arguments)]
  pub async fn set_binding(&self, hub_id: &str, hub_topic: &str, hub_name: &str, session_id: &str, nonce: &str, accepted_at: &str) -> Result<(), DomainError> {
    self.state.set_binding(hub_id, hub_topic, hub_name, session_id, nonce, accepted_at)?;
    self.publish().await
  }

  pub async fn clear_binding(&self) -> Result<(), DomainError> {
    self.state.clear_binding()?;
    self.publish().await
  }

  pub async fn set_debug(&self, enabled: bool) -> Result<bool, DomainError> {
    let previous = self.state.debug_enabled()?;
    self.state.set_debug(enabled)?;
    self.publish().await?;
    if previous != enabled {
      let handler = self.debug_change_handler.lock().expect("lock poisoned");
      if let Some(handler) = handler.as_ref() {
        handler(enabled);
      } else {
        warn!(enabled, "debug flag flipped with no change handler registered");
      }
    }
    self.state.debug_enabled()
  }
}
