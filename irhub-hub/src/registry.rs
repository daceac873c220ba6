//! Live agent registry (C6): tracks which agents currently have a
//! reachable, in-process [`Agent`] handle (as opposed to the catalog's
//! durable `agents` rows, which also cover offline/unpaired agents).
//!
//! Grounded on `original_source/backend/agents/agent_registry.py`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use irhub_core::error::DomainError;

use crate::agent::mqtt::MqttAgent;
use crate::agent::Agent;
use crate::db::remotes::Remote;
use crate::db::Catalog;
use crate::rpc::CommandClient;

pub struct AgentRegistry {
  catalog: Arc<Catalog>,
  agents: Mutex<HashMap<String, Arc<dyn Agent>>>,
}

impl AgentRegistry {
  pub fn new(catalog: Arc<Catalog>) -> Self {
    Self { catalog, agents: Mutex::new(HashMap::new()) }
  }

  pub async fn register_agent(&self, agent: Arc<dyn Agent>) -> Result<(), DomainError> {
    let status = agent.get_status().await?;
    {
      let mut agents = self.agents.lock().expect("lock poisoned");
      agents.insert(agent.agent_id().to_owned(), agent);
    }
    self.catalog.set_agent_status(&status.agent_id, &status.status, Some(chrono::Utc::now().timestamp() as f64))?;
    Ok(())
  }

  pub fn unregister_agent(&self, agent_id: &str) -> Result<(), DomainError> {
    {
      let mut agents = self.agents.lock().expect("lock poisoned");
      agents.remove(agent_id);
    }
    self.catalog.set_agent_status(agent_id, "offline", Some(chrono::Utc::now().timestamp() as f64))
  }

  fn active_ids(&self) -> Vec<String> {
    self.agents.lock().expect("lock poisoned").keys().cloned().collect()
  }

  /// Resolves the agent that should handle `remote`, auto-assigning when
  /// there is exactly one active agent and the remote has none pinned.
  pub fn resolve_agent_for_remote(&self, remote: &Remote) -> Result<Arc<dyn Agent>, DomainError> {
    if let Some(assigned) = remote.assigned_agent_id.as_deref().filter(|s| !s.trim().is_empty()) {
      return self.get_agent_by_id(assigned);
    }

    let mut active_ids = self.active_ids();
    if active_ids.is_empty() {
      return Err(DomainError::agent_routing("no_agents", "no agents are available"));
    }
    if active_ids.len() == 1 {
      let selected_id = active_ids.remove(0);
      self.catalog.set_assigned_agent(remote.id, Some(&selected_id))?;
      return self.get_agent_by_id(&selected_id);
    }

    Err(DomainError::new(irhub_core::error::ErrorKind::Validation, "agent_required", "remote must be assigned to an agent"))
  }

  /// Looks up a registered agent, touching its `last_seen` timestamp
  /// (SPEC_FULL.md §C.5) on every successful resolution.
  pub fn get_agent_by_id(&self, agent_id: &str) -> Result<Arc<dyn Agent>, DomainError> {
    if agent_id.trim().is_empty() {
      return Err(DomainError::new(irhub_core::error::ErrorKind::Validation, "agent_required", "remote must be assigned to an agent"));
    }
    let agent = {
      let agents = self.agents.lock().expect("lock poisoned");
      agents.get(agent_id).cloned()
    };
    let agent = agent.ok_or_else(|| DomainError::agent_routing("agent_offline", "assigned agent is offline or unavailable"))?;
    self.catalog.touch_agent_last_seen(agent_id, chrono::Utc::now().timestamp() as f64)?;
    Ok(agent)
  }

  pub fn is_active(&self, agent_id: &str) -> bool {
    self.agents.lock().expect("lock poisoned").contains_key(agent_id)
  }

  /// Reacts to a retained `ir/agents/{agent_id}/state` publish: a
  /// non-empty payload means the agent connected (register a
  /// [`MqttAgent`] handle if the catalog already knows it as a
  /// non-pending `mqtt` agent), an empty one means its retained state was
  /// cleared, which the broker also delivers as the will message's
  /// effect when the agent disconnects uncleanly.
  pub fn sync_mqtt_presence(&self, agent_id: &str, online: bool, command_client: &Arc<CommandClient>) {
    if !online {
      let _ = self.unregister_agent(agent_id);
      return;
    }
    if self.is_active(agent_id) {
      return;
    }
    let Ok(Some(record)) = self.catalog.get_agent(agent_id) else { return };
    if record.transport != "mqtt" || record.pending {
      return;
    }
    let name = record.name.clone().unwrap_or_else(|| agent_id.to_owned());
    let agent: Arc<dyn Agent> = Arc::new(MqttAgent::new(agent_id.to_owned(), name, Arc::clone(command_client)));
    {
      let mut agents = self.agents.lock().expect("lock poisoned");
      agents.insert(agent_id.to_owned(), agent);
    }
    let _ = self.catalog.set_agent_status(agent_id, "online", Some(chrono::Utc::now().timestamp() as f64));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::Catalog;
  use async_trait::async_trait;
  use irhub_core::protocol::{AgentStatus, BusyState};

  struct StubAgent(String);

  #[async_trait]
  impl Agent for StubAgent {
    fn agent_id(&self) -> &str {
      &self.0
    }
    fn transport(&self) -> &'static str {
      "local"
    }
    async fn send(&self, _frames: &[Vec<i64>], _gap_us: Option<i64>, _carrier_hz: Option<u32>, _duty_cycle: Option<u8>, _hold_ms: Option<u32>) -> Result<(String, String), DomainError> {
      Ok((String::new(), String::new()))
    }
    async fn learn_start(&self) -> Result<(), DomainError> {
      Ok(())
    }
    async fn learn_stop(&self) -> Result<(), DomainError> {
      Ok(())
    }
    async fn learn_capture(&self, _timeout_ms: u64, _wideband: bool) -> Result<(Vec<i64>, Option<i64>), DomainError> {
      Ok((vec![], None))
    }
    async fn get_status(&self) -> Result<AgentStatus, DomainError> {
      Ok(AgentStatus { agent_id: self.0.clone(), name: self.0.clone(), transport: "local".to_owned(), status: "online".to_owned(), busy: BusyState::default(), capabilities: Default::default() })
    }
  }

  #[tokio::test]
  async fn resolves_sole_active_agent_and_assigns_it() {
    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    catalog.upsert_agent("agent-1", Some("Agent 1"), "local", "online", true, true, None, None, None, None, None).unwrap();
    let remote = catalog.create_remote("Living Room TV", None, None, None).unwrap();

    let registry = AgentRegistry::new(Arc::clone(&catalog));
    registry.register_agent(Arc::new(StubAgent("agent-1".to_owned()))).await.unwrap();

    let resolved = registry.resolve_agent_for_remote(&remote).unwrap();
    assert_eq!(resolved.agent_id(), "agent-1");
    let refreshed = catalog.get_remote(remote.id).unwrap();
    assert_eq!(refreshed.assigned_agent_id.as_deref(), Some("agent-1"));
  }

  #[tokio::test]
  async fn errors_when_no_agents_are_active() {
    let catalog = Arc::new(Catalog::open_in_memory().unwrap());
    let remote = catalog.create_remote("Bedroom AC", None, None, None).unwrap();
    let registry = AgentRegistry::new(catalog);
    let err = registry.resolve_agent_for_remote(&remote).unwrap_err();
    assert_eq!(err.code, "no_agents");
  }
}
