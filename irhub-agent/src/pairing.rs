//! Pairing state machine (C9), agent side.
//!
//! Grounded on
//! `original_source/backend/connections/pairing_manager_agent.py`, plus
//! the unpair handling spec.md §4.9 adds that the original never
//! implements on the agent side (confirmed absent from
//! `pairing_manager_agent.py`): spec.md's own prose is authoritative for
//! that half. The original's `threading.Timer` auto-stop-listening window
//! becomes a spawned `tokio` task; its "settings store holds pairing
//! fields" becomes [`crate::state::AgentStateStore`] (SPEC_FULL.md §C.3).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rumqttc::{AsyncClient, QoS};
use tracing::warn;
use uuid::Uuid;

use irhub_core::protocol::{PairingAcceptPayload, PairingOfferPayload, UnpairAckPayload};
use irhub_core::version::major_compatible;

use crate::runtime_state::RuntimeStatePublisher;

pub const PAIRING_OPEN_TOPIC: &str = "ir/pairing/open";
const DEFAULT_LISTEN_WINDOW_SECONDS: u64 = 300;

struct ListenState {
  listening: bool,
  generation: u64,
}

pub struct PairingAgent {
  client: AsyncClient,
  state: Arc<RuntimeStatePublisher>,
  agent_uid: String,
  readable_name: String,
  base_topic: String,
  sw_version: String,
  can_send: bool,
  can_learn: bool,
  listen: Mutex<ListenState>,
}

impl PairingAgent {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    client: AsyncClient,
    state: Arc<RuntimeStatePublisher>,
    agent_uid: impl Into<String>,
    readable_name: impl Into<String>,
    base_topic: impl Into<String>,
    sw_version: impl Into<String>,
    can_send: bool,
    can_learn: bool,
  ) -> Arc<Self> {
    Arc::new(Self {
      client,
      state,
      agent_uid: agent_uid.into(),
      readable_name: readable_name.into(),
      base_topic: base_topic.into(),
      sw_version: sw_version.into(),
      can_send,
      can_learn,
      listen: Mutex::new(ListenState { listening: false, generation: 0 }),
    })
  }

  pub fn unpair_topic(&self) -> String {
    format!("ir/pairing/unpair/{}", self.agent_uid)
  }

  fn accept_topic_wildcard(&self) -> String {
    format!("ir/pairing/accept/+/{}", self.agent_uid)
  }

  /// Subscribes to the agent's own unpair topic (always listened to), and
  /// to the open/accept topics if not yet bound.
  pub async fn start(self: &Arc<Self>) {
    if let Err(e) = self.client.subscribe(self.unpair_topic(), QoS::AtLeastOnce).await {
      warn!(error = %e, "failed to subscribe unpair topic");
    }
    match self.state.is_bound() {
      Ok(true) => {}
      Ok(false) => self.start_listening().await,
      Err(e) => warn!(error = %e, "failed to read pairing binding at startup"),
    }
  }

  async fn start_listening(self: &Arc<Self>) {
    if let Err(e) = self.client.subscribe(PAIRING_OPEN_TOPIC, QoS::AtLeastOnce).await {
      warn!(error = %e, "failed to subscribe pairing open topic");
      return;
    }
    if let Err(e) = self.client.subscribe(self.accept_topic_wildcard(), QoS::AtLeastOnce).await {
      warn!(error = %e, "failed to subscribe pairing accept topic");
      return;
    }

    let generation = {
      let mut listen = self.listen.lock().expect("lock poisoned");
      listen.listening = true;
      listen.generation += 1;
      listen.generation
    };

    let this = Arc::clone(self);
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_secs(DEFAULT_LISTEN_WINDOW_SECONDS)).await;
      this.stop_listening_if_still(generation).await;
    });
  }

  async fn stop_listening_if_still(&self, generation: u64) {
    let should_stop = {
      let listen = self.listen.lock().expect("lock poisoned");
      listen.listening && listen.generation == generation
    };
    if should_stop {
      self.stop_listening().await;
    }
  }

  async fn stop_listening(&self) {
    {
      let mut listen = self.listen.lock().expect("lock poisoned");
      listen.listening = false;
    }
    let _ = self.client.unsubscribe(PAIRING_OPEN_TOPIC).await;
    let _ = self.client.unsubscribe(self.accept_topic_wildcard()).await;
  }

  /// Dispatched by the MQTT event-loop task for `ir/pairing/open`.
  pub async fn handle_open(&self, payload: &[u8]) {
    if self.state.is_bound().unwrap_or(true) {
      return;
    }
    let Ok(open) = serde_json::from_slice::<irhub_core::protocol::PairingOpenPayload>(payload) else { return };
    if open.session_id.is_empty() || open.nonce.is_empty() {
      return;
    }
    if Utc::now() >= open.expires_at {
      return;
    }
    if !major_compatible(&open.sw_version, &self.sw_version) {
      return;
    }

    let offer = PairingOfferPayload {
      session_id: open.session_id.clone(),
      nonce: open.nonce,
      agent_uid: self.agent_uid.clone(),
      readable_name: self.readable_name.clone(),
      base_topic: self.base_topic.clone(),
      sw_version: self.sw_version.clone(),
      can_send: self.can_send,
      can_learn: self.can_learn,
      offered_at: Utc::now(),
    };
    let Ok(body) = serde_json::to_vec(&offer) else { return };
    let topic = format!("ir/pairing/offer/{}/{}", offer.session_id, self.agent_uid);
    if let Err(e) = self.client.publish(topic, QoS::AtLeastOnce, false, body).await {
      warn!(error = %e, "failed to publish pairing offer");
    }
  }

  /// Dispatched by the MQTT event-loop task for `ir/pairing/accept/+/{own_uid}`.
  pub async fn handle_accept(&self, topic: &str, payload: &[u8]) {
    if self.state.is_bound().unwrap_or(true) {
      return;
    }
    let Some((session_from_topic, agent_from_topic)) = parse_accept_topic(topic) else { return };
    if agent_from_topic != self.agent_uid {
      return;
    }
    let Ok(accept) = serde_json::from_slice::<PairingAcceptPayload>(payload) else { return };
    if !accept.session_id.is_empty() && accept.session_id != session_from_topic {
      return;
    }
    if accept.nonce.is_empty() {
      return;
    }

    if let Err(e) = self.state.set_binding(&accept.hub_id, &accept.hub_topic, &accept.hub_name, &session_from_topic, &accept.nonce, &accept.accepted_at.to_rfc3339()).await {
      warn!(error = %e, "failed to persist pairing binding");
      return;
    }
    self.stop_listening().await;
  }

  /// Dispatched by the MQTT event-loop task for `ir/pairing/unpair/{own_uid}`.
  ///
  /// Not present in `pairing_manager_agent.py` at all; this side of the
  /// handshake is added per spec.md §4.9 ("Agent side... On unpair
  /// matching its uid: clear the binding, ack... then resume pairing
  /// listeners").
  pub async fn handle_unpair(self: &Arc<Self>, topic: &str, payload: &[u8]) {
    let Some(agent_from_topic) = parse_unpair_topic(topic) else { return };
    if agent_from_topic != self.agent_uid {
      return;
    }
    // An empty payload is the hub clearing its own retained command after
    // our ack; nothing to act on.
    if payload.is_empty() {
      return;
    }
    let Ok(command) = serde_json::from_slice::<irhub_core::protocol::UnpairCommandPayload>(payload) else { return };
    if !command.agent_uid.is_empty() && command.agent_uid != self.agent_uid {
      return;
    }

    if let Err(e) = self.state.clear_binding().await {
      warn!(error = %e, "failed to clear pairing binding");
      return;
    }

    let ack = UnpairAckPayload { agent_uid: self.agent_uid.clone(), command_id: command.command_id, acked_at: Utc::now() };
    if let Ok(body) = serde_json::to_vec(&ack) {
      if let Err(e) = self.client.publish(self.unpair_topic(), QoS::AtLeastOnce, false, body).await {
        warn!(error = %e, "failed to publish unpair ack");
      }
    }

    let _ = self.client.publish(format!("ir/pairing/unpair/{}", self.agent_uid), QoS::AtLeastOnce, true, Vec::new()).await;

    self.start_listening().await;
  }
}

fn parse_accept_topic(topic: &str) -> Option<(String, String)> {
  let parts: Vec<&str> = topic.split('/').collect();
  if parts.len() != 5 || parts[0] != "ir" || parts[1] != "pairing" || parts[2] != "accept" {
    return None;
  }
  Some((parts[3].to_owned(), parts[4].to_owned()))
}

fn parse_unpair_topic(topic: &str) -> Option<String> {
  let parts: Vec<&str> = topic.split('/').collect();
  if parts.len() != 4 || parts[0] != "ir" || parts[1] != "pairing" || parts[2] != "unpair" {
    return None;
  }
  Some(parts[3].to_owned())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_accept_topic() {
    assert_eq!(parse_accept_topic("ir/pairing/accept/sess1/agent1"), Some(("sess1".to_owned(), "agent1".to_owned())));
    assert_eq!(parse_accept_topic("ir/pairing/accept/sess1"), None);
  }

  #[test]
  fn parses_unpair_topic() {
    assert_eq!(parse_unpair_topic("ir/pairing/unpair/agent1"), Some("agent1".to_owned()));
    assert_eq!(parse_unpair_topic("ir/pairing/unpair_ack/agent1"), None);
  }
}
