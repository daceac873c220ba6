//! Pairing state machine (C9), hub side.
//!
//! Grounded on
//! `original_source/backend/connections/pairing_manager_hub.py`: a hub
//! opens a time-boxed pairing window on the retained `ir/pairing/open`
//! topic, accepts `ir/pairing/offer/{session}/{agent}` messages matching
//! the active session/nonce, and lets an operator accept one pending
//! agent or unpair an already-paired one. The original's
//! `threading.Timer` auto-close and `threading.Event` unpair-ack wait
//! become a spawned `tokio` task and a `oneshot` channel respectively.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, QoS};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use irhub_core::error::DomainError;
use irhub_core::protocol::{PairingAcceptPayload, PairingOpenPayload, UnpairCommandPayload};
use irhub_core::version::major_compatible;

use crate::db::agents::AgentRecord;
use crate::db::Catalog;

pub const PAIRING_OPEN_TOPIC: &str = "ir/pairing/open";
pub const PAIRING_OFFER_WILDCARD_TOPIC: &str = "ir/pairing/offer/+/+";
pub const PAIRING_UNPAIR_ACK_WILDCARD_TOPIC: &str = "ir/pairing/unpair_ack/+";

pub const DEFAULT_WINDOW_SECONDS: i64 = 300;
const MIN_WINDOW_SECONDS: i64 = 10;
const MAX_WINDOW_SECONDS: i64 = 3600;
const UNPAIR_ACK_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Clone, Debug, Serialize)]
pub struct PairingStatus {
  pub open: bool,
  pub session_id: Option<String>,
  pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct UnpairResult {
  pub ok: bool,
  pub agent_id: String,
  pub unpair_acked: bool,
  pub unassigned_remotes: usize,
}

struct Session {
  session_id: String,
  nonce: String,
  expires_at: DateTime<Utc>,
  close_task: Option<JoinHandle<()>>,
}

struct PendingUnpairAck {
  agent_id: String,
  tx: oneshot::Sender<()>,
}

pub struct PairingHub {
  client: AsyncClient,
  catalog: Arc<Catalog>,
  hub_id: String,
  hub_name: String,
  hub_topic: String,
  sw_version: String,
  session: Mutex<Option<Session>>,
  pending_unpair_acks: Mutex<HashMap<String, PendingUnpairAck>>,
}

impl PairingHub {
  pub fn new(client: AsyncClient, catalog: Arc<Catalog>, hub_id: impl Into<String>, hub_name: impl Into<String>, hub_topic: impl Into<String>, sw_version: impl Into<String>) -> Arc<Self> {
    Arc::new(Self {
      client,
      catalog,
      hub_id: hub_id.into(),
      hub_name: hub_name.into(),
      hub_topic: hub_topic.into(),
      sw_version: sw_version.into(),
      session: Mutex::new(None),
      pending_unpair_acks: Mutex::new(HashMap::new()),
    })
  }

  pub fn status(&self) -> PairingStatus {
    let session = self.session.lock().expect("lock poisoned");
    match session.as_ref() {
      Some(s) => PairingStatus { open: true, session_id: Some(s.session_id.clone()), expires_at: Some(s.expires_at) },
      None => PairingStatus { open: false, session_id: None, expires_at: None },
    }
  }

  /// Opens a pairing window, publishing the retained announcement and
  /// clearing any agents still pending from a previous window.
  pub async fn open_pairing(self: &Arc<Self>, duration_seconds: i64) -> Result<PairingStatus, DomainError> {
    let duration = duration_seconds.clamp(MIN_WINDOW_SECONDS, MAX_WINDOW_SECONDS);
    let session_id = Uuid::new_v4().simple().to_string();
    let nonce = Uuid::new_v4().simple().to_string();
    let expires_at = Utc::now() + chrono::Duration::seconds(duration);

    let payload = PairingOpenPayload { session_id: session_id.clone(), nonce: nonce.clone(), expires_at, sw_version: self.sw_version.clone() };
    let body = serde_json::to_vec(&payload).map_err(|e| DomainError::validation(format!("failed to encode pairing announcement: {e}")))?;
    self
      .client
      .publish(PAIRING_OPEN_TOPIC, QoS::AtLeastOnce, true, body)
      .await
      .map_err(|e| DomainError::agent_routing("mqtt_publish_failed", format!("failed to publish pairing open: {e}")))?;

    let this = Arc::clone(self);
    let close_session_id = session_id.clone();
    let close_task = tokio::spawn(async move {
      tokio::time::sleep(Duration::from_secs(duration as u64)).await;
      this.auto_close(&close_session_id).await;
    });

    {
      let mut session = self.session.lock().expect("lock poisoned");
      if let Some(previous) = session.take() {
        if let Some(task) = previous.close_task {
          task.abort();
        }
      }
      *session = Some(Session { session_id: session_id.clone(), nonce, expires_at, close_task: Some(close_task) });
    }

    self.catalog.delete_pending_agents(None)?;
    Ok(self.status())
  }

  pub async fn close_pairing(&self) -> Result<PairingStatus, DomainError> {
    let previous_session = {
      let mut session = self.session.lock().expect("lock poisoned");
      let previous = session.take();
      if let Some(previous) = &previous {
        if let Some(task) = &previous.close_task {
          task.abort();
        }
      }
      previous.map(|s| s.session_id)
    };

    if let Some(session_id) = previous_session {
      self.catalog.delete_pending_agents(Some(&session_id))?;
    }

    let _ = self.client.publish(PAIRING_OPEN_TOPIC, QoS::AtLeastOnce, true, Vec::new()).await;
    Ok(self.status())
  }

  async fn auto_close(self: &Arc<Self>, session_id: &str) {
    let still_active = {
      let session = self.session.lock().expect("lock poisoned");
      session.as_ref().map(|s| s.session_id.as_str() == session_id).unwrap_or(false)
    };
    if still_active {
      let _ = self.close_pairing().await;
    }
  }

  /// Accepts the offer from a pending agent, publishing the accept
  /// response and clearing its pending flag.
  pub async fn accept_offer(&self, agent_id: &str) -> Result<AgentRecord, DomainError> {
    let agent_id = agent_id.trim();
    if agent_id.is_empty() {
      return Err(DomainError::validation("agent_id must not be empty"));
    }

    let (active_session, active_nonce) = {
      let session = self.session.lock().expect("lock poisoned");
      let session = session.as_ref().ok_or_else(|| DomainError::conflict("pairing_closed", "no pairing window is open"))?;
      if Utc::now() >= session.expires_at {
        return Err(DomainError::conflict("pairing_closed", "the pairing window has expired"));
      }
      (session.session_id.clone(), session.nonce.clone())
    };

    let agent = self.catalog.get_agent(agent_id)?.ok_or_else(|| DomainError::not_found("unknown agent_id"))?;
    if !agent.pending {
      return Err(DomainError::validation("unknown pending agent_id"));
    }
    if agent.pairing_session_id.as_deref() != Some(active_session.as_str()) {
      return Err(DomainError::conflict("offer_session_mismatch", "agent offered under a different pairing session"));
    }

    let payload = PairingAcceptPayload {
      session_id: active_session.clone(),
      nonce: active_nonce,
      hub_id: self.hub_id.clone(),
      hub_topic: self.hub_topic.clone(),
      hub_name: self.hub_name.clone(),
      accepted_at: Utc::now(),
    };
    let body = serde_json::to_vec(&payload).map_err(|e| DomainError::validation(format!("failed to encode pairing accept: {e}")))?;
    let topic = format!("ir/pairing/accept/{active_session}/{agent_id}");
    self
      .client
      .publish(topic, QoS::AtLeastOnce, false, body)
      .await
      .map_err(|e| DomainError::agent_routing("mqtt_publish_failed", format!("failed to publish pairing accept: {e}")))?;

    self.catalog.set_pending_state(agent_id, false, None)?;
    self.catalog.get_agent(agent_id)?.ok_or_else(|| DomainError::not_found("unknown agent_id"))
  }

  /// Unpairs an MQTT agent: asks it to acknowledge, then deletes its
  /// catalog row and unassigns every remote pinned to it.
  pub async fn unpair_and_delete_agent(&self, agent_id: &str) -> Result<UnpairResult, DomainError> {
    let agent_id = agent_id.trim();
    if agent_id.is_empty() {
      return Err(DomainError::validation("agent_id must not be empty"));
    }
    let agent = self.catalog.get_agent(agent_id)?.ok_or_else(|| DomainError::not_found("unknown agent_id"))?;
    if agent.transport != "mqtt" {
      return Err(DomainError::validation("only mqtt agents can be unpaired"));
    }

    let unpair_acked = if agent.pending {
      true
    } else {
      self.send_unpair_command(agent_id).await?
    };
    if !unpair_acked {
      return Err(DomainError::timeout("unpair_ack_timeout", "agent did not acknowledge the unpair command"));
    }

    let unassigned_remotes = self.catalog.unassign_agent_from_remotes(agent_id)?;
    self.catalog.delete_agent(agent_id)?;
    Ok(UnpairResult { ok: true, agent_id: agent_id.to_owned(), unpair_acked, unassigned_remotes })
  }

  async fn send_unpair_command(&self, agent_id: &str) -> Result<bool, DomainError> {
    let command_id = Uuid::new_v4().simple().to_string();
    let (tx, rx) = oneshot::channel();
    {
      let mut pending = self.pending_unpair_acks.lock().expect("lock poisoned");
      pending.insert(command_id.clone(), PendingUnpairAck { agent_id: agent_id.to_owned(), tx });
    }

    let payload = UnpairCommandPayload {
      command_id: command_id.clone(),
      agent_uid: agent_id.to_owned(),
      hub_id: self.hub_id.clone(),
      hub_topic: self.hub_topic.clone(),
      requested_at: Utc::now(),
    };
    let body = serde_json::to_vec(&payload).map_err(|e| DomainError::validation(format!("failed to encode unpair command: {e}")))?;
    let topic = format!("ir/pairing/unpair/{agent_id}");
    if self.client.publish(topic, QoS::AtLeastOnce, true, body).await.is_err() {
      self.pending_unpair_acks.lock().expect("lock poisoned").remove(&command_id);
      return Err(DomainError::agent_routing("mqtt_publish_failed", "failed to publish unpair command"));
    }

    let acked = tokio::time::timeout(UNPAIR_ACK_TIMEOUT, rx).await.is_ok_and(|r| r.is_ok());
    self.pending_unpair_acks.lock().expect("lock poisoned").remove(&command_id);
    Ok(acked)
  }

  /// Dispatched by the MQTT event-loop task for `ir/pairing/offer/+/+`.
  pub fn handle_offer(&self, topic: &str, payload: &[u8]) {
    let Some((session_from_topic, agent_from_topic)) = parse_offer_topic(topic) else { return };

    let (active_session, active_nonce, expires_at) = {
      let session = self.session.lock().expect("lock poisoned");
      let Some(session) = session.as_ref() else { return };
      (session.session_id.clone(), session.nonce.clone(), session.expires_at)
    };
    if Utc::now() >= expires_at || session_from_topic != active_session {
      return;
    }

    let Ok(offer) = serde_json::from_slice::<irhub_core::protocol::PairingOfferPayload>(payload) else { return };
    if offer.nonce != active_nonce {
      return;
    }
    if !offer.session_id.is_empty() && offer.session_id != active_session {
      return;
    }
    if offer.agent_uid != agent_from_topic {
      return;
    }
    if !major_compatible(&offer.sw_version, &self.sw_version) {
      return;
    }

    let _ = self.catalog.upsert_agent(
      &offer.agent_uid,
      Some(&offer.readable_name),
      "mqtt",
      "online",
      offer.can_send,
      offer.can_learn,
      Some(&offer.sw_version),
      Some(&offer.base_topic),
      None,
      None,
      Some(Utc::now().timestamp() as f64),
    );
    let _ = self.catalog.set_pending_state(&offer.agent_uid, true, Some(&active_session));
  }

  /// Dispatched by the MQTT event-loop task for `ir/pairing/unpair_ack/+`.
  pub fn handle_unpair_ack(&self, topic: &str, payload: &[u8]) {
    let Some(agent_from_topic) = parse_unpair_ack_topic(topic) else { return };
    let Ok(ack) = serde_json::from_slice::<irhub_core::protocol::UnpairAckPayload>(payload) else { return };
    let mut pending = self.pending_unpair_acks.lock().expect("lock poisoned");
    if let Some(state) = pending.remove(&ack.command_id) {
      if state.agent_id == agent_from_topic {
        let _ = state.tx.send(());
      } else {
        pending.insert(ack.command_id, state);
      }
    }
  }
}

fn parse_offer_topic(topic: &str) -> Option<(String, String)> {
  let parts: Vec<&str> = topic.split('/').collect();
  if parts.len() != 5 || parts[0] != "ir" || parts[1] != "pairing" || parts[2] != "offer" {
    return None;
  }
  Some((parts[3].to_owned(), parts[4].to_owned()))
}

fn parse_unpair_ack_topic(topic: &str) -> Option<String> {
  let parts: Vec<&str> = topic.split('/').collect();
  if parts.len() != 4 || parts[0] != "ir" || parts[1] != "pairing" || parts[2] != "unpair_ack" {
    return None;
  }
  Some(parts[3].to_owned())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_offer_topic() {
    assert_eq!(parse_offer_topic("ir/pairing/offer/sess1/agent1"), Some(("sess1".to_owned(), "agent1".to_owned())));
    assert_eq!(parse_offer_topic("ir/pairing/offer/sess1"), None);
  }

  #[test]
  fn parses_unpair_ack_topic() {
    assert_eq!(parse_unpair_ack_topic("ir/pairing/unpair_ack/agent1"), Some("agent1".to_owned()));
    assert_eq!(parse_unpair_ack_topic("ir/pairing/unpair/agent1"), None);
  }
}
