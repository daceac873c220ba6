//! MQTT connection bootstrap and inbound message dispatch.
//!
//! The hub is a single `rumqttc` client subscribed to every topic it
//! needs to react to; incoming messages are routed by topic to whichever
//! service owns that concern. Grounded on the wiring in
//! `original_source/backend/connections/runtime_loader.py` (one shared
//! connection object handed to every manager that subscribes on it) and
//! on the teacher's own connect/event-loop split in `cdp_broker/src/broker.rs`.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tracing::{debug, warn};

use crate::logs::LogHub;
use crate::pairing::{PairingHub, PAIRING_OFFER_WILDCARD_TOPIC, PAIRING_UNPAIR_ACK_WILDCARD_TOPIC};
use crate::registry::AgentRegistry;
use crate::rpc::CommandClient;

/// Retained per-agent presence topic: a non-empty payload means the agent
/// at `{agent_id}` is online, an empty one (including the broker clearing
/// a will-triggered retained message) means it went offline.
const AGENT_STATE_WILDCARD: &str = "ir/agents/+/state";

/// Builds the shared `AsyncClient`/`EventLoop` pair for `mqtt_url`. The
/// client half is `Clone` and meant to be handed to every service that
/// needs to publish (`CommandClient`, `PairingHub`) *before*
/// [`spawn_event_loop`] takes ownership of the event-loop half, since
/// those services, not this module, own the logic `spawn_event_loop`
/// ends up dispatching into.
///
/// `credentials` is the decrypted `(mqtt_username, mqtt_password)` pair
/// resolved from `Catalog::get_runtime_settings`; a username with no
/// password (or vice versa) still sets credentials, matching
/// `rumqttc::MqttOptions::set_credentials` accepting either half empty.
pub fn build_client(mqtt_url: &str, client_id: &str, credentials: Option<(&str, &str)>) -> Result<(AsyncClient, rumqttc::EventLoop), anyhow::Error> {
  let (host, port) = parse_broker_url(mqtt_url)?;
  let mut options = MqttOptions::new(client_id, host, port);
  options.set_keep_alive(Duration::from_secs(30));
  if let Some((username, password)) = credentials {
    options.set_credentials(username, password);
  }
  Ok(AsyncClient::new(options, 64))
}

/// Subscribes to every topic the hub needs and spawns the background task
/// that polls `event_loop`, dispatching inbound publishes by topic to
/// `pairing`, `logs`, or `command_client`. Runs for the life of the
/// process.
pub fn spawn_event_loop(client: AsyncClient, mut event_loop: rumqttc::EventLoop, pairing: Arc<PairingHub>, logs: Arc<LogHub>, command_client: Arc<CommandClient>, registry: Arc<AgentRegistry>) {
  let response_wildcard = command_client.response_wildcard();
  tokio::spawn(async move {
    for topic in [PAIRING_OFFER_WILDCARD_TOPIC, PAIRING_UNPAIR_ACK_WILDCARD_TOPIC, crate::logs::LOG_TOPIC_WILDCARD, AGENT_STATE_WILDCARD, response_wildcard.as_str()] {
      if let Err(e) = client.subscribe(topic, QoS::AtLeastOnce).await {
        warn!(topic, error = %e, "failed to subscribe");
      }
    }
  });

  tokio::spawn(async move {
    loop {
      match event_loop.poll().await {
        Ok(Event::Incoming(Packet::Publish(publish))) => {
          let topic = publish.topic.as_str();
          debug!(topic, "inbound mqtt publish");
          if topic.starts_with("ir/pairing/offer/") {
            pairing.handle_offer(topic, &publish.payload);
          } else if topic.starts_with("ir/pairing/unpair_ack/") {
            pairing.handle_unpair_ack(topic, &publish.payload);
          } else if topic.ends_with("/logs") {
            logs.handle_agent_log(topic, &publish.payload);
          } else if topic.ends_with("/state") {
            if let Some(agent_id) = parse_state_topic(topic) {
              registry.sync_mqtt_presence(&agent_id, !publish.payload.is_empty(), &command_client);
            }
          } else if topic.contains("/resp/") {
            command_client.handle_response(topic, &publish.payload);
          }
        }
        Ok(_) => {}
        Err(e) => {
          warn!(error = %e, "mqtt event loop error, reconnecting");
          tokio::time::sleep(Duration::from_secs(2)).await;
        }
      }
    }
  });
}

fn parse_state_topic(topic: &str) -> Option<String> {
  let parts: Vec<&str> = topic.split('/').collect();
  if parts.len() != 4 || parts[0] != "ir" || parts[1] != "agents" || parts[3] != "state" {
    return None;
  }
  Some(parts[2].to_owned())
}

/// Parses a broker URL like `tcp://localhost:1883` or `mqtt://broker:1884`
/// into a `(host, port)` pair. `rumqttc::MqttOptions` takes host/port
/// directly rather than a URL, so the scheme is only used to validate the
/// input and is otherwise discarded (the hub always speaks plain MQTT over
/// TCP, never TLS or websockets).
fn parse_broker_url(mqtt_url: &str) -> Result<(String, u16), anyhow::Error> {
  let without_scheme = mqtt_url.split_once("://").map(|(_, rest)| rest).unwrap_or(mqtt_url);
  let (host, port) = match without_scheme.rsplit_once(':') {
    Some((host, port)) => (host, port.parse::<u16>().map_err(|_| anyhow::anyhow!("invalid mqtt port in '{mqtt_url}'"))?),
    None => (without_scheme, 1883),
  };
  if host.is_empty() {
    return Err(anyhow::anyhow!("invalid mqtt url '{mqtt_url}': missing host"));
  }
  Ok((host.to_owned(), port))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_tcp_url_with_port() {
    assert_eq!(parse_broker_url("tcp://localhost:1883").unwrap(), ("localhost".to_owned(), 1883));
  }

  #[test]
  fn defaults_port_when_absent() {
    assert_eq!(parse_broker_url("tcp://broker.local").unwrap(), ("broker.local".to_owned(), 1883));
  }

  #[test]
  fn rejects_empty_host() {
    assert!(parse_broker_url("tcp://:1883").is_err());
  }

  #[test]
  fn parses_state_topic() {
    assert_eq!(parse_state_topic("ir/agents/agent-1/state"), Some("agent-1".to_owned()));
    assert_eq!(parse_state_topic("ir/agents/agent-1/logs"), None);
  }
}
