//! MQTT connection bootstrap and inbound message dispatch, agent side.
//!
//! Mirrors `irhub-hub/src/mqtt.rs`'s own connect/event-loop split; the
//! duplicated `parse_broker_url` helper is intentional rather than shared,
//! the same way the teacher keeps each binary's connection setup
//! self-contained (`cdp_broker`/`cdp_dummy` each build their own client).

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tracing::{debug, warn};

use crate::command::CommandHandler;
use crate::pairing::{PairingAgent, PAIRING_OPEN_TOPIC};

pub fn build_client(mqtt_url: &str, client_id: &str) -> Result<(AsyncClient, rumqttc::EventLoop), anyhow::Error> {
  let (host, port) = parse_broker_url(mqtt_url)?;
  let mut options = MqttOptions::new(client_id, host, port);
  options.set_keep_alive(Duration::from_secs(30));
  Ok(AsyncClient::new(options, 64))
}

/// Spawns the background task that polls `event_loop`, dispatching inbound
/// publishes by topic to `pairing` or `commands`. The agent never
/// subscribes to its own state/log topics since it only ever publishes
/// those; `pairing.start()` and `commands.command_wildcard()`'s
/// subscription are expected to already be in flight (or about to be) by
/// the time this is called.
pub fn spawn_event_loop(mut event_loop: rumqttc::EventLoop, pairing: Arc<PairingAgent>, commands: Arc<CommandHandler>) {
  tokio::spawn(async move {
    loop {
      match event_loop.poll().await {
        Ok(Event::Incoming(Packet::Publish(publish))) => {
          let topic = publish.topic.clone();
          debug!(topic = %topic, "inbound mqtt publish");
          if topic == PAIRING_OPEN_TOPIC {
            let pairing = Arc::clone(&pairing);
            let payload = publish.payload.clone();
            tokio::spawn(async move { pairing.handle_open(&payload).await });
          } else if topic.starts_with("ir/pairing/accept/") {
            let pairing = Arc::clone(&pairing);
            tokio::spawn(async move { pairing.handle_accept(&topic, &publish.payload).await });
          } else if topic.starts_with("ir/pairing/unpair/") {
            let pairing = Arc::clone(&pairing);
            tokio::spawn(async move { pairing.handle_unpair(&topic, &publish.payload).await });
          } else if topic.contains("/cmd/") {
            let commands = Arc::clone(&commands);
            tokio::spawn(async move { commands.handle_command(&topic, &publish.payload).await });
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

/// Parses a broker URL like `tcp://localhost:1883` into a `(host, port)`
/// pair, identically to `irhub-hub`'s own helper.
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
}
