//! Agent entry point: loads configuration, opens the local state store,
//! connects to the MQTT broker, and runs the pairing/command handlers
//! until signalled to shut down.
//!
//! Grounded on `original_source/backend/agent_main.py`'s
//! init/start/wait/stop shape, adapted from a `threading.Event` wait loop
//! to `tokio::signal`.

mod command;
mod config;
mod log_reporter;
mod mqtt;
mod pairing;
mod runtime_state;
mod state;

use std::sync::Arc;

use clap::Parser;
use irhub_core::signal::engine::IrHardwareEngine;

use crate::command::CommandHandler;
use crate::log_reporter::LogReporter;
use crate::pairing::PairingAgent;
use crate::runtime_state::RuntimeStatePublisher;
use crate::state::AgentStateStore;

#[derive(Parser, Debug)]
#[command(name = "irhub-agent", about = "IR remote-control agent: pairs with a hub and executes its commands over MQTT")]
struct Cli {
  /// Path to a config file (without extension), overriding the default
  /// `irhub_agent.{toml,yaml,...}` search.
  #[arg(long, env = "IRHUB_AGENT_CONFIG")]
  config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

  let cli = Cli::parse();
  let cfg = config::load_defaults(cli.config.as_deref())?;

  let store = Arc::new(AgentStateStore::open(&cfg.state_db_path)?);
  if cfg.reset_binding {
    store.clear_binding()?;
    tracing::info!("pairing binding reset at startup");
  }
  let agent_id = store.get_or_create_agent_id()?;
  tracing::info!(agent_id = %agent_id, "configuration loaded");

  let client_id = format!("irhub-agent-{agent_id}");
  let (mqtt_client, event_loop) = mqtt::build_client(&cfg.mqtt_url, &client_id)?;

  let runtime_state = Arc::new(RuntimeStatePublisher::new(mqtt_client.clone(), Arc::clone(&store), agent_id.clone()));
  runtime_state.publish().await?;

  let logs = LogReporter::new(mqtt_client.clone(), Arc::clone(&runtime_state), agent_id.clone());
  let engine = IrHardwareEngine::new(&cfg.device);
  let commands = CommandHandler::new(mqtt_client.clone(), engine, Arc::clone(&runtime_state), Arc::clone(&logs), agent_id.clone());
  mqtt_client.subscribe(commands.command_wildcard(), rumqttc::QoS::AtLeastOnce).await?;

  let pairing = PairingAgent::new(mqtt_client.clone(), Arc::clone(&runtime_state), agent_id.clone(), cfg.readable_name.clone(), format!("ir/agents/{agent_id}"), cfg.sw_version.clone(), cfg.can_send, cfg.can_learn);
  pairing.start().await;

  mqtt::spawn_event_loop(event_loop, Arc::clone(&pairing), Arc::clone(&commands));

  logs.info("startup", "agent online", None, serde_json::Map::new()).await;

  let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
  tokio::select! {
    _ = tokio::signal::ctrl_c() => {}
    _ = sigterm.recv() => {}
  }
  tracing::info!("shutdown signal received");
  Ok(())
}
