//! Hub entry point: loads configuration, connects to the catalog and the
//! MQTT broker, optionally builds a co-located local agent, and serves
//! the HTTP/WebSocket API until shut down.
//!
//! Grounded on `cdp_api/src/main.rs`'s load-config/build-state/run-server
//! shape, extended with the MQTT bootstrap and multi-service wiring
//! `cdp_api` never needed.

mod agent;
mod api;
mod broadcaster;
mod config;
mod db;
mod learning;
mod logs;
mod mqtt;
mod pairing;
mod registry;
mod rpc;
mod sender;

use std::sync::Arc;

use clap::Parser;

use irhub_core::cipher::SettingsCipher;
use irhub_core::signal::engine::IrHardwareEngine;

use crate::agent::local::LocalAgent;
use crate::api::AppState;
use crate::broadcaster::StatusBroadcaster;
use crate::db::Catalog;
use crate::learning::{LearningService, LearningTuning};
use crate::logs::LogHub;
use crate::pairing::PairingHub;
use crate::registry::AgentRegistry;
use crate::rpc::CommandClient;
use crate::sender::IrSenderService;

#[derive(Parser, Debug)]
#[command(name = "irhub-hub", about = "IR remote-control hub: catalog, agent routing, pairing, and learning")]
struct Cli {
  /// Path to a config file (without extension), overriding the default
  /// `irhub_hub.{toml,yaml,...}` search.
  #[arg(long, env = "IRHUB_CONFIG")]
  config: Option<String>,

  /// Master key used to encrypt settings secrets. Left unset, the
  /// encrypted-settings endpoints fail with `settings_master_key_missing`.
  #[arg(long, env = "IRHUB_SETTINGS_MASTER_KEY")]
  settings_master_key: Option<String>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

  let cli = Cli::parse();
  let cfg = config::load_defaults(cli.config.as_deref())?;
  tracing::info!(hub_id = %cfg.hub_id, "configuration loaded");

  let catalog = Arc::new(Catalog::open(&cfg.db_path)?);
  let registry = Arc::new(AgentRegistry::new(Arc::clone(&catalog)));
  let broadcaster = Arc::new(StatusBroadcaster::new());
  let local_agent_id = cfg.local_agent_device.as_ref().map(|_| cfg.hub_id.clone());
  let log_hub = Arc::new(LogHub::new(Arc::clone(&catalog), local_agent_id));

  let cipher = cli.settings_master_key.as_deref().and_then(SettingsCipher::new).map(Arc::new);
  let runtime_settings = catalog.get_runtime_settings(cipher.as_deref())?;

  let client_id = format!("{}-{}", cfg.mqtt_client_id, uuid::Uuid::new_v4().simple());
  let credentials = runtime_settings.mqtt_password.as_deref().map(|password| (runtime_settings.mqtt_username.as_deref().unwrap_or_default(), password));
  let (mqtt_client, event_loop) = mqtt::build_client(&cfg.mqtt_url, &client_id, credentials)?;

  let command_client = Arc::new(CommandClient::new(mqtt_client.clone(), cfg.hub_id.clone()));
  let pairing = PairingHub::new(mqtt_client.clone(), Arc::clone(&catalog), cfg.hub_id.clone(), cfg.hub_id.clone(), format!("ir/hubs/{}", cfg.hub_id), cfg.sw_version.clone());
  mqtt::spawn_event_loop(mqtt_client, event_loop, Arc::clone(&pairing), Arc::clone(&log_hub), Arc::clone(&command_client), Arc::clone(&registry));

  if let Some(device) = cfg.local_agent_device.as_deref() {
    let engine = IrHardwareEngine::new(device);
    let local_agent = Arc::new(LocalAgent::new(cfg.hub_id.clone(), cfg.hub_id.clone(), engine));
    registry.register_agent(local_agent).await?;
    tracing::info!(device, "local agent registered");
  }

  let tuning = LearningTuning { aggregate_round_to_us: cfg.aggregate_round_to_us, aggregate_min_match_ratio: cfg.aggregate_min_match_ratio, hold_idle_timeout_ms: cfg.hold_idle_timeout_ms };
  let learning = Arc::new(LearningService::new(Arc::clone(&catalog), Arc::clone(&registry), Arc::clone(&broadcaster), tuning));
  let sender = Arc::new(IrSenderService::new(Arc::clone(&catalog), Arc::clone(&registry)));

  let state = AppState { catalog, registry, pairing, logs: log_hub, broadcaster, learning, sender, cipher };

  let result = api::run_server(state, &cfg.binds).await;
  command_client.shutdown();
  result.map_err(anyhow::Error::from)
}
