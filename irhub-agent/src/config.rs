//! Agent configuration.
//!
//! Grounded on `irhub-hub/src/config.rs`'s own pattern (itself grounded on
//! `cdp_api/src/config.rs`): a `*ConfigFile` that derives
//! `Serialize`/`Deserialize` and carries defaults, loaded through the
//! `config` crate, then `TryFrom`-converted into the type the rest of the
//! binary uses.

use std::convert::TryFrom;

use config::ConfigError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// On-disk / environment representation of the agent's configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfigFile {
  /// URL of the external MQTT broker, e.g. `tcp://localhost:1883`.
  pub mqtt_url: String,
  /// Path to the small agent-local state store (C10 binding + debug flag,
  /// plus the persisted `agent_id`).
  pub state_db_path: String,
  /// Path to the IR transceiver device passed through to `ir-ctl`.
  pub device: String,
  /// Name offered during pairing (`readable_name`).
  pub readable_name: String,
  /// Software version string, used for pairing compatibility checks.
  pub sw_version: String,
  pub can_send: bool,
  pub can_learn: bool,
  /// Clears any persisted pairing binding at startup before listening,
  /// mirroring `agent_main.py`'s `env.agent_pairing_reset`.
  pub reset_binding: bool,
}

impl Default for AgentConfigFile {
  fn default() -> Self {
    Self {
      mqtt_url: "tcp://localhost:1883".to_owned(),
      state_db_path: "irhub-agent.db".to_owned(),
      device: "/dev/lirc0".to_owned(),
      readable_name: "IR Agent".to_owned(),
      sw_version: "1.0.0".to_owned(),
      can_send: true,
      can_learn: true,
      reset_binding: false,
    }
  }
}

/// The parsed, ready-to-use agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
  pub mqtt_url: String,
  pub state_db_path: String,
  pub device: String,
  pub readable_name: String,
  pub sw_version: String,
  pub can_send: bool,
  pub can_learn: bool,
  pub reset_binding: bool,
}

#[derive(Debug, Error)]
pub enum AgentConfigParseError {
  #[error("config error: {0}")]
  ConfigError(#[from] ConfigError),
}

impl TryFrom<AgentConfigFile> for AgentConfig {
  type Error = AgentConfigParseError;

  fn try_from(pre: AgentConfigFile) -> Result<Self, Self::Error> {
    Ok(Self {
      mqtt_url: pre.mqtt_url,
      state_db_path: pre.state_db_path,
      device: pre.device,
      readable_name: pre.readable_name,
      sw_version: pre.sw_version,
      can_send: pre.can_send,
      can_learn: pre.can_learn,
      reset_binding: pre.reset_binding,
    })
  }
}

impl Default for AgentConfig {
  fn default() -> Self {
    Self::try_from(AgentConfigFile::default()).expect("default config failed to parse")
  }
}

/// Loads `irhub_agent.{toml,yaml,json,...}` (if present) merged over the
/// built-in defaults, then applies a config file path override.
pub fn load_defaults(config_path: Option<&str>) -> Result<AgentConfig, AgentConfigParseError> {
  let mut builder = config::Config::builder().add_source(config::Config::try_from(&AgentConfigFile::default())?);
  if let Some(path) = config_path {
    builder = builder.add_source(config::File::with_name(path));
  } else {
    builder = builder.add_source(config::File::with_name("irhub_agent").required(false));
  }
  let cfg = builder.build()?;
  let file: AgentConfigFile = cfg.try_deserialize()?;
  AgentConfig::try_from(file)
}
