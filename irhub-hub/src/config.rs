//! Hub configuration.
//!
//! Grounded on `cdp_api/src/config.rs`: a `*ConfigFile` that derives
//! `Serialize`/`Deserialize` and carries defaults, loaded through the
//! `config` crate, then `TryFrom`-converted into the type the rest of the
//! binary uses.

use std::convert::TryFrom;

use config::ConfigError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// On-disk / environment representation of the hub's configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfigFile {
  /// List of address:port items the HTTP/WebSocket API binds to.
  pub binds: Vec<String>,
  /// URL of the external MQTT broker, e.g. `tcp://localhost:1883`.
  pub mqtt_url: String,
  /// MQTT client id this hub connects with.
  pub mqtt_client_id: String,
  /// Path to the SQLite catalog database file.
  pub db_path: String,
  /// This hub's own identifier, used as `hub_id` on the wire.
  pub hub_id: String,
  /// Software version string, used for pairing compatibility checks.
  pub sw_version: String,
  /// Whether to also construct a co-located `LocalAgent` wrapping a
  /// locally-attached IR device (see SPEC_FULL.md §D, `hub_is_agent`).
  pub local_agent_device: Option<String>,
  /// Default number of capture takes for a press learn, when the caller
  /// omits `takes` (see SPEC_FULL.md §D).
  pub press_takes_default: u32,
  pub aggregate_round_to_us: i64,
  pub aggregate_min_match_ratio: f64,
  pub hold_idle_timeout_ms: u64,
}

impl Default for HubConfigFile {
  fn default() -> Self {
    Self {
      binds: vec!["0.0.0.0:8980".to_owned(), "[::]:8980".to_owned()],
      mqtt_url: "tcp://localhost:1883".to_owned(),
      mqtt_client_id: "irhub-hub".to_owned(),
      db_path: "irhub.db".to_owned(),
      hub_id: "hub-default".to_owned(),
      sw_version: "1.0.0".to_owned(),
      local_agent_device: None,
      press_takes_default: 3,
      aggregate_round_to_us: 10,
      aggregate_min_match_ratio: 0.6,
      hold_idle_timeout_ms: 1500,
    }
  }
}

/// The parsed, ready-to-use hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
  pub binds: Vec<String>,
  pub mqtt_url: String,
  pub mqtt_client_id: String,
  pub db_path: String,
  pub hub_id: String,
  pub sw_version: String,
  pub local_agent_device: Option<String>,
  pub press_takes_default: u32,
  pub aggregate_round_to_us: i64,
  pub aggregate_min_match_ratio: f64,
  pub hold_idle_timeout_ms: u64,
}

#[derive(Debug, Error)]
pub enum HubConfigParseError {
  #[error("config error: {0}")]
  ConfigError(#[from] ConfigError),
}

impl TryFrom<HubConfigFile> for HubConfig {
  type Error = HubConfigParseError;

  fn try_from(pre: HubConfigFile) -> Result<Self, Self::Error> {
    Ok(Self {
      binds: pre.binds,
      mqtt_url: pre.mqtt_url,
      mqtt_client_id: pre.mqtt_client_id,
      db_path: pre.db_path,
      hub_id: pre.hub_id,
      sw_version: pre.sw_version,
      local_agent_device: pre.local_agent_device,
      press_takes_default: pre.press_takes_default,
      aggregate_round_to_us: pre.aggregate_round_to_us,
      aggregate_min_match_ratio: pre.aggregate_min_match_ratio,
      hold_idle_timeout_ms: pre.hold_idle_timeout_ms,
    })
  }
}

impl Default for HubConfig {
  fn default() -> Self {
    Self::try_from(HubConfigFile::default()).expect("default config failed to parse")
  }
}

/// Loads `irhub_hub.{toml,yaml,json,...}` (if present) merged over the
/// built-in defaults, then applies a config file path override.
pub fn load_defaults(config_path: Option<&str>) -> Result<HubConfig, HubConfigParseError> {
  let mut builder = config::Config::builder().add_source(config::Config::try_from(&HubConfigFile::default())?);
  if let Some(path) = config_path {
    builder = builder.add_source(config::File::with_name(path));
  } else {
    builder = builder.add_source(config::File::with_name("irhub_hub").required(false));
  }
  let cfg = builder.build()?;
  let file: HubConfigFile = cfg.try_deserialize()?;
  HubConfig::try_from(file)
}
