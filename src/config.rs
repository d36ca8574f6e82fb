//! Configuration for the skid service.
//!
//! Loaded from a TOML file; every field has a default so an empty file is a
//! valid (local SQLite, local broker, no remote) configuration. Endpoints and
//! secrets can be supplied through the environment instead of the file:
//!
//! | Variable        | Field          |
//! |-----------------|----------------|
//! | `FO_STORE_URL`  | `store.url`    |
//! | `FO_MQTT_HOST`  | `bus.host`     |
//! | `SUPABASE_URL`  | `remote.url`   |
//! | `SUPABASE_KEY`  | `remote.api_key` |
//!
//! # Example
//!
//! ```
//! use fo_skid::SkidConfig;
//!
//! let config = SkidConfig::from_toml_str(r#"
//!     [bus]
//!     host = "broker.local"
//!
//!     [control]
//!     feed_on_level = 18.0
//! "#).unwrap();
//!
//! assert_eq!(config.bus.host, "broker.local");
//! assert_eq!(config.bus.port, 1883);
//! assert_eq!(config.control.feed_on_level, 18.0);
//! assert_eq!(config.pipeline.persist_interval_secs, 30);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SkidConfig {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// How long shutdown waits for in-flight ticks before aborting them.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

/// MQTT broker connection.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_bus_host")]
    pub host: String,
    #[serde(default = "default_bus_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Bound on publish, subscribe and disconnect requests.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Capacity of the client request queue and the inbound event channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Retained `online`/`offline` topic; the broker publishes `offline` as last will.
    #[serde(default = "default_status_topic")]
    pub status_topic: String,
}

/// Local SQL store.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// `sqlite://`, `postgres://` or `mysql://` URL.
    #[serde(default = "default_store_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

/// Remote backend and connectivity probe.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Project base URL; rows are posted to `{url}/rest/v1/{table}`.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_remote_table")]
    pub table: String,
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
    #[serde(default = "default_probe_url")]
    pub probe_url: String,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

/// Ingestion, derivation, persistence and sync.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_persist_interval_secs")]
    pub persist_interval_secs: u64,
    /// History window for derived metrics.
    #[serde(default = "default_lookback_secs")]
    pub lookback_secs: u64,
    /// FS0, the feed-side reference volume used by `com_vol_fs`.
    #[serde(default = "default_initial_flow_setpoint")]
    pub initial_flow_setpoint: f64,
}

/// Actuator control loop.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_settings_refresh_secs")]
    pub settings_refresh_secs: u64,
    #[serde(default = "default_republish_secs")]
    pub republish_secs: u64,
    /// Feed pump turns on at or below this level.
    #[serde(default = "default_feed_on_level")]
    pub feed_on_level: f64,
    /// Feed pump turns off at or above this level.
    #[serde(default = "default_feed_off_level")]
    pub feed_off_level: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_true() -> bool { true }
fn default_shutdown_grace_secs() -> u64 { 10 }
fn default_bus_host() -> String { "localhost".to_string() }
fn default_bus_port() -> u16 { 1883 }
fn default_client_id() -> String { "fo-skid".to_string() }
fn default_keep_alive_secs() -> u64 { 30 }
fn default_request_timeout_secs() -> u64 { 5 }
fn default_channel_capacity() -> usize { 256 }
fn default_status_topic() -> String { "status/fo-skid".to_string() }
fn default_store_url() -> String { "sqlite://fo_skid.db?mode=rwc".to_string() }
fn default_max_connections() -> u32 { 5 }
fn default_acquire_timeout_secs() -> u64 { 10 }
fn default_remote_table() -> String { "fo_sensor_data".to_string() }
fn default_upload_timeout_secs() -> u64 { 30 }
fn default_probe_url() -> String { "http://www.google.com".to_string() }
fn default_probe_timeout_secs() -> u64 { 5 }
fn default_persist_interval_secs() -> u64 { 30 }
fn default_lookback_secs() -> u64 { 30 }
fn default_initial_flow_setpoint() -> f64 { 20.0 }
fn default_settings_refresh_secs() -> u64 { 10 }
fn default_republish_secs() -> u64 { 120 }
fn default_feed_on_level() -> f64 { 20.0 }
fn default_feed_off_level() -> f64 { 25.0 }
fn default_log_level() -> String { "info".to_string() }

impl Default for SkidConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            store: StoreConfig::default(),
            remote: RemoteConfig::default(),
            pipeline: PipelineConfig::default(),
            control: ControlConfig::default(),
            logging: LoggingConfig::default(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host: default_bus_host(),
            port: default_bus_port(),
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            channel_capacity: default_channel_capacity(),
            status_topic: default_status_topic(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            api_key: String::new(),
            table: default_remote_table(),
            upload_timeout_secs: default_upload_timeout_secs(),
            probe_url: default_probe_url(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            persist_interval_secs: default_persist_interval_secs(),
            lookback_secs: default_lookback_secs(),
            initial_flow_setpoint: default_initial_flow_setpoint(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            settings_refresh_secs: default_settings_refresh_secs(),
            republish_secs: default_republish_secs(),
            feed_on_level: default_feed_on_level(),
            feed_off_level: default_feed_off_level(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl BusConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn persist_interval(&self) -> Duration {
        Duration::from_secs(self.persist_interval_secs)
    }

    #[must_use]
    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_secs)
    }
}

impl ControlConfig {
    #[must_use]
    pub fn settings_refresh(&self) -> Duration {
        Duration::from_secs(self.settings_refresh_secs)
    }

    #[must_use]
    pub fn republish(&self) -> Duration {
        Duration::from_secs(self.republish_secs)
    }
}

impl SkidConfig {
    /// Read, apply environment overrides, validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    /// Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("FO_STORE_URL") {
            self.store.url = url;
        }
        if let Some(host) = get("FO_MQTT_HOST") {
            self.bus.host = host;
        }
        if let Some(url) = get("SUPABASE_URL") {
            self.remote.url = url;
        }
        if let Some(key) = get("SUPABASE_KEY") {
            self.remote.api_key = key;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if !self.pipeline.enabled && !self.control.enabled {
            return invalid("at least one of pipeline.enabled and control.enabled must be set");
        }
        if self.bus.host.trim().is_empty() {
            return invalid("bus.host is empty");
        }
        if self.bus.request_timeout_secs == 0 || self.bus.channel_capacity == 0 {
            return invalid("bus.request_timeout_secs and bus.channel_capacity must be positive");
        }
        if self.store.url.trim().is_empty() {
            return invalid("store.url is empty");
        }
        if self.store.max_connections == 0 {
            return invalid("store.max_connections must be positive");
        }
        if self.pipeline.enabled {
            if self.pipeline.persist_interval_secs == 0 || self.pipeline.lookback_secs == 0 {
                return invalid("pipeline intervals must be positive");
            }
            if !self.pipeline.initial_flow_setpoint.is_finite() {
                return invalid("pipeline.initial_flow_setpoint must be finite");
            }
        }
        if self.control.enabled {
            if self.control.settings_refresh_secs == 0 || self.control.republish_secs == 0 {
                return invalid("control intervals must be positive");
            }
            if !(self.control.feed_on_level < self.control.feed_off_level) {
                return invalid("control.feed_on_level must be below control.feed_off_level");
            }
        }
        if self.remote.enabled {
            if self.remote.url.trim().is_empty() || self.remote.api_key.trim().is_empty() {
                return invalid("remote.url and remote.api_key are required when remote is enabled");
            }
            if self.remote.table.trim().is_empty() || self.remote.probe_url.trim().is_empty() {
                return invalid("remote.table and remote.probe_url are required when remote is enabled");
            }
            if self.remote.upload_timeout_secs == 0 || self.remote.probe_timeout_secs == 0 {
                return invalid("remote timeouts must be positive");
            }
        }
        Ok(())
    }
}
