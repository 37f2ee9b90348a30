//! Configuration loading from TOML files
//!
//! The path comes from the binary's `--config` flag (or `CONFIG_FILE`,
//! default `config/dev.toml`); an unreadable file falls back to defaults.

use crate::domain::types::{Credentials, Endpoint};
use crate::io::fetcher::DEFAULT_FLOORS;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// `[ohip]` - connection and credential set
#[derive(Debug, Clone, Deserialize, Default)]
pub struct OhipConfig {
    #[serde(default)]
    pub host_url: String,
    #[serde(default)]
    pub app_key: String,
    #[serde(default)]
    pub hotel_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_sync_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_endpoint")]
    pub endpoint: Endpoint,
    /// Floors queried on the housekeeping overview endpoint
    #[serde(default = "default_floors")]
    pub floors: Vec<u32>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sync_interval_secs(),
            endpoint: default_endpoint(),
            floors: default_floors(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_sync_interval_secs() -> u64 {
    900
}

fn default_endpoint() -> Endpoint {
    Endpoint::HousekeepingOverview
}

fn default_floors() -> Vec<u32> {
    DEFAULT_FLOORS.to_vec()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_metrics_interval_secs(),
            prometheus_port: default_prometheus_port(),
        }
    }
}

fn default_metrics_interval_secs() -> u64 {
    60
}

fn default_prometheus_port() -> u16 {
    9090
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttEgressConfig {
    /// Publish room state to an MQTT broker
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Topics are `{topic_prefix}/{hotel_id}/room/{room_id}/...`
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
}

impl Default for MqttEgressConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: None,
            password: None,
            topic_prefix: default_topic_prefix(),
        }
    }
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_topic_prefix() -> String {
    "ohip".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub ohip: OhipConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub mqtt_egress: MqttEgressConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    credentials: Credentials,
    sync_interval_secs: u64,
    endpoint: Endpoint,
    floors: Vec<u32>,
    request_timeout_ms: u64,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    mqtt_egress_enabled: bool,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    mqtt_topic_prefix: String,
    log_format: LogFormat,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(
            TomlConfig {
                ohip: OhipConfig::default(),
                sync: SyncConfig::default(),
                metrics: MetricsConfig::default(),
                mqtt_egress: MqttEgressConfig::default(),
                logging: LoggingConfig::default(),
            },
            "default".to_string(),
        )
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let ohip = toml_config.ohip;
        Self {
            credentials: Credentials {
                host_url: ohip.host_url,
                app_key: ohip.app_key,
                hotel_id: ohip.hotel_id,
                client_id: ohip.client_id,
                client_secret: ohip.client_secret,
                username: ohip.username,
                password: ohip.password,
            },
            sync_interval_secs: toml_config.sync.interval_secs,
            endpoint: toml_config.sync.endpoint,
            floors: toml_config.sync.floors,
            request_timeout_ms: toml_config.sync.request_timeout_ms,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            mqtt_egress_enabled: toml_config.mqtt_egress.enabled,
            mqtt_host: toml_config.mqtt_egress.host,
            mqtt_port: toml_config.mqtt_egress.port,
            mqtt_username: toml_config.mqtt_egress.username,
            mqtt_password: toml_config.mqtt_egress.password,
            mqtt_topic_prefix: toml_config.mqtt_egress.topic_prefix,
            log_format: toml_config.logging.format,
            config_file,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration from an explicit path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                // Logging may not be initialized yet
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Check that everything a sync cycle needs is present
    pub fn validate(&self) -> anyhow::Result<()> {
        let missing = self.credentials.missing_fields();
        if !missing.is_empty() {
            anyhow::bail!("missing [ohip] settings: {}", missing.join(", "));
        }
        if self.sync_interval_secs == 0 {
            anyhow::bail!("[sync] interval_secs must be greater than 0");
        }
        if self.request_timeout_ms == 0 {
            anyhow::bail!("[sync] request_timeout_ms must be greater than 0");
        }
        Ok(())
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn hotel_id(&self) -> &str {
        &self.credentials.hotel_id
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn floors(&self) -> &[u32] {
        &self.floors
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn mqtt_egress_enabled(&self) -> bool {
        self.mqtt_egress_enabled
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn mqtt_topic_prefix(&self) -> &str {
        &self.mqtt_topic_prefix
    }

    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    #[cfg(test)]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_credentials() -> Credentials {
        Credentials {
            host_url: "https://ohip.example.com".to_string(),
            app_key: "key".to_string(),
            hotel_id: "HOTEL1".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            username: "user".to_string(),
            password: "pass".to_string(),
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sync_interval(), Duration::from_secs(900));
        assert_eq!(config.endpoint(), Endpoint::HousekeepingOverview);
        assert_eq!(config.floors(), &[1, 2, 3]);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.metrics_interval_secs(), 60);
        assert_eq!(config.prometheus_port(), 9090);
        assert!(!config.mqtt_egress_enabled());
        assert_eq!(config.mqtt_topic_prefix(), "ohip");
        assert_eq!(config.log_format(), LogFormat::Pretty);
        assert_eq!(config.config_file(), "default");
    }

    #[test]
    fn test_validate_reports_missing_credentials() {
        let err = Config::default().validate().unwrap_err().to_string();
        assert!(err.contains("host_url"));
        assert!(err.contains("password"));

        let config = Config::default().with_credentials(full_credentials());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let toml_config: TomlConfig = toml::from_str("[sync]\ninterval_secs = 0\n").unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string())
            .with_credentials(full_credentials());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        let toml_config: TomlConfig =
            toml::from_str("[sync]\nendpoint = \"rooms\"\n[logging]\nformat = \"json\"\n").unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.endpoint(), Endpoint::RoomDetails);
        assert_eq!(config.floors(), &[1, 2, 3]);
        assert_eq!(config.sync_interval(), Duration::from_secs(900));
        assert_eq!(config.log_format(), LogFormat::Json);
    }
}
