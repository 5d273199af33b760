//! Configuration loading from TOML files and environment
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/bridge.toml
//!
//! A missing file falls back to defaults. Credentials and hosts can be
//! overridden with `BRIDGE_*` environment variables so secrets stay out of
//! the file.

use anyhow::{bail, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config/bridge.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub topic: String,
    /// Subscription QoS (0, 1 or 2)
    pub qos: u8,
    pub keep_alive_secs: u64,
    /// How long to wait for the first ConnAck at startup
    pub connect_timeout_ms: u64,
    /// Only count readings from this sensor (all sensors when unset)
    pub sensor: Option<String>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_id: "sensor-bridge".to_string(),
            topic: "/sensors".to_string(),
            qos: 0,
            keep_alive_secs: 60,
            connect_timeout_ms: 10_000,
            sensor: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Long-lived secret key (Adafruit IO key or equivalent)
    pub key: String,
    /// Feed name handed to the publisher
    pub topic: String,
    /// Wire topic, `{username}` and `{topic}` are substituted
    pub topic_template: String,
    pub keep_alive_secs: u64,
    pub connect_timeout_ms: u64,
    pub publish_timeout_ms: u64,
    /// Forward from a background worker instead of inline
    pub queued: bool,
    pub queue_size: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "io.adafruit.com".to_string(),
            port: 1883,
            username: String::new(),
            key: String::new(),
            topic: "lightsensor".to_string(),
            topic_template: "{username}/feeds/{topic}".to_string(),
            keep_alive_secs: 30,
            connect_timeout_ms: 5_000,
            publish_timeout_ms: 5_000,
            queued: false,
            queue_size: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Forward one reading out of every `threshold` valid readings
    pub threshold: u64,
    /// Counter value at startup
    pub initial_count: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self { threshold: 10, initial_count: 0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Metrics report interval (0 to disable)
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Run an in-process MQTT broker for the local side
    pub enabled: bool,
    pub bind_address: String,
    pub port: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { enabled: false, bind_address: "0.0.0.0".to_string(), port: 1883 }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable text
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TomlConfig {
    pub local: LocalConfig,
    pub remote: RemoteConfig,
    pub throttle: ThrottleConfig,
    pub metrics: MetricsConfig,
    pub broker: BrokerConfig,
    pub logging: LoggingConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    local: LocalConfig,
    remote: RemoteConfig,
    throttle: ThrottleConfig,
    metrics: MetricsConfig,
    broker: BrokerConfig,
    logging: LoggingConfig,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        Self {
            local: toml_config.local,
            remote: toml_config.remote,
            throttle: toml_config.throttle,
            metrics: toml_config.metrics,
            broker: toml_config.broker,
            logging: toml_config.logging,
            config_file: config_file.to_string(),
        }
    }

    /// Determine config file path from the CLI argument or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        DEFAULT_CONFIG_PATH.to_string()
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str, config_file: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content)
            .with_context(|| format!("Failed to parse config file {}", config_file))?;
        Ok(Self::from_toml(toml_config, config_file))
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Load configuration for the bridge process
    ///
    /// A missing file yields defaults (`config_file()` reports "default"); a
    /// malformed file is an error. Environment overrides are applied on top
    /// and the result is validated.
    pub fn load_from_path(path: &str) -> anyhow::Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };

        config.apply_env_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `BRIDGE_*` overrides using the given variable lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("BRIDGE_LOCAL_HOST") {
            self.local.host = host;
        }
        if let Some(port) = lookup("BRIDGE_LOCAL_PORT") {
            self.local.port =
                port.parse().with_context(|| format!("Invalid BRIDGE_LOCAL_PORT {:?}", port))?;
        }
        if let Some(username) = lookup("BRIDGE_LOCAL_USERNAME") {
            self.local.username = Some(username);
        }
        if let Some(password) = lookup("BRIDGE_LOCAL_PASSWORD") {
            self.local.password = Some(password);
        }
        if let Some(username) = lookup("BRIDGE_REMOTE_USERNAME") {
            self.remote.username = username;
        }
        if let Some(key) = lookup("BRIDGE_REMOTE_KEY") {
            self.remote.key = key;
        }
        if let Some(topic) = lookup("BRIDGE_REMOTE_TOPIC") {
            self.remote.topic = topic;
        }
        if let Some(threshold) = lookup("BRIDGE_THROTTLE_THRESHOLD") {
            self.throttle.threshold = threshold
                .parse()
                .with_context(|| format!("Invalid BRIDGE_THROTTLE_THRESHOLD {:?}", threshold))?;
        }
        Ok(())
    }

    /// Reject settings the bridge cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.throttle.threshold == 0 {
            bail!("throttle.threshold must be at least 1");
        }
        if self.local.topic.is_empty() {
            bail!("local.topic must not be empty");
        }
        if self.remote.topic.is_empty() {
            bail!("remote.topic must not be empty");
        }
        if self.local.qos > 2 {
            bail!("local.qos must be 0, 1 or 2 (got {})", self.local.qos);
        }
        if self.remote.queued && self.remote.queue_size == 0 {
            bail!("remote.queue_size must be at least 1 when remote.queued is set");
        }
        Ok(())
    }

    pub fn local(&self) -> &LocalConfig {
        &self.local
    }

    pub fn remote(&self) -> &RemoteConfig {
        &self.remote
    }

    pub fn throttle_threshold(&self) -> u64 {
        self.throttle.threshold
    }

    pub fn throttle_initial_count(&self) -> u64 {
        self.throttle.initial_count
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics.interval_secs
    }

    pub fn broker(&self) -> &BrokerConfig {
        &self.broker
    }

    pub fn log_json(&self) -> bool {
        self.logging.json
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the throttle
    #[cfg(test)]
    pub fn with_throttle(mut self, threshold: u64, initial_count: u64) -> Self {
        self.throttle.threshold = threshold;
        self.throttle.initial_count = initial_count;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.local().host, "localhost");
        assert_eq!(config.local().port, 1883);
        assert_eq!(config.local().topic, "/sensors");
        assert_eq!(config.local().keep_alive_secs, 60);
        assert_eq!(config.remote().host, "io.adafruit.com");
        assert_eq!(config.remote().topic, "lightsensor");
        assert_eq!(config.throttle_threshold(), 10);
        assert_eq!(config.throttle_initial_count(), 0);
        assert!(!config.broker().enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
[remote]
username = "alice"
key = "aio_secret"

[throttle]
threshold = 5
"#,
            "inline",
        )
        .unwrap();

        assert_eq!(config.remote().username, "alice");
        assert_eq!(config.remote().key, "aio_secret");
        assert_eq!(config.remote().topic, "lightsensor");
        assert_eq!(config.throttle_threshold(), 5);
        assert_eq!(config.local().topic, "/sensors");
        assert_eq!(config.config_file(), "inline");
    }

    #[test]
    fn test_invalid_toml_is_error() {
        assert!(Config::from_toml_str("[throttle]\nthreshold = \"ten\"", "inline").is_err());
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        assert_eq!(Config::resolve_config_path(Some("config/pi.toml")), "config/pi.toml");
    }

    #[test]
    fn test_env_overrides() {
        let vars = HashMap::from([
            ("BRIDGE_LOCAL_HOST", "10.0.0.5"),
            ("BRIDGE_LOCAL_PORT", "1884"),
            ("BRIDGE_LOCAL_PASSWORD", "hunter2"),
            ("BRIDGE_REMOTE_USERNAME", "bob"),
            ("BRIDGE_REMOTE_KEY", "aio_key"),
            ("BRIDGE_THROTTLE_THRESHOLD", "3"),
        ]);
        let mut config = Config::default();
        config.apply_env_overrides(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.local().host, "10.0.0.5");
        assert_eq!(config.local().port, 1884);
        assert_eq!(config.local().username, None);
        assert_eq!(config.local().password.as_deref(), Some("hunter2"));
        assert_eq!(config.remote().username, "bob");
        assert_eq!(config.remote().key, "aio_key");
        assert_eq!(config.throttle_threshold(), 3);
    }

    #[test]
    fn test_env_override_invalid_port() {
        let mut config = Config::default();
        let result = config
            .apply_env_overrides(|key| (key == "BRIDGE_LOCAL_PORT").then(|| "abc".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let config = Config::default().with_throttle(0, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_qos() {
        let config = Config::from_toml_str("[local]\nqos = 3", "inline").unwrap();
        assert!(config.validate().is_err());
    }
}
