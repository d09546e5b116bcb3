use std::net::SocketAddr;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{FlowlyError, Result};

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_STATIC_DIR: &str = "static";
pub const DEFAULT_CONFIG_FILE: &str = "flowly.toml";
/// Path viewers upgrade on and producers POST frames to.
pub const TRAFFIC_PATH: &str = "/traffic";
pub const DEFAULT_QUEUE_CAPACITY: usize = 256; // frames buffered per viewer before eviction
pub const DEFAULT_EVENT_CAPACITY: usize = 1024; // hub control-loop inbox
pub const DEFAULT_TRAFFIC_INTERVAL_MS: u64 = 500;
pub const DEFAULT_MAPPING_INTERVAL_MS: u64 = 2_500;

/// Top-level config (flowly.toml + FLOWLY_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowlyConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub synthetic: SyntheticConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the HTTP server binds to.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Directory served for every path that is not an API route.
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            static_dir: default_static_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Outbound queue capacity of every viewer connection.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Capacity of the hub's event channel. Producers wait when it is full.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// External log (Kafka) ingestion. Disabled unless `address` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Comma-separated broker list, e.g. `kafka-1:9092,kafka-2:9092`.
    pub address: Option<String>,
    pub topic: Option<String>,
    #[serde(default)]
    pub partition: i32,
    #[serde(default)]
    pub schema: RecordSchema,
}

impl KafkaConfig {
    pub fn enabled(&self) -> bool {
        self.address.as_deref().is_some_and(|a| !a.trim().is_empty())
    }

    /// Broker addresses split out of `address`, empty entries dropped.
    pub fn brokers(&self) -> Vec<String> {
        self.address
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(String::from)
            .collect()
    }
}

/// Wire layout of the records found on the external log.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RecordSchema {
    /// Service packages between named endpoints (`ServicePackages`).
    #[default]
    Endpoint,
    /// Flattened capture groups with `"ip:port"` addresses (`Packets`).
    Capture,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    /// Generate dummy traffic for demos.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_traffic_interval_ms")]
    pub traffic_interval_ms: u64,
    #[serde(default = "default_mapping_interval_ms")]
    pub mapping_interval_ms: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            traffic_interval_ms: DEFAULT_TRAFFIC_INTERVAL_MS,
            mapping_interval_ms: DEFAULT_MAPPING_INTERVAL_MS,
        }
    }
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}
fn default_static_dir() -> String {
    DEFAULT_STATIC_DIR.to_string()
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}
fn default_traffic_interval_ms() -> u64 {
    DEFAULT_TRAFFIC_INTERVAL_MS
}
fn default_mapping_interval_ms() -> u64 {
    DEFAULT_MAPPING_INTERVAL_MS
}

impl FlowlyConfig {
    /// Load config from a TOML file with FLOWLY_* env var overrides.
    ///
    /// The file is looked up in order:
    ///   1. Explicit path argument
    ///   2. `FLOWLY_CONFIG` env var
    ///   3. `./flowly.toml`
    ///
    /// A missing file is not an error; built-in defaults apply. Nested keys
    /// use a double underscore: `FLOWLY_HUB__QUEUE_CAPACITY=512`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("FLOWLY_CONFIG").ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        let config: FlowlyConfig = Figment::from(Serialized::defaults(FlowlyConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("FLOWLY_").ignore(&["CONFIG"]).split("__"))
            .extract()
            .map_err(|e| FlowlyError::Config(e.to_string()))?;

        tracing::debug!(path = %path, "configuration loaded");
        Ok(config)
    }

    /// Cross-field checks that must hold before anything is started.
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;

        if self.hub.queue_capacity == 0 {
            return Err(FlowlyError::Config(
                "hub.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.hub.event_capacity == 0 {
            return Err(FlowlyError::Config(
                "hub.event_capacity must be at least 1".to_string(),
            ));
        }

        if self.kafka.enabled() {
            let topic_missing = self
                .kafka
                .topic
                .as_deref()
                .map_or(true, |t| t.trim().is_empty());
            if topic_missing {
                return Err(FlowlyError::Config(
                    "kafka.topic is required when kafka.address is set".to_string(),
                ));
            }
        } else if self.kafka.topic.is_some() {
            tracing::warn!("kafka.topic is set without kafka.address, ingestion stays disabled");
        }

        if self.synthetic.enabled
            && (self.synthetic.traffic_interval_ms == 0 || self.synthetic.mapping_interval_ms == 0)
        {
            return Err(FlowlyError::Config(
                "synthetic intervals must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.server.listen.parse().map_err(|e| {
            FlowlyError::Config(format!(
                "invalid listen address '{}': {e}",
                self.server.listen
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = FlowlyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hub.queue_capacity, 256);
        assert!(!config.kafka.enabled());
        assert!(!config.synthetic.enabled);
    }

    #[test]
    fn kafka_address_without_topic_is_rejected() {
        let mut config = FlowlyConfig::default();
        config.kafka.address = Some("localhost:9092".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("kafka.topic"));

        config.kafka.topic = Some("flowly".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_listen_address_is_rejected() {
        let mut config = FlowlyConfig::default();
        config.server.listen = ":8080".to_string();
        assert!(matches!(config.validate(), Err(FlowlyError::Config(_))));
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        let mut config = FlowlyConfig::default();
        config.hub.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn brokers_are_split_and_trimmed() {
        let kafka = KafkaConfig {
            address: Some("a:9092, b:9092,,".to_string()),
            ..Default::default()
        };
        assert_eq!(kafka.brokers(), vec!["a:9092", "b:9092"]);
    }

    #[test]
    fn toml_file_and_env_are_layered() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "flowly.toml",
                r#"
                [server]
                listen = "127.0.0.1:9000"

                [kafka]
                address = "broker:9092"
                topic = "captures"
                schema = "capture"
                "#,
            )?;
            jail.set_env("FLOWLY_HUB__QUEUE_CAPACITY", "8");
            jail.set_env("FLOWLY_SYNTHETIC__ENABLED", "true");

            let config = FlowlyConfig::load(Some("flowly.toml")).expect("load");
            assert_eq!(config.server.listen, "127.0.0.1:9000");
            assert_eq!(config.server.static_dir, "static");
            assert_eq!(config.hub.queue_capacity, 8);
            assert_eq!(config.hub.event_capacity, DEFAULT_EVENT_CAPACITY);
            assert_eq!(config.kafka.schema, RecordSchema::Capture);
            assert_eq!(config.kafka.topic.as_deref(), Some("captures"));
            assert!(config.synthetic.enabled);
            assert!(config.validate().is_ok());
            Ok(())
        });
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = FlowlyConfig::load(Some("does-not-exist.toml")).expect("load");
            assert_eq!(config.server.listen, DEFAULT_LISTEN);
            Ok(())
        });
    }
}
