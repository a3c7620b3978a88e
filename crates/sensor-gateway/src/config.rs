// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 home-sensors

//! Gateway configuration.
//!
//! Loaded from TOML, or from JSON when the file name ends in `.json`.
//! Keys are flat; only the ones for the selected publisher are required.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Downstream sink selected by the `publisher` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherKind {
    Web,
    Mqtt,
}

impl fmt::Display for PublisherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublisherKind::Web => write!(f, "web"),
            PublisherKind::Mqtt => write!(f, "mqtt"),
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// ZeroMQ endpoint the measurements are published on.
    #[serde(default)]
    pub zmq_endpoint: String,

    /// Log every relayed measurement.
    #[serde(default)]
    pub debug: bool,

    /// "web" or "mqtt".
    #[serde(default)]
    pub publisher: String,

    /// Base URL of the ingestion API.
    #[serde(default)]
    pub web_url: String,

    /// Seconds after which a publish re-fetches the measurement type catalog.
    #[serde(default)]
    pub web_update_types_interval: i64,

    /// Seconds between background catalog refreshes (disabled when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_background_refresh_interval: Option<u64>,

    #[serde(default)]
    pub mqtt_broker: String,

    #[serde(default)]
    pub mqtt_user: String,

    #[serde(default)]
    pub mqtt_password: String,

    /// Measurements go to `<mqtt_topic>/<device_id>/<type>`.
    #[serde(default)]
    pub mqtt_topic: String,

    /// Subscriber poll timeout (milliseconds).
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Statistics reporting interval (seconds, 0 disables).
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

fn default_poll_timeout_ms() -> u64 {
    5000
}

fn default_stats_interval() -> u64 {
    60
}

impl GatewayConfig {
    /// Load and validate a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_toml_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML without validating.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Parse JSON without validating.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.zmq_endpoint.is_empty() {
            return Err(ConfigError::Invalid("zmq_endpoint must be set".into()));
        }

        match self.publisher_kind()? {
            PublisherKind::Web => self.validate_web(),
            PublisherKind::Mqtt => self.validate_mqtt(),
        }
    }

    fn validate_web(&self) -> Result<(), ConfigError> {
        if self.web_url.is_empty() {
            return Err(ConfigError::Invalid("web_url must be set".into()));
        }

        if self.web_update_types_interval <= 0 {
            return Err(ConfigError::Invalid(format!(
                "invalid value for web_update_types_interval: {}",
                self.web_update_types_interval
            )));
        }

        if self.web_background_refresh_interval == Some(0) {
            return Err(ConfigError::Invalid(
                "invalid value for web_background_refresh_interval: 0".into(),
            ));
        }

        Ok(())
    }

    fn validate_mqtt(&self) -> Result<(), ConfigError> {
        if self.mqtt_broker.is_empty() {
            return Err(ConfigError::Invalid("mqtt_broker must be set".into()));
        }

        if self.mqtt_topic.is_empty() {
            return Err(ConfigError::Invalid("mqtt_topic must be set".into()));
        }

        if self.mqtt_user.is_empty() && !self.mqtt_password.is_empty() {
            return Err(ConfigError::Invalid(
                "mqtt_password is set for an empty mqtt_user".into(),
            ));
        }

        Ok(())
    }

    /// The selected publisher.
    pub fn publisher_kind(&self) -> Result<PublisherKind, ConfigError> {
        match self.publisher.as_str() {
            "web" => Ok(PublisherKind::Web),
            "mqtt" => Ok(PublisherKind::Mqtt),
            other => Err(ConfigError::Invalid(format!("unsupported Publisher '{}'", other))),
        }
    }

    /// Lazy catalog refresh interval; zero if the key is not positive.
    pub fn update_types_interval(&self) -> Duration {
        Duration::from_secs(self.web_update_types_interval.max(0) as u64)
    }

    pub fn background_refresh_interval(&self) -> Option<Duration> {
        self.web_background_refresh_interval
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }

    /// Example configuration for `gen-config`.
    pub fn example() -> Self {
        Self {
            zmq_endpoint: "tcp://127.0.0.1:5555".into(),
            debug: false,
            publisher: "web".into(),
            web_url: "http://127.0.0.1:8000/api".into(),
            web_update_types_interval: 30,
            web_background_refresh_interval: Some(300),
            mqtt_broker: "tcp://127.0.0.1:1883".into(),
            mqtt_user: String::new(),
            mqtt_password: String::new(),
            mqtt_topic: "sensors".into(),
            poll_timeout_ms: default_poll_timeout_ms(),
            stats_interval_secs: default_stats_interval(),
        }
    }
}
