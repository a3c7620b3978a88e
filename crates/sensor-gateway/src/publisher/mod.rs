// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 home-sensors

//! Measurement sinks.
//!
//! Each sink takes one measurement at a time; nothing is retried or
//! queued here.

pub mod mqtt;
pub mod web;

use crate::config::{ConfigError, GatewayConfig, PublisherKind};
use sensor_zmq::Measurement;
use std::sync::Arc;
use thiserror::Error;

pub use mqtt::{MqttPublisher, MqttSettings};
pub use web::WebPublisher;

/// Publish errors.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("unsupported measurement type '{0}'")]
    UnsupportedType(String),

    #[error("request to '{url}' failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("'{url}' returned HTTP status {status}")]
    Status { url: String, status: u16 },

    #[error("invalid measurement type catalog from '{url}': {source}")]
    Catalog {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP client setup failed: {0}")]
    Client(#[source] reqwest::Error),

    #[error("publish to topic '{topic}' failed: {source}")]
    Mqtt {
        topic: String,
        #[source]
        source: rumqttc::ClientError,
    },

    #[error("cannot connect to MQTT broker '{broker}': {reason}")]
    Connect { broker: String, reason: String },

    #[error("MQTT broker '{0}' is not connected")]
    Disconnected(String),

    #[error("invalid MQTT broker address '{0}'")]
    Broker(String),

    #[error("MQTT disconnect failed: {0}")]
    Disconnect(#[source] rumqttc::ClientError),

    #[error("cannot encode payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A downstream sink.
///
/// All methods take `&self` so one sink can be shared between the relay
/// loop and background tasks.
pub trait Publisher: Send + Sync {
    fn publish(&self, measurement: &Measurement) -> Result<(), PublishError>;

    /// Human-readable sink description for logs.
    fn describe(&self) -> String;

    /// Release the sink. Calling it again is a no-op.
    fn close(&self) -> Result<(), PublishError>;
}

/// The configured sink.
pub enum Sink {
    Web(Arc<WebPublisher>),
    Mqtt(MqttPublisher),
}

impl Sink {
    /// Build the sink selected by `config.publisher`.
    ///
    /// Fails if the sink cannot reach its backend: the web sink needs the
    /// initial type catalog, the MQTT sink a CONNACK.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, PublishError> {
        match config.publisher_kind()? {
            PublisherKind::Web => {
                let web = WebPublisher::new(&config.web_url, config.update_types_interval())?;
                Ok(Sink::Web(Arc::new(web)))
            }
            PublisherKind::Mqtt => {
                let mqtt = MqttPublisher::connect(MqttSettings::from_config(config))?;
                Ok(Sink::Mqtt(mqtt))
            }
        }
    }

    pub fn kind(&self) -> PublisherKind {
        match self {
            Sink::Web(_) => PublisherKind::Web,
            Sink::Mqtt(_) => PublisherKind::Mqtt,
        }
    }

    /// The web sink, for the background refresh task.
    pub fn web_publisher(&self) -> Option<Arc<WebPublisher>> {
        match self {
            Sink::Web(web) => Some(Arc::clone(web)),
            Sink::Mqtt(_) => None,
        }
    }
}

impl Publisher for Sink {
    fn publish(&self, measurement: &Measurement) -> Result<(), PublishError> {
        match self {
            Sink::Web(web) => web.publish(measurement),
            Sink::Mqtt(mqtt) => mqtt.publish(measurement),
        }
    }

    fn describe(&self) -> String {
        match self {
            Sink::Web(web) => web.describe(),
            Sink::Mqtt(mqtt) => mqtt.describe(),
        }
    }

    fn close(&self) -> Result<(), PublishError> {
        match self {
            Sink::Web(web) => web.close(),
            Sink::Mqtt(mqtt) => mqtt.close(),
        }
    }
}

impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    fn publish(&self, measurement: &Measurement) -> Result<(), PublishError> {
        (**self).publish(measurement)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    fn close(&self) -> Result<(), PublishError> {
        (**self).close()
    }
}
