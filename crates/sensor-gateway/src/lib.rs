// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 home-sensors

//! Sensor Gateway
//!
//! Relays sensor measurements from a ZeroMQ bus to an HTTP ingestion API or
//! an MQTT broker.
//!
//! # Features
//!
//! - **Web sink**: posts measurements to `<web_url>/measurements/`, mapping
//!   type names to ids from a cached `<web_url>/mtypes/` catalog
//! - **MQTT sink**: publishes to `<mqtt_topic>/<device_id>/<type>`
//! - **Background refresh**: optional periodic catalog refresh
//! - **Statistics**: periodic throughput and error counters
//!
//! # Quick Start
//!
//! ```bash
//! sensor-gateway gen-config --output gateway.toml
//! sensor-gateway --config gateway.toml
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! zmq_endpoint = "tcp://127.0.0.1:5555"
//! publisher = "web"
//! web_url = "http://127.0.0.1:8000/api"
//! web_update_types_interval = 30
//! ```

pub mod config;
pub mod publisher;
pub mod refresh;
pub mod relay;

pub use config::{ConfigError, GatewayConfig, PublisherKind};
pub use publisher::{MqttPublisher, MqttSettings, PublishError, Publisher, Sink, WebPublisher};
pub use refresh::TypeRefresher;
pub use relay::{MeasurementSource, Relay, RelayStats, RelayStatsSnapshot, StopHandle};
