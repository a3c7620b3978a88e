// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 home-sensors

//! MQTT broker sink.
//!
//! Publishes `{"timestamp", "value"}` to
//! `<base_topic>/<device_id>/<lowercased type>` with QoS 0, no retain.
//! A background thread drives the client's event loop and reconnects after
//! connection errors. While the broker connection is down, publishing fails
//! instead of queueing, and a full request queue is an error rather than a
//! blocking wait.

use super::{PublishError, Publisher};
use crate::config::GatewayConfig;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rumqttc::{Client, Connection, ConnectionError, Event, MqttOptions, Outgoing, Packet, QoS};
use sensor_zmq::Measurement;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const DEFAULT_PORT: u16 = 1883;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_CAPACITY: usize = 64;

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttSettings {
    /// `host[:port]`, optionally prefixed with `tcp://` or `mqtt://`.
    pub broker: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub topic: String,
}

impl MqttSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            broker: config.mqtt_broker.clone(),
            user: non_empty(&config.mqtt_user),
            password: non_empty(&config.mqtt_password),
            topic: config.mqtt_topic.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct MqttPayload {
    timestamp: i64,
    value: f64,
}

/// Sink publishing to an MQTT broker.
pub struct MqttPublisher {
    base_topic: String,
    broker: String,
    client: Client,
    connected: Arc<AtomicBool>,
    stop_tx: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl MqttPublisher {
    /// Connect to the broker, waiting up to 10 s for its CONNACK.
    pub fn connect(settings: MqttSettings) -> Result<Self, PublishError> {
        let (host, port) = parse_broker(&settings.broker)?;

        let mut options = MqttOptions::new(format!("sensor-gateway-{}", std::process::id()), host, port);
        options.set_keep_alive(KEEP_ALIVE);
        if let Some(user) = &settings.user {
            options.set_credentials(user.clone(), settings.password.clone().unwrap_or_default());
        }

        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        let (ready_tx, ready_rx) = channel::bounded(1);
        let (stop_tx, stop_rx) = channel::bounded(1);

        let connected = Arc::new(AtomicBool::new(false));
        let link = Link {
            broker: settings.broker.clone(),
            connected: Arc::clone(&connected),
        };
        let worker = thread::Builder::new()
            .name("mqtt-eventloop".into())
            .spawn(move || drive_connection(connection, ready_tx, stop_rx, link))
            .map_err(|e| PublishError::Connect {
                broker: settings.broker.clone(),
                reason: format!("cannot spawn event loop thread: {}", e),
            })?;

        let handshake = match ready_rx.recv_timeout(CONNECT_TIMEOUT) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(reason),
            Err(_) => Err(format!("no CONNACK within {:?}", CONNECT_TIMEOUT)),
        };

        if let Err(reason) = handshake {
            // The thread exits by itself after an initial failure; after a
            // timeout it stops at its next error.
            drop(stop_tx);
            if worker.is_finished() {
                let _ = worker.join();
            }
            return Err(PublishError::Connect {
                broker: settings.broker,
                reason,
            });
        }

        tracing::debug!(broker = %settings.broker, topic = %settings.topic, "MQTT publisher connected");
        Ok(Self {
            base_topic: settings.topic,
            broker: settings.broker,
            client,
            connected,
            stop_tx: Mutex::new(Some(stop_tx)),
            worker: Mutex::new(Some(worker)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn base_topic(&self) -> &str {
        &self.base_topic
    }

    pub fn broker(&self) -> &str {
        &self.broker
    }

    /// Whether the event loop currently holds a broker connection.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Publisher for MqttPublisher {
    fn publish(&self, measurement: &Measurement) -> Result<(), PublishError> {
        if self.closed.load(Ordering::SeqCst) || !self.is_connected() {
            return Err(PublishError::Disconnected(self.broker.clone()));
        }

        let topic = measurement_topic(&self.base_topic, measurement);
        let payload = serde_json::to_vec(&MqttPayload {
            timestamp: measurement.timestamp,
            value: measurement.value,
        })?;

        self.client
            .try_publish(topic.as_str(), QoS::AtMostOnce, false, payload)
            .map_err(|source| PublishError::Mqtt { topic, source })
    }

    fn describe(&self) -> String {
        format!("MQTT Publisher (topic: '{}')", self.base_topic)
    }

    fn close(&self) -> Result<(), PublishError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        drop(self.stop_tx.lock().take());
        let result = self.client.try_disconnect().map_err(PublishError::Disconnect);

        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::warn!("MQTT event loop thread panicked");
            }
        }
        result
    }
}

impl Drop for MqttPublisher {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::debug!(error = %e, "MQTT close on drop failed");
        }
    }
}

/// Event loop side of the connection state.
struct Link {
    broker: String,
    connected: Arc<AtomicBool>,
}

/// Event loop thread body.
///
/// Reports the first CONNACK (or the first error) on `ready`. Errors before
/// the first CONNACK end the thread; later ones are logged and retried until
/// `stop` fires or the client disconnects. `link.connected` follows the
/// broker connection.
fn drive_connection(mut connection: Connection, ready: Sender<Result<(), String>>, stop: Receiver<()>, link: Link) {
    let Link { broker, connected: link_up } = link;
    let mut connected = false;

    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                link_up.store(true, Ordering::SeqCst);
                if !connected {
                    connected = true;
                    let _ = ready.send(Ok(()));
                } else {
                    tracing::info!(broker = %broker, "Reconnected to MQTT broker");
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(ConnectionError::RequestsDone) => break,
            Err(e) => {
                link_up.store(false, Ordering::SeqCst);
                if !connected {
                    let _ = ready.send(Err(e.to_string()));
                    break;
                }
                tracing::warn!(broker = %broker, error = %e, "MQTT connection error, reconnecting");
                match stop.recv_timeout(RECONNECT_DELAY) {
                    Err(RecvTimeoutError::Timeout) => {}
                    _ => break,
                }
            }
        }
    }
    link_up.store(false, Ordering::SeqCst);
    tracing::debug!(broker = %broker, "MQTT event loop stopped");
}

/// `<base>/<device_id>/<lowercased type>`.
pub fn measurement_topic(base: &str, measurement: &Measurement) -> String {
    format!(
        "{}/{}/{}",
        base,
        measurement.device_id,
        measurement.mtype.to_lowercase()
    )
}

/// Split `[tcp://|mqtt://]host[:port]` into host and port.
pub fn parse_broker(broker: &str) -> Result<(String, u16), PublishError> {
    let address = broker
        .strip_prefix("tcp://")
        .or_else(|| broker.strip_prefix("mqtt://"))
        .unwrap_or(broker)
        .trim_end_matches('/');

    let invalid = || PublishError::Broker(broker.to_string());

    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
        None => (address, DEFAULT_PORT),
    };

    if host.is_empty() || host.contains('/') {
        return Err(invalid());
    }
    Ok((host.to_string(), port))
}
