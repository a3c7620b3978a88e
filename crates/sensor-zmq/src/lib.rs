// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 home-sensors

//! Sensor ZeroMQ transport
//!
//! Consumes sensor measurements from a ZeroMQ PUB/SUB bus without losing
//! messages to edge-triggered notification.
//!
//! # Overview
//!
//! ```text
//! ZmqSocket --> ReadPoller --> Subscriber --> Vec<Measurement>
//! ```
//!
//! - [`ZmqContext`] / [`ZmqSocket`]: libzmq adapter behind the [`Transport`]
//!   and [`TransportSocket`] traits.
//! - [`ReadPoller`]: waits on the sockets' notification descriptors and
//!   confirms each wake-up against the socket's event bitmask.
//! - [`Subscriber`]: drains its socket to exhaustion on every call and decodes
//!   each payload into a [`Measurement`].
//!
//! Unix only: the multiplexer is built on `poll(2)`.
//!
//! # Example
//!
//! ```rust,ignore
//! use sensor_zmq::Subscriber;
//! use std::time::Duration;
//!
//! let mut subscriber = Subscriber::new("tcp://127.0.0.1:5555")?;
//! let mut batch = Vec::new();
//! subscriber.recv(Duration::from_secs(5), &mut batch)?;
//! for m in &batch {
//!     println!("{} {} = {}", m.device_id, m.mtype, m.value);
//! }
//! subscriber.close()?;
//! ```

pub mod error;
pub mod measurement;
pub mod poller;
pub mod socket;
pub mod subscriber;
pub mod zmq_transport;

#[cfg(test)]
pub(crate) mod testing;

pub use error::TransportError;
pub use measurement::{DecodeError, Measurement};
pub use poller::ReadPoller;
pub use socket::{Pollable, SocketEvents, SocketKind, Transport, TransportSocket};
pub use subscriber::{Subscriber, SubscriberError, SubscriberStats, RECV_BUFFER_SIZE};
pub use zmq_transport::{ZmqContext, ZmqSocket};
