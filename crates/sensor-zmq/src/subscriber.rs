// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 home-sensors

//! Measurement subscriber.
//!
//! Owns one SUB socket (connected, subscribed to everything) wrapped in a
//! single-socket [`ReadPoller`]. Every [`Subscriber::recv`] call drains the
//! socket until the transport reports "would block", whether or not the poll
//! reported it ready: the notification descriptor only signals transitions,
//! so a burst that arrived while the incoming bit was already set never
//! wakes the poller again.
//!
//! A drain cut short by a bad message leaves data queued behind the incoming
//! bit. The next call then polls with a zero timeout, since the descriptor
//! will not signal for it.

use crate::error::TransportError;
use crate::measurement::{DecodeError, Measurement};
use crate::poller::ReadPoller;
use crate::socket::{Pollable, SocketKind, Transport, TransportSocket};
use crate::zmq_transport::ZmqContext;
use std::time::Duration;
use thiserror::Error;

/// Receive buffer size; longer payloads fail with [`TransportError::Truncated`].
pub const RECV_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("subscriber setup for '{endpoint}' failed: {source}")]
    Setup {
        endpoint: String,
        #[source]
        source: TransportError,
    },

    #[error("poll failed: {0}")]
    Poll(#[source] TransportError),

    #[error("receive failed: {0}")]
    Recv(#[source] TransportError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("subscriber teardown failed: {0}")]
    Teardown(#[source] TransportError),

    #[error("subscriber is closed")]
    Closed,
}

/// Subscriber counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberStats {
    /// `recv` calls.
    pub polls: u64,
    /// Calls where the poller reported the socket ready.
    pub notifications: u64,
    /// Calls that found data although the poller reported nothing.
    pub missed_notifications: u64,
    /// Measurements decoded.
    pub received: u64,
    pub decode_errors: u64,
}

/// SUB-side consumer of measurement payloads.
pub struct Subscriber<T: Transport = ZmqContext> {
    endpoint: String,
    transport: T,
    poller: Option<ReadPoller<T::Socket>>,
    buffer: Vec<u8>,
    stats: SubscriberStats,
    /// Data was left queued by the previous call.
    pending: bool,
}

impl Subscriber<ZmqContext> {
    /// Create a context, connect a SUB socket to `endpoint` and subscribe to
    /// all messages.
    pub fn new(endpoint: &str) -> Result<Self, SubscriberError> {
        Self::with_transport(endpoint, ZmqContext::new())
    }
}

impl<T: Transport> Subscriber<T> {
    /// Like [`Subscriber::new`] on an existing transport. The subscriber
    /// takes ownership of it and terminates it on [`close`](Self::close).
    pub fn with_transport(endpoint: &str, mut transport: T) -> Result<Self, SubscriberError> {
        match open_subscription(&transport, endpoint) {
            Ok(poller) => {
                log::debug!("[subscriber] connected to {}", endpoint);
                Ok(Self {
                    endpoint: endpoint.to_string(),
                    transport,
                    poller: Some(poller),
                    buffer: vec![0u8; RECV_BUFFER_SIZE],
                    stats: SubscriberStats::default(),
                    pending: false,
                })
            }
            Err(source) => {
                if let Err(e) = transport.terminate() {
                    log::debug!("[subscriber] terminate after failed setup: {}", e);
                }
                Err(SubscriberError::Setup {
                    endpoint: endpoint.to_string(),
                    source,
                })
            }
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn stats(&self) -> SubscriberStats {
        self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.poller.is_none()
    }

    /// Whether the previous [`recv`](Self::recv) stopped with data still queued.
    pub fn has_pending(&self) -> bool {
        self.pending
    }

    /// Wait up to `timeout` for data, then drain the socket.
    ///
    /// Decoded measurements are appended to `out` in delivery order and the
    /// number appended is returned. On a decode or receive error the batch
    /// stops there; everything decoded before it stays in `out`. A poll
    /// error does not skip the drain and is returned after it.
    ///
    /// If the previous call stopped with data still queued, the wait is
    /// skipped.
    pub fn recv(&mut self, timeout: Duration, out: &mut Vec<Measurement>) -> Result<usize, SubscriberError> {
        let poller = self.poller.as_ref().ok_or(SubscriberError::Closed)?;
        let socket = &poller.sockets()[0];
        let before = out.len();

        self.stats.polls += 1;
        let wait = if self.pending { Duration::ZERO } else { timeout };
        let mut ready = Vec::with_capacity(1);
        let polled = poller.poll_ready(Some(wait), &mut ready);
        let notified = !ready.is_empty();
        if notified {
            self.stats.notifications += 1;
        }

        let drained = drain(socket, &mut self.buffer, out, &mut self.stats);

        // A clean drain ended on "would block". After an aborted one, the
        // post-receive state check decides whether data is left.
        self.pending = match &drained {
            Ok(()) => false,
            Err(_) => match socket.has_incoming() {
                Ok(incoming) => incoming,
                Err(e) => {
                    log::debug!("[subscriber] state check after failed drain: {}", e);
                    true
                }
            },
        };
        if self.pending {
            log::trace!("[subscriber] drain stopped with data still queued");
        }

        let appended = out.len() - before;
        if appended > 0 && !notified {
            self.stats.missed_notifications += 1;
            log::trace!("[subscriber] {} message(s) found without notification", appended);
        }

        match (polled, drained) {
            (Ok(()), Ok(())) => Ok(appended),
            (Ok(()), Err(e)) => Err(e),
            (Err(poll_err), Ok(())) => Err(SubscriberError::Poll(poll_err)),
            (Err(poll_err), Err(drain_err)) => {
                log::warn!("[subscriber] drain after failed poll also failed: {}", drain_err);
                Err(SubscriberError::Poll(poll_err))
            }
        }
    }

    /// Close the socket, then terminate the transport.
    ///
    /// Both steps run even if the first fails; the first error is returned.
    /// Calling it again is a no-op.
    pub fn close(&mut self) -> Result<(), SubscriberError> {
        let mut first_err = None;

        if let Some(poller) = self.poller.take() {
            for mut socket in poller.into_sockets() {
                if let Err(e) = socket.close() {
                    first_err.get_or_insert(e);
                }
            }
        }

        if let Err(e) = self.transport.terminate() {
            first_err.get_or_insert(e);
        }

        match first_err {
            Some(e) => Err(SubscriberError::Teardown(e)),
            None => Ok(()),
        }
    }
}

impl<T: Transport> Drop for Subscriber<T> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::debug!("[subscriber] close on drop failed: {}", e);
        }
    }
}

fn open_subscription<T: Transport>(transport: &T, endpoint: &str) -> Result<ReadPoller<T::Socket>, TransportError> {
    let mut socket = transport.socket(SocketKind::Sub)?;
    if let Err(e) = configure(&socket, endpoint) {
        if let Err(close_err) = socket.close() {
            log::debug!("[subscriber] close after failed setup: {}", close_err);
        }
        return Err(e);
    }
    ReadPoller::new(vec![socket])
}

fn configure<S: TransportSocket>(socket: &S, endpoint: &str) -> Result<(), TransportError> {
    socket.connect(endpoint)?;
    socket.add_subscribe_filter(b"")?;
    socket.notification_fd()?;
    Ok(())
}

/// Event-state check around every receive.
///
/// Reading the event state is also what lets the transport re-arm the
/// notification descriptor, so it has to happen after each receive too.
fn check_incoming<S: Pollable>(socket: &S) -> Result<bool, SubscriberError> {
    socket.has_incoming().map_err(SubscriberError::Recv)
}

/// Receive until "would block", decoding into `out`.
///
/// On error the caller runs the post-receive state check.
fn drain<S: TransportSocket>(
    socket: &S,
    buf: &mut [u8],
    out: &mut Vec<Measurement>,
    stats: &mut SubscriberStats,
) -> Result<(), SubscriberError> {
    let mut reported = check_incoming(socket)?;
    loop {
        let Some(len) = socket.recv_nonblocking(buf).map_err(SubscriberError::Recv)? else {
            if reported {
                log::debug!("[subscriber] incoming bit set but receive would block");
            }
            return Ok(());
        };

        match Measurement::decode(&buf[..len]) {
            Ok(m) => {
                out.push(m);
                stats.received += 1;
            }
            Err(e) => {
                stats.decode_errors += 1;
                return Err(e.into());
            }
        }

        reported = check_incoming(socket)?;
    }
}
