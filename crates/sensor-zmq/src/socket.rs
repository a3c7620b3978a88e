// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 home-sensors

//! Transport socket abstraction.
//!
//! The subscriber and the multiplexer only see these traits. [`ZmqContext`]
//! and [`ZmqSocket`] are the production implementation; tests substitute
//! their own.
//!
//! [`ZmqContext`]: crate::ZmqContext
//! [`ZmqSocket`]: crate::ZmqSocket

use crate::error::TransportError;
use std::fmt;
use std::os::fd::RawFd;

/// Socket-level event flags as reported by the transport.
///
/// Unlike the notification descriptor these flags are level-triggered and
/// authoritative: `INCOMING` is set exactly when a receive would not block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SocketEvents(u8);

impl SocketEvents {
    pub const NONE: Self = Self(0);
    /// At least one message can be received without blocking.
    pub const INCOMING: Self = Self(0b01);
    /// At least one message can be sent without blocking.
    pub const OUTGOING: Self = Self(0b10);

    pub fn has_incoming(self) -> bool {
        self.0 & Self::INCOMING.0 != 0
    }

    pub fn has_outgoing(self) -> bool {
        self.0 & Self::OUTGOING.0 != 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl std::ops::BitOr for SocketEvents {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Anything the [`ReadPoller`](crate::ReadPoller) can wait on.
pub trait Pollable {
    /// OS descriptor that becomes readable when the socket's event state
    /// changes. Edge-triggered: readability says "look again", nothing more.
    fn notification_fd(&self) -> Result<RawFd, TransportError>;

    /// Current event flags. Querying them also lets the transport process
    /// pending internal commands, which re-arms the notification descriptor.
    fn events(&self) -> Result<SocketEvents, TransportError>;

    /// Whether a receive would currently succeed without blocking.
    fn has_incoming(&self) -> Result<bool, TransportError> {
        Ok(self.events()?.has_incoming())
    }
}

impl<T: Pollable + ?Sized> Pollable for &T {
    fn notification_fd(&self) -> Result<RawFd, TransportError> {
        (**self).notification_fd()
    }

    fn events(&self) -> Result<SocketEvents, TransportError> {
        (**self).events()
    }
}

/// One pub/sub endpoint.
pub trait TransportSocket: Pollable {
    fn bind(&self, endpoint: &str) -> Result<(), TransportError>;

    fn connect(&self, endpoint: &str) -> Result<(), TransportError>;

    fn send(&self, payload: &[u8]) -> Result<(), TransportError>;

    /// Receive one message into `buf`.
    ///
    /// Returns `Ok(None)` when no message is queued ("would block"); that is
    /// not an error. A message longer than `buf` is consumed and reported as
    /// [`TransportError::Truncated`].
    fn recv_nonblocking(&self, buf: &mut [u8]) -> Result<Option<usize>, TransportError>;

    /// Deliver messages starting with `prefix`. The empty prefix matches
    /// everything.
    fn add_subscribe_filter(&self, prefix: &[u8]) -> Result<(), TransportError>;

    fn remove_subscribe_filter(&self, prefix: &[u8]) -> Result<(), TransportError>;

    /// Release the socket. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Context/session object owning the sockets it creates.
///
/// Must outlive its sockets: [`Transport::terminate`] fails while any of
/// them is still open.
pub trait Transport {
    type Socket: TransportSocket;

    fn socket(&self, kind: SocketKind) -> Result<Self::Socket, TransportError>;

    /// Tear the context down. Calling it again is a no-op.
    fn terminate(&mut self) -> Result<(), TransportError>;
}

/// Socket roles used by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Pub,
    Sub,
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketKind::Pub => write!(f, "PUB"),
            SocketKind::Sub => write!(f, "SUB"),
        }
    }
}
