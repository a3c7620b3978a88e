// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 home-sensors

//! Transport error type.

use std::io;
use std::os::fd::RawFd;
use thiserror::Error;

/// Errors raised by sockets, contexts and the readiness multiplexer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("empty socket list")]
    EmptySocketList,

    #[error("notification descriptor {0} is shared by more than one socket")]
    DuplicateDescriptor(RawFd),

    #[error("{op} failed: {source}")]
    Zmq {
        op: &'static str,
        #[source]
        source: zmq::Error,
    },

    #[error("{op}('{endpoint}') failed: {source}")]
    Endpoint {
        op: &'static str,
        endpoint: String,
        #[source]
        source: zmq::Error,
    },

    #[error("received data was truncated: {size}-byte message, {capacity}-byte buffer")]
    Truncated { size: usize, capacity: usize },

    #[error("poll() failed: {0}")]
    Poll(#[source] io::Error),

    #[error("cannot terminate context: {0} socket(s) still open")]
    SocketsOpen(usize),

    #[error("context already terminated")]
    Terminated,

    #[error("socket is closed")]
    Closed,
}

impl TransportError {
    pub(crate) fn zmq(op: &'static str) -> impl FnOnce(zmq::Error) -> Self {
        move |source| Self::Zmq { op, source }
    }

    pub(crate) fn endpoint<'a>(op: &'static str, endpoint: &'a str) -> impl FnOnce(zmq::Error) -> Self + 'a {
        move |source| Self::Endpoint {
            op,
            endpoint: endpoint.to_string(),
            source,
        }
    }
}
