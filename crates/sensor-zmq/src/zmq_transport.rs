// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 home-sensors

//! libzmq-backed [`Transport`] and [`TransportSocket`].
//!
//! Every libzmq call that can report `EINTR` is retried at the call site.
//! The context counts the sockets it handed out so that terminating it early
//! is reported as an error instead of blocking inside `zmq_ctx_term`.

use crate::error::TransportError;
use crate::socket::{Pollable, SocketEvents, SocketKind, Transport, TransportSocket};
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn retry_interrupted<T>(mut call: impl FnMut() -> zmq::Result<T>) -> zmq::Result<T> {
    loop {
        match call() {
            Err(zmq::Error::EINTR) => continue,
            other => return other,
        }
    }
}

/// ZeroMQ context.
pub struct ZmqContext {
    inner: Option<zmq::Context>,
    open_sockets: Arc<AtomicUsize>,
}

impl ZmqContext {
    pub fn new() -> Self {
        Self {
            inner: Some(zmq::Context::new()),
            open_sockets: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of sockets created by this context and not yet closed.
    pub fn open_sockets(&self) -> usize {
        self.open_sockets.load(Ordering::SeqCst)
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.is_none()
    }
}

impl Default for ZmqContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ZmqContext {
    type Socket = ZmqSocket;

    fn socket(&self, kind: SocketKind) -> Result<ZmqSocket, TransportError> {
        let ctx = self.inner.as_ref().ok_or(TransportError::Terminated)?;
        let zmq_kind = match kind {
            SocketKind::Pub => zmq::PUB,
            SocketKind::Sub => zmq::SUB,
        };

        let sock = retry_interrupted(|| ctx.socket(zmq_kind)).map_err(TransportError::zmq("zmq_socket"))?;
        // Pending outbound messages must never hold up context termination.
        retry_interrupted(|| sock.set_linger(0)).map_err(TransportError::zmq("setsockopt(ZMQ_LINGER)"))?;

        self.open_sockets.fetch_add(1, Ordering::SeqCst);
        log::trace!("[zmq] opened {} socket", kind);

        Ok(ZmqSocket {
            inner: Some(sock),
            kind,
            open_sockets: Arc::clone(&self.open_sockets),
        })
    }

    fn terminate(&mut self) -> Result<(), TransportError> {
        if self.inner.is_none() {
            return Ok(());
        }

        let open = self.open_sockets();
        if open > 0 {
            return Err(TransportError::SocketsOpen(open));
        }

        // Sockets keep their own handle on the libzmq context; once they are
        // all closed this is the last one and dropping it runs zmq_ctx_term.
        self.inner = None;
        log::trace!("[zmq] context terminated");
        Ok(())
    }
}

/// ZeroMQ socket created by a [`ZmqContext`].
pub struct ZmqSocket {
    inner: Option<zmq::Socket>,
    kind: SocketKind,
    open_sockets: Arc<AtomicUsize>,
}

impl ZmqSocket {
    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Endpoint of the last bind/connect, with wildcards resolved
    /// (e.g. `tcp://127.0.0.1:*` becomes the actual port).
    pub fn last_endpoint(&self) -> Result<String, TransportError> {
        let sock = self.live()?;
        let endpoint = retry_interrupted(|| sock.get_last_endpoint())
            .map_err(TransportError::zmq("getsockopt(ZMQ_LAST_ENDPOINT)"))?;
        Ok(endpoint.unwrap_or_else(|raw| String::from_utf8_lossy(&raw).into_owned()))
    }

    pub fn unbind(&self, endpoint: &str) -> Result<(), TransportError> {
        let sock = self.live()?;
        retry_interrupted(|| sock.unbind(endpoint)).map_err(TransportError::endpoint("unbind", endpoint))
    }

    fn live(&self) -> Result<&zmq::Socket, TransportError> {
        self.inner.as_ref().ok_or(TransportError::Closed)
    }
}

impl Pollable for ZmqSocket {
    fn notification_fd(&self) -> Result<RawFd, TransportError> {
        let sock = self.live()?;
        retry_interrupted(|| sock.get_fd()).map_err(TransportError::zmq("getsockopt(ZMQ_FD)"))
    }

    fn events(&self) -> Result<SocketEvents, TransportError> {
        let sock = self.live()?;
        let raw = retry_interrupted(|| sock.get_events()).map_err(TransportError::zmq("getsockopt(ZMQ_EVENTS)"))?;

        let mut events = SocketEvents::NONE;
        if raw.contains(zmq::POLLIN) {
            events = events | SocketEvents::INCOMING;
        }
        if raw.contains(zmq::POLLOUT) {
            events = events | SocketEvents::OUTGOING;
        }
        Ok(events)
    }
}

impl TransportSocket for ZmqSocket {
    fn bind(&self, endpoint: &str) -> Result<(), TransportError> {
        let sock = self.live()?;
        retry_interrupted(|| sock.bind(endpoint)).map_err(TransportError::endpoint("bind", endpoint))
    }

    fn connect(&self, endpoint: &str) -> Result<(), TransportError> {
        let sock = self.live()?;
        retry_interrupted(|| sock.connect(endpoint)).map_err(TransportError::endpoint("connect", endpoint))
    }

    fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        let sock = self.live()?;
        retry_interrupted(|| sock.send(payload, 0)).map_err(TransportError::zmq("zmq_send"))
    }

    fn recv_nonblocking(&self, buf: &mut [u8]) -> Result<Option<usize>, TransportError> {
        let sock = self.live()?;
        match retry_interrupted(|| sock.recv_into(buf, zmq::DONTWAIT)) {
            Ok(size) if size > buf.len() => Err(TransportError::Truncated {
                size,
                capacity: buf.len(),
            }),
            Ok(size) => Ok(Some(size)),
            Err(zmq::Error::EAGAIN) => Ok(None),
            Err(source) => Err(TransportError::Zmq {
                op: "zmq_recv",
                source,
            }),
        }
    }

    fn add_subscribe_filter(&self, prefix: &[u8]) -> Result<(), TransportError> {
        let sock = self.live()?;
        retry_interrupted(|| sock.set_subscribe(prefix)).map_err(TransportError::zmq("setsockopt(ZMQ_SUBSCRIBE)"))
    }

    fn remove_subscribe_filter(&self, prefix: &[u8]) -> Result<(), TransportError> {
        let sock = self.live()?;
        retry_interrupted(|| sock.set_unsubscribe(prefix))
            .map_err(TransportError::zmq("setsockopt(ZMQ_UNSUBSCRIBE)"))
    }

    fn close(&mut self) -> Result<(), TransportError> {
        // zmq::Socket closes itself on drop and retries EINTR there.
        if self.inner.take().is_some() {
            self.open_sockets.fetch_sub(1, Ordering::SeqCst);
            log::trace!("[zmq] closed {} socket", self.kind);
        }
        Ok(())
    }
}

impl Drop for ZmqSocket {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
