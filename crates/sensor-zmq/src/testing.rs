// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 home-sensors

//! In-crate fake transport for deterministic edge-triggered tests.
//!
//! The notification descriptor is a Linux eventfd the test raises and clears
//! explicitly, so "data queued but no wake-up" and "wake-up without data"
//! can both be staged.

use crate::error::TransportError;
use crate::socket::{Pollable, SocketEvents, SocketKind, Transport, TransportSocket};
use std::collections::VecDeque;
use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const EVENTFD_FLAGS: libc::c_int = libc::EFD_NONBLOCK | libc::EFD_CLOEXEC;

pub(crate) struct FakeSocket {
    fd: RawFd,
    queue: Mutex<VecDeque<Vec<u8>>>,
    filters: Mutex<Vec<Vec<u8>>>,
    connected: Mutex<Option<String>>,
    fail_events: AtomicBool,
    fail_connect: AtomicBool,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl FakeSocket {
    pub(crate) fn new() -> Self {
        // SAFETY: eventfd is invoked with valid flags and no shared state.
        let fd = unsafe { libc::eventfd(0, EVENTFD_FLAGS) };
        assert!(fd >= 0, "eventfd failed: {}", io::Error::last_os_error());
        Self {
            fd,
            queue: Mutex::new(VecDeque::new()),
            filters: Mutex::new(Vec::new()),
            connected: Mutex::new(None),
            fail_events: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// Queue a message and raise the notification descriptor.
    pub(crate) fn push(&self, payload: &[u8]) {
        self.queue.lock().expect("queue lock").push_back(payload.to_vec());
        self.notify();
    }

    pub(crate) fn notify(&self) {
        let payload = 1u64.to_ne_bytes();
        // SAFETY: payload is a stack buffer with the 8-byte eventfd payload.
        let ret = unsafe { libc::write(self.fd, payload.as_ptr().cast(), payload.len()) };
        assert!(ret >= 0, "eventfd write failed: {}", io::Error::last_os_error());
    }

    pub(crate) fn clear_notification(&self) {
        let mut payload = [0u8; 8];
        // SAFETY: payload is a stack buffer sized for the eventfd counter.
        // EAGAIN (already clear) is fine.
        unsafe { libc::read(self.fd, payload.as_mut_ptr().cast(), payload.len()) };
    }

    pub(crate) fn fail_events(&self, fail: bool) {
        self.fail_events.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn pending(&self) -> usize {
        self.queue.lock().expect("queue lock").len()
    }

    pub(crate) fn filters(&self) -> Vec<Vec<u8>> {
        self.filters.lock().expect("filters lock").clone()
    }

    pub(crate) fn connected_to(&self) -> Option<String> {
        self.connected.lock().expect("connected lock").clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

impl Drop for FakeSocket {
    fn drop(&mut self) {
        // SAFETY: the eventfd was obtained via libc::eventfd and is closed once here.
        unsafe {
            libc::close(self.fd);
        }
    }
}

impl Pollable for FakeSocket {
    fn notification_fd(&self) -> Result<RawFd, TransportError> {
        self.check_open()?;
        Ok(self.fd)
    }

    fn events(&self) -> Result<SocketEvents, TransportError> {
        self.check_open()?;
        if self.fail_events.load(Ordering::SeqCst) {
            return Err(TransportError::Zmq {
                op: "getsockopt(ZMQ_EVENTS)",
                source: zmq::Error::EINVAL,
            });
        }
        if self.pending() > 0 {
            Ok(SocketEvents::INCOMING | SocketEvents::OUTGOING)
        } else {
            Ok(SocketEvents::OUTGOING)
        }
    }
}

impl TransportSocket for FakeSocket {
    fn bind(&self, endpoint: &str) -> Result<(), TransportError> {
        self.connect(endpoint)
    }

    fn connect(&self, endpoint: &str) -> Result<(), TransportError> {
        self.check_open()?;
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Endpoint {
                op: "connect",
                endpoint: endpoint.to_string(),
                source: zmq::Error::EINVAL,
            });
        }
        *self.connected.lock().expect("connected lock") = Some(endpoint.to_string());
        Ok(())
    }

    fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.check_open()?;
        self.push(payload);
        Ok(())
    }

    fn recv_nonblocking(&self, buf: &mut [u8]) -> Result<Option<usize>, TransportError> {
        self.check_open()?;
        let Some(message) = self.queue.lock().expect("queue lock").pop_front() else {
            return Ok(None);
        };
        if message.len() > buf.len() {
            return Err(TransportError::Truncated {
                size: message.len(),
                capacity: buf.len(),
            });
        }
        buf[..message.len()].copy_from_slice(&message);
        Ok(Some(message.len()))
    }

    fn add_subscribe_filter(&self, prefix: &[u8]) -> Result<(), TransportError> {
        self.check_open()?;
        self.filters.lock().expect("filters lock").push(prefix.to_vec());
        Ok(())
    }

    fn remove_subscribe_filter(&self, prefix: &[u8]) -> Result<(), TransportError> {
        self.check_open()?;
        self.filters.lock().expect("filters lock").retain(|f| f != prefix);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        FakeSocket::close_shared(self)
    }
}

impl FakeSocket {
    fn close_shared(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Handle used by [`FakeTransport`] so the test keeps access to the socket
/// after handing it to a subscriber.
impl Pollable for Arc<FakeSocket> {
    fn notification_fd(&self) -> Result<RawFd, TransportError> {
        self.as_ref().notification_fd()
    }

    fn events(&self) -> Result<SocketEvents, TransportError> {
        self.as_ref().events()
    }
}

impl TransportSocket for Arc<FakeSocket> {
    fn bind(&self, endpoint: &str) -> Result<(), TransportError> {
        self.as_ref().bind(endpoint)
    }

    fn connect(&self, endpoint: &str) -> Result<(), TransportError> {
        self.as_ref().connect(endpoint)
    }

    fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.as_ref().send(payload)
    }

    fn recv_nonblocking(&self, buf: &mut [u8]) -> Result<Option<usize>, TransportError> {
        self.as_ref().recv_nonblocking(buf)
    }

    fn add_subscribe_filter(&self, prefix: &[u8]) -> Result<(), TransportError> {
        self.as_ref().add_subscribe_filter(prefix)
    }

    fn remove_subscribe_filter(&self, prefix: &[u8]) -> Result<(), TransportError> {
        self.as_ref().remove_subscribe_filter(prefix)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.as_ref().close_shared()
    }
}

/// Transport handing out one shared [`FakeSocket`].
pub(crate) struct FakeTransport {
    pub(crate) socket: Arc<FakeSocket>,
    terminated: Arc<AtomicBool>,
    terminate_calls: Arc<AtomicUsize>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self {
            socket: Arc::new(FakeSocket::new()),
            terminated: Arc::new(AtomicBool::new(false)),
            terminate_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Observer for termination that outlives the transport itself.
    pub(crate) fn termination(&self) -> (Arc<AtomicBool>, Arc<AtomicUsize>) {
        (Arc::clone(&self.terminated), Arc::clone(&self.terminate_calls))
    }
}

impl Transport for FakeTransport {
    type Socket = Arc<FakeSocket>;

    fn socket(&self, _kind: SocketKind) -> Result<Arc<FakeSocket>, TransportError> {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(TransportError::Terminated);
        }
        Ok(Arc::clone(&self.socket))
    }

    fn terminate(&mut self) -> Result<(), TransportError> {
        self.terminate_calls.fetch_add(1, Ordering::SeqCst);
        if self.terminated.load(Ordering::SeqCst) {
            return Ok(());
        }
        if !self.socket.is_closed() {
            return Err(TransportError::SocketsOpen(1));
        }
        self.terminated.store(true, Ordering::SeqCst);
        Ok(())
    }
}
