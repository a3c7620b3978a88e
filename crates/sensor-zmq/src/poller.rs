// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 home-sensors

//! Readiness multiplexer over transport notification descriptors.
//!
//! A socket's notification descriptor is edge-triggered: it becomes readable
//! when the socket's event state *changes*, not while data is queued. Each
//! cycle therefore runs two checks:
//!
//! 1. `poll(2)` on every descriptor (coarse: "something changed"),
//! 2. the socket's event bitmask for every coarse-ready socket
//!    (authoritative: "a receive would succeed now").
//!
//! Only sockets passing both are reported. Callers still have to drain a
//! reported socket until it would block, see [`Subscriber`](crate::Subscriber).

use crate::error::TransportError;
use crate::socket::Pollable;
use std::collections::HashSet;
use std::io;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

/// Fixed, non-empty set of sockets polled for incoming data.
pub struct ReadPoller<S> {
    sockets: Vec<S>,
    fds: Vec<RawFd>,
}

impl<S: Pollable> ReadPoller<S> {
    /// Build a poller over `sockets`.
    ///
    /// Fails on an empty list and on two sockets sharing one notification
    /// descriptor.
    pub fn new(sockets: Vec<S>) -> Result<Self, TransportError> {
        if sockets.is_empty() {
            return Err(TransportError::EmptySocketList);
        }

        let mut fds = Vec::with_capacity(sockets.len());
        let mut seen = HashSet::with_capacity(sockets.len());
        for socket in &sockets {
            let fd = socket.notification_fd()?;
            if !seen.insert(fd) {
                return Err(TransportError::DuplicateDescriptor(fd));
            }
            fds.push(fd);
        }

        log::debug!("[poller] watching {} socket(s): fds={:?}", sockets.len(), fds);
        Ok(Self { sockets, fds })
    }

    /// Wait up to `timeout` (`None` = forever) and append the indices of
    /// sockets with incoming data to `ready`.
    ///
    /// A timeout is not an error: `ready` is simply left unchanged. If the
    /// bitmask query fails for one socket, the indices appended for earlier
    /// sockets in the same cycle are kept and the error is returned.
    pub fn poll_ready(&self, timeout: Option<Duration>, ready: &mut Vec<usize>) -> Result<(), TransportError> {
        let mut pollfds: Vec<libc::pollfd> = self
            .fds
            .iter()
            .map(|&fd| libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();

        let signalled = wait_readable(&mut pollfds, timeout)?;

        let mut processed = 0;
        for (index, pfd) in pollfds.iter().enumerate() {
            if processed == signalled {
                break;
            }
            if pfd.revents == 0 {
                continue;
            }
            processed += 1;

            if pfd.revents & libc::POLLIN == 0 {
                // POLLERR/POLLHUP/POLLNVAL on a transport descriptor: not data.
                log::debug!("[poller] fd {} revents=0x{:x} without POLLIN", pfd.fd, pfd.revents);
                continue;
            }
            if self.sockets[index].has_incoming()? {
                ready.push(index);
            }
        }
        Ok(())
    }

    /// Convenience form of [`poll_ready`](Self::poll_ready) returning the
    /// ready sockets themselves.
    pub fn poll(&self, timeout: Option<Duration>) -> Result<Vec<&S>, TransportError> {
        let mut ready = Vec::new();
        self.poll_ready(timeout, &mut ready)?;
        Ok(ready.into_iter().map(|i| &self.sockets[i]).collect())
    }
}

impl<S> ReadPoller<S> {
    pub fn sockets(&self) -> &[S] {
        &self.sockets
    }

    pub fn socket(&self, index: usize) -> Option<&S> {
        self.sockets.get(index)
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    /// Always false: construction rejects an empty set.
    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    pub fn into_sockets(self) -> Vec<S> {
        self.sockets
    }
}

/// `poll(2)` with EINTR retried against the original deadline.
fn wait_readable(pollfds: &mut [libc::pollfd], timeout: Option<Duration>) -> Result<usize, TransportError> {
    // A timeout too large to represent as an Instant waits forever.
    let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

    loop {
        let timeout_ms = match deadline {
            None => -1,
            Some(deadline) => to_poll_millis(deadline.saturating_duration_since(Instant::now())),
        };

        // SAFETY: pollfds is a live, exclusively borrowed slice of pollfd structs
        // and its length is passed alongside the pointer.
        let res = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms) };
        if res >= 0 {
            return Ok(res as usize);
        }

        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            log::trace!("[poller] poll interrupted, retrying");
            continue;
        }
        return Err(TransportError::Poll(err));
    }
}

/// Round up so that a sub-millisecond remainder still waits instead of
/// spinning with a zero timeout.
fn to_poll_millis(remaining: Duration) -> libc::c_int {
    let ms = remaining.as_micros().div_ceil(1000);
    ms.try_into().unwrap_or(libc::c_int::MAX)
}
