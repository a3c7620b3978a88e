// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 home-sensors

//! Background refresh of the web sink's measurement type catalog.

use crate::publisher::WebPublisher;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Thread refreshing a [`WebPublisher`]'s type cache every `interval`,
/// independently of the relay loop.
pub struct TypeRefresher {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TypeRefresher {
    pub fn spawn(publisher: Arc<WebPublisher>, interval: Duration) -> io::Result<Self> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("type-refresh".into())
            .spawn(move || {
                tracing::debug!(interval_secs = interval.as_secs(), "Type refresher started");
                let mut known = publisher.supported_types();

                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    if let Err(e) = publisher.refresh_types() {
                        tracing::warn!(error = %e, "Background type refresh failed");
                        continue;
                    }

                    let current = publisher.supported_types();
                    if current != known {
                        tracing::info!(types = ?current, "Supported measurement types changed");
                        known = current;
                    }
                }
                tracing::debug!("Type refresher stopped");
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wake the thread and wait for it. Calling it again is a no-op.
    pub fn stop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Type refresher thread panicked");
            }
        }
    }
}

impl Drop for TypeRefresher {
    fn drop(&mut self) {
        self.stop();
    }
}
