// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 home-sensors

//! Relay loop: receive a batch, publish each measurement, repeat.
//!
//! Delivery is best effort. A measurement that fails to publish is logged,
//! counted and dropped.

use crate::publisher::Publisher;
use sensor_zmq::{Measurement, Subscriber, SubscriberError, Transport};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where measurements come from.
pub trait MeasurementSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Append newly available measurements to `out`, waiting up to
    /// `timeout`. On error, measurements appended before it stay in `out`.
    fn recv_batch(&mut self, timeout: Duration, out: &mut Vec<Measurement>) -> Result<usize, Self::Error>;

    fn close(&mut self) -> Result<(), Self::Error>;
}

impl<T: Transport> MeasurementSource for Subscriber<T> {
    type Error = SubscriberError;

    fn recv_batch(&mut self, timeout: Duration, out: &mut Vec<Measurement>) -> Result<usize, SubscriberError> {
        self.recv(timeout, out)
    }

    fn close(&mut self) -> Result<(), SubscriberError> {
        Subscriber::close(self)
    }
}

/// Relay statistics.
#[derive(Debug)]
pub struct RelayStats {
    pub received: AtomicU64,
    pub published: AtomicU64,
    pub publish_errors: AtomicU64,
    pub recv_errors: AtomicU64,
    pub started: Instant,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            published: AtomicU64::new(0),
            publish_errors: AtomicU64::new(0),
            recv_errors: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Get snapshot of current stats.
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_errors: self.publish_errors.load(Ordering::Relaxed),
            recv_errors: self.recv_errors.load(Ordering::Relaxed),
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of relay statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayStatsSnapshot {
    pub received: u64,
    pub published: u64,
    pub publish_errors: u64,
    pub recv_errors: u64,
    pub uptime_secs: u64,
}

impl RelayStatsSnapshot {
    /// Published measurements per second of uptime.
    pub fn messages_per_second(&self) -> f64 {
        if self.uptime_secs > 0 {
            self.published as f64 / self.uptime_secs as f64
        } else {
            0.0
        }
    }
}

/// Stops a running [`Relay`] from another thread (e.g. a signal handler).
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    /// Stop the relay after its current cycle.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Single consumer loop forwarding measurements from a source to a sink.
pub struct Relay<S, P> {
    source: S,
    publisher: P,
    poll_timeout: Duration,
    stats_interval: Option<Duration>,
    debug: bool,
    running: Arc<AtomicBool>,
    stats: Arc<RelayStats>,
    batch: Vec<Measurement>,
}

impl<S: MeasurementSource, P: Publisher> Relay<S, P> {
    pub fn new(source: S, publisher: P, poll_timeout: Duration) -> Self {
        Self {
            source,
            publisher,
            poll_timeout,
            stats_interval: None,
            debug: false,
            running: Arc::new(AtomicBool::new(true)),
            stats: Arc::new(RelayStats::new()),
            batch: Vec::new(),
        }
    }

    /// Log a statistics line every `interval` (`None` disables).
    pub fn with_stats_interval(mut self, interval: Option<Duration>) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Log every relayed measurement.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
        }
    }

    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// One receive + publish cycle. Returns the number of measurements
    /// published successfully.
    pub fn run_once(&mut self) -> usize {
        self.batch.clear();
        if let Err(e) = self.source.recv_batch(self.poll_timeout, &mut self.batch) {
            self.stats.recv_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %e, partial = self.batch.len(), "Failed to receive measurements");
        }
        self.stats
            .received
            .fetch_add(self.batch.len() as u64, Ordering::Relaxed);

        let mut published = 0;
        for m in &self.batch {
            if self.debug {
                tracing::debug!(
                    device_id = m.device_id,
                    mtype = %m.mtype,
                    value = m.value,
                    timestamp = m.timestamp,
                    "Received measurement"
                );
            }

            match self.publisher.publish(m) {
                Ok(()) => {
                    published += 1;
                    self.stats.published.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.stats.publish_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(error = %e, measurement = %m, "Failed to publish measurement");
                }
            }
        }
        published
    }

    /// Run until [`StopHandle::stop`] is called.
    pub fn run(&mut self) {
        tracing::info!(publisher = %self.publisher.describe(), "Relay started");
        let mut last_report = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            self.run_once();

            if let Some(interval) = self.stats_interval {
                if last_report.elapsed() >= interval {
                    log_stats(&self.stats.snapshot());
                    last_report = Instant::now();
                }
            }
        }

        tracing::info!("Relay stopped");
    }

    /// Hand the source and the publisher back for teardown.
    pub fn into_parts(self) -> (S, P) {
        (self.source, self.publisher)
    }
}

fn log_stats(stats: &RelayStatsSnapshot) {
    tracing::info!(
        received = stats.received,
        published = stats.published,
        publish_errors = stats.publish_errors,
        recv_errors = stats.recv_errors,
        msgs_per_sec = stats.messages_per_second(),
        "Relay statistics"
    );
}
