// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 home-sensors

//! HTTP ingestion API sink.
//!
//! The API identifies measurement types by numeric id. The sink keeps a
//! name -> id map fetched from `GET <base>/mtypes/`, replaced wholesale on
//! every refresh, and posts each measurement to `POST <base>/measurements/`.
//!
//! The cache lock only covers the map read or swap, never a request.

use super::{PublishError, Publisher};
use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use sensor_zmq::Measurement;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct Catalog {
    mtypes: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    id: i64,
    name: String,
}

/// Body of `POST <base>/measurements/`.
#[derive(Debug, Serialize)]
struct MeasurementRecord {
    sensor_id: i64,
    mtype_id: i64,
    timestamp: i64,
    value: f64,
}

struct TypeCache {
    ids: HashMap<String, i64>,
    refreshed_at: Instant,
}

/// Sink posting measurements to the ingestion API.
pub struct WebPublisher {
    base_url: String,
    mtypes_url: String,
    measurements_url: String,
    refresh_interval: Duration,
    client: Client,
    cache: Mutex<TypeCache>,
}

impl WebPublisher {
    /// Create the sink and fetch the initial type catalog.
    ///
    /// Fails if the catalog cannot be fetched.
    pub fn new(base_url: &str, refresh_interval: Duration) -> Result<Self, PublishError> {
        let base = base_url.trim_end_matches('/');
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(PublishError::Client)?;

        let publisher = Self {
            base_url: base.to_string(),
            mtypes_url: format!("{}/mtypes/", base),
            measurements_url: format!("{}/measurements/", base),
            refresh_interval,
            client,
            cache: Mutex::new(TypeCache {
                ids: HashMap::new(),
                refreshed_at: Instant::now(),
            }),
        };

        publisher.refresh_types()?;
        tracing::debug!(
            url = %publisher.base_url,
            types = ?publisher.supported_types(),
            "Web publisher ready"
        );
        Ok(publisher)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Re-fetch the catalog and replace the cache.
    ///
    /// On failure the cache and its timestamp are left untouched.
    pub fn refresh_types(&self) -> Result<(), PublishError> {
        let ids = self.fetch_catalog()?;

        let mut cache = self.cache.lock();
        cache.ids = ids;
        cache.refreshed_at = Instant::now();
        Ok(())
    }

    /// Supported type names, sorted.
    pub fn supported_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cache.lock().ids.keys().cloned().collect();
        names.sort();
        names
    }

    /// Id of `name` in the current cache.
    pub fn type_id(&self, name: &str) -> Option<i64> {
        self.cache.lock().ids.get(name).copied()
    }

    fn is_stale(&self) -> bool {
        self.cache.lock().refreshed_at.elapsed() > self.refresh_interval
    }

    fn fetch_catalog(&self) -> Result<HashMap<String, i64>, PublishError> {
        let url = &self.mtypes_url;
        let resp = self.client.get(url).send().map_err(|source| PublishError::Http {
            url: url.clone(),
            source,
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PublishError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        let catalog: Catalog = resp.json().map_err(|source| PublishError::Catalog {
            url: url.clone(),
            source,
        })?;

        Ok(catalog
            .mtypes
            .into_iter()
            .map(|entry| (entry.name, entry.id))
            .collect())
    }
}

impl Publisher for WebPublisher {
    fn publish(&self, measurement: &Measurement) -> Result<(), PublishError> {
        if self.is_stale() {
            // A failed refresh keeps the old mapping; the next publish retries.
            if let Err(e) = self.refresh_types() {
                tracing::warn!(error = %e, "Measurement type refresh failed, using cached types");
            }
        }

        let mtype_id = self
            .type_id(&measurement.mtype)
            .ok_or_else(|| PublishError::UnsupportedType(measurement.mtype.clone()))?;

        let record = MeasurementRecord {
            sensor_id: measurement.device_id,
            mtype_id,
            timestamp: measurement.timestamp,
            value: measurement.value,
        };

        let url = &self.measurements_url;
        let resp = self
            .client
            .post(url)
            .json(&record)
            .send()
            .map_err(|source| PublishError::Http {
                url: url.clone(),
                source,
            })?;

        if resp.status() != StatusCode::OK {
            return Err(PublishError::Status {
                url: url.clone(),
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("Web Publisher (url '{}')", self.base_url)
    }

    fn close(&self) -> Result<(), PublishError> {
        Ok(())
    }
}
