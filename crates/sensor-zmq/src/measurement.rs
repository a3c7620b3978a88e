// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 home-sensors

//! Measurement record and its wire format.
//!
//! Wire payload: a JSON object
//! `{"device_id": <int>, "type": <string>, "value": <float>, "timestamp": <int>}`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Payloads longer than this are shortened in error messages.
const PAYLOAD_PREVIEW_LEN: usize = 128;

/// One sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub device_id: i64,
    #[serde(rename = "type")]
    pub mtype: String,
    pub value: f64,
    pub timestamp: i64,
}

impl Measurement {
    pub fn new(device_id: i64, mtype: impl Into<String>, value: f64, timestamp: i64) -> Self {
        Self {
            device_id,
            mtype: mtype.into(),
            value,
            timestamp,
        }
    }

    /// Decode one wire payload.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(payload).map_err(|source| DecodeError {
            payload: preview(payload),
            source,
        })
    }

    /// Encode to the wire format.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "device {} {}={} @{}",
            self.device_id, self.mtype, self.value, self.timestamp
        )
    }
}

/// A payload that is not a valid measurement record.
#[derive(Debug, Error)]
#[error("cannot decode measurement '{payload}': {source}")]
pub struct DecodeError {
    /// Offending payload (lossy UTF-8, possibly shortened).
    pub payload: String,
    #[source]
    pub source: serde_json::Error,
}

fn preview(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    if text.chars().count() <= PAYLOAD_PREVIEW_LEN {
        return text.into_owned();
    }
    let mut short: String = text.chars().take(PAYLOAD_PREVIEW_LEN).collect();
    short.push_str("...");
    short
}
