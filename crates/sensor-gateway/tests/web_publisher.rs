// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 home-sensors

//! Web sink against the mock ingestion API.

mod common;

use axum::http::StatusCode;
use common::MockApi;
use sensor_gateway::{PublishError, Publisher, WebPublisher};
use sensor_zmq::Measurement;
use serde_json::json;
use std::thread;
use std::time::Duration;

const LONG: Duration = Duration::from_secs(3600);

#[test]
fn test_publish_translates_type_name() {
    let api = MockApi::start(&[("Some type", 1)]);
    let publisher = WebPublisher::new(&api.base_url, LONG).expect("publisher");

    assert_eq!(publisher.supported_types(), vec!["Some type"]);
    assert_eq!(publisher.type_id("Some type"), Some(1));

    publisher
        .publish(&Measurement::new(99, "Some type", 90.7, 12))
        .expect("publish");

    assert_eq!(
        api.posted(),
        vec![json!({"sensor_id": 99, "mtype_id": 1, "timestamp": 12, "value": 90.7})]
    );
    assert_eq!(publisher.describe(), format!("Web Publisher (url '{}')", api.base_url));
}

#[test]
fn test_unknown_type_rejected() {
    let api = MockApi::start(&[("Some type", 1)]);
    let publisher = WebPublisher::new(&api.base_url, LONG).expect("publisher");

    let err = publisher
        .publish(&Measurement::new(99, "Other", 1.0, 12))
        .expect_err("unknown type");
    assert!(matches!(err, PublishError::UnsupportedType(ref t) if t == "Other"));
    assert!(err.to_string().contains("Other"));

    assert!(api.posted().is_empty());
    assert_eq!(publisher.supported_types(), vec!["Some type"]);
}

#[test]
fn test_non_200_is_publish_failure() {
    let api = MockApi::start(&[("Some type", 1)]);
    let publisher = WebPublisher::new(&api.base_url, LONG).expect("publisher");
    api.set_post_status(StatusCode::CREATED);

    let err = publisher
        .publish(&Measurement::new(1, "Some type", 1.0, 1))
        .expect_err("201 is not 200");
    assert!(matches!(err, PublishError::Status { status: 201, .. }), "{err}");
    assert!(err.to_string().contains("HTTP status 201"));

    api.set_post_status(StatusCode::INTERNAL_SERVER_ERROR);
    let err = publisher
        .publish(&Measurement::new(1, "Some type", 1.0, 1))
        .expect_err("500");
    assert!(err.to_string().contains("HTTP status 500"));
}

#[test]
fn test_construction_needs_catalog() {
    let api = MockApi::start(&[]);

    api.set_empty_catalog_body();
    let err = WebPublisher::new(&api.base_url, LONG).err().expect("empty body");
    assert!(matches!(err, PublishError::Catalog { .. }), "{err}");

    api.set_catalog(&[("Some type", 1)]);
    api.set_catalog_status(StatusCode::SERVICE_UNAVAILABLE);
    let err = WebPublisher::new(&api.base_url, LONG).err().expect("503");
    assert!(matches!(err, PublishError::Status { status: 503, .. }), "{err}");

    api.set_catalog_status(StatusCode::OK);
    WebPublisher::new(&format!("{}/", api.base_url), LONG).expect("trailing slash is tolerated");
}

#[test]
fn test_stale_cache_refreshed_before_lookup() {
    let api = MockApi::start(&[("Some type", 1)]);
    let publisher = WebPublisher::new(&api.base_url, Duration::from_millis(500)).expect("publisher");
    assert_eq!(api.catalog_hits(), 1);

    api.set_catalog(&[("Some type", 1), ("Humidity", 2)]);

    // Within the interval the old mapping is used.
    let err = publisher
        .publish(&Measurement::new(5, "Humidity", 40.0, 3))
        .expect_err("not known yet");
    assert!(matches!(err, PublishError::UnsupportedType(_)));
    assert_eq!(api.catalog_hits(), 1);

    thread::sleep(Duration::from_millis(600));
    publisher
        .publish(&Measurement::new(5, "Humidity", 40.0, 3))
        .expect("refreshed before lookup");
    assert_eq!(api.catalog_hits(), 2);
    assert_eq!(api.posted()[0]["mtype_id"], 2);
}

#[test]
fn test_refresh_replaces_whole_catalog() {
    let api = MockApi::start(&[("Some type", 1), ("Humidity", 2)]);
    let publisher = WebPublisher::new(&api.base_url, LONG).expect("publisher");

    api.set_catalog(&[("Pressure", 3)]);
    publisher.refresh_types().expect("refresh");

    assert_eq!(publisher.supported_types(), vec!["Pressure"]);
    assert_eq!(publisher.type_id("Some type"), None);
}

#[test]
fn test_failed_refresh_keeps_previous_mapping() {
    let api = MockApi::start(&[("Some type", 1)]);
    let publisher = WebPublisher::new(&api.base_url, Duration::from_millis(50)).expect("publisher");

    api.set_catalog_status(StatusCode::INTERNAL_SERVER_ERROR);
    thread::sleep(Duration::from_millis(100));

    publisher
        .publish(&Measurement::new(7, "Some type", 1.0, 1))
        .expect("stale mapping still used");
    assert_eq!(api.posted()[0]["mtype_id"], 1);
    assert_eq!(api.catalog_hits(), 2);

    // The timestamp was not advanced, so the next publish retries.
    publisher
        .publish(&Measurement::new(7, "Some type", 2.0, 2))
        .expect("publish");
    assert_eq!(api.catalog_hits(), 3);

    assert!(publisher.refresh_types().is_err());
    assert_eq!(publisher.supported_types(), vec!["Some type"]);
}
