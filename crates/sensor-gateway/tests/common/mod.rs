// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 home-sensors

//! In-process mock of the ingestion API.
//!
//! Serves `GET /api/mtypes/` and `POST /api/measurements/` from an axum
//! router on a current-thread tokio runtime in its own thread, so the
//! blocking HTTP client under test never runs inside the runtime.

#![allow(dead_code)]

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;

pub struct MockState {
    /// `None` serves an empty body.
    catalog: Mutex<Option<Value>>,
    catalog_status: Mutex<StatusCode>,
    post_status: Mutex<StatusCode>,
    posted: Mutex<Vec<Value>>,
    catalog_hits: AtomicUsize,
}

pub struct MockApi {
    pub base_url: String,
    state: Arc<MockState>,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

/// `{"mtypes": [{"id": .., "name": ..}, ..]}` from `(name, id)` pairs.
pub fn catalog(types: &[(&str, i64)]) -> Value {
    let mtypes: Vec<Value> = types
        .iter()
        .map(|(name, id)| json!({"id": id, "name": name}))
        .collect();
    json!({ "mtypes": mtypes })
}

impl MockApi {
    pub fn start(types: &[(&str, i64)]) -> Self {
        let state = Arc::new(MockState {
            catalog: Mutex::new(Some(catalog(types))),
            catalog_status: Mutex::new(StatusCode::OK),
            post_status: Mutex::new(StatusCode::OK),
            posted: Mutex::new(Vec::new()),
            catalog_hits: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/api/mtypes/", get(get_mtypes))
            .route("/api/measurements/", post(post_measurement))
            .with_state(Arc::clone(&state));

        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind mock API");
        listener.set_nonblocking(true).expect("nonblocking listener");
        let addr = listener.local_addr().expect("local addr");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let thread = thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("tokio runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).expect("tokio listener");
                axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    })
                    .await
                    .expect("mock API server");
            });
        });

        Self {
            base_url: format!("http://{}/api", addr),
            state,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        }
    }

    pub fn set_catalog(&self, types: &[(&str, i64)]) {
        *self.state.catalog.lock() = Some(catalog(types));
    }

    pub fn set_empty_catalog_body(&self) {
        *self.state.catalog.lock() = None;
    }

    pub fn set_catalog_status(&self, status: StatusCode) {
        *self.state.catalog_status.lock() = status;
    }

    pub fn set_post_status(&self, status: StatusCode) {
        *self.state.post_status.lock() = status;
    }

    pub fn posted(&self) -> Vec<Value> {
        self.state.posted.lock().clone()
    }

    pub fn catalog_hits(&self) -> usize {
        self.state.catalog_hits.load(Ordering::SeqCst)
    }
}

impl Drop for MockApi {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

async fn get_mtypes(State(state): State<Arc<MockState>>) -> (StatusCode, String) {
    state.catalog_hits.fetch_add(1, Ordering::SeqCst);
    let status = *state.catalog_status.lock();
    let body = state
        .catalog
        .lock()
        .as_ref()
        .map(Value::to_string)
        .unwrap_or_default();
    (status, body)
}

async fn post_measurement(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> StatusCode {
    state.posted.lock().push(body);
    *state.post_status.lock()
}
