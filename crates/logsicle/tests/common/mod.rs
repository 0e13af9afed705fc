//! Mock ingestion backend shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use logsicle::{Config, QueueEvent};
use serde_json::Value;
use tokio::sync::broadcast;

pub const API_KEY: &str = "test-api-key";
pub const PROJECT_ID: &str = "proj-integration";

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub resource_type: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub status: StatusCode,
}

impl CapturedRequest {
    /// Decodes the JSON array body, decompressing zstd bodies first.
    pub fn payloads(&self) -> Vec<Value> {
        let raw = if self.headers.get("content-encoding").map(String::as_str) == Some("zstd") {
            zstd::decode_all(self.body.as_slice()).expect("zstd body")
        } else {
            self.body.clone()
        };
        serde_json::from_slice(&raw).expect("JSON array body")
    }

    pub fn messages(&self) -> Vec<String> {
        self.payloads()
            .iter()
            .filter_map(|payload| payload.get("message").and_then(Value::as_str))
            .map(ToString::to_string)
            .collect()
    }
}

#[derive(Default)]
struct BackendState {
    requests: Mutex<Vec<CapturedRequest>>,
    script: Mutex<VecDeque<StatusCode>>,
    fallback: Option<StatusCode>,
}

/// Answers `POST /v1/ingest/{resource_type}` with scripted statuses and records every call.
pub struct MockBackend {
    addr: SocketAddr,
    state: Arc<BackendState>,
}

impl MockBackend {
    /// Replays `script`, then answers `fallback` (202 when `None`).
    pub async fn start(script: Vec<StatusCode>, fallback: Option<StatusCode>) -> Self {
        let state = Arc::new(BackendState {
            script: Mutex::new(script.into()),
            fallback,
            ..BackendState::default()
        });

        let app = Router::new()
            .route("/v1/ingest/{resource_type}", post(ingest))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock backend");
        let addr = listener.local_addr().expect("local addr");

        tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Mock backend server failed");
        });

        Self { addr, state }
    }

    pub async fn accepting() -> Self {
        Self::start(Vec::new(), None).await
    }

    /// Fails the first `count` calls with 500, then accepts.
    pub async fn failing_first(count: usize) -> Self {
        Self::start(vec![StatusCode::INTERNAL_SERVER_ERROR; count], None).await
    }

    pub async fn always(status: StatusCode) -> Self {
        Self::start(Vec::new(), Some(status)).await
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.state.requests.lock().expect("lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.requests.lock().expect("lock").len()
    }

    /// Requests the backend answered with a 2xx.
    pub fn accepted(&self) -> Vec<CapturedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.status.is_success())
            .collect()
    }
}

async fn ingest(
    State(state): State<Arc<BackendState>>,
    Path(resource_type): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let scripted = state.script.lock().expect("lock").pop_front();
    let status = scripted
        .or(state.fallback)
        .unwrap_or(StatusCode::ACCEPTED);

    let header_map: HashMap<String, String> = headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
        .collect();
    state.requests.lock().expect("lock").push(CapturedRequest {
        resource_type,
        headers: header_map,
        body: body.to_vec(),
        status,
    });

    let body = if status.is_success() {
        "{}".to_string()
    } else {
        serde_json::json!({
            "error": status.canonical_reason().unwrap_or("error"),
            "message": "mock backend refused the batch",
        })
        .to_string()
    };
    (status, body)
}

/// Fast timings so retries finish in milliseconds.
pub fn test_config(api_url: &str) -> Config {
    let mut config = Config::new(API_KEY, PROJECT_ID);
    config.endpoint.api_url = api_url.to_string();
    config.service_name = Some("integration".to_string());
    config.batching.max_wait = Duration::from_millis(50);
    config.retry.base_delay = Duration::from_millis(10);
    config.retry.max_delay = Duration::from_millis(40);
    config.retry.jitter = false;
    config.flush_timeout = Duration::from_secs(10);
    config.request_timeout = Duration::from_secs(5);
    config
}

/// Everything broadcast so far.
pub fn drain(events: &mut broadcast::Receiver<QueueEvent>) -> Vec<QueueEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
