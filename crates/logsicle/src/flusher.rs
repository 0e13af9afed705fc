//! Delivery of type groups to the ingestion API.
//!
//! ```text
//!   QueueWorker
//!       │ (resource type, JSON array)
//!       v
//!   ┌─────────────┐
//!   │  Compress   │ (optional zstd)
//!   └──────┬──────┘
//!          v
//!   ┌─────────────┐
//!   │ HTTP POST   │ {api_url}/v{version}/ingest/{type}
//!   └──────┬──────┘
//!          v
//!   ┌─────────────┐
//!   │  Classify   │ delivered / retryable / rejected
//!   └─────────────┘
//! ```
//!
//! The flusher never retries on its own. It reports a [`DispatchOutcome`] and the worker decides
//! whether the items go back on the queue.

use std::io::Write;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::CONTENT_ENCODING;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;
use zstd::stream::write::Encoder;

use crate::config::Config;
use crate::error::ClientError;
use crate::http::{build_client, IngestEndpoint};
use crate::resource::ResourceType;

const MAX_ERROR_BODY_CHARS: usize = 512;

/// Result of one POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered { status: u16 },
    /// 429, 5xx, timeouts and connection failures. `status` is `None` when no response arrived.
    Retryable { status: Option<u16>, message: String },
    /// Any other 4xx, or a body that could not be encoded.
    Rejected { status: Option<u16>, message: String },
}

impl DispatchOutcome {
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }
}

/// Sends one serialized type group.
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    async fn dispatch(&self, resource_type: ResourceType, body: Vec<u8>) -> DispatchOutcome;
}

/// Error body returned by the ingestion API on rejection.
#[derive(Debug, Default, Deserialize)]
struct IngestErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Maps an HTTP status and its body to an outcome.
#[must_use]
pub fn classify_status(status: StatusCode, body: &str) -> DispatchOutcome {
    let code = status.as_u16();
    if status.is_success() {
        return DispatchOutcome::Delivered { status: code };
    }
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return DispatchOutcome::Retryable {
            status: Some(code),
            message: describe_error_body(status, body),
        };
    }
    if status.is_client_error() {
        return DispatchOutcome::Rejected {
            status: Some(code),
            message: describe_error_body(status, body),
        };
    }
    // unfollowed redirects and informational codes
    DispatchOutcome::Retryable {
        status: Some(code),
        message: describe_error_body(status, body),
    }
}

fn describe_error_body(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<IngestErrorBody>(body).unwrap_or_default();
    match (parsed.error, parsed.message) {
        (Some(error), Some(message)) => format!("{status}: {error}: {message}"),
        (Some(detail), None) | (None, Some(detail)) => format!("{status}: {detail}"),
        (None, None) if body.trim().is_empty() => status.to_string(),
        (None, None) => {
            let snippet: String = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
            format!("{status}: {snippet}")
        }
    }
}

/// Posts groups to the ingestion API with the shared client.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
    endpoint: IngestEndpoint,
    compression_level: Option<i32>,
}

impl HttpDispatcher {
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built from `config`.
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        Ok(Self {
            client: build_client(config)?,
            endpoint: IngestEndpoint::from_config(config),
            compression_level: config
                .compression
                .enabled
                .then_some(config.compression.level),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &IngestEndpoint {
        &self.endpoint
    }

    /// Returns the body to send and whether it is compressed.
    fn compress(&self, data: Vec<u8>) -> (Vec<u8>, bool) {
        let Some(level) = self.compression_level else {
            return (data, false);
        };

        match encode(&data, level) {
            Ok(compressed_data) => (compressed_data, true),
            Err(e) => {
                debug!("LOGSICLE | Failed to compress data: {}", e);
                (data, false)
            }
        }
    }
}

fn encode(data: &[u8], level: i32) -> std::io::Result<Vec<u8>> {
    let mut encoder = Encoder::new(Vec::new(), level)?;
    encoder.write_all(data)?;
    encoder.finish()
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn dispatch(&self, resource_type: ResourceType, body: Vec<u8>) -> DispatchOutcome {
        let url = self.endpoint.url_for(resource_type);
        let (body, compressed) = self.compress(body);
        let mut request = self.client.post(&url).body(body);
        if compressed {
            request = request.header(CONTENT_ENCODING, "zstd");
        }

        let time = Instant::now();
        match request.send().await {
            Ok(resp) => {
                let status = resp.status();
                debug!(
                    "LOGSICLE | POST {} returned {} after {} ms",
                    url,
                    status,
                    time.elapsed().as_millis()
                );
                if status.is_success() {
                    // Don't read response body unless needed
                    return DispatchOutcome::Delivered {
                        status: status.as_u16(),
                    };
                }
                let text = resp.text().await.unwrap_or_default();
                classify_status(status, &text)
            }
            Err(e) => {
                let kind = if e.is_timeout() {
                    "timed out"
                } else if e.is_connect() {
                    "connection failed"
                } else {
                    "request failed"
                };
                debug!(
                    "LOGSICLE | POST {} {} after {} ms: {:?}",
                    url,
                    kind,
                    time.elapsed().as_millis(),
                    e
                );
                DispatchOutcome::Retryable {
                    status: None,
                    message: format!("{kind}: {e}"),
                }
            }
        }
    }
}
