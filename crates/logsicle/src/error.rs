use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised while constructing a [`crate::LogsicleClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("failed to spawn queue worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

/// Errors returned by `flush` and `shutdown`.
///
/// Delivery failures never surface here; they are reported as queue events.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FlushError {
    #[error("flush did not complete within {0:?}")]
    Timeout(Duration),

    #[error("queue worker is not running")]
    WorkerUnavailable,
}
