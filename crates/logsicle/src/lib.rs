//! # Logsicle
//!
//! Client SDK for the Logsicle ingestion API. Application logs, events, request logs and metrics
//! are queued without blocking the caller, then batched, deduplicated, retried and posted to
//! `{api_url}/v{version}/ingest/{type}` by a worker running on its own thread.
//!
//! ## Architecture
//!
//! - [`client`]: the [`LogsicleClient`] facade and its builder
//! - [`transport`]: typed `app`, `event`, `request` and `metric` façades
//! - [`queue`]: the queue manager, the worker actor and its batching, dedup and backoff policies
//! - [`flusher`]: the [`flusher::Dispatcher`] seam and its HTTP implementation
//! - [`http`]: the shared `reqwest` client and ingestion URLs
//! - [`config`]: defaults, `logsicle.yaml` and `LOGSICLE_*` environment sources
//! - [`logger`]: the `LOGSICLE | LEVEL | ...` tracing formatter
//!
//! ```rust,ignore
//! use logsicle::{Config, LogsicleClient};
//! use logsicle::transport::AppLogOptions;
//!
//! let client = LogsicleClient::new(Config::new("api-key", "project-id"))?;
//! client.app.info("checkout started", AppLogOptions::default());
//! client.shutdown().await?;
//! ```

#![deny(clippy::all)]
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod flusher;
pub mod http;
pub mod logger;
pub mod queue;
pub mod resource;
pub mod transport;

pub use client::{LogsicleClient, LogsicleClientBuilder};
pub use config::Config;
pub use error::{ClientError, FlushError};
pub use queue::{DropReason, QueueEvent};
pub use resource::{Level, MetricKind, ResourceData, ResourceType};

pub const SDK_NAME: &str = "logsicle-rust";
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");
