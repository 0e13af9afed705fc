//! Typed façades that turn caller input into [`ResourceData`] and hand it to the queue.
//!
//! Every transport stamps `project_id` and defaults `timestamp` to the current time. Calls never
//! block and never fail; a record that cannot be serialized is logged and skipped.

pub mod app;
pub mod event;
pub mod hostname;
pub mod metric;
pub mod request;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::config::Config;
use crate::queue::QueueManager;
use crate::resource::{format_timestamp, ResourceData, ResourceType};

pub use app::{AppLogOptions, AppStructuredLogTransport};
pub use event::{EventOptions, EventTransport};
pub use hostname::HostnameResolver;
pub use metric::{MetricOptions, MetricTransport};
pub use request::{RequestLog, RequestLogOptions, RequestTransport};

/// State shared by all transports of one client.
#[derive(Debug, Clone)]
pub struct TransportContext {
    config: Arc<Config>,
    queue: Arc<QueueManager>,
    hostname: Arc<str>,
}

impl TransportContext {
    #[must_use]
    pub fn new(config: Arc<Config>, queue: Arc<QueueManager>, hostname: &str) -> Self {
        Self {
            config,
            queue,
            hostname: Arc::from(hostname),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.config.project_id
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub(crate) fn submit<T: Serialize>(&self, resource_type: ResourceType, payload: &T) {
        match ResourceData::from_payload(resource_type, payload) {
            Ok(data) => self.queue.enqueue(data),
            Err(e) => warn!(
                "LOGSICLE | Failed to serialize {} record, dropping it: {}",
                resource_type, e
            ),
        }
    }
}

pub(crate) fn timestamp_or_now(timestamp: Option<DateTime<Utc>>) -> String {
    format_timestamp(timestamp.unwrap_or_else(Utc::now))
}
