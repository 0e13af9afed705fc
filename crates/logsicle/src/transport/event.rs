use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::resource::{EventPayload, ResourceType};
use crate::transport::{timestamp_or_now, TransportContext};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventOptions {
    pub metadata: Map<String, Value>,
    pub user_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl EventOptions {
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// `client.event`: named product or business events.
#[derive(Debug, Clone)]
pub struct EventTransport {
    ctx: TransportContext,
}

impl EventTransport {
    #[must_use]
    pub fn new(ctx: TransportContext) -> Self {
        Self { ctx }
    }

    pub fn send(&self, name: impl Into<String>, options: EventOptions) {
        let payload = EventPayload {
            project_id: self.ctx.project_id().to_string(),
            name: name.into(),
            metadata: options.metadata,
            hostname: Some(self.ctx.hostname().to_string()),
            user_id: options.user_id,
            timestamp: timestamp_or_now(options.timestamp),
        };
        self.ctx.submit(ResourceType::Event, &payload);
    }
}
