use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::resource::{RequestLogPayload, ResourceType};
use crate::transport::{timestamp_or_now, TransportContext};

/// One served HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestLog {
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub duration: Duration,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Overrides the configured service name.
    pub service_name: Option<String>,
    pub metadata: Map<String, Value>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl RequestLog {
    #[must_use]
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        status_code: u16,
        duration: Duration,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            status_code,
            duration,
            ip_address: None,
            user_agent: None,
            service_name: None,
            metadata: Map::new(),
            timestamp: None,
        }
    }
}

/// Optional fields for [`RequestTransport::log_request`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestLogOptions {
    pub user_agent: Option<String>,
    pub service_name: Option<String>,
    pub metadata: Map<String, Value>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// `client.request`: access logs.
#[derive(Debug, Clone)]
pub struct RequestTransport {
    ctx: TransportContext,
}

impl RequestTransport {
    #[must_use]
    pub fn new(ctx: TransportContext) -> Self {
        Self { ctx }
    }

    pub fn log(&self, request: RequestLog) {
        let payload = RequestLogPayload {
            project_id: self.ctx.project_id().to_string(),
            method: request.method.trim().to_uppercase(),
            path: request.path,
            status_code: request.status_code,
            duration: request.duration.as_secs_f64() * 1000.0,
            ip_address: request.ip_address,
            user_agent: request.user_agent,
            service_name: request
                .service_name
                .or_else(|| self.ctx.config().service_name.clone()),
            hostname: Some(self.ctx.hostname().to_string()),
            metadata: request.metadata,
            timestamp: timestamp_or_now(request.timestamp),
        };
        self.ctx.submit(ResourceType::Request, &payload);
    }

    pub fn log_request(
        &self,
        method: &str,
        path: &str,
        status_code: u16,
        duration: Duration,
        ip_address: Option<&str>,
        options: RequestLogOptions,
    ) {
        self.log(RequestLog {
            method: method.to_string(),
            path: path.to_string(),
            status_code,
            duration,
            ip_address: ip_address.map(ToString::to_string),
            user_agent: options.user_agent,
            service_name: options.service_name,
            metadata: options.metadata,
            timestamp: options.timestamp,
        });
    }
}
