use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::resource::{AppLogPayload, Level, ResourceType};
use crate::transport::{timestamp_or_now, TransportContext};

/// Optional fields of an application log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppLogOptions {
    /// Overrides the configured service name.
    pub service_name: Option<String>,
    /// Overrides the configured environment.
    pub environment: Option<String>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub metadata: Map<String, Value>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl AppLogOptions {
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_trace(mut self, trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self.span_id = Some(span_id.into());
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// `client.app`: structured application logs.
#[derive(Debug, Clone)]
pub struct AppStructuredLogTransport {
    ctx: TransportContext,
}

impl AppStructuredLogTransport {
    #[must_use]
    pub fn new(ctx: TransportContext) -> Self {
        Self { ctx }
    }

    pub fn log(&self, level: Level, message: impl Into<String>, options: AppLogOptions) {
        let config = self.ctx.config();
        let payload = AppLogPayload {
            project_id: self.ctx.project_id().to_string(),
            level,
            message: message.into(),
            service_name: options
                .service_name
                .unwrap_or_else(|| config.service_name().to_string()),
            environment: options.environment.or_else(|| config.environment.clone()),
            hostname: Some(self.ctx.hostname().to_string()),
            trace_id: options.trace_id,
            span_id: options.span_id,
            metadata: options.metadata,
            timestamp: timestamp_or_now(options.timestamp),
        };
        self.ctx.submit(ResourceType::App, &payload);
    }

    pub fn debug(&self, message: impl Into<String>, options: AppLogOptions) {
        self.log(Level::Debug, message, options);
    }

    pub fn info(&self, message: impl Into<String>, options: AppLogOptions) {
        self.log(Level::Info, message, options);
    }

    pub fn warning(&self, message: impl Into<String>, options: AppLogOptions) {
        self.log(Level::Warning, message, options);
    }

    pub fn error(&self, message: impl Into<String>, options: AppLogOptions) {
        self.log(Level::Error, message, options);
    }

    pub fn fatal(&self, message: impl Into<String>, options: AppLogOptions) {
        self.log(Level::Fatal, message, options);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::test_support::{test_config, test_context};
    use chrono::TimeZone;
    use serde_json::json;

    #[tokio::test]
    async fn test_log_stamps_config_defaults() {
        let (ctx, queue, dispatcher) = test_context(test_config());
        let app = AppStructuredLogTransport::new(ctx);

        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        app.error(
            "payment failed",
            AppLogOptions::default()
                .with_metadata("order_id", 42)
                .with_timestamp(ts),
        );
        queue.flush().await.expect("flush");

        let calls = dispatcher.calls();
        assert_eq!(calls[0].0, ResourceType::App);
        assert_eq!(
            calls[0].1[0],
            json!({
                "project_id": "proj-1",
                "level": "error",
                "message": "payment failed",
                "service_name": "checkout",
                "environment": "staging",
                "hostname": "test-host",
                "metadata": {"order_id": 42},
                "timestamp": "2024-03-01T08:00:00.000Z"
            })
        );
    }

    #[tokio::test]
    async fn test_options_override_config() {
        let (ctx, queue, dispatcher) = test_context(test_config());
        let app = AppStructuredLogTransport::new(ctx);

        app.info(
            "hello",
            AppLogOptions {
                service_name: Some("worker".to_string()),
                environment: Some("prod".to_string()),
                ..AppLogOptions::default()
            }
            .with_trace("trace-1", "span-1"),
        );
        queue.flush().await.expect("flush");

        let payload = &dispatcher.calls()[0].1[0];
        assert_eq!(payload["service_name"], "worker");
        assert_eq!(payload["environment"], "prod");
        assert_eq!(payload["trace_id"], "trace-1");
        assert_eq!(payload["span_id"], "span-1");
        assert!(payload["timestamp"].as_str().is_some());
        assert!(payload.get("metadata").is_none());
    }

    #[tokio::test]
    async fn test_level_helpers() {
        let (ctx, queue, dispatcher) = test_context(test_config());
        let app = AppStructuredLogTransport::new(ctx);

        app.debug("d", AppLogOptions::default());
        app.info("i", AppLogOptions::default());
        app.warning("w", AppLogOptions::default());
        app.error("e", AppLogOptions::default());
        app.fatal("f", AppLogOptions::default());
        queue.flush().await.expect("flush");

        let levels: Vec<_> = dispatcher.calls()[0]
            .1
            .iter()
            .map(|payload| payload["level"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(levels, vec!["debug", "info", "warning", "error", "fatal"]);
    }
}
