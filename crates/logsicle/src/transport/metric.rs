use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::resource::{MetricKind, MetricPayload, ResourceType};
use crate::transport::{timestamp_or_now, TransportContext};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricOptions {
    pub unit: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl MetricOptions {
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// `client.metric`: numeric samples.
#[derive(Debug, Clone)]
pub struct MetricTransport {
    ctx: TransportContext,
}

impl MetricTransport {
    #[must_use]
    pub fn new(ctx: TransportContext) -> Self {
        Self { ctx }
    }

    pub fn gauge(&self, name: impl Into<String>, value: f64, options: MetricOptions) {
        self.record(MetricKind::Gauge, name.into(), value, options);
    }

    pub fn count(&self, name: impl Into<String>, value: f64, options: MetricOptions) {
        self.record(MetricKind::Count, name.into(), value, options);
    }

    pub fn histogram(&self, name: impl Into<String>, value: f64, options: MetricOptions) {
        self.record(MetricKind::Histogram, name.into(), value, options);
    }

    fn record(&self, metric_type: MetricKind, name: String, value: f64, options: MetricOptions) {
        // JSON has no NaN or infinity
        if !value.is_finite() {
            warn!(
                "LOGSICLE | Dropping metric {} with non-finite value {}",
                name, value
            );
            return;
        }
        let payload = MetricPayload {
            project_id: self.ctx.project_id().to_string(),
            name,
            value,
            metric_type,
            unit: options.unit,
            tags: options.tags,
            hostname: Some(self.ctx.hostname().to_string()),
            timestamp: timestamp_or_now(options.timestamp),
        };
        self.ctx.submit(ResourceType::Metric, &payload);
    }
}
