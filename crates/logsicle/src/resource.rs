//! Canonical record model shared by the transports, the queue and the dispatcher.
//!
//! Every record handed to the SDK ends up as a [`ResourceData`]: a resource type that selects
//! the ingestion route, plus a JSON object payload. The typed payload structs below describe the
//! shape each route expects; transports build them and convert into `ResourceData` before
//! enqueueing.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload key holding the record timestamp.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Payload key holding the owning project.
pub const PROJECT_ID_FIELD: &str = "project_id";

/// JSON object carried by every record.
pub type Payload = Map<String, Value>;

/// Kind of record, and the ingestion route it is posted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    App,
    Event,
    Request,
    Metric,
}

impl ResourceType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::App => "app",
            ResourceType::Event => "event",
            ResourceType::Request => "request",
            ResourceType::Metric => "metric",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of an application log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Fatal,
}

impl Level {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseLevelError(String);

impl fmt::Display for ParseLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown log level: {}", self.0)
    }
}

impl std::error::Error for ParseLevelError {}

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debug" | "trace" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warning),
            "error" => Ok(Level::Error),
            "fatal" | "critical" => Ok(Level::Fatal),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

/// Kind of metric sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Count,
    Histogram,
}

/// A record ready to be queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceData {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub payload: Payload,
}

impl ResourceData {
    #[must_use]
    pub fn new(resource_type: ResourceType, payload: Payload) -> Self {
        Self {
            resource_type,
            payload,
        }
    }

    /// Builds a record from any payload that serializes to a JSON object.
    ///
    /// # Errors
    ///
    /// Fails when the payload cannot be serialized or is not a JSON object.
    pub fn from_payload<T: Serialize>(
        resource_type: ResourceType,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(payload)? {
            Value::Object(map) => Ok(Self::new(resource_type, map)),
            other => Err(serde::ser::Error::custom(format!(
                "{resource_type} payload must be a JSON object, got {other}"
            ))),
        }
    }

    #[must_use]
    pub fn project_id(&self) -> Option<&str> {
        self.payload.get(PROJECT_ID_FIELD).and_then(Value::as_str)
    }

    #[must_use]
    pub fn timestamp(&self) -> Option<&str> {
        self.payload.get(TIMESTAMP_FIELD).and_then(Value::as_str)
    }

    /// Stamps `timestamp` with `now` unless the payload already has one.
    pub fn ensure_timestamp(&mut self, now: DateTime<Utc>) {
        let missing = matches!(self.payload.get(TIMESTAMP_FIELD), None | Some(Value::Null));
        if missing {
            self.payload.insert(
                TIMESTAMP_FIELD.to_string(),
                Value::String(format_timestamp(now)),
            );
        }
    }
}

/// RFC 3339 in UTC with millisecond precision, e.g. `2024-05-01T12:00:00.000Z`.
#[must_use]
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn is_empty_map(map: &Map<String, Value>) -> bool {
    map.is_empty()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppLogPayload {
    pub project_id: String,
    pub level: Level,
    pub message: String,
    pub service_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(skip_serializing_if = "is_empty_map")]
    pub metadata: Map<String, Value>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventPayload {
    pub project_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "is_empty_map")]
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestLogPayload {
    pub project_id: String,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    /// Milliseconds.
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "is_empty_map")]
    pub metadata: Map<String, Value>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPayload {
    pub project_id: String,
    pub name: String,
    pub value: f64,
    pub metric_type: MetricKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_resource_type_serializes_lowercase() {
        let data = ResourceData::new(ResourceType::Request, Map::new());
        let value = serde_json::to_value(&data).expect("serialize");
        assert_eq!(value, json!({"type": "request", "payload": {}}));
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("WARN".parse::<Level>(), Ok(Level::Warning));
        assert_eq!(" fatal ".parse::<Level>(), Ok(Level::Fatal));
        assert_eq!("info".parse::<Level>(), Ok(Level::Info));
        assert!("loud".parse::<Level>().is_err());
    }

    #[test]
    fn test_format_timestamp_millis_utc() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 15).unwrap();
        assert_eq!(format_timestamp(ts), "2024-05-01T12:30:15.000Z");
    }

    #[test]
    fn test_ensure_timestamp_keeps_caller_value() {
        let mut data = ResourceData::new(ResourceType::Event, Map::new());
        data.payload
            .insert("timestamp".to_string(), json!("2020-01-01T00:00:00.000Z"));
        data.ensure_timestamp(Utc::now());
        assert_eq!(data.timestamp(), Some("2020-01-01T00:00:00.000Z"));

        let mut empty = ResourceData::new(ResourceType::Event, Map::new());
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        empty.ensure_timestamp(now);
        assert_eq!(empty.timestamp(), Some("2024-01-02T03:04:05.000Z"));
    }

    #[test]
    fn test_app_payload_skips_empty_optionals() {
        let payload = AppLogPayload {
            project_id: "proj".to_string(),
            level: Level::Error,
            message: "boom".to_string(),
            service_name: "api".to_string(),
            environment: None,
            hostname: Some("host-1".to_string()),
            trace_id: None,
            span_id: None,
            metadata: Map::new(),
            timestamp: "2024-01-01T00:00:00.000Z".to_string(),
        };
        let data = ResourceData::from_payload(ResourceType::App, &payload).expect("object");
        assert_eq!(data.project_id(), Some("proj"));
        assert_eq!(
            serde_json::Value::Object(data.payload),
            json!({
                "project_id": "proj",
                "level": "error",
                "message": "boom",
                "service_name": "api",
                "hostname": "host-1",
                "timestamp": "2024-01-01T00:00:00.000Z"
            })
        );
    }

    #[test]
    fn test_from_payload_rejects_non_objects() {
        let result = ResourceData::from_payload(ResourceType::Metric, &vec![1, 2, 3]);
        assert!(result.is_err());
    }
}
