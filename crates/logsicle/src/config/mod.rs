//! SDK configuration.
//!
//! A [`Config`] starts from [`Config::default`] and is layered by [`ConfigBuilder`] from any
//! number of [`ConfigSource`]s, later sources overriding earlier ones:
//!
//! 1. defaults
//! 2. `logsicle.yaml` ([`yaml::YamlConfigSource`])
//! 3. `LOGSICLE_*` environment variables ([`env::EnvConfigSource`])
//!
//! Programmatic users usually skip the builder and call [`Config::new`] with an API key and a
//! project id, overriding fields directly.

pub mod env;
pub mod yaml;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_aux::prelude::deserialize_bool_from_anything;
use serde_json::Value;
use tracing::{debug, error, warn};

pub const DEFAULT_API_URL: &str = "https://api.logsicle.com";
pub const DEFAULT_API_VERSION: u32 = 1;
pub const DEFAULT_SERVICE_NAME: &str = "default";
pub const CONFIG_FILE_NAME: &str = "logsicle.yaml";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("{0}")]
    ParseError(String),
}

/// Location of the ingestion API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub api_url: String,
    pub version: u32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            version: DEFAULT_API_VERSION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchingConfig {
    /// Items per batch; reaching it triggers an immediate send.
    pub max_size: usize,
    /// How long the oldest queued item may wait before a send is triggered.
    pub max_wait: Duration,
    /// Retries after the first failed attempt before an item is dropped.
    pub max_retries: u32,
    /// Queued items kept before the oldest is evicted.
    pub max_queue_size: usize,
    /// Upper bound of the serialized items in one batch.
    pub max_batch_bytes: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            max_wait: Duration::from_secs(1),
            max_retries: 3,
            max_queue_size: 10_000,
            max_batch_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

/// Duplicate suppression window. A zero `ttl` disables it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupConfig {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5),
            max_entries: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub api_key: String,
    pub project_id: String,
    pub endpoint: EndpointConfig,
    pub service_name: Option<String>,
    pub environment: Option<String>,
    pub debug: bool,
    pub batching: BatchingConfig,
    pub retry: RetryConfig,
    pub dedup: DedupConfig,
    pub compression: CompressionConfig,
    pub flush_timeout: Duration,
    pub request_timeout: Duration,
    pub proxy_https: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            project_id: String::new(),
            endpoint: EndpointConfig::default(),
            service_name: None,
            environment: None,
            debug: false,
            batching: BatchingConfig::default(),
            retry: RetryConfig::default(),
            dedup: DedupConfig::default(),
            compression: CompressionConfig::default(),
            flush_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
            proxy_https: None,
        }
    }
}

impl Config {
    #[must_use]
    pub fn new(api_key: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    /// Service name stamped on app logs when the caller gives none.
    #[must_use]
    pub fn service_name(&self) -> &str {
        self.service_name.as_deref().unwrap_or(DEFAULT_SERVICE_NAME)
    }

    /// Longest time one record can stay pending: every attempt hits `request_timeout` and every
    /// retry waits the full backoff delay.
    #[must_use]
    pub fn worst_case_delivery(&self) -> Duration {
        let max_retries = self.batching.max_retries;
        let mut total = self
            .request_timeout
            .saturating_mul(max_retries.saturating_add(1));
        let mut delay = self.retry.base_delay;
        for retry in 0..max_retries {
            if delay.is_zero() {
                break;
            }
            if delay >= self.retry.max_delay {
                let remaining = max_retries - retry;
                return total.saturating_add(self.retry.max_delay.saturating_mul(remaining));
            }
            total = total.saturating_add(delay);
            delay = delay.saturating_mul(2);
        }
        total
    }

    /// Checks the fields the client cannot run without.
    ///
    /// # Errors
    ///
    /// Returns the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingField("api_key"));
        }
        if self.project_id.trim().is_empty() {
            return Err(ConfigError::MissingField("project_id"));
        }
        let url = self.endpoint.api_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "endpoint.api_url",
                reason: format!("`{url}` is not an http(s) URL"),
            });
        }
        if self.endpoint.version == 0 {
            return Err(ConfigError::InvalidValue {
                field: "endpoint.version",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.batching.max_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batching.max_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.batching.max_queue_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batching.max_queue_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.batching.max_batch_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batching.max_batch_bytes",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retry.base_delay > self.retry.max_delay {
            return Err(ConfigError::InvalidValue {
                field: "retry.base_delay",
                reason: "must not exceed retry.max_delay".to_string(),
            });
        }
        if !(1..=22).contains(&self.compression.level) {
            return Err(ConfigError::InvalidValue {
                field: "compression.level",
                reason: format!("{} is outside 1..=22", self.compression.level),
            });
        }
        let worst_case = self.worst_case_delivery();
        if self.flush_timeout < worst_case {
            warn!(
                "LOGSICLE | flush_timeout of {} ms is shorter than the {} ms a record can spend in retries, flush may time out while delivery is still in progress",
                self.flush_timeout.as_millis(),
                worst_case.as_millis()
            );
        }
        Ok(())
    }
}

pub trait ConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError>;
}

#[derive(Default)]
#[allow(clippy::module_name_repetitions)]
pub struct ConfigBuilder {
    sources: Vec<Box<dyn ConfigSource>>,
    config: Config,
}

#[allow(clippy::module_name_repetitions)]
impl ConfigBuilder {
    /// Starts from `config` instead of the defaults.
    #[must_use]
    pub fn with_base(config: Config) -> Self {
        Self {
            sources: Vec::new(),
            config,
        }
    }

    #[must_use]
    pub fn add_source(mut self, source: Box<dyn ConfigSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn build(&mut self) -> Config {
        let mut failed_sources = 0;
        for source in &self.sources {
            match source.load(&mut self.config) {
                Ok(()) => (),
                Err(e) => {
                    error!("Failed to load config: {e}");
                    failed_sources += 1;
                }
            }
        }

        if !self.sources.is_empty() && failed_sources == self.sources.len() {
            debug!("All sources failed to load config, using default config.");
        }

        self.config.endpoint.api_url = normalize_url(&self.config.endpoint.api_url);
        if self.config.endpoint.api_url.is_empty() {
            self.config.endpoint.api_url = DEFAULT_API_URL.to_string();
        }

        // `HTTPS_PROXY` applies when no proxy was configured explicitly.
        if self.config.proxy_https.is_none() {
            if let Ok(https_proxy) = std::env::var("HTTPS_PROXY") {
                if !https_proxy.trim().is_empty() {
                    self.config.proxy_https = Some(https_proxy);
                }
            }
        }

        self.config.clone()
    }
}

/// Loads `logsicle.yaml` from `config_directory`, then the environment.
#[must_use]
pub fn get_config(config_directory: &Path) -> Config {
    let path = config_directory.join(CONFIG_FILE_NAME);
    ConfigBuilder::default()
        .add_source(Box::new(yaml::YamlConfigSource { path }))
        .add_source(Box::new(env::EnvConfigSource))
        .build()
}

/// Trims whitespace and trailing slashes.
#[must_use]
pub fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Helper macro to merge Option<T> fields to T fields when Option<T> is Some
///
/// Providing one field argument will merge the value from the source config field into the config
/// field.
///
/// Providing two field arguments will merge the value from the source config field into the config
/// field if the value is not empty.
#[macro_export]
macro_rules! merge_option_to_value {
    ($config:expr, $config_field:ident, $source:expr, $source_field:ident) => {
        if let Some(value) = &$source.$source_field {
            $config.$config_field = value.clone();
        }
    };
    ($config:expr, $source:expr, $field:ident) => {
        if let Some(value) = &$source.$field {
            $config.$field = value.clone();
        }
    };
}

/// Helper macro to merge Option<T> fields where T implements Clone
#[macro_export]
macro_rules! merge_option {
    ($config:expr, $config_field:ident, $source:expr, $source_field:ident) => {
        if $source.$source_field.is_some() {
            $config.$config_field.clone_from(&$source.$source_field);
        }
    };
    ($config:expr, $source:expr, $field:ident) => {
        if $source.$field.is_some() {
            $config.$field.clone_from(&$source.$field);
        }
    };
}

/// Helper macro to merge an Option<u64> of milliseconds into a `Duration` field
#[macro_export]
macro_rules! merge_millis {
    ($config:expr, $config_field:ident, $source:expr, $source_field:ident) => {
        if let Some(millis) = $source.$source_field {
            $config.$config_field = std::time::Duration::from_millis(millis);
        }
    };
}

pub fn deserialize_string_or_int<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        Some(Value::String(s)) => {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                Ok(Some(s))
            }
        }
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        None | Some(Value::Null) => Ok(None),
        Some(_) => {
            error!("Failed to parse value, expected a string or an integer, ignoring");
            Ok(None)
        }
    }
}

pub fn deserialize_optional_bool_from_anything<'de, D>(
    deserializer: D,
) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    // First try to deserialize as Option<_> to handle null/missing values
    let opt: Option<Value> = Option::deserialize(deserializer)?;

    match opt {
        None => Ok(None),
        Some(value) => match deserialize_bool_from_anything(value) {
            Ok(bool_result) => Ok(Some(bool_result)),
            Err(e) => {
                error!("Failed to parse bool value: {}, ignoring", e);
                Ok(None)
            }
        },
    }
}

/// Accepts integers and numeric strings, ignoring anything else.
pub fn deserialize_optional_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_u64() {
            Some(v) => Ok(Some(v)),
            None => {
                error!("Failed to parse {n} as a non-negative integer, ignoring");
                Ok(None)
            }
        },
        Some(Value::String(s)) => match s.trim().parse::<u64>() {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                error!("Failed to parse `{s}` as a non-negative integer: {e}, ignoring");
                Ok(None)
            }
        },
        Some(other) => {
            error!("Expected an integer, got {other}, ignoring");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.endpoint.api_url, "https://api.logsicle.com");
        assert_eq!(config.endpoint.version, 1);
        assert_eq!(config.batching.max_size, 100);
        assert_eq!(config.batching.max_wait, Duration::from_secs(1));
        assert_eq!(config.batching.max_retries, 3);
        assert_eq!(config.batching.max_queue_size, 10_000);
        assert_eq!(config.dedup.ttl, Duration::from_secs(5));
        assert_eq!(config.flush_timeout, Duration::from_secs(60));
        assert!(!config.compression.enabled);
        assert_eq!(config.service_name(), "default");
    }

    #[test]
    fn test_worst_case_delivery() {
        let config = Config::default();
        // 4 attempts of 10 s plus 1 + 2 + 4 s of backoff
        assert_eq!(config.worst_case_delivery(), Duration::from_secs(47));

        let mut capped = Config::default();
        capped.batching.max_retries = 8;
        capped.request_timeout = Duration::from_secs(1);
        // 1 + 2 + 4 + 8 + 16, then 30 s three times
        assert_eq!(capped.worst_case_delivery(), Duration::from_secs(9 + 31 + 90));

        let mut no_retries = Config::default();
        no_retries.batching.max_retries = 0;
        assert_eq!(no_retries.worst_case_delivery(), Duration::from_secs(10));
    }

    #[test]
    #[traced_test]
    fn test_validate_warns_on_short_flush_timeout() {
        let mut config = Config::new("key", "proj");
        config.flush_timeout = Duration::from_secs(5);
        assert_eq!(config.validate(), Ok(()));
        assert!(logs_contain("flush may time out"));
    }

    #[test]
    #[traced_test]
    fn test_default_flush_timeout_covers_retries() {
        assert_eq!(Config::new("key", "proj").validate(), Ok(()));
        assert!(!logs_contain("flush may time out"));
    }

    #[test]
    fn test_validate_requires_credentials() {
        assert_eq!(
            Config::default().validate(),
            Err(ConfigError::MissingField("api_key"))
        );
        assert_eq!(
            Config::new("key", " ").validate(),
            Err(ConfigError::MissingField("project_id"))
        );
        assert_eq!(Config::new("key", "proj").validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::new("key", "proj");
        config.endpoint.api_url = "ftp://example.com".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "endpoint.api_url",
                ..
            })
        ));

        let mut config = Config::new("key", "proj");
        config.batching.max_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "batching.max_size",
                ..
            })
        ));

        let mut config = Config::new("key", "proj");
        config.batching.max_queue_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::new("key", "proj");
        config.retry.base_delay = Duration::from_secs(60);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("  https://api.logsicle.com/ "),
            "https://api.logsicle.com"
        );
        assert_eq!(normalize_url("http://localhost:8080//"), "http://localhost:8080");
    }

    #[test]
    fn test_precedence() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                "logsicle.yaml",
                r"
                service_name: from-yaml
                environment: staging
            ",
            )?;
            jail.set_env("LOGSICLE_SERVICE_NAME", "from-env");
            let config = get_config(Path::new(""));
            assert_eq!(config.service_name.as_deref(), Some("from-env"));
            assert_eq!(config.environment.as_deref(), Some("staging"));
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            let config = get_config(Path::new(""));
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn test_https_proxy_env_fallback() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("HTTPS_PROXY", "http://proxy.internal:3128");
            let config = get_config(Path::new(""));
            assert_eq!(
                config.proxy_https.as_deref(),
                Some("http://proxy.internal:3128")
            );
            Ok(())
        });
    }

    #[test]
    fn test_builder_normalizes_api_url() {
        let mut base = Config::new("key", "proj");
        base.endpoint.api_url = "https://ingest.example.com/ ".to_string();
        let config = ConfigBuilder::with_base(base).build();
        assert_eq!(config.endpoint.api_url, "https://ingest.example.com");
    }
}
