//! `logsicle.yaml` configuration file.
//!
//! ```yaml
//! api_key: sk_live_123
//! project_id: my-project
//! service_name: checkout
//! environment: production
//! endpoint:
//!   api_url: https://api.logsicle.com
//!   version: 1
//! batching:
//!   max_size: 100
//!   max_wait_ms: 1000
//!   max_retries: 3
//!   max_queue_size: 10000
//! retry:
//!   base_delay_ms: 1000
//!   max_delay_ms: 30000
//!   jitter: true
//! dedup:
//!   ttl_ms: 5000
//! compression:
//!   enabled: false
//! ```

use std::path::PathBuf;

use figment::{
    providers::{Format, Yaml},
    Figment,
};
use serde::Deserialize;

use crate::{
    config::{
        deserialize_optional_bool_from_anything, deserialize_optional_u64,
        deserialize_string_or_int, Config, ConfigError, ConfigSource,
    },
    merge_millis, merge_option, merge_option_to_value,
};

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
#[allow(clippy::module_name_repetitions)]
pub struct YamlConfig {
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub api_key: Option<String>,
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub project_id: Option<String>,
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub service_name: Option<String>,
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub environment: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    pub debug: Option<bool>,
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub flush_timeout_ms: Option<u64>,
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub request_timeout_ms: Option<u64>,
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub proxy_https: Option<String>,

    pub endpoint: EndpointYaml,
    pub batching: BatchingYaml,
    pub retry: RetryYaml,
    pub dedup: DedupYaml,
    pub compression: CompressionYaml,
}

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
pub struct EndpointYaml {
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub api_url: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub version: Option<u64>,
}

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
pub struct BatchingYaml {
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub max_size: Option<u64>,
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub max_wait_ms: Option<u64>,
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub max_retries: Option<u64>,
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub max_queue_size: Option<u64>,
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub max_batch_bytes: Option<u64>,
}

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RetryYaml {
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub base_delay_ms: Option<u64>,
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub max_delay_ms: Option<u64>,
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    pub jitter: Option<bool>,
}

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DedupYaml {
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub ttl_ms: Option<u64>,
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub max_entries: Option<u64>,
}

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CompressionYaml {
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    pub enabled: Option<bool>,
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub level: Option<u64>,
}

#[allow(clippy::module_name_repetitions)]
pub struct YamlConfigSource {
    pub path: PathBuf,
}

fn narrow<T: TryFrom<u64>>(value: Option<u64>) -> Option<T> {
    value.and_then(|v| T::try_from(v).ok())
}

fn merge_config(config: &mut Config, yaml_config: &YamlConfig) {
    merge_option_to_value!(config, yaml_config, api_key);
    merge_option_to_value!(config, yaml_config, project_id);
    merge_option!(config, yaml_config, service_name);
    merge_option!(config, yaml_config, environment);
    merge_option_to_value!(config, yaml_config, debug);
    merge_option!(config, yaml_config, proxy_https);
    merge_millis!(config, flush_timeout, yaml_config, flush_timeout_ms);
    merge_millis!(config, request_timeout, yaml_config, request_timeout_ms);

    merge_option_to_value!(config.endpoint, yaml_config.endpoint, api_url);
    if let Some(version) = narrow(yaml_config.endpoint.version) {
        config.endpoint.version = version;
    }

    let batching = &yaml_config.batching;
    if let Some(max_size) = narrow(batching.max_size) {
        config.batching.max_size = max_size;
    }
    merge_millis!(config.batching, max_wait, batching, max_wait_ms);
    if let Some(max_retries) = narrow(batching.max_retries) {
        config.batching.max_retries = max_retries;
    }
    if let Some(max_queue_size) = narrow(batching.max_queue_size) {
        config.batching.max_queue_size = max_queue_size;
    }
    if let Some(max_batch_bytes) = narrow(batching.max_batch_bytes) {
        config.batching.max_batch_bytes = max_batch_bytes;
    }

    merge_millis!(config.retry, base_delay, yaml_config.retry, base_delay_ms);
    merge_millis!(config.retry, max_delay, yaml_config.retry, max_delay_ms);
    merge_option_to_value!(config.retry, yaml_config.retry, jitter);

    merge_millis!(config.dedup, ttl, yaml_config.dedup, ttl_ms);
    if let Some(max_entries) = narrow(yaml_config.dedup.max_entries) {
        config.dedup.max_entries = max_entries;
    }

    merge_option_to_value!(config.compression, yaml_config.compression, enabled);
    if let Some(level) = narrow(yaml_config.compression.level) {
        config.compression.level = level;
    }
}

impl ConfigSource for YamlConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        let figment = Figment::new().merge(Yaml::file(self.path.clone()));

        match figment.extract::<YamlConfig>() {
            Ok(yaml_config) => merge_config(config, &yaml_config),
            Err(e) => {
                return Err(ConfigError::ParseError(format!(
                    "Failed to parse config from yaml file: {e}, using default config."
                )));
            }
        }

        Ok(())
    }
}
