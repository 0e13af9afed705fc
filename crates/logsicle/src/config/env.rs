use figment::{providers::Env, Figment};
use serde::Deserialize;

use crate::{
    config::{
        deserialize_optional_bool_from_anything, deserialize_optional_u64,
        deserialize_string_or_int, Config, ConfigError, ConfigSource,
    },
    merge_millis, merge_option, merge_option_to_value,
};

pub const ENV_PREFIX: &str = "LOGSICLE_";

/// `LOGSICLE_*` variables, keyed by their lowercase suffix.
#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
#[allow(clippy::module_name_repetitions)]
pub struct EnvConfig {
    /// @env `LOGSICLE_API_KEY`
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub api_key: Option<String>,
    /// @env `LOGSICLE_PROJECT_ID`
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub project_id: Option<String>,
    /// @env `LOGSICLE_API_URL`
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub api_url: Option<String>,
    /// @env `LOGSICLE_API_VERSION`
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub api_version: Option<u64>,
    /// @env `LOGSICLE_SERVICE_NAME`
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub service_name: Option<String>,
    /// @env `LOGSICLE_ENVIRONMENT`
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub environment: Option<String>,
    /// @env `LOGSICLE_DEBUG`
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    pub debug: Option<bool>,

    /// @env `LOGSICLE_BATCH_MAX_SIZE`
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub batch_max_size: Option<u64>,
    /// @env `LOGSICLE_BATCH_MAX_WAIT_MS`
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub batch_max_wait_ms: Option<u64>,
    /// @env `LOGSICLE_MAX_RETRIES`
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub max_retries: Option<u64>,
    /// @env `LOGSICLE_MAX_QUEUE_SIZE`
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub max_queue_size: Option<u64>,
    /// @env `LOGSICLE_MAX_BATCH_BYTES`
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub max_batch_bytes: Option<u64>,

    /// @env `LOGSICLE_RETRY_BASE_DELAY_MS`
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub retry_base_delay_ms: Option<u64>,
    /// @env `LOGSICLE_RETRY_MAX_DELAY_MS`
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub retry_max_delay_ms: Option<u64>,
    /// @env `LOGSICLE_RETRY_JITTER`
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    pub retry_jitter: Option<bool>,

    /// @env `LOGSICLE_DEDUP_TTL_MS`
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub dedup_ttl_ms: Option<u64>,
    /// @env `LOGSICLE_DEDUP_MAX_ENTRIES`
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub dedup_max_entries: Option<u64>,

    /// @env `LOGSICLE_FLUSH_TIMEOUT_MS`
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub flush_timeout_ms: Option<u64>,
    /// @env `LOGSICLE_REQUEST_TIMEOUT_MS`
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub request_timeout_ms: Option<u64>,

    /// @env `LOGSICLE_COMPRESSION_ENABLED`
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    pub compression_enabled: Option<bool>,
    /// @env `LOGSICLE_COMPRESSION_LEVEL`
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub compression_level: Option<u64>,

    /// @env `LOGSICLE_PROXY_HTTPS`
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub proxy_https: Option<String>,
}

fn to_usize(value: Option<u64>) -> Option<usize> {
    value.and_then(|v| usize::try_from(v).ok())
}

fn to_u32(value: Option<u64>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

fn to_i32(value: Option<u64>) -> Option<i32> {
    value.and_then(|v| i32::try_from(v).ok())
}

fn merge_config(config: &mut Config, env_config: &EnvConfig) {
    merge_option_to_value!(config, api_key, env_config, api_key);
    merge_option_to_value!(config, project_id, env_config, project_id);
    merge_option_to_value!(config.endpoint, api_url, env_config, api_url);
    if let Some(version) = to_u32(env_config.api_version) {
        config.endpoint.version = version;
    }
    merge_option!(config, env_config, service_name);
    merge_option!(config, env_config, environment);
    merge_option_to_value!(config, env_config, debug);
    merge_option!(config, env_config, proxy_https);

    if let Some(max_size) = to_usize(env_config.batch_max_size) {
        config.batching.max_size = max_size;
    }
    merge_millis!(config.batching, max_wait, env_config, batch_max_wait_ms);
    if let Some(max_retries) = to_u32(env_config.max_retries) {
        config.batching.max_retries = max_retries;
    }
    if let Some(max_queue_size) = to_usize(env_config.max_queue_size) {
        config.batching.max_queue_size = max_queue_size;
    }
    if let Some(max_batch_bytes) = to_usize(env_config.max_batch_bytes) {
        config.batching.max_batch_bytes = max_batch_bytes;
    }

    merge_millis!(config.retry, base_delay, env_config, retry_base_delay_ms);
    merge_millis!(config.retry, max_delay, env_config, retry_max_delay_ms);
    merge_option_to_value!(config.retry, jitter, env_config, retry_jitter);

    merge_millis!(config.dedup, ttl, env_config, dedup_ttl_ms);
    if let Some(max_entries) = to_usize(env_config.dedup_max_entries) {
        config.dedup.max_entries = max_entries;
    }

    merge_millis!(config, flush_timeout, env_config, flush_timeout_ms);
    merge_millis!(config, request_timeout, env_config, request_timeout_ms);

    merge_option_to_value!(config.compression, enabled, env_config, compression_enabled);
    if let Some(level) = to_i32(env_config.compression_level) {
        config.compression.level = level;
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
#[allow(clippy::module_name_repetitions)]
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        let figment = Figment::new().merge(Env::prefixed(ENV_PREFIX));

        match figment.extract::<EnvConfig>() {
            Ok(env_config) => merge_config(config, &env_config),
            Err(e) => {
                return Err(ConfigError::ParseError(format!(
                    "Failed to parse config from environment variables: {e}, using default config."
                )));
            }
        }

        Ok(())
    }
}
