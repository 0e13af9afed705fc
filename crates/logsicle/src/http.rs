//! Authenticated HTTP client for the ingestion API.
//!
//! The client carries the bearer token, JSON content type and SDK user agent as default headers,
//! so the dispatcher only has to pick the route and attach the body. It performs no retries;
//! those belong to the queue worker.

use core::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::error;

use crate::config::{normalize_url, Config, ConfigError};
use crate::error::ClientError;
use crate::resource::ResourceType;
use crate::{SDK_NAME, SDK_VERSION};

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const TCP_KEEPALIVE: Duration = Duration::from_secs(60);

/// `{api_url}/v{version}/ingest`, with one route per resource type below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestEndpoint {
    base: String,
}

impl IngestEndpoint {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            base: format!(
                "{}/v{}/ingest",
                normalize_url(&config.endpoint.api_url),
                config.endpoint.version
            ),
        }
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    #[must_use]
    pub fn url_for(&self, resource_type: ResourceType) -> String {
        format!("{}/{}", self.base, resource_type.as_str())
    }
}

#[must_use]
pub fn user_agent() -> String {
    format!("{SDK_NAME}/{SDK_VERSION}")
}

/// Builds the shared client.
///
/// An unusable proxy setting is logged and ignored rather than failing the SDK.
///
/// # Errors
///
/// Fails when the API key cannot be sent as a header or TLS initialisation fails.
pub fn build_client(config: &Config) -> Result<reqwest::Client, ClientError> {
    match build_client_inner(config, true) {
        Ok(client) => Ok(client),
        Err(e) if config.proxy_https.is_some() => {
            error!(
                "Unable to use proxy configuration: {}, falling back to direct connection",
                e
            );
            build_client_inner(config, false)
        }
        Err(e) => Err(e),
    }
}

fn default_headers(config: &Config) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key.trim())).map_err(
        |_| ConfigError::InvalidValue {
            field: "api_key",
            reason: "contains characters that are not allowed in an HTTP header".to_string(),
        },
    )?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

fn build_client_inner(config: &Config, allow_proxy: bool) -> Result<reqwest::Client, ClientError> {
    let mut builder = reqwest::Client::builder()
        .default_headers(default_headers(config)?)
        .user_agent(user_agent())
        .timeout(config.request_timeout)
        .pool_idle_timeout(Some(POOL_IDLE_TIMEOUT))
        .tcp_keepalive(Some(TCP_KEEPALIVE));

    if allow_proxy {
        if let Some(proxy) = &config.proxy_https {
            builder = builder.proxy(reqwest::Proxy::https(proxy)?);
        }
    } else {
        builder = builder.no_proxy();
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls() {
        let mut config = Config::new("key", "proj");
        config.endpoint.api_url = "http://localhost:8080/".to_string();
        config.endpoint.version = 2;
        let endpoint = IngestEndpoint::from_config(&config);
        assert_eq!(endpoint.base(), "http://localhost:8080/v2/ingest");
        assert_eq!(
            endpoint.url_for(ResourceType::Request),
            "http://localhost:8080/v2/ingest/request"
        );
    }

    #[test]
    fn test_user_agent_names_sdk() {
        assert!(user_agent().starts_with("logsicle-rust/"));
    }

    #[test]
    fn test_api_key_with_newline_is_rejected() {
        let config = Config::new("bad\nkey", "proj");
        let result = build_client(&config);
        assert!(matches!(
            result,
            Err(ClientError::Config(ConfigError::InvalidValue {
                field: "api_key",
                ..
            }))
        ));
    }

    #[test]
    fn test_invalid_proxy_falls_back_to_direct() {
        let mut config = Config::new("key", "proj");
        config.proxy_https = Some("not a url at all".to_string());
        assert!(build_client(&config).is_ok());
    }
}
