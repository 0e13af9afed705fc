//! Hostname detection for record stamping.

use std::env;
use std::sync::Arc;

use tracing::warn;

pub const HOSTNAME_ENV: &str = "LOGSICLE_HOSTNAME";
pub const UNKNOWN_HOSTNAME: &str = "unknown";

/// Strategy used to stamp `hostname` on records.
pub type HostnameResolver = Arc<dyn Fn() -> String + Send + Sync>;

#[must_use]
pub fn default_resolver() -> HostnameResolver {
    Arc::new(get_hostname)
}

/// A resolver that always answers `hostname`.
#[must_use]
pub fn fixed_resolver(hostname: impl Into<String>) -> HostnameResolver {
    let hostname = hostname.into();
    Arc::new(move || hostname.clone())
}

/// Resolves the hostname from, in order:
/// 1. `LOGSICLE_HOSTNAME`
/// 2. `HOSTNAME`
/// 3. the system hostname (unix)
/// 4. `"unknown"`
#[must_use]
pub fn get_hostname() -> String {
    resolve_hostname(|key| env::var(key).ok(), system_hostname)
}

fn resolve_hostname(
    lookup_env: impl Fn(&str) -> Option<String>,
    system: impl Fn() -> Option<String>,
) -> String {
    for key in [HOSTNAME_ENV, "HOSTNAME"] {
        if let Some(hostname) = lookup_env(key) {
            let hostname = hostname.trim();
            if !hostname.is_empty() {
                return hostname.to_string();
            }
        }
    }

    if let Some(hostname) = system() {
        if !hostname.is_empty() {
            return hostname;
        }
    }

    warn!("Could not determine hostname, using '{}'", UNKNOWN_HOSTNAME);
    UNKNOWN_HOSTNAME.to_string()
}

#[cfg(unix)]
fn system_hostname() -> Option<String> {
    match nix::unistd::gethostname() {
        // non-UTF8 hostnames are ignored
        Ok(hostname) => hostname.to_str().map(ToString::to_string),
        Err(e) => {
            warn!("Failed to get system hostname: {}", e);
            None
        }
    }
}

#[cfg(not(unix))]
fn system_hostname() -> Option<String> {
    env::var("COMPUTERNAME").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
        }
    }

    #[test]
    fn test_get_hostname_not_empty() {
        assert!(!get_hostname().is_empty());
    }

    #[test]
    fn test_sdk_override_wins() {
        let hostname = resolve_hostname(
            env_of(&[("LOGSICLE_HOSTNAME", "override"), ("HOSTNAME", "container")]),
            || Some("system".to_string()),
        );
        assert_eq!(hostname, "override");
    }

    #[test]
    fn test_blank_values_fall_through() {
        let hostname = resolve_hostname(
            env_of(&[("LOGSICLE_HOSTNAME", "  "), ("HOSTNAME", "container")]),
            || Some("system".to_string()),
        );
        assert_eq!(hostname, "container");

        let hostname = resolve_hostname(env_of(&[]), || Some("system".to_string()));
        assert_eq!(hostname, "system");
    }

    #[test]
    fn test_unknown_fallback() {
        let hostname = resolve_hostname(env_of(&[]), || None);
        assert_eq!(hostname, "unknown");
    }

    #[test]
    fn test_fixed_resolver() {
        let resolver = fixed_resolver("box-7");
        assert_eq!(resolver(), "box-7");
    }
}
