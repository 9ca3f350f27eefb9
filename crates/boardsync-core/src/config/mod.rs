//! Runtime configuration for the sync layer.
//!
//! Retry ceilings, backoff bases and debounce windows are named fields here
//! rather than literals scattered through the queue and engine. Values can be
//! overridden from `BOARDSYNC_*` environment variables.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const ENV_MAX_RETRIES: &str = "BOARDSYNC_MAX_RETRIES";
const ENV_BASE_BACKOFF_MS: &str = "BOARDSYNC_BASE_BACKOFF_MS";
const ENV_AUTH_RETRY_ATTEMPTS: &str = "BOARDSYNC_AUTH_RETRY_ATTEMPTS";
const ENV_AUTH_RETRY_DELAY_MS: &str = "BOARDSYNC_AUTH_RETRY_DELAY_MS";
const ENV_CONTENT_DEBOUNCE_MS: &str = "BOARDSYNC_CONTENT_DEBOUNCE_MS";
const ENV_KEY_SALT: &str = "BOARDSYNC_KEY_SALT";

/// Application-wide salt mixed into every content key.
pub const DEFAULT_KEY_SALT: &str = "boardsync-content-salt-v1";

/// Tunables for the offline queue, the sync engine and key derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Retries of a failing queued operation before it is dropped
    pub max_retries: u32,
    /// Queue backoff is `base_backoff_ms * 2^retry_count`
    pub base_backoff_ms: u64,
    /// Retries of the workspace bootstrap while the auth token propagates
    pub auth_retry_attempts: u32,
    /// Workspace bootstrap backoff is `attempt * auth_retry_delay_ms`
    pub auth_retry_delay_ms: u64,
    /// Trailing debounce window for content pushes
    pub content_debounce_ms: u64,
    pub key_salt: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_ms: 1_000,
            auth_retry_attempts: 3,
            auth_retry_delay_ms: 1_000,
            content_debounce_ms: 2_000,
            key_salt: DEFAULT_KEY_SALT.to_string(),
        }
    }
}

impl SyncSettings {
    /// Load settings from the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_retries: parse_or(&lookup, ENV_MAX_RETRIES, defaults.max_retries)?,
            base_backoff_ms: parse_or(&lookup, ENV_BASE_BACKOFF_MS, defaults.base_backoff_ms)?,
            auth_retry_attempts: parse_or(
                &lookup,
                ENV_AUTH_RETRY_ATTEMPTS,
                defaults.auth_retry_attempts,
            )?,
            auth_retry_delay_ms: parse_or(
                &lookup,
                ENV_AUTH_RETRY_DELAY_MS,
                defaults.auth_retry_delay_ms,
            )?,
            content_debounce_ms: parse_or(
                &lookup,
                ENV_CONTENT_DEBOUNCE_MS,
                defaults.content_debounce_ms,
            )?,
            key_salt: normalize_text_option(lookup(ENV_KEY_SALT)).unwrap_or(defaults.key_salt),
        })
    }

    /// Delay before the retry following the `retry_count`-th failure.
    #[must_use]
    pub fn queue_backoff(&self, retry_count: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry_count);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor))
    }

    /// Delay after the `attempt`-th unauthorized workspace bootstrap.
    #[must_use]
    pub fn auth_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.auth_retry_delay_ms.saturating_mul(u64::from(attempt)))
    }

    #[must_use]
    pub const fn content_debounce(&self) -> Duration {
        Duration::from_millis(self.content_debounce_ms)
    }
}

/// Location of the remote RPC service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
}

impl RemoteConfig {
    /// Validate and normalize a base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = normalize_text_option(Some(base_url.into())).ok_or_else(|| {
            Error::InvalidInput("remote base URL must not be empty".to_string())
        })?;
        if !is_http_url(&base_url) {
            return Err(Error::InvalidInput(
                "remote base URL must include http:// or https://".to_string(),
            ));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
{
    match normalize_text_option(lookup(name)) {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::InvalidInput(format!("{name} must be a non-negative integer"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_documented_policy() {
        let settings = SyncSettings::default();
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.queue_backoff(1), Duration::from_secs(2));
        assert_eq!(settings.queue_backoff(2), Duration::from_secs(4));
        assert_eq!(settings.queue_backoff(3), Duration::from_secs(8));
        assert_eq!(settings.auth_backoff(2), Duration::from_secs(2));
        assert_eq!(settings.content_debounce(), Duration::from_secs(2));
    }

    #[test]
    fn from_lookup_overrides_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_MAX_RETRIES, "5"),
            (ENV_BASE_BACKOFF_MS, " 10 "),
            (ENV_KEY_SALT, "custom-salt"),
        ]);
        let settings =
            SyncSettings::from_lookup(|name| vars.get(name).map(ToString::to_string)).unwrap();
        assert_eq!(
            settings,
            SyncSettings {
                max_retries: 5,
                base_backoff_ms: 10,
                key_salt: "custom-salt".to_string(),
                ..SyncSettings::default()
            }
        );
    }

    #[test]
    fn from_lookup_rejects_garbage() {
        let error = SyncSettings::from_lookup(|name| {
            (name == ENV_CONTENT_DEBOUNCE_MS).then(|| "soon".to_string())
        })
        .unwrap_err();
        assert!(error.to_string().contains(ENV_CONTENT_DEBOUNCE_MS));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let settings = SyncSettings {
            base_backoff_ms: u64::MAX,
            ..SyncSettings::default()
        };
        assert_eq!(settings.queue_backoff(64), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn remote_config_requires_http_scheme() {
        assert_eq!(
            RemoteConfig::new(" https://api.example.com/ ").unwrap().base_url,
            "https://api.example.com"
        );
        assert!(RemoteConfig::new("api.example.com").is_err());
        assert!(RemoteConfig::new("   ").is_err());
    }
}
