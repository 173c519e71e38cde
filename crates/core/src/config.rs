use std::str::FromStr;
use std::time::Duration;

use crate::backoff::{ReconnectConfig, RetryPolicy};
use crate::env::{resolve, ResolvedEnv};
use crate::error::ConfigError;

/// Default debounce window for free-text search.
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Data-layer configuration loaded from environment variables.
///
/// All tunables have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct NotesConfig {
    /// Resolved API base and WebSocket URLs.
    pub endpoints: ResolvedEnv,
    /// Timeout and retry schedule for REST calls.
    pub retry: RetryPolicy,
    /// Reconnect schedule for the live-update socket.
    pub reconnect: ReconnectConfig,
    /// Debounce window for search input in list views.
    pub search_debounce: Duration,
}

impl NotesConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                      | Default |
    /// |------------------------------|---------|
    /// | `NOTES_REQUEST_TIMEOUT_SECS` | `10`    |
    /// | `NOTES_MAX_RETRIES`          | `2`     |
    /// | `NOTES_RETRY_BASE_DELAY_MS`  | `300`   |
    /// | `NOTES_RECONNECT_INITIAL_MS` | `1000`  |
    /// | `NOTES_RECONNECT_MAX_MS`     | `30000` |
    /// | `NOTES_SEARCH_DEBOUNCE_MS`   | `300`   |
    ///
    /// Endpoints are resolved by [`crate::env::resolve`].
    pub fn from_env(origin: Option<&str>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), origin)
    }

    /// Load configuration from an arbitrary key/value source.
    pub fn from_lookup<F>(lookup: F, origin: Option<&str>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoints = resolve(&lookup, origin);

        let retry_defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "NOTES_REQUEST_TIMEOUT_SECS",
                retry_defaults.timeout.as_secs(),
            )?),
            max_retries: parse_or(&lookup, "NOTES_MAX_RETRIES", retry_defaults.max_retries)?,
            base_delay: Duration::from_millis(parse_or(
                &lookup,
                "NOTES_RETRY_BASE_DELAY_MS",
                retry_defaults.base_delay.as_millis() as u64,
            )?),
        };

        let reconnect_defaults = ReconnectConfig::default();
        let reconnect = ReconnectConfig {
            initial_delay: Duration::from_millis(parse_or(
                &lookup,
                "NOTES_RECONNECT_INITIAL_MS",
                reconnect_defaults.initial_delay.as_millis() as u64,
            )?),
            max_delay: Duration::from_millis(parse_or(
                &lookup,
                "NOTES_RECONNECT_MAX_MS",
                reconnect_defaults.max_delay.as_millis() as u64,
            )?),
            ..reconnect_defaults
        };

        let search_debounce = Duration::from_millis(parse_or(
            &lookup,
            "NOTES_SEARCH_DEBOUNCE_MS",
            DEFAULT_SEARCH_DEBOUNCE.as_millis() as u64,
        )?);

        Ok(Self {
            endpoints,
            retry,
            reconnect,
            search_debounce,
        })
    }
}

/// Parse `key` if set, otherwise return `default`. A set but malformed value
/// is an error.
fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key).map(|v| v.trim().to_string()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
            key,
            expected: std::any::type_name::<T>(),
            value: v,
        }),
    }
}
