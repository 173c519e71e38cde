//! Resolution of the API base URL and WebSocket URL.
//!
//! Pure function of a key/value lookup and an optional page origin. The
//! process environment and an in-memory map are interchangeable sources:
//!
//! ```rust
//! use std::collections::HashMap;
//! use notekeep_core::env::{resolve, API_BASE_PRIMARY};
//!
//! let vars = HashMap::from([(API_BASE_PRIMARY, "https://api.example.com/")]);
//! let env = resolve(|key| vars.get(key).map(|v| v.to_string()), None);
//! assert_eq!(env.api_base, "https://api.example.com");
//! ```

/// Primary API base override.
pub const API_BASE_PRIMARY: &str = "NOTES_API_BASE_URL";

/// Secondary API base override, consulted when the primary is unset.
pub const API_BASE_SECONDARY: &str = "NOTES_API_URL";

/// WebSocket endpoint for live updates. Live updates are off when unset.
pub const WS_URL: &str = "NOTES_WS_URL";

/// Origin used when no override is set and no page origin is known.
pub const DEV_ORIGIN: &str = "http://localhost:3000";

/// Normalized endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEnv {
    pub api_base: String,
    pub ws_url: Option<String>,
}

/// Resolve endpoints from `lookup` and the current page `origin`.
///
/// API base precedence: [`API_BASE_PRIMARY`], then [`API_BASE_SECONDARY`],
/// then `origin`, then [`DEV_ORIGIN`]. Blank values count as unset and
/// trailing slashes are stripped from everything returned.
pub fn resolve<F>(lookup: F, origin: Option<&str>) -> ResolvedEnv
where
    F: Fn(&str) -> Option<String>,
{
    let binding = |key: &str| lookup(key).and_then(|v| non_blank(&v));

    let api_base = binding(API_BASE_PRIMARY)
        .or_else(|| binding(API_BASE_SECONDARY))
        .or_else(|| origin.and_then(non_blank))
        .unwrap_or_else(|| DEV_ORIGIN.to_string());

    ResolvedEnv {
        api_base: strip_trailing_slashes(&api_base),
        ws_url: binding(WS_URL).map(|url| strip_trailing_slashes(&url)),
    }
}

/// Resolve from the process environment.
pub fn from_process_env(origin: Option<&str>) -> ResolvedEnv {
    resolve(|key| std::env::var(key).ok(), origin)
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn strip_trailing_slashes(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup<'a>(vars: &'a HashMap<&str, &str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| vars.get(key).map(|v| v.to_string())
    }

    #[test]
    fn primary_wins_over_secondary() {
        let vars = HashMap::from([
            (API_BASE_PRIMARY, "https://a"),
            (API_BASE_SECONDARY, "https://b"),
        ]);
        let env = resolve(lookup(&vars), Some("https://origin"));
        assert_eq!(env.api_base, "https://a");
    }

    #[test]
    fn primary_trailing_slash_is_stripped() {
        let vars = HashMap::from([(API_BASE_PRIMARY, "https://a/")]);
        assert_eq!(resolve(lookup(&vars), None).api_base, "https://a");
    }

    #[test]
    fn secondary_used_when_primary_unset() {
        let vars = HashMap::from([(API_BASE_SECONDARY, "https://b")]);
        assert_eq!(resolve(lookup(&vars), Some("https://o")).api_base, "https://b");
    }

    #[test]
    fn blank_primary_counts_as_unset() {
        let vars = HashMap::from([(API_BASE_PRIMARY, "  "), (API_BASE_SECONDARY, "https://b")]);
        assert_eq!(resolve(lookup(&vars), None).api_base, "https://b");
    }

    #[test]
    fn origin_used_when_no_override() {
        let vars = HashMap::new();
        let env = resolve(lookup(&vars), Some("https://notes.example.com/"));
        assert_eq!(env.api_base, "https://notes.example.com");
        assert!(env.ws_url.is_none());
    }

    #[test]
    fn headless_without_origin_uses_dev_origin() {
        let vars = HashMap::new();
        assert_eq!(resolve(lookup(&vars), None).api_base, DEV_ORIGIN);
    }

    #[test]
    fn ws_url_is_normalized() {
        let vars = HashMap::from([(WS_URL, "wss://live.example.com/ws//")]);
        let env = resolve(lookup(&vars), None);
        assert_eq!(env.ws_url.as_deref(), Some("wss://live.example.com/ws"));
    }
}
