//! Client configuration from environment variables.

use crate::policy::{
    RetryPolicy, DEFAULT_BACKOFF_BASE_MS, DEFAULT_MAX_RATE_LIMIT_RETRIES,
    DEFAULT_MAX_TRANSIENT_FAILURES,
};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
/// Per-attempt deadline; a stalled attempt counts as a transient failure.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upstream backend, e.g. `https://api.example.com`.
    pub base_url: String,
    pub token: Option<String>,
    pub policy: RetryPolicy,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            policy: RetryPolicy::default(),
            timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

impl ClientConfig {
    /// Read `STATS_API_URL`, `STATS_API_TOKEN`, `STATS_MAX_RATE_LIMIT_RETRIES`,
    /// `STATS_BACKOFF_BASE_MS`, `STATS_MAX_TRANSIENT_FAILURES` and `STATS_REQUEST_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup("STATS_API_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let token = lookup("STATS_API_TOKEN").filter(|v| !v.is_empty());
        let policy = RetryPolicy::new(
            parse_or(&lookup, "STATS_MAX_RATE_LIMIT_RETRIES", DEFAULT_MAX_RATE_LIMIT_RETRIES)?,
            parse_or(&lookup, "STATS_BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS)?,
            parse_or(&lookup, "STATS_MAX_TRANSIENT_FAILURES", DEFAULT_MAX_TRANSIENT_FAILURES)?,
        );
        let timeout_ms =
            parse_or(&lookup, "STATS_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)?;
        if timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "STATS_REQUEST_TIMEOUT_MS",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(Self {
            base_url,
            token,
            policy,
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}

/// Parse an optional variable; negative numbers fail here since all knobs are unsigned.
pub(crate) fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.token, None);
        assert_eq!(cfg.policy, RetryPolicy::default());
        assert_eq!(cfg.timeout, Duration::from_secs(30));
    }

    #[test]
    fn reads_overrides() {
        let cfg = ClientConfig::from_lookup(lookup(&[
            ("STATS_API_URL", "https://api.stats.test"),
            ("STATS_API_TOKEN", "t0k"),
            ("STATS_MAX_RATE_LIMIT_RETRIES", "2"),
            ("STATS_BACKOFF_BASE_MS", " 100 "),
            ("STATS_MAX_TRANSIENT_FAILURES", "4"),
            ("STATS_REQUEST_TIMEOUT_MS", "2500"),
        ]))
        .unwrap();
        assert_eq!(cfg.base_url, "https://api.stats.test");
        assert_eq!(cfg.token.as_deref(), Some("t0k"));
        assert_eq!(cfg.policy.max_rate_limit_retries, 2);
        assert_eq!(cfg.policy.backoff_base, Duration::from_millis(100));
        assert_eq!(cfg.policy.max_transient_failures, 4);
        assert_eq!(cfg.timeout, Duration::from_millis(2500));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[("STATS_REQUEST_TIMEOUT_MS", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("STATS_REQUEST_TIMEOUT_MS"));
    }

    #[test]
    fn negative_knob_fails_fast() {
        let err = ClientConfig::from_lookup(lookup(&[("STATS_MAX_TRANSIENT_FAILURES", "-1")]))
            .unwrap_err();
        assert!(err.to_string().contains("STATS_MAX_TRANSIENT_FAILURES"));
    }
}
