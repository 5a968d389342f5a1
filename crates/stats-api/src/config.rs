//! Proxy configuration from environment variables.

use stats_client::{ClientConfig, ConfigError};
use std::net::SocketAddr;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
/// Forwarded request bodies above this size get 413; sized for demo/replay uploads.
pub const DEFAULT_MAX_BODY_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen: SocketAddr,
    /// `None` forwards bodies of any size.
    pub max_body_bytes: Option<usize>,
    /// Upstream backend, bearer token and retry policy.
    pub client: ClientConfig,
}

impl ProxyConfig {
    /// `STATS_LISTEN`, `STATS_MAX_BODY_BYTES` (0 = unlimited) plus everything
    /// [`ClientConfig::from_env`] reads.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw = lookup("STATS_LISTEN").unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let listen = raw.trim().parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::Invalid {
                name: "STATS_LISTEN",
                value: raw.clone(),
                reason: e.to_string(),
            }
        })?;
        let max_body_bytes = match lookup("STATS_MAX_BODY_BYTES") {
            None => Some(DEFAULT_MAX_BODY_BYTES),
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(0) => None,
                Ok(n) => Some(n),
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        name: "STATS_MAX_BODY_BYTES",
                        value: raw.clone(),
                        reason: e.to_string(),
                    })
                }
            },
        };
        Ok(Self {
            listen,
            max_body_bytes,
            client: ClientConfig::from_lookup(lookup)?,
        })
    }
}
