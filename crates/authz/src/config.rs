//! Authorization configuration.
//!
//! Configuration is loaded from environment variables. Every value has a default
//! except the JWKS URL; without it the key resolver stays unavailable and every
//! lookup fails with `KeySetUnavailable`.

use crate::policy::DEFAULT_REQUIRED_POLICY;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP timeout for JWKS fetches in seconds.
pub const DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Upper bound accepted for `JWKS_FETCH_TIMEOUT_SECONDS`.
pub const MAX_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 60;

/// Default name of the claim carrying the caller's policy grants.
pub const DEFAULT_POLICY_CLAIM: &str = "group_policy";

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Logging configuration consumed by `observability::init_tracing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Fallback filter directive (e.g. "info", "authz=debug").
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Authorization configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// URL of the published key set. `None` leaves the resolver unavailable.
    pub jwks_url: Option<String>,

    /// HTTP timeout for a single JWKS fetch.
    pub jwks_fetch_timeout: Duration,

    /// Claim holding the delimited policy string.
    pub policy_claim: String,

    /// Grant that must be contained in the policy claim.
    pub required_policy: String,

    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jwks_url: None,
            jwks_fetch_timeout: Duration::from_secs(DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS),
            policy_claim: DEFAULT_POLICY_CLAIM.to_string(),
            required_policy: DEFAULT_REQUIRED_POLICY.to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid JWKS URL: {0}")]
    InvalidJwksUrl(String),

    #[error("Invalid JWKS fetch timeout configuration: {0}")]
    InvalidFetchTimeout(String),

    #[error("Invalid log format: {0}")]
    InvalidLogFormat(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    ///
    /// Empty values are treated as unset.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            vars.get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let jwks_url = match get("JWKS_URL") {
            Some(raw) => {
                let url = reqwest::Url::parse(raw).map_err(|e| {
                    ConfigError::InvalidJwksUrl(format!(
                        "JWKS_URL must be an absolute URL, got '{}': {}",
                        raw, e
                    ))
                })?;
                if url.scheme() != "https" && url.scheme() != "http" {
                    return Err(ConfigError::InvalidJwksUrl(format!(
                        "JWKS_URL must use http or https, got '{}'",
                        url.scheme()
                    )));
                }
                Some(raw.to_string())
            }
            None => None,
        };

        let jwks_fetch_timeout = if let Some(value_str) = get("JWKS_FETCH_TIMEOUT_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidFetchTimeout(format!(
                    "JWKS_FETCH_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidFetchTimeout(
                    "JWKS_FETCH_TIMEOUT_SECONDS must be greater than 0".to_string(),
                ));
            }

            if value > MAX_JWKS_FETCH_TIMEOUT_SECONDS {
                return Err(ConfigError::InvalidFetchTimeout(format!(
                    "JWKS_FETCH_TIMEOUT_SECONDS must not exceed {} seconds, got {}",
                    MAX_JWKS_FETCH_TIMEOUT_SECONDS, value
                )));
            }

            Duration::from_secs(value)
        } else {
            Duration::from_secs(DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS)
        };

        let policy_claim = get("AUTHZ_POLICY_CLAIM")
            .unwrap_or(DEFAULT_POLICY_CLAIM)
            .to_string();

        let required_policy = get("AUTHZ_REQUIRED_POLICY")
            .unwrap_or(DEFAULT_REQUIRED_POLICY)
            .to_string();

        let level = get("LOG_LEVEL").unwrap_or(DEFAULT_LOG_LEVEL).to_string();

        let format = match get("LOG_FORMAT") {
            None => LogFormat::Text,
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                other => {
                    return Err(ConfigError::InvalidLogFormat(format!(
                        "LOG_FORMAT must be 'text' or 'json', got '{}'",
                        other
                    )))
                }
            },
        };

        Ok(Config {
            jwks_url,
            jwks_fetch_timeout,
            policy_claim,
            required_policy,
            logging: LoggingConfig { level, format },
        })
    }
}
