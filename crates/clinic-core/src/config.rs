//! Client configuration.
//!
//! Values come from the host app (over FFI) or from the process environment,
//! with an optional `.env` file for development builds.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use clinic_net::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// In-memory database when unset
    pub database_path: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: policy.attempt_timeout.as_millis() as u64,
            max_retries: policy.max_retries,
            base_backoff_ms: policy.base_delay_ms,
            max_backoff_ms: policy.max_delay_ms,
            database_path: None,
        }
    }
}

impl ClientConfig {
    /// Read `CLINIC_*` variables, loading `.env` first when one exists.
    pub fn from_env() -> ConfigResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("CLINIC_API_BASE_URL").filter(|v| !v.trim().is_empty()) {
            config.base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("CLINIC_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = parse("CLINIC_REQUEST_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("CLINIC_MAX_RETRIES") {
            config.max_retries = parse("CLINIC_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("CLINIC_BASE_BACKOFF_MS") {
            config.base_backoff_ms = parse("CLINIC_BASE_BACKOFF_MS", &v)?;
        }
        if let Some(v) = lookup("CLINIC_MAX_BACKOFF_MS") {
            config.max_backoff_ms = parse("CLINIC_MAX_BACKOFF_MS", &v)?;
        }
        config.database_path = lookup("CLINIC_DATABASE_PATH").filter(|v| !v.trim().is_empty());

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "base_url".into(),
                value: self.base_url.clone(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "request_timeout_ms".into(),
                value: "0".into(),
            });
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay_ms: self.base_backoff_ms,
            max_delay_ms: self.max_backoff_ms.max(self.base_backoff_ms),
            attempt_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.base_url, DEFAULT_BASE_URL);

        let policy = config.retry_policy();
        assert_eq!(policy, RetryPolicy::default());
        assert_eq!(policy.attempt_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("CLINIC_API_BASE_URL", "https://api.clinic.example/api/"),
            ("CLINIC_MAX_RETRIES", "5"),
            ("CLINIC_REQUEST_TIMEOUT_MS", "5000"),
            ("CLINIC_DATABASE_PATH", "/data/clinic.db"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "https://api.clinic.example/api");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_policy().attempt_timeout, Duration::from_millis(5000));
        assert_eq!(config.database_path.as_deref(), Some("/data/clinic.db"));
    }

    #[test]
    fn test_invalid_number() {
        let err = ClientConfig::from_lookup(lookup(&[("CLINIC_MAX_RETRIES", "three")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "CLINIC_MAX_RETRIES".into(),
                value: "three".into()
            }
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(ClientConfig::from_lookup(lookup(&[("CLINIC_API_BASE_URL", "clinic.local")])).is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"base_url": "https://x.test/api", "max_retries": 1}"#).unwrap();
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.max_backoff_ms, 10_000);
    }
}
