//! Configuration
//!
//! Settings come from an optional TOML file with environment-variable
//! overrides for credentials. `Config` is the raw file shape; `RuntimeConfig`
//! is the validated form the server runs with.

use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}

/// Raw configuration file shape
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthConfig {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Client-side rate limiting knobs; disabled unless opted in
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    #[serde(default = "default_burst_capacity")]
    pub burst_capacity: u32,
}

fn default_requests_per_minute() -> u32 {
    600
}

fn default_burst_capacity() -> u32 {
    30
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_minute: default_requests_per_minute(),
            burst_capacity: default_burst_capacity(),
        }
    }
}

impl Config {
    /// Load from `$M365_MCP_CONFIG` or `./config.toml`; absent file means
    /// defaults (credentials must then come from the environment).
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = env::var("M365_MCP_CONFIG").unwrap_or_else(|_| "config.toml".to_string());

        if !Path::new(&path).exists() {
            return Ok(Config::default());
        }

        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub(crate) fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Resolve into a runtime configuration. `TENANT_ID`, `CLIENT_ID` and
    /// `CLIENT_SECRET` environment variables take precedence over the file.
    pub fn to_runtime(self) -> Result<RuntimeConfig, ConfigError> {
        let tenant_id = resolve_credential("TENANT_ID", self.auth.tenant_id)?;
        let client_id = resolve_credential("CLIENT_ID", self.auth.client_id)?;
        let client_secret = resolve_credential("CLIENT_SECRET", self.auth.client_secret)?;

        Ok(RuntimeConfig {
            tenant_id,
            client_id,
            client_secret,
            rate_limit: self.rate_limit,
        })
    }
}

fn resolve_credential(env_key: &str, file_value: Option<String>) -> Result<String, ConfigError> {
    env::var(env_key)
        .ok()
        .filter(|v| !v.is_empty())
        .or(file_value)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingCredentials(env_key.to_string()))
}

/// Validated configuration the server runs with
#[derive(Debug)]
pub struct RuntimeConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub rate_limit: RateLimitConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_has_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert!(config.auth.tenant_id.is_none());
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.rate_limit.requests_per_minute, 600);
        assert_eq!(config.rate_limit.burst_capacity, 30);
    }

    #[test]
    fn test_full_config_parses() {
        let config = Config::from_toml_str(
            r#"
            [auth]
            tenant_id = "tenant"
            client_id = "client"
            client_secret = "secret"

            [rate_limit]
            enabled = true
            requests_per_minute = 120
            "#,
        )
        .unwrap();

        assert_eq!(config.auth.tenant_id.as_deref(), Some("tenant"));
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.requests_per_minute, 120);
        // unset keys in a present section keep their defaults
        assert_eq!(config.rate_limit.burst_capacity, 30);
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        assert!(matches!(
            Config::from_toml_str("[auth\ntenant_id = "),
            Err(ConfigError::Parse(_))
        ));
    }
}
