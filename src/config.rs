//! Configuration management
//!
//! Supplies the API root, API version and default credentials to the history
//! client. Values come from a JSON file, from environment variables (a `.env`
//! file is honoured), or are set directly.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_API_URL: &str = "PAYMENT_API_URL";
pub const ENV_API_VERSION: &str = "PAYMENT_API_VERSION";
pub const ENV_API_KEY: &str = "PAYMENT_API_KEY";
pub const ENV_API_SECRET: &str = "PAYMENT_API_SECRET";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration value: {0}")]
    Missing(&'static str),
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config JSON: {0}")]
    Parse(String),
    #[error("invalid API URL {0:?}")]
    InvalidUrl(String),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Source of the values the history client needs at construction time.
pub trait ConfigSource {
    fn api_key(&self) -> Result<String, ConfigError>;
    fn api_secret(&self) -> Result<String, ConfigError>;
    fn api_url(&self) -> Result<String, ConfigError>;
    fn api_version(&self) -> Result<String, ConfigError>;
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
}

impl Configuration {
    pub fn new(api_url: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self {
            api_url: Some(api_url.into()),
            api_version: Some(api_version.into()),
            ..Self::default()
        }
    }

    pub fn with_credentials(
        mut self,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        self.api_key = Some(api_key.into());
        self.api_secret = Some(api_secret.into());
        self
    }

    /// Load configuration from a JSON file, then apply environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Configuration =
            serde_json::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;

        dotenv::dotenv().ok();
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Build configuration from the process environment (and `.env`).
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides(lookup);
        config
    }

    /// Overwrite fields for which `lookup` yields a non-blank value.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fields = [
            (ENV_API_URL, &mut self.api_url),
            (ENV_API_VERSION, &mut self.api_version),
            (ENV_API_KEY, &mut self.api_key),
            (ENV_API_SECRET, &mut self.api_secret),
        ];
        for (key, slot) in fields {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *slot = Some(value);
            }
        }
    }
}

fn required(value: &Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ConfigError::Missing(name))
}

impl ConfigSource for Configuration {
    fn api_key(&self) -> Result<String, ConfigError> {
        required(&self.api_key, "api_key")
    }

    fn api_secret(&self) -> Result<String, ConfigError> {
        required(&self.api_secret, "api_secret")
    }

    fn api_url(&self) -> Result<String, ConfigError> {
        required(&self.api_url, "api_url")
    }

    fn api_version(&self) -> Result<String, ConfigError> {
        required(&self.api_version, "api_version")
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration")
            .field("api_url", &self.api_url)
            .field("api_version", &self.api_version)
            .field("api_key", &self.api_key)
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
