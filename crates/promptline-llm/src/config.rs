// Model configuration resolved from the environment
//
// Binaries load `.env` with dotenvy before calling `ModelConfig::from_env`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Model identifier, e.g. `Qwen/Qwen2.5-7B-Instruct`
pub const MODEL_ENV: &str = "QWEN_MODEL";
/// OpenAI-compatible base URL, e.g. `https://api.siliconflow.cn/v1`
pub const BASE_URL_ENV: &str = "SILICONFLOW_BASE_URL";
/// Bearer token for the provider
pub const API_KEY_ENV: &str = "SILICONFLOW_API_KEY";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration: environment variable {0} is not set")]
    Missing(&'static str),

    #[error("Invalid base URL {0:?}: expected an http:// or https:// URL")]
    InvalidBaseUrl(String),
}

/// Everything needed to construct a chat model client
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
}

impl ModelConfig {
    pub fn new(
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Read the three required variables from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve the configuration through an arbitrary lookup
    ///
    /// Blank values count as missing. Fails before anything touches the network.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &'static str| -> Result<String, ConfigError> {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let config = Self {
            model: require(MODEL_ENV)?,
            base_url: require(BASE_URL_ENV)?,
            api_key: require(API_KEY_ENV)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Missing(MODEL_ENV));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Missing(API_KEY_ENV));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        Ok(())
    }
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}
