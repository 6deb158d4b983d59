//! Provider settings read from the environment.

use serde::{Deserialize, Serialize};

use crate::error::{LlmError, Result};

pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";
pub const API_BASE_VAR: &str = "PROPSMITH_API_BASE";
pub const MAX_TOKENS_VAR: &str = "PROPSMITH_MAX_TOKENS";
pub const REQUEST_TIMEOUT_VAR: &str = "PROPSMITH_REQUEST_TIMEOUT_SECS";
pub const MAX_RETRIES_VAR: &str = "PROPSMITH_MAX_RETRIES";

pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Connection settings for the Anthropic Messages API
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
    /// Base URL without a trailing slash
    pub api_base: String,
    pub max_tokens: u32,
    /// Per-attempt timeout
    pub request_timeout_secs: u64,
    /// Retries after the first attempt
    pub max_retries: u32,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl ProviderConfig {
    /// Config with defaults for everything but the key
    pub fn new(api_key: impl Into<String>) -> Self {
        ProviderConfig {
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Read settings from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, which returns a variable's value if set
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(LlmError::MissingApiKey(API_KEY_VAR))?;

        let mut config = Self::new(api_key);
        if let Some(base) = lookup(API_BASE_VAR).filter(|b| !b.trim().is_empty()) {
            config.api_base = base.trim().trim_end_matches('/').to_string();
        }
        if let Some(value) = lookup(MAX_TOKENS_VAR) {
            config.max_tokens = parse_positive(MAX_TOKENS_VAR, &value)?;
        }
        if let Some(value) = lookup(REQUEST_TIMEOUT_VAR) {
            config.request_timeout_secs = parse_positive(REQUEST_TIMEOUT_VAR, &value)?;
        }
        if let Some(value) = lookup(MAX_RETRIES_VAR) {
            config.max_retries = value.trim().parse().map_err(|e: std::num::ParseIntError| {
                LlmError::InvalidSetting {
                    name: MAX_RETRIES_VAR,
                    value: value.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        Ok(config)
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    pub fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.api_base)
    }
}

fn parse_positive<T>(name: &'static str, value: &str) -> Result<T>
where
    T: std::str::FromStr + PartialEq + From<u8>,
    T::Err: std::fmt::Display,
{
    let parsed: T = value.trim().parse().map_err(|e: T::Err| LlmError::InvalidSetting {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    if parsed == T::from(0) {
        return Err(LlmError::InvalidSetting {
            name,
            value: value.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(parsed)
}
