//! Error types for propsmith-llm

use propsmith_core::ModelError;
use thiserror::Error;

/// Errors raised while configuring or building a provider client
#[derive(Error, Debug)]
pub enum LlmError {
    /// No API key in the environment
    #[error("{0} is not set")]
    MissingApiKey(&'static str),

    /// An environment setting could not be parsed
    #[error("invalid value for {name}: {value:?} ({reason})")]
    InvalidSetting {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// HTTP client construction failed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, LlmError>;

impl From<LlmError> for ModelError {
    fn from(err: LlmError) -> Self {
        ModelError::Config(err.to_string())
    }
}
