//! propsmith-llm: the HTTP model-call primitive.
//!
//! [`AnthropicClient`] implements [`propsmith_core::ModelClient`] over the
//! Anthropic Messages API, with per-request timeouts and exponential
//! back-off on rate limits and server errors.

pub mod anthropic;
pub mod config;
pub mod error;
pub mod http;

pub use anthropic::AnthropicClient;
pub use config::ProviderConfig;
pub use error::{LlmError, Result};
