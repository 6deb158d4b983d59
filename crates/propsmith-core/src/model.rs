//! The model-call primitive.
//!
//! Stages only ever see [`ModelClient`]: "ask the model for X given Y".
//! Provider transport, retry and timeout policy live behind the trait
//! (see the `propsmith-llm` crate); tests plug in
//! [`ScriptedModel`](crate::fakes::ScriptedModel).

use async_trait::async_trait;
use serde_json::Value;

/// One prompt sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    /// Model identifier, threaded from [`PipelineConfig`](crate::pipeline::PipelineConfig).
    pub model: String,
    pub prompt: String,
    /// JSON schema the reply must satisfy; `None` asks for free text.
    pub schema: Option<Value>,
}

impl ModelRequest {
    pub fn text(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            schema: None,
        }
    }

    pub fn structured(model: impl Into<String>, prompt: impl Into<String>, schema: Value) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            schema: Some(schema),
        }
    }
}

/// Errors raised by a model-call primitive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("provider returned an empty response")]
    EmptyResponse,

    #[error("model client misconfigured: {0}")]
    Config(String),
}

/// Ask a language model for text.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError>;
}
