//! Anthropic Messages API client.
//!
//! Free-text requests are a single user message. Structured requests force
//! a call to one tool whose input schema is the requested reply schema, and
//! the tool input is returned as JSON text.

use std::time::Duration;

use async_trait::async_trait;
use propsmith_core::{ModelClient, ModelError, ModelRequest};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::Result;
use crate::http::request_with_retry;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Name of the tool structured replies are forced through.
pub const REPLY_TOOL: &str = "submit_reply";

#[derive(Debug, Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<[Value; 1]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesReply {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

/// [`ModelClient`] for the Anthropic Messages API
pub struct AnthropicClient {
    client: Client,
    config: ProviderConfig,
}

impl AnthropicClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("propsmith/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(AnthropicClient { client, config })
    }

    /// Build from `ANTHROPIC_API_KEY` and the `PROPSMITH_*` provider variables
    pub fn from_env() -> Result<Self> {
        Self::new(ProviderConfig::from_env()?)
    }

    fn map_transport(&self, err: reqwest::Error) -> ModelError {
        if err.is_timeout() {
            ModelError::Timeout {
                secs: self.config.request_timeout_secs,
            }
        } else {
            ModelError::Transport(err.to_string())
        }
    }
}

/// JSON body for one request.
pub fn request_body(request: &ModelRequest, max_tokens: u32) -> Value {
    let body = MessagesBody {
        model: &request.model,
        max_tokens,
        messages: [Message {
            role: "user",
            content: &request.prompt,
        }],
        tools: request.schema.as_ref().map(|schema| {
            [json!({
                "name": REPLY_TOOL,
                "description": "Submit the reply in the required structure.",
                "input_schema": schema,
            })]
        }),
        tool_choice: request
            .schema
            .as_ref()
            .map(|_| json!({"type": "tool", "name": REPLY_TOOL})),
    };
    // Serializing borrowed strings and Values cannot fail.
    serde_json::to_value(body).unwrap_or(Value::Null)
}

/// Extract the reply text from a Messages API response body.
///
/// The forced tool input wins when present; otherwise text blocks are
/// joined in order.
pub fn parse_reply(body: &str) -> std::result::Result<String, ModelError> {
    let reply: MessagesReply = serde_json::from_str(body)
        .map_err(|e| ModelError::Transport(format!("unreadable provider response: {e}")))?;

    let mut text = String::new();
    for block in reply.content {
        match block {
            ContentBlock::ToolUse { name, input } if name == REPLY_TOOL => {
                return Ok(input.to_string());
            }
            ContentBlock::Text { text: part } => text.push_str(&part),
            ContentBlock::ToolUse { .. } | ContentBlock::Other => {}
        }
    }
    if text.trim().is_empty() {
        return Err(ModelError::EmptyResponse);
    }
    Ok(text)
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn complete(&self, request: &ModelRequest) -> std::result::Result<String, ModelError> {
        let url = self.config.messages_url();
        let body = request_body(request, self.config.max_tokens);
        debug!(model = %request.model, structured = request.schema.is_some(), "sending model request");

        let response = request_with_retry(
            || {
                self.client
                    .post(&url)
                    .header("x-api-key", &self.config.api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&body)
                    .send()
            },
            self.config.max_retries,
        )
        .await
        .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_transport(e))?;
        if !status.is_success() {
            return Err(ModelError::Status {
                status: status.as_u16(),
                body: text.trim().to_string(),
            });
        }
        parse_reply(&text)
    }
}
