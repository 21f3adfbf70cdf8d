//! OpenAI chat completions client.
//!
//! Speaks the `/chat/completions` wire format, which Groq and DeepSeek
//! also serve; their clients in this module wrap this one with their own
//! defaults. Tool calling is supported in both directions: bound
//! [`ToolDefinition`]s are sent as `tools`, and `tool_calls` in the reply
//! become [`ToolCall`]s with parsed JSON arguments.
//!
//! # Example
//!
//! ```rust,no_run
//! use llm::config::RemoteLlmConfig;
//! use llm::remote::OpenAiClient;
//! use parley_core::{ChatModel, ChatRequest, Message};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RemoteLlmConfig::from_env(
//!     "OPENAI_API_KEY",
//!     "https://api.openai.com/v1",
//!     "gpt-4o-mini",
//! )?;
//! let client = OpenAiClient::new(config)?;
//!
//! let request = ChatRequest::new(vec![Message::user("Hello!")]).with_temperature(0.7);
//! let response = client.chat(request).await?;
//! println!("{}", response.message.content);
//! # Ok(())
//! # }
//! ```

use crate::config::RemoteLlmConfig;
use crate::error::{LlmError, Result};
use crate::redact::redact_secrets;
use crate::retry::{with_retry, RetryPolicy};
use async_trait::async_trait;
use parley_core::{
    ChatModel, ChatRequest, ChatResponse, Message, ModelError, Role, ToolCall, ToolDefinition,
    UsageMetadata,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;

/// Client for any OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    config: RemoteLlmConfig,
    client: Client,
    retry: RetryPolicy,
    provider: &'static str,
}

impl OpenAiClient {
    /// Create a new OpenAI client with the given configuration.
    pub fn new(config: RemoteLlmConfig) -> Result<Self> {
        Self::with_provider(config, "openai")
    }

    /// Client labelled with another provider name in logs and metadata.
    pub(crate) fn with_provider(config: RemoteLlmConfig, provider: &'static str) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let retry = RetryPolicy::new(config.max_retries);

        Ok(Self {
            config,
            client,
            retry,
            provider,
        })
    }

    /// Override the backoff schedule derived from `max_retries`.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &RemoteLlmConfig {
        &self.config
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    fn convert_message(msg: &Message) -> OpenAiMessage {
        let tool_calls = (!msg.tool_calls.is_empty()).then(|| {
            msg.tool_calls
                .iter()
                .map(|call| OpenAiToolCall {
                    id: call.id.clone(),
                    kind: "function".to_string(),
                    function: OpenAiFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect()
        });

        // An assistant message that only carries tool calls is sent with null content.
        let content = if tool_calls.is_some() && msg.content.is_empty() {
            None
        } else {
            Some(msg.content.clone())
        };

        OpenAiMessage {
            role: msg.role.as_str().to_string(),
            content,
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
            reasoning_content: None,
        }
    }

    fn convert_tool(tool: &ToolDefinition) -> OpenAiTool {
        OpenAiTool {
            kind: "function".to_string(),
            function: OpenAiFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool
                    .parameters
                    .clone()
                    .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
            },
        }
    }

    fn build_request(&self, request: &ChatRequest) -> OpenAiRequest {
        let tools = request
            .has_tools()
            .then(|| request.config.tools.iter().map(Self::convert_tool).collect());

        OpenAiRequest {
            model: self.config.model.clone(),
            messages: request.messages.iter().map(Self::convert_message).collect(),
            temperature: request.config.temperature,
            max_tokens: request.config.max_tokens,
            tools,
            stream: false,
        }
    }

    fn convert_response(&self, openai_resp: OpenAiResponse) -> Result<ChatResponse> {
        let choice = openai_resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall::new(call.id, call.function.name, parse_arguments(&call.function.arguments)))
            .collect();

        let message = Message::new(Role::Assistant, choice.message.content.unwrap_or_default())
            .with_tool_calls(tool_calls);

        let mut response = ChatResponse::new(message)
            .with_metadata("provider", Value::String(self.provider.to_string()))
            .with_metadata("model", Value::String(openai_resp.model))
            .with_metadata(
                "finish_reason",
                Value::String(choice.finish_reason.unwrap_or_default()),
            );

        if let Some(reasoning) = choice.message.reasoning_content.filter(|r| !r.is_empty()) {
            response = response.with_metadata("reasoning", Value::String(reasoning));
        }
        if let Some(usage) = openai_resp.usage {
            response = response.with_usage(UsageMetadata::new(usage.prompt_tokens, usage.completion_tokens));
        }

        Ok(response)
    }

    async fn send_once(&self, url: &str, body: &OpenAiRequest) -> Result<OpenAiResponse> {
        let mut req = self.client.post(url).bearer_auth(&self.config.api_key).json(body);

        if let Some(org) = &self.config.organization {
            req = req.header("OpenAI-Organization", org);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(e.to_string())
            } else {
                LlmError::HttpError(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let error_text = redact_secrets(&error_text).into_owned();
            tracing::warn!(
                provider = self.provider,
                model = %self.config.model,
                status = status.as_u16(),
                body = %error_text,
                "chat completion rejected"
            );
            return Err(status_error(status, error_text));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }

    /// Run one chat completion, retrying transient failures.
    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = self.config.completions_url();
        let body = self.build_request(request);
        let started = Instant::now();

        let openai_resp = with_retry(&self.retry, || self.send_once(&url, &body)).await?;
        let response = self.convert_response(openai_resp)?;

        tracing::debug!(
            provider = self.provider,
            model = %self.config.model,
            tool_calls = response.message.tool_calls.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "chat completion"
        );
        Ok(response)
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn chat(&self, request: ChatRequest) -> std::result::Result<ChatResponse, ModelError> {
        self.complete(&request).await.map_err(ModelError::from)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

fn status_error(status: StatusCode, body: String) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::AuthenticationError(body),
        404 => LlmError::ModelNotFound(body),
        429 => LlmError::RateLimitExceeded(body),
        400 | 422 => LlmError::InvalidRequest(body),
        500..=599 => LlmError::ServiceUnavailable(format!("{}: {}", status, body)),
        _ => LlmError::ProviderError(format!("API error {}: {}", status, body)),
    }
}

/// Tool-call arguments arrive as a JSON string; empty means no arguments.
/// Unparsable text is kept as a string so argument validation rejects it.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

// Chat completions wire types
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    /// DeepSeek reasoner output
    #[serde(default, skip_serializing)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    kind: String,
    function: OpenAiFunction,
}

#[derive(Debug, Serialize)]
struct OpenAiFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

fn function_kind() -> String {
    "function".to_string()
}
