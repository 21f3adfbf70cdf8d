//! Tool registry and remote tool transport
//!
//! Tools come from two places:
//!
//! - **Remote tools** discovered from MCP servers at startup. The model calls
//!   them from the `query_or_respond` node; the engine runs them in the
//!   `tool_dispatch` node through a [`ToolTransport`].
//! - **`human_assistance`**, a local pseudo-tool. It is only ever bound in the
//!   `generate` node and is never invoked through a transport: calling it
//!   suspends the conversation until an operator answers.
//!
//! ```text
//! ┌───────────────┐  discover   ┌────────────────────┐
//! │ MCP server(s) │ ──────────▶ │ ToolRegistry (Arc) │  immutable once built
//! └───────┬───────┘             └─────────┬──────────┘
//!         │ tools/call                    │ resolve(name) -> ToolSpec
//!         ◀───────────────────────────────┘ invoke(spec, args) -> ToolResult
//! ```
//!
//! Every failure of a remote call is a [`ToolError`] with a [`ToolErrorKind`];
//! the engine turns it into a tool message so the model can react to it.

pub mod mcp;
pub mod normalize;
pub mod registry;

pub use mcp::McpHttpTransport;
pub use normalize::{truncate_chars, OutputLimits};
pub use registry::{ToolRegistry, ToolRegistryBuilder};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

/// Name of the human-escalation pseudo-tool.
pub const HUMAN_ASSISTANCE_TOOL: &str = "human_assistance";

/// How a tool is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Invoked over the owning server's transport
    Remote,
    /// Answered by an operator through a suspension
    HumanAssistance,
}

/// Engine-side description of a callable tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    /// Owning server for remote tools
    pub server: Option<String>,
    pub kind: ToolKind,
    /// Per-tool override of the registry's default timeout
    pub timeout: Option<Duration>,
}

impl ToolSpec {
    pub fn remote(
        server: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            server: Some(server.into()),
            kind: ToolKind::Remote,
            timeout: None,
        }
    }

    /// The `human_assistance` pseudo-tool: one required string `query`.
    pub fn human_assistance() -> Self {
        Self {
            name: HUMAN_ASSISTANCE_TOOL.to_string(),
            description: "Request assistance from a human.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"}
                },
                "required": ["query"]
            }),
            server: None,
            kind: ToolKind::HumanAssistance,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn is_remote(&self) -> bool {
        self.kind == ToolKind::Remote
    }

    /// Model-facing definition of this tool.
    pub fn definition(&self) -> crate::llm::ToolDefinition {
        crate::llm::ToolDefinition::new(&self.name, &self.description)
            .with_parameters(self.input_schema.clone())
    }

    /// Check call arguments before they leave the process.
    ///
    /// Without the `json-validation` feature only the object shape is
    /// checked.
    pub fn validate_args(&self, args: &Value) -> Result<(), ToolError> {
        if !args.is_object() {
            return Err(ToolError::invalid_arguments(format!(
                "arguments for '{}' must be a JSON object",
                self.name
            )));
        }

        #[cfg(feature = "json-validation")]
        {
            use jsonschema::JSONSchema;

            let compiled = JSONSchema::compile(&self.input_schema).map_err(|e| {
                ToolError::invalid_arguments(format!("invalid schema for '{}': {}", self.name, e))
            })?;
            let messages = match compiled.validate(args) {
                Ok(()) => None,
                Err(errors) => Some(
                    errors
                        .map(|e| format!("{}: {}", e.instance_path, e))
                        .collect::<Vec<String>>(),
                ),
            };
            if let Some(messages) = messages {
                return Err(ToolError::invalid_arguments(messages.join("; ")));
            }
        }

        Ok(())
    }
}

/// Classification of a failed tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolErrorKind {
    /// Connection refused, DNS failure, reset
    Unreachable,
    /// Server answered with a non-success HTTP status
    BadStatus,
    /// Body could not be parsed, JSON-RPC error, or tool-reported error
    MalformedResponse,
    /// Per-call deadline elapsed
    Timeout,
    /// The model named a tool the registry does not know
    NotFound,
    /// Arguments failed validation
    InvalidArguments,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolErrorKind::Unreachable => "unreachable",
            ToolErrorKind::BadStatus => "bad-status",
            ToolErrorKind::MalformedResponse => "malformed-response",
            ToolErrorKind::Timeout => "timeout",
            ToolErrorKind::NotFound => "not-found",
            ToolErrorKind::InvalidArguments => "invalid-arguments",
        }
    }
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed tool call or discovery request.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Unreachable, message)
    }

    pub fn bad_status(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::BadStatus, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::MalformedResponse, message)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(ToolErrorKind::Timeout, format!("no response after {:?}", after))
    }

    pub fn not_found(name: &str) -> Self {
        Self::new(ToolErrorKind::NotFound, format!("unknown tool '{}'", name))
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidArguments, message)
    }

    /// Text placed in the tool message that reports this failure.
    pub fn to_tool_content(&self) -> String {
        format!("Error: {}", self)
    }
}

/// One content item of a remote tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: Value,
    },
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        ToolContent::Text { text: text.into() }
    }
}

/// Raw output of a remote tool, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    #[serde(default)]
    pub content: Vec<ToolContent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,

    #[serde(default)]
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            structured_content: None,
            is_error: false,
        }
    }

    pub fn json(value: &Value) -> Self {
        Self::text(value.to_string())
    }
}

/// Normalized tool output, ready to become a tool message.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool: String,
    pub content: String,
    /// Whether any budget cut the payload
    pub truncated: bool,
}

/// A tool as listed by a server during discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

/// Connection to one tool server.
///
/// Transports perform no retries and no timeouts of their own; the
/// registry wraps every call in the tool's deadline.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// Name the server's tools are registered under.
    fn server(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<RemoteTool>, ToolError>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput, ToolError>;
}
