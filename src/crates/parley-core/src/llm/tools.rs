//! Tool definitions as advertised to a model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name, description and JSON Schema of a callable tool.
///
/// This is the model-facing view only. The engine-side record, which also
/// knows the owning server and timeout, is [`ToolSpec`](crate::tool::ToolSpec).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,

    /// JSON Schema of the arguments object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: None,
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = Some(parameters);
        self
    }
}
