//! Tool trait definition

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::Result;

/// Tool execution result
///
/// `content` is whatever JSON the tool produced. A result with `is_error`
/// set is a step failure for the orchestrator, not a crate error.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub content: JsonValue,
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful tool result
    pub fn success(content: impl Into<JsonValue>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// Create an error tool result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: JsonValue::String(message.into()),
            is_error: true,
        }
    }

    /// Content rendered as text for prompts and logs
    pub fn text(&self) -> String {
        match &self.content {
            JsonValue::String(s) => s.clone(),
            JsonValue::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// A named capability that agents and workflows can invoke
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema for the tool's input parameters
    fn input_schema(&self) -> JsonValue;

    /// Execute the tool with the given input
    ///
    /// Recoverable failures (bad arguments, a missing file) should come back
    /// as [`ToolResult::error`]; `Err` is reserved for failures of the
    /// surrounding machinery.
    async fn execute(&self, input: JsonValue) -> Result<ToolResult>;
}
