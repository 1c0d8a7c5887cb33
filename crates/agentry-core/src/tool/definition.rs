//! Tool definitions and schema helpers

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

/// Model-facing description of a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: JsonValue,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: JsonValue,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// One-line summary used when listing tools inside a prompt
    pub fn prompt_line(&self) -> String {
        format!("- {}: {}", self.name, self.description)
    }
}

/// Helper functions for creating tool schemas
pub struct SchemaBuilder;

impl SchemaBuilder {
    /// Object schema from `(name, type, description, required)` tuples
    ///
    /// ```ignore
    /// let schema = SchemaBuilder::object_schema(&[
    ///     ("path", "string", "File to read", true),
    ///     ("limit", "integer", "Maximum lines", false),
    /// ]);
    /// ```
    pub fn object_schema(properties: &[(&str, &str, &str, bool)]) -> JsonValue {
        let props: serde_json::Map<String, JsonValue> = properties
            .iter()
            .map(|(name, type_str, desc, _)| {
                (
                    name.to_string(),
                    json!({"type": type_str, "description": desc}),
                )
            })
            .collect();

        let required: Vec<&str> = properties
            .iter()
            .filter(|(_, _, _, required)| *required)
            .map(|(name, _, _, _)| *name)
            .collect();

        json!({
            "type": "object",
            "properties": props,
            "required": required
        })
    }

    /// Names listed under `required` in an object schema
    pub fn required_fields(schema: &JsonValue) -> Vec<String> {
        schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_schema_required() {
        let schema = SchemaBuilder::object_schema(&[
            ("path", "string", "File path", true),
            ("limit", "integer", "Max lines", false),
        ]);
        assert_eq!(schema["properties"]["path"]["type"], "string");
        assert_eq!(SchemaBuilder::required_fields(&schema), vec!["path"]);
    }
}
