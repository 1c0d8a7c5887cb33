//! Workflow definitions
//!
//! Definitions are plain data and load from YAML or JSON:
//!
//! ```yaml
//! name: summarize
//! steps:
//!   - name: fetch
//!     tool: http_request
//!     input_bindings:
//!       url: "${url}"
//!     output_bindings:
//!       page: "$result.body"
//!   - name: digest
//!     tool: summarizer
//!     condition: "page != null"
//!     input_bindings:
//!       text: "${page}"
//!     output_bindings:
//!       result: "$result"
//!     on_error: continue
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::tool::ToolRegistry;
use crate::workflow::Condition;
use crate::{Error, Result};

/// What to do when a step's tool fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Abort the workflow
    #[default]
    Fail,
    /// Record the error and move on
    Continue,
}

/// One tool invocation inside a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(alias = "tool")]
    pub tool_ref: String,
    /// Tool argument name to literal or `${path}` template
    #[serde(default)]
    pub input_bindings: Map<String, JsonValue>,
    /// Context key to `$result`, `$result.field` or a bare field path
    #[serde(default)]
    pub output_bindings: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub on_error: OnError,
}

impl Step {
    pub fn new(name: impl Into<String>, tool_ref: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tool_ref: tool_ref.into(),
            input_bindings: Map::new(),
            output_bindings: BTreeMap::new(),
            condition: None,
            on_error: OnError::Fail,
        }
    }

    pub fn input(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.input_bindings.insert(key.into(), value.into());
        self
    }

    pub fn output(mut self, context_key: impl Into<String>, source: impl Into<String>) -> Self {
        self.output_bindings.insert(context_key.into(), source.into());
        self
    }

    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn on_error(mut self, on_error: OnError) -> Self {
        self.on_error = on_error;
        self
    }
}

/// Named, ordered sequence of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load from a `.yaml`, `.yml` or `.json` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            other => Err(Error::InvalidArgument(format!(
                "unsupported workflow file extension: {:?}",
                other
            ))),
        }
    }

    /// Tool references that `tools` cannot satisfy, in step order
    pub fn unknown_tools<'a>(&'a self, tools: &ToolRegistry) -> Vec<&'a str> {
        self.steps
            .iter()
            .map(|s| s.tool_ref.as_str())
            .filter(|t| !tools.contains(t))
            .collect()
    }

    /// Check names, tool references and condition syntax
    ///
    /// Registration does not call this; it is for callers that want to catch
    /// mistakes before the first execution.
    pub fn validate(&self, tools: &ToolRegistry) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "workflow name must not be empty".to_string(),
            ));
        }
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "workflow '{}' has a step without a name",
                    self.name
                )));
            }
            if let Some(condition) = &step.condition {
                Condition::parse(condition)?;
            }
        }
        let unknown = self.unknown_tools(tools);
        if !unknown.is_empty() {
            return Err(Error::ToolNotFound(unknown.join(", ")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::EchoTool;
    use std::sync::Arc;

    const YAML: &str = r#"
name: greet
steps:
  - name: first
    tool: echo
    input_bindings:
      who: "${user.name}"
      times: 2
    output_bindings:
      greeting: "$result.who"
  - name: second
    tool_ref: shout
    condition: "greeting != null"
    on_error: continue
"#;

    #[test]
    fn test_from_yaml() {
        let wf = WorkflowDefinition::from_yaml(YAML).unwrap();
        assert_eq!(wf.name, "greet");
        assert_eq!(wf.steps.len(), 2);
        assert_eq!(wf.steps[0].tool_ref, "echo");
        assert_eq!(wf.steps[0].on_error, OnError::Fail);
        assert_eq!(wf.steps[0].input_bindings["times"], 2);
        assert_eq!(wf.steps[1].on_error, OnError::Continue);
        assert_eq!(wf.steps[1].condition.as_deref(), Some("greeting != null"));
    }

    #[test]
    fn test_from_json() {
        let wf = WorkflowDefinition::from_json(
            r#"{"name": "j", "steps": [{"name": "a", "tool": "echo"}]}"#,
        )
        .unwrap();
        assert_eq!(wf.steps[0].name, "a");
        assert!(wf.steps[0].output_bindings.is_empty());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("greet.yaml");
        std::fs::write(&path, YAML).unwrap();
        let wf = WorkflowDefinition::from_file(&path).unwrap();
        assert_eq!(wf.name, "greet");
    }

    #[test]
    fn test_validate_reports_unknown_tools() {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(EchoTool::new("echo"))).unwrap();

        let wf = WorkflowDefinition::from_yaml(YAML).unwrap();
        assert_eq!(wf.unknown_tools(&tools), vec!["shout"]);
        assert!(matches!(wf.validate(&tools), Err(Error::ToolNotFound(t)) if t == "shout"));
    }

    #[test]
    fn test_validate_rejects_bad_condition() {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(EchoTool::new("echo"))).unwrap();
        let wf = WorkflowDefinition::new("bad")
            .step(Step::new("s", "echo").condition("x == == 1"));
        assert!(matches!(wf.validate(&tools), Err(Error::Condition(_))));
    }
}
