//! Planner output

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::text::extract_json_object;

/// One planned step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Tool input proposed by the planner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<JsonValue>,
}

impl PlanStep {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            tool: None,
            input: None,
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    fn from_value(value: &JsonValue) -> Option<Self> {
        if let Some(text) = value.as_str() {
            return Some(Self::new(text));
        }
        let description = ["description", "step", "action"]
            .iter()
            .find_map(|key| value.get(*key).and_then(|v| v.as_str()))?;
        let tool = value
            .get("tool")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("none"))
            .map(String::from);
        Some(Self {
            description: description.to_string(),
            tool,
            input: value.get("input").filter(|v| !v.is_null()).cloned(),
        })
    }
}

/// A planner's structured answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub analysis: String,
    pub steps: Vec<PlanStep>,
    pub expected_result: String,
}

impl Plan {
    /// Plan with a single step that is the task itself
    pub fn single_step(task: &str) -> Self {
        Self {
            analysis: String::new(),
            steps: vec![PlanStep::new(task)],
            expected_result: String::new(),
        }
    }

    /// Parse a planner reply
    ///
    /// Looks for a JSON object (fenced or embedded in prose). A reply without
    /// a usable step list degrades to [`Plan::single_step`], keeping the
    /// reply text as the analysis.
    pub fn parse(reply: &str, task: &str) -> Self {
        let parsed = extract_json_object(reply).and_then(|value| {
            let steps: Vec<PlanStep> = value
                .get("steps")?
                .as_array()?
                .iter()
                .filter_map(PlanStep::from_value)
                .collect();
            if steps.is_empty() {
                return None;
            }
            let text = |key: &str| {
                value
                    .get(key)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            Some(Plan {
                analysis: text("analysis"),
                steps,
                expected_result: text("expected_result"),
            })
        });

        parsed.unwrap_or_else(|| {
            warn!("Planner reply had no usable plan, falling back to a single step");
            Plan {
                analysis: reply.trim().to_string(),
                ..Self::single_step(task)
            }
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_fenced_plan() {
        let reply = r#"Here is my plan:
```json
{
  "analysis": "Need the files first",
  "steps": [
    {"description": "List sources", "tool": "glob", "input": {"pattern": "src/*.rs"}},
    {"description": "Summarise", "tool": "none"},
    "Write report"
  ],
  "expected_result": "A short report"
}
```"#;
        let plan = Plan::parse(reply, "task");
        assert_eq!(plan.analysis, "Need the files first");
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.steps[0].tool.as_deref(), Some("glob"));
        assert_eq!(plan.steps[0].input, Some(json!({"pattern": "src/*.rs"})));
        assert_eq!(plan.steps[1].tool, None);
        assert_eq!(plan.steps[2].description, "Write report");
        assert_eq!(plan.expected_result, "A short report");
    }

    #[test]
    fn test_parse_inline_object() {
        let plan = Plan::parse(
            r#"Sure. {"steps": [{"action": "do it"}]} Good luck."#,
            "task",
        );
        assert_eq!(plan.steps, vec![PlanStep::new("do it")]);
    }

    #[test]
    fn test_unparseable_reply_falls_back() {
        let plan = Plan::parse("I would just answer directly.", "count the files");
        assert_eq!(plan.steps, vec![PlanStep::new("count the files")]);
        assert_eq!(plan.analysis, "I would just answer directly.");

        let empty = Plan::parse(r#"{"steps": []}"#, "t");
        assert_eq!(empty.steps, vec![PlanStep::new("t")]);
    }
}
