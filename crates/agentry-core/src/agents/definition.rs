//! Persisted agent definitions
//!
//! A definition is what the agent-definition resolver hands back: a type
//! tag, model settings, a system prompt, the tools to bind, and optionally a
//! workflow or a team layout that makes it a collaboration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::config::LlmConfig;
use crate::workflow::WorkflowDefinition;
use crate::Result;

/// Model settings; unset fields fall back to the `[llm]` config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ModelSettings {
    pub fn resolve(&self, defaults: &LlmConfig) -> LlmConfig {
        LlmConfig {
            model: self.model.clone().unwrap_or_else(|| defaults.model.clone()),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
        }
    }
}

/// A tool to attach, with per-agent parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolBinding {
    pub tool_id: String,
    #[serde(default)]
    pub parameters: JsonValue,
}

impl ToolBinding {
    pub fn new(tool_id: impl Into<String>) -> Self {
        Self {
            tool_id: tool_id.into(),
            parameters: JsonValue::Null,
        }
    }

    pub fn with_parameters(mut self, parameters: JsonValue) -> Self {
        self.parameters = parameters;
        self
    }
}

/// One step of a declarative society: which agent runs and what it is told
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocietyStep {
    pub name: String,
    /// Definition id of the agent that handles the step
    pub agent: String,
    /// Input template; `{task}`, `{result_N}` and `{last_result}` are filled in
    #[serde(default = "default_input_template")]
    pub input: String,
}

fn default_input_template() -> String {
    "{last_result}".to_string()
}

/// Layout of a multi-agent definition; member fields hold definition ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TeamSpec {
    PlannerExecutor {
        planner: String,
        executor: String,
    },
    Workflow {
        steps: Vec<SocietyStep>,
    },
    Experts {
        experts: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        moderator: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parallel: Option<bool>,
    },
    Debate {
        experts: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        moderator: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rounds: Option<usize>,
    },
}

impl TeamSpec {
    /// Every definition id the layout refers to
    pub fn member_ids(&self) -> Vec<&str> {
        match self {
            TeamSpec::PlannerExecutor { planner, executor } => {
                vec![planner.as_str(), executor.as_str()]
            }
            TeamSpec::Workflow { steps } => steps.iter().map(|s| s.agent.as_str()).collect(),
            TeamSpec::Experts {
                experts, moderator, ..
            }
            | TeamSpec::Debate {
                experts, moderator, ..
            } => experts
                .iter()
                .map(|s| s.as_str())
                .chain(moderator.as_deref())
                .collect(),
        }
    }
}

/// Stored description of an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: String,
    pub name: String,
    /// Constructor tag looked up in the agent type registry
    #[serde(rename = "type", alias = "agent_type")]
    pub agent_type: String,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Expertise areas; experts are briefed with these
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub tools: Vec<ToolBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamSpec>,
    /// Free-form settings for custom agent types
    #[serde(default)]
    pub config: Map<String, JsonValue>,
}

impl AgentDefinition {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        agent_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            agent_type: agent_type.into(),
            model: ModelSettings::default(),
            system_prompt: None,
            capabilities: Vec::new(),
            tools: Vec::new(),
            workflow: None,
            team: None,
            config: Map::new(),
        }
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    pub fn tool(mut self, binding: ToolBinding) -> Self {
        self.tools.push(binding);
        self
    }

    pub fn workflow(mut self, workflow: WorkflowDefinition) -> Self {
        self.workflow = Some(workflow);
        self
    }

    pub fn team(mut self, team: TeamSpec) -> Self {
        self.team = Some(team);
        self
    }

    pub fn model(mut self, model: ModelSettings) -> Self {
        self.model = model;
        self
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Expertise summary used when briefing an expert
    pub fn expertise(&self) -> String {
        if self.capabilities.is_empty() {
            self.name.clone()
        } else {
            self.capabilities.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definition_from_yaml() {
        let def = AgentDefinition::from_yaml(
            r#"
id: reviewer
name: Code Reviewer
type: expert
capabilities: [security, performance]
model:
  temperature: 0.2
tools:
  - tool_id: read_file
  - tool_id: shell
    parameters: {timeout_secs: 5}
"#,
        )
        .unwrap();
        assert_eq!(def.agent_type, "expert");
        assert_eq!(def.tools.len(), 2);
        assert_eq!(def.tools[1].parameters, json!({"timeout_secs": 5}));
        assert_eq!(def.expertise(), "security, performance");
        assert!(def.team.is_none());
    }

    #[test]
    fn test_model_settings_fall_back_to_config() {
        let defaults = LlmConfig::default();
        let settings = ModelSettings {
            temperature: Some(0.1),
            ..Default::default()
        };
        let resolved = settings.resolve(&defaults);
        assert_eq!(resolved.model, defaults.model);
        assert_eq!(resolved.temperature, 0.1);
        assert_eq!(resolved.max_tokens, defaults.max_tokens);
    }

    #[test]
    fn test_team_spec_tagging() {
        let team: TeamSpec = serde_json::from_value(json!({
            "mode": "debate",
            "experts": ["a", "b"],
            "moderator": "m",
            "rounds": 2
        }))
        .unwrap();
        assert_eq!(team.member_ids(), vec!["a", "b", "m"]);

        let team: TeamSpec = serde_json::from_value(json!({
            "mode": "workflow",
            "steps": [{"name": "draft", "agent": "writer"}]
        }))
        .unwrap();
        match team {
            TeamSpec::Workflow { steps } => assert_eq!(steps[0].input, "{last_result}"),
            other => panic!("unexpected team: {other:?}"),
        }
    }
}
