//! Agent constructors keyed by type tag

use std::collections::HashMap;
use std::sync::Arc;

use crate::agents::{AgentDefinition, AgentInstance};
use crate::config::LlmConfig;
use crate::llm::{ChatModel, RetryPolicy};
use crate::{Error, Result};

/// Inputs handed to an agent constructor
pub struct AgentSeed<'a> {
    pub definition: &'a AgentDefinition,
    pub model: Arc<dyn ChatModel>,
    pub settings: LlmConfig,
    pub tool_policy: RetryPolicy,
}

impl AgentSeed<'_> {
    /// Bare instance carrying the definition's identity and model
    pub fn instance(&self, default_prompt: impl Into<String>) -> AgentInstance {
        AgentInstance::new(
            &self.definition.name,
            &self.definition.agent_type,
            self.model.clone(),
            self.settings.clone(),
        )
        .with_id(&self.definition.id)
        .with_system_prompt(default_prompt)
        .with_capabilities(self.definition.capabilities.clone())
        .with_tool_policy(self.tool_policy)
    }
}

pub type AgentConstructor = fn(AgentSeed<'_>) -> Result<AgentInstance>;

pub const ASSISTANT_PROMPT: &str =
    "You are a helpful assistant. Complete the task you are given accurately and concisely.";

pub const PLANNER_PROMPT: &str = "You are a planning agent. Analyse the task and break it into \
concrete, ordered steps. Reply with a JSON object of the form \
{\"analysis\": \"...\", \"steps\": [{\"description\": \"...\", \"tool\": \"optional tool name\"}], \
\"expected_result\": \"...\"}.";

pub const EXECUTOR_PROMPT: &str = "You are an executor agent. Carry out the step you are given \
using the information provided, and report the concrete outcome.";

pub const MODERATOR_PROMPT: &str = "You are a neutral moderator. Weigh every contribution fairly, \
summarise points of agreement and disagreement, and synthesise a balanced conclusion.";

pub fn expert_prompt(expertise: &str) -> String {
    format!(
        "You are an expert in {}. Give your professional opinion on the task, \
         grounded in your area of expertise.",
        expertise
    )
}

fn assistant(seed: AgentSeed<'_>) -> Result<AgentInstance> {
    Ok(seed.instance(ASSISTANT_PROMPT))
}

fn planner(seed: AgentSeed<'_>) -> Result<AgentInstance> {
    Ok(seed.instance(PLANNER_PROMPT))
}

fn executor(seed: AgentSeed<'_>) -> Result<AgentInstance> {
    Ok(seed.instance(EXECUTOR_PROMPT))
}

fn expert(seed: AgentSeed<'_>) -> Result<AgentInstance> {
    let prompt = expert_prompt(&seed.definition.expertise());
    Ok(seed.instance(prompt))
}

fn moderator(seed: AgentSeed<'_>) -> Result<AgentInstance> {
    Ok(seed.instance(MODERATOR_PROMPT))
}

/// Type tag to constructor mapping, populated at startup
#[derive(Clone)]
pub struct AgentTypeRegistry {
    constructors: HashMap<String, AgentConstructor>,
}

impl Default for AgentTypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl AgentTypeRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with `assistant`, `planner`, `executor`, `expert` and `moderator`
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("assistant", assistant);
        registry.register("planner", planner);
        registry.register("executor", executor);
        registry.register("expert", expert);
        registry.register("moderator", moderator);
        registry
    }

    pub fn register(&mut self, type_tag: impl Into<String>, constructor: AgentConstructor) {
        self.constructors.insert(type_tag.into(), constructor);
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.constructors.contains_key(type_tag)
    }

    pub fn create(&self, seed: AgentSeed<'_>) -> Result<AgentInstance> {
        let tag = seed.definition.agent_type.as_str();
        let constructor = self
            .constructors
            .get(tag)
            .ok_or_else(|| Error::UnknownAgentType(tag.to_string()))?;
        constructor(seed)
    }

    pub fn type_tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.constructors.keys().map(|s| s.as_str()).collect();
        tags.sort_unstable();
        tags
    }
}
