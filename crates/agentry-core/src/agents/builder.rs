//! Materialises agent instances from definitions

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::agents::{AgentDefinition, AgentInstance, AgentSeed, AgentTypeRegistry, ToolBinding};
use crate::config::{Config, ExecutionConfig, LlmConfig};
use crate::llm::{ChatModel, RetryPolicy, RetryingModel};
use crate::resolve::{AgentDefinitionResolver, ToolResolver};
use crate::tool::{merge_parameters, Tool, ToolFactoryRegistry};
use crate::{Error, Result};

/// Builds [`AgentInstance`]s from [`AgentDefinition`]s
///
/// Agent types come from an [`AgentTypeRegistry`]; bound tools are looked
/// up through a [`ToolResolver`] and constructed by the
/// [`ToolFactoryRegistry`].
#[derive(Clone)]
pub struct AgentBuilder {
    types: Arc<AgentTypeRegistry>,
    tool_factories: Arc<ToolFactoryRegistry>,
    tool_resolver: Arc<dyn ToolResolver>,
    model: Arc<dyn ChatModel>,
    llm: LlmConfig,
    execution: ExecutionConfig,
}

impl AgentBuilder {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tool_resolver: Arc<dyn ToolResolver>,
        tool_factories: Arc<ToolFactoryRegistry>,
    ) -> Self {
        Self {
            types: Arc::new(AgentTypeRegistry::with_builtins()),
            tool_factories,
            tool_resolver,
            model,
            llm: LlmConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }

    pub fn with_types(mut self, types: AgentTypeRegistry) -> Self {
        self.types = Arc::new(types);
        self
    }

    pub fn with_config(mut self, config: &Config) -> Self {
        self.llm = config.llm.clone();
        self.execution = config.execution.clone();
        self
    }

    pub fn types(&self) -> &AgentTypeRegistry {
        &self.types
    }

    /// Build an agent from its definition
    ///
    /// Fails with [`Error::UnknownAgentType`] when the type tag has no
    /// constructor. A bound tool that cannot be resolved is logged and
    /// skipped; the remaining tools are attached in definition order.
    pub async fn build(&self, definition: &AgentDefinition) -> Result<AgentInstance> {
        let model: Arc<dyn ChatModel> = Arc::new(RetryingModel::new(
            self.model.clone(),
            RetryPolicy::for_models(&self.execution),
        ));
        let seed = AgentSeed {
            definition,
            model,
            settings: definition.model.resolve(&self.llm),
            tool_policy: RetryPolicy::for_tools(&self.execution),
        };
        let mut agent = self.types.create(seed)?;

        if let Some(prompt) = &definition.system_prompt {
            agent.set_system_prompt(prompt.clone());
        }

        for binding in &definition.tools {
            match self.resolve_tool(binding).await {
                Ok(tool) => {
                    debug!(agent = %definition.id, tool = %binding.tool_id, "Tool attached");
                    agent.attach_tool(tool);
                }
                Err(e) => {
                    warn!(
                        agent = %definition.id,
                        tool = %binding.tool_id,
                        "Skipping unavailable tool: {}",
                        e
                    );
                }
            }
        }

        if let Some(workflow) = &definition.workflow {
            agent.install_workflow(workflow.clone());
        }

        info!(
            agent = %definition.id,
            agent_type = %definition.agent_type,
            tools = agent.tool_names().len(),
            "Agent built"
        );
        Ok(agent)
    }

    /// Resolve and build in one go
    pub async fn build_by_id(
        &self,
        definitions: &dyn AgentDefinitionResolver,
        definition_id: &str,
    ) -> Result<AgentInstance> {
        let definition = definitions
            .get(definition_id)
            .await?
            .ok_or_else(|| Error::AgentDefinitionNotFound(definition_id.to_string()))?;
        self.build(&definition).await
    }

    /// Construct the tool for one binding
    pub async fn resolve_tool(&self, binding: &ToolBinding) -> Result<Arc<dyn Tool>> {
        let record = self
            .tool_resolver
            .get_by_id(&binding.tool_id)
            .await?
            .ok_or_else(|| Error::ToolResolution {
                tool_id: binding.tool_id.clone(),
                reason: "not found in tool catalogue".to_string(),
            })?;

        let parameters = merge_parameters(&record.parameters, &binding.parameters);
        self.tool_factories
            .create(&record.type_tag, &parameters)
            .map_err(|e| match e {
                Error::ToolResolution { .. } => e,
                other => Error::ToolResolution {
                    tool_id: binding.tool_id.clone(),
                    reason: other.to_string(),
                },
            })
    }
}
