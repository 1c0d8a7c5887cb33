//! Runtime agent instances

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agents::{HistoryEntry, TaskOutcome, TaskRunner};
use crate::chain::{StepData, StepReporter, ToolExecutionRecord};
use crate::config::{ExecutionConfig, LlmConfig};
use crate::llm::{ChatModel, ChatRequest, Message, RetryPolicy, Role, TokenUsage};
use crate::text::extract_json_object;
use crate::tool::{Tool, ToolDefinition, ToolRegistry, ToolResult};
use crate::workflow::{ToolOrchestrator, WorkflowDefinition};
use crate::{Error, Result};

const DEFAULT_MAX_TOOL_ROUNDS: usize = 5;

/// A tool call made by an agent
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRecord {
    pub name: String,
    pub input: JsonValue,
    pub output: String,
    pub is_error: bool,
}

/// A runtime-bound agent
///
/// Owns its conversation history and token usage, so an instance belongs to
/// exactly one chain or collaboration at a time.
pub struct AgentInstance {
    id: String,
    name: String,
    agent_type: String,
    model: Arc<dyn ChatModel>,
    settings: LlmConfig,
    system_prompt: String,
    capabilities: Vec<String>,
    tools: Vec<Arc<dyn Tool>>,
    workflow: Option<WorkflowDefinition>,
    history: Vec<Message>,
    usage: TokenUsage,
    tool_calls: Vec<ToolCallRecord>,
    tool_policy: RetryPolicy,
    max_tool_rounds: usize,
    reporter: Option<Arc<dyn StepReporter>>,
}

impl AgentInstance {
    pub fn new(
        name: impl Into<String>,
        agent_type: impl Into<String>,
        model: Arc<dyn ChatModel>,
        settings: LlmConfig,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            name: name.into(),
            agent_type: agent_type.into(),
            model,
            settings,
            system_prompt: String::new(),
            capabilities: Vec::new(),
            tools: Vec::new(),
            workflow: None,
            history: Vec::new(),
            usage: TokenUsage::default(),
            tool_calls: Vec::new(),
            tool_policy: RetryPolicy::for_tools(&ExecutionConfig::default()),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            reporter: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_tool_policy(mut self, policy: RetryPolicy) -> Self {
        self.tool_policy = policy;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.attach_tool(tool);
        self
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = prompt.into();
    }

    /// Bind a tool; a tool with the same name is replaced in place
    pub fn attach_tool(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(idx) => self.tools[idx] = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn install_workflow(&mut self, workflow: WorkflowDefinition) {
        self.workflow = Some(workflow);
    }

    pub fn set_reporter(&mut self, reporter: Option<Arc<dyn StepReporter>>) {
        self.reporter = reporter;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    pub fn settings(&self) -> &LlmConfig {
        &self.settings
    }

    pub fn model(&self) -> &Arc<dyn ChatModel> {
        &self.model
    }

    /// Capabilities joined for briefings, or the name when there are none
    pub fn expertise(&self) -> String {
        if self.capabilities.is_empty() {
            self.name.clone()
        } else {
            self.capabilities.join(", ")
        }
    }

    /// Bound tool names in binding order
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    pub fn workflow(&self) -> Option<&WorkflowDefinition> {
        self.workflow.as_ref()
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        &self.tool_calls
    }

    /// Forget the conversation; usage totals are kept
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    fn request(&self, messages: Vec<Message>) -> ChatRequest {
        let mut request = ChatRequest::new(&self.settings.model)
            .messages(messages)
            .temperature(self.settings.temperature)
            .max_tokens(self.settings.max_tokens);
        if !self.system_prompt.is_empty() {
            request = request.system(&self.system_prompt);
        }
        request
    }

    /// Send a message as part of the ongoing conversation
    pub async fn chat(&mut self, message: impl Into<String>) -> Result<String> {
        let mut messages = self.history.clone();
        messages.push(Message::user(message));
        let response = self.model.chat(self.request(messages.clone())).await?;

        self.usage += response.usage;
        messages.push(Message::assistant(&response.text));
        self.history = messages;
        debug!(agent = %self.name, tokens = response.usage.total(), "Chat turn complete");
        Ok(response.text)
    }

    /// One-off prompt outside the conversation history
    pub async fn ask(&mut self, prompt: impl Into<String>) -> Result<String> {
        let response = self
            .model
            .chat(self.request(vec![Message::user(prompt)]))
            .await?;
        self.usage += response.usage;
        Ok(response.text)
    }

    /// Invoke a bound tool under the tool timeout
    ///
    /// Tool-level failures come back as an error [`ToolResult`]; only an
    /// unknown tool or a failure of the call itself is an `Err`.
    pub async fn call_tool(&mut self, name: &str, input: JsonValue) -> Result<ToolResult> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .cloned()
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;

        let started = Instant::now();
        let outcome = self
            .tool_policy
            .run(name, || {
                let tool = tool.clone();
                let input = input.clone();
                async move { tool.execute(input).await }
            })
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let (record, result) = match outcome {
            Ok(result) if !result.is_error => (
                ToolExecutionRecord::success(name, input.clone(), result.content.clone()),
                Ok(result),
            ),
            Ok(result) => (
                ToolExecutionRecord::failure(name, input.clone(), result.text()),
                Ok(result),
            ),
            Err(e) => (
                ToolExecutionRecord::failure(name, input.clone(), e.to_string()),
                Err(e),
            ),
        };

        self.tool_calls.push(ToolCallRecord {
            name: name.to_string(),
            input,
            output: record
                .output
                .as_ref()
                .map(|v| v.to_string())
                .or_else(|| record.error.clone())
                .unwrap_or_default(),
            is_error: record.is_error(),
        });
        if let Some(reporter) = &self.reporter {
            reporter.report_tool(record.elapsed_ms(elapsed_ms)).await?;
        }
        result
    }

    pub(crate) fn tool_definitions(&self, allowed: Option<&[String]>) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .filter(|t| allowed.is_none_or(|names| names.iter().any(|n| n == t.name())))
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.input_schema()))
            .collect()
    }

    async fn run_conversation(
        &mut self,
        task: &str,
        allowed: Option<&[String]>,
    ) -> Result<TaskOutcome> {
        let definitions = self.tool_definitions(allowed);
        let mut prompt = task.to_string();
        if !definitions.is_empty() {
            let listing: Vec<String> = definitions.iter().map(|d| d.prompt_line()).collect();
            prompt = format!(
                "{}\n\nYou may call a tool by replying with only a JSON object \
                 {{\"tool\": \"<name>\", \"input\": {{...}}}}. Available tools:\n{}",
                task,
                listing.join("\n")
            );
        }

        let history_start = self.history.len();
        let mut rounds = 0;
        let answer = loop {
            let reply = self.chat(prompt).await?;
            rounds += 1;

            let call = parse_tool_call(&reply, &definitions);
            let Some((tool, input)) = call else {
                break reply;
            };
            if rounds >= self.max_tool_rounds {
                warn!(agent = %self.name, rounds, "Tool round limit reached");
                break reply;
            }

            debug!(agent = %self.name, tool = %tool, "Agent requested tool");
            prompt = match self.call_tool(&tool, input).await {
                Ok(result) if !result.is_error => {
                    self.report_step(
                        StepData::new(format!("Called tool {}", tool))
                            .tool(tool.as_str())
                            .result(result.content.clone()),
                    )
                    .await?;
                    format!("Tool {} returned:\n{}", tool, result.text())
                }
                Ok(result) => format!("Tool {} failed: {}", tool, result.text()),
                Err(e) => format!("Tool {} failed: {}", tool, e),
            };
        };

        let history = self.history[history_start..]
            .iter()
            .map(|m| {
                let actor = match m.role {
                    Role::Assistant => self.name.clone(),
                    other => other.to_string(),
                };
                HistoryEntry::new(actor, &m.content)
            })
            .collect();

        Ok(TaskOutcome::new(answer)
            .with_history(history)
            .with_metadata("rounds", rounds))
    }

    async fn run_workflow(&mut self, workflow: WorkflowDefinition, task: &str) -> Result<TaskOutcome> {
        let mut registry = ToolRegistry::new();
        for tool in &self.tools {
            registry.register(tool.clone())?;
        }
        let workflow_name = workflow.name.clone();
        let mut orchestrator = ToolOrchestrator::with_registry(registry, &ExecutionConfig::default())
            .with_tool_policy(self.tool_policy);
        orchestrator.register_workflow(workflow_name.clone(), workflow);

        let outcome = orchestrator
            .execute_workflow(&workflow_name, json!({"task": task}))
            .await?;

        let mut history = Vec::with_capacity(outcome.execution_history.len());
        for record in &outcome.execution_history {
            let content = match (&record.output, &record.error) {
                (Some(output), _) => output.to_string(),
                (None, Some(error)) => format!("error: {}", error),
                (None, None) => "skipped".to_string(),
            };
            history.push(HistoryEntry::new(format!("tool:{}", record.tool), content));
            if record.skipped() {
                continue;
            }

            let inputs = record.inputs.clone().unwrap_or(JsonValue::Null);
            let audit = match (&record.output, &record.error) {
                (Some(output), _) => {
                    ToolExecutionRecord::success(&record.tool, inputs, output.clone())
                }
                _ => ToolExecutionRecord::failure(
                    &record.tool,
                    inputs,
                    record.error.clone().unwrap_or_default(),
                ),
            };
            if let Some(reporter) = &self.reporter {
                reporter.report_tool(audit.elapsed_ms(record.elapsed_ms)).await?;
            }
            let mut step = StepData::new(format!("Workflow step {}", record.step)).tool(record.tool.as_str());
            if let Some(output) = &record.output {
                step = step.result(output.clone());
            }
            self.report_step(step).await?;
        }

        let metadata = serde_json::to_value(&outcome.execution_history)?;
        let result = outcome.into_result()?;
        let answer = match result {
            JsonValue::String(s) => s,
            other => other.to_string(),
        };
        Ok(TaskOutcome::new(answer)
            .with_history(history)
            .with_metadata("workflow", workflow_name)
            .with_metadata("execution_history", metadata))
    }

    async fn report_step(&self, step: StepData) -> Result<()> {
        match &self.reporter {
            Some(reporter) => reporter.report_step(step).await,
            None => Ok(()),
        }
    }
}

/// A `{"tool": ..., "input": ...}` request naming one of `tools`
fn parse_tool_call(reply: &str, tools: &[ToolDefinition]) -> Option<(String, JsonValue)> {
    if tools.is_empty() {
        return None;
    }
    let value = extract_json_object(reply)?;
    let name = value.get("tool")?.as_str()?;
    if !tools.iter().any(|t| t.name == name) {
        return None;
    }
    let input = value.get("input").cloned().unwrap_or_else(|| json!({}));
    Some((name.to_string(), input))
}

#[async_trait]
impl TaskRunner for AgentInstance {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_task(&mut self, task: &str, tools: Option<&[String]>) -> Result<TaskOutcome> {
        info!(agent = %self.name, agent_type = %self.agent_type, "Running task");
        let usage_before = self.usage;

        let outcome = match self.workflow.clone() {
            Some(workflow) => self.run_workflow(workflow, task).await?,
            None => self.run_conversation(task, tools).await?,
        };

        let usage = TokenUsage::new(
            self.usage.input_tokens - usage_before.input_tokens,
            self.usage.output_tokens - usage_before.output_tokens,
        );
        Ok(outcome
            .with_metadata("agent", self.name.clone())
            .with_metadata("agent_type", self.agent_type.clone())
            .with_metadata("usage", serde_json::to_value(usage)?)
            .with_metadata("tool_calls", self.tool_calls.len()))
    }
}

impl std::fmt::Debug for AgentInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentInstance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("agent_type", &self.agent_type)
            .field("model", &self.model.name())
            .field("tools", &self.tool_names())
            .finish()
    }
}
