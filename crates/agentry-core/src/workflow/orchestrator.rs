//! Workflow execution against a tool registry

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, error, info, warn};

use crate::config::ExecutionConfig;
use crate::llm::RetryPolicy;
use crate::tool::{Tool, ToolRegistry};
use crate::workflow::context::lookup_path;
use crate::workflow::{Condition, ExecutionContext, OnError, Step, WorkflowDefinition};
use crate::{Error, Result};

/// Context key a workflow writes its final answer to
pub const RESULT_KEY: &str = "result";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Skipped,
    Failed,
}

/// One entry of a workflow's execution history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: String,
    pub tool: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inputs: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the condition could not be evaluated and the step was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_warning: Option<String>,
    pub elapsed_ms: u64,
}

impl StepRecord {
    fn new(step: &Step, status: StepStatus) -> Self {
        Self {
            step: step.name.clone(),
            tool: step.tool_ref.clone(),
            status,
            inputs: None,
            output: None,
            error: None,
            condition_warning: None,
            elapsed_ms: 0,
        }
    }

    pub fn skipped(&self) -> bool {
        self.status == StepStatus::Skipped
    }

    pub fn failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

/// Whether the workflow produced a `result`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Completed,
    /// Every step ran (or was skipped) but nothing wrote `result`
    Empty,
}

/// Everything a finished workflow execution produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub workflow: String,
    pub status: WorkflowStatus,
    pub result: Option<JsonValue>,
    pub context: ExecutionContext,
    pub execution_history: Vec<StepRecord>,
}

impl WorkflowOutcome {
    /// The result value, treating a missing result as an error
    pub fn into_result(self) -> Result<JsonValue> {
        self.result
            .ok_or(Error::EmptyWorkflowResult(self.workflow))
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.execution_history.iter().filter(|r| r.failed())
    }
}

/// Runs registered workflows against registered tools
pub struct ToolOrchestrator {
    tools: ToolRegistry,
    workflows: HashMap<String, Arc<WorkflowDefinition>>,
    tool_policy: RetryPolicy,
}

impl Default for ToolOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolOrchestrator {
    pub fn new() -> Self {
        Self::with_config(&ExecutionConfig::default())
    }

    pub fn with_config(config: &ExecutionConfig) -> Self {
        Self::with_registry(ToolRegistry::new(), config)
    }

    pub fn with_registry(tools: ToolRegistry, config: &ExecutionConfig) -> Self {
        Self {
            tools,
            workflows: HashMap::new(),
            tool_policy: RetryPolicy::for_tools(config),
        }
    }

    /// Override the timeout/retry applied to each tool call
    pub fn with_tool_policy(mut self, policy: RetryPolicy) -> Self {
        self.tool_policy = policy;
        self
    }

    pub fn register_tool(
        &mut self,
        name: impl Into<String>,
        tool: Arc<dyn Tool>,
        description: impl Into<String>,
    ) -> Result<()> {
        self.tools.register_tool(name, tool, description)
    }

    /// Store a workflow under `name`
    ///
    /// Tool references are not checked here; a missing tool surfaces when the
    /// step that needs it runs. Use [`WorkflowDefinition::validate`] to check
    /// up front.
    pub fn register_workflow(&mut self, name: impl Into<String>, workflow: WorkflowDefinition) {
        let name = name.into();
        debug!(workflow = %name, steps = workflow.steps.len(), "Registering workflow");
        self.workflows.insert(name, Arc::new(workflow));
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn workflow(&self, name: &str) -> Option<Arc<WorkflowDefinition>> {
        self.workflows.get(name).cloned()
    }

    pub fn workflow_names(&self) -> Vec<&str> {
        self.workflows.keys().map(|s| s.as_str()).collect()
    }

    /// Execute a registered workflow
    ///
    /// Steps run strictly in order. A step with `on_error = fail` whose tool
    /// fails aborts with [`Error::WorkflowAborted`] carrying the history so
    /// far; a missing tool is a definition error and aborts immediately.
    pub async fn execute_workflow(&self, name: &str, input: JsonValue) -> Result<WorkflowOutcome> {
        let workflow = self
            .workflow(name)
            .ok_or_else(|| Error::WorkflowNotFound(name.to_string()))?;

        info!(workflow = %name, steps = workflow.steps.len(), "Executing workflow");
        let mut context = ExecutionContext::from_input(input);
        let mut history: Vec<StepRecord> = Vec::with_capacity(workflow.steps.len());
        // A `result` seeded from the input does not count as one written by a step
        let mut wrote_result = false;

        for step in &workflow.steps {
            if let Some(source) = &step.condition {
                match Condition::parse(source).and_then(|c| c.evaluate(&context)) {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(workflow = %name, step = %step.name, "Condition false, skipping");
                        history.push(StepRecord::new(step, StepStatus::Skipped));
                        continue;
                    }
                    Err(e) => {
                        warn!(
                            workflow = %name,
                            step = %step.name,
                            condition = %source,
                            "Condition could not be evaluated, skipping step: {}",
                            e
                        );
                        let mut record = StepRecord::new(step, StepStatus::Skipped);
                        record.condition_warning = Some(e.to_string());
                        history.push(record);
                        continue;
                    }
                }
            }

            let registration = self.tools.get(&step.tool_ref).ok_or_else(|| {
                error!(workflow = %name, step = %step.name, tool = %step.tool_ref, "Tool not registered");
                Error::ToolNotFound(step.tool_ref.clone())
            })?;

            let inputs = resolve_inputs(&step.input_bindings, &context);
            debug!(workflow = %name, step = %step.name, tool = %step.tool_ref, "Running step");

            let started = Instant::now();
            let tool = registration.tool.clone();
            let outcome = self
                .tool_policy
                .run(&step.tool_ref, || {
                    let tool = tool.clone();
                    let inputs = inputs.clone();
                    async move { tool.execute(inputs).await }
                })
                .await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let failure = match outcome {
                Ok(result) if !result.is_error => {
                    registration.record_use();
                    wrote_result |= step.output_bindings.contains_key(RESULT_KEY);
                    apply_output_bindings(&step.output_bindings, &result.content, &mut context);
                    let mut record = StepRecord::new(step, StepStatus::Completed);
                    record.inputs = Some(inputs);
                    record.output = Some(result.content);
                    record.elapsed_ms = elapsed_ms;
                    history.push(record);
                    continue;
                }
                Ok(result) => result.text(),
                Err(e) => e.to_string(),
            };

            let mut record = StepRecord::new(step, StepStatus::Failed);
            record.inputs = Some(inputs);
            record.error = Some(failure.clone());
            record.elapsed_ms = elapsed_ms;
            history.push(record);

            match step.on_error {
                OnError::Fail => {
                    error!(workflow = %name, step = %step.name, "Step failed, aborting workflow: {}", failure);
                    return Err(Error::WorkflowAborted {
                        workflow: name.to_string(),
                        step: step.name.clone(),
                        message: failure,
                        history,
                    });
                }
                OnError::Continue => {
                    warn!(workflow = %name, step = %step.name, "Step failed, continuing: {}", failure);
                }
            }
        }

        let result = if wrote_result {
            context.get(RESULT_KEY).cloned()
        } else {
            None
        };
        let status = if result.is_some() {
            WorkflowStatus::Completed
        } else {
            warn!(workflow = %name, "Workflow finished without a result");
            WorkflowStatus::Empty
        };
        info!(workflow = %name, status = ?status, "Workflow finished");

        Ok(WorkflowOutcome {
            workflow: name.to_string(),
            status,
            result,
            context,
            execution_history: history,
        })
    }
}

fn resolve_inputs(bindings: &Map<String, JsonValue>, context: &ExecutionContext) -> JsonValue {
    JsonValue::Object(
        bindings
            .iter()
            .map(|(key, binding)| (key.clone(), context.resolve(binding)))
            .collect(),
    )
}

/// Extract a value from a tool result for an output binding
///
/// `$result` is the whole value, `$result.a.b` and `a.b` are sub-fields.
fn extract_output(content: &JsonValue, source: &str) -> JsonValue {
    let path = source.trim();
    let path = if path == "$result" {
        ""
    } else {
        path.strip_prefix("$result.").unwrap_or(path)
    };
    if path.is_empty() {
        return content.clone();
    }
    lookup_path(content, path).cloned().unwrap_or(JsonValue::Null)
}

fn apply_output_bindings(
    bindings: &std::collections::BTreeMap<String, String>,
    content: &JsonValue,
    context: &mut ExecutionContext,
) {
    for (key, source) in bindings {
        context.set(key.clone(), extract_output(content, source));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EchoTool, FailingTool, SlowTool};
    use serde_json::json;
    use std::time::Duration;

    fn orchestrator() -> ToolOrchestrator {
        let mut orch = ToolOrchestrator::new();
        orch.register_tool("echo", Arc::new(EchoTool::new("echo")), "echo")
            .unwrap();
        orch.register_tool("fail", Arc::new(FailingTool::new("fail")), "fail")
            .unwrap();
        orch
    }

    #[tokio::test]
    async fn test_three_steps_in_order() {
        let mut orch = orchestrator();
        orch.register_workflow(
            "chain",
            WorkflowDefinition::new("chain")
                .step(Step::new("a", "echo").input("v", "${start}").output("a_out", "$result.v"))
                .step(Step::new("b", "echo").input("v", "${a_out}-b").output("b_out", "v"))
                .step(Step::new("c", "echo").input("final", "${b_out}").output("result", "$result")),
        );

        let outcome = orch.execute_workflow("chain", json!({"start": "x"})).await.unwrap();

        let names: Vec<&str> = outcome.execution_history.iter().map(|r| r.step.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(outcome
            .execution_history
            .iter()
            .all(|r| r.status == StepStatus::Completed));
        assert_eq!(outcome.result, Some(json!({"final": "x-b"})));
        assert_eq!(outcome.result, outcome.execution_history[2].output);
        assert_eq!(outcome.status, WorkflowStatus::Completed);
        assert_eq!(orch.tools().usage_count("echo"), Some(3));
    }

    #[tokio::test]
    async fn test_false_condition_skips_without_invoking() {
        let mut orch = orchestrator();
        orch.register_workflow(
            "cond",
            WorkflowDefinition::new("cond")
                .step(Step::new("maybe", "echo").condition("enabled == true"))
                .step(Step::new("always", "echo").output("result", "$result")),
        );

        let outcome = orch.execute_workflow("cond", json!({"enabled": false})).await.unwrap();

        assert_eq!(outcome.execution_history.len(), 2);
        let skipped = &outcome.execution_history[0];
        assert!(skipped.skipped());
        assert!(skipped.condition_warning.is_none());
        assert!(skipped.output.is_none());
        assert_eq!(orch.tools().usage_count("echo"), Some(1));
    }

    #[tokio::test]
    async fn test_condition_error_skips_with_warning() {
        let mut orch = orchestrator();
        orch.register_workflow(
            "warn",
            WorkflowDefinition::new("warn")
                .step(Step::new("typo", "echo").condition("name > 3"))
                .step(Step::new("broken", "echo").condition("a ==")),
        );

        let outcome = orch.execute_workflow("warn", json!({"name": "ada"})).await.unwrap();

        assert!(outcome.execution_history.iter().all(|r| r.skipped()));
        assert!(outcome
            .execution_history
            .iter()
            .all(|r| r.condition_warning.is_some()));
        assert_eq!(orch.tools().usage_count("echo"), Some(0));
    }

    #[tokio::test]
    async fn test_fail_halts_execution() {
        let mut orch = orchestrator();
        orch.register_workflow(
            "halt",
            WorkflowDefinition::new("halt")
                .step(Step::new("ok", "echo"))
                .step(Step::new("boom", "fail"))
                .step(Step::new("never", "echo")),
        );

        let err = orch.execute_workflow("halt", json!({})).await.unwrap_err();
        match err {
            Error::WorkflowAborted { step, history, .. } => {
                assert_eq!(step, "boom");
                assert_eq!(history.len(), 2);
                assert!(history[1].failed());
                assert!(history.iter().all(|r| r.step != "never"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(orch.tools().usage_count("echo"), Some(1));
    }

    #[tokio::test]
    async fn test_continue_proceeds_after_failure() {
        let mut orch = orchestrator();
        orch.register_workflow(
            "resilient",
            WorkflowDefinition::new("resilient")
                .step(Step::new("boom", "fail").on_error(OnError::Continue))
                .step(Step::new("after", "echo").input("x", 1).output("result", "$result")),
        );

        let outcome = orch.execute_workflow("resilient", json!({})).await.unwrap();

        assert_eq!(outcome.execution_history.len(), 2);
        assert!(outcome.execution_history[0].failed());
        assert_eq!(
            outcome.execution_history[0].error.as_deref(),
            Some("fail failed")
        );
        assert_eq!(outcome.execution_history[1].status, StepStatus::Completed);
        assert_eq!(outcome.failed_steps().count(), 1);
        assert_eq!(outcome.result, Some(json!({"x": 1})));
    }

    #[tokio::test]
    async fn test_missing_result_is_empty() {
        let mut orch = orchestrator();
        orch.register_workflow(
            "quiet",
            WorkflowDefinition::new("quiet").step(Step::new("a", "echo").output("other", "$result")),
        );

        let outcome = orch.execute_workflow("quiet", json!({})).await.unwrap();
        assert_eq!(outcome.status, WorkflowStatus::Empty);
        assert!(matches!(outcome.into_result(), Err(Error::EmptyWorkflowResult(w)) if w == "quiet"));
    }

    #[tokio::test]
    async fn test_result_from_input_is_not_a_step_result() {
        let mut orch = orchestrator();
        orch.register_workflow(
            "quiet",
            WorkflowDefinition::new("quiet").step(Step::new("a", "echo").output("other", "$result")),
        );

        let outcome = orch
            .execute_workflow("quiet", json!({"result": "from the caller"}))
            .await
            .unwrap();

        assert_eq!(outcome.status, WorkflowStatus::Empty);
        assert_eq!(outcome.result, None);
        assert_eq!(outcome.context.get("result"), Some(&json!("from the caller")));
    }

    #[tokio::test]
    async fn test_unknown_workflow_and_tool() {
        let mut orch = orchestrator();
        assert!(matches!(
            orch.execute_workflow("nope", json!({})).await,
            Err(Error::WorkflowNotFound(_))
        ));

        orch.register_workflow(
            "ghost",
            WorkflowDefinition::new("ghost").step(Step::new("a", "missing_tool")),
        );
        assert!(matches!(
            orch.execute_workflow("ghost", json!({})).await,
            Err(Error::ToolNotFound(t)) if t == "missing_tool"
        ));
    }

    #[tokio::test]
    async fn test_tool_timeout_is_a_step_failure() {
        let mut orch = orchestrator()
            .with_tool_policy(RetryPolicy::no_retry(Duration::from_millis(20)));
        orch.register_tool("slow", Arc::new(SlowTool), "slow").unwrap();
        orch.register_workflow(
            "slowpoke",
            WorkflowDefinition::new("slowpoke")
                .step(Step::new("wait", "slow").on_error(OnError::Continue)),
        );

        let outcome = orch.execute_workflow("slowpoke", json!({})).await.unwrap();
        let record = &outcome.execution_history[0];
        assert!(record.failed());
        assert!(record.error.as_deref().unwrap().contains("timed out"));
    }

    #[test]
    fn test_extract_output() {
        let content = json!({"a": {"b": [10, 20]}});
        assert_eq!(extract_output(&content, "$result"), content);
        assert_eq!(extract_output(&content, "$result.a.b.1"), json!(20));
        assert_eq!(extract_output(&content, "a.b.0"), json!(10));
        assert_eq!(extract_output(&content, "zzz"), JsonValue::Null);

        let named = json!({"results": {"x": 1}, "s": {"x": 2}});
        assert_eq!(extract_output(&named, "$results.x"), JsonValue::Null);
        assert_eq!(extract_output(&named, "results.x"), json!(1));
    }
}
