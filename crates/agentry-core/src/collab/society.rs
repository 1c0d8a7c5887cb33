//! Agent societies
//!
//! A society either pairs a planner with an executor, or runs a fixed list of
//! steps where each step hands a templated input to one member agent.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::{Captures, Regex};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::agents::{AgentInstance, HistoryEntry, SocietyStep, TaskOutcome, TaskRunner};
use crate::chain::{StepData, StepReporter};
use crate::collab::{Plan, PlanStep};
use crate::text::extract_json_object;
use crate::{Error, Result};

static TEMPLATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(task|last_result|result_(\d+))\}").expect("template regex is valid")
});

/// How a society divides the work
#[derive(Debug, Clone, PartialEq)]
pub enum SocietyMode {
    /// Member keys (id or name) of the planner and the executor
    PlannerExecutor { planner: String, executor: String },
    Workflow(Vec<SocietyStep>),
}

pub struct Society {
    name: String,
    members: Vec<AgentInstance>,
    mode: SocietyMode,
    reporter: Option<Arc<dyn StepReporter>>,
}

impl Society {
    pub fn planner_executor(
        name: impl Into<String>,
        planner: AgentInstance,
        executor: AgentInstance,
    ) -> Self {
        let mode = SocietyMode::PlannerExecutor {
            planner: planner.id().to_string(),
            executor: executor.id().to_string(),
        };
        Self {
            name: name.into(),
            members: vec![planner, executor],
            mode,
            reporter: None,
        }
    }

    /// Society driven by `steps`; add the agents they name with [`Society::with_member`]
    pub fn workflow(name: impl Into<String>, steps: Vec<SocietyStep>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            mode: SocietyMode::Workflow(steps),
            reporter: None,
        }
    }

    pub fn with_member(mut self, agent: AgentInstance) -> Self {
        self.add_member(agent);
        self
    }

    /// Add an agent; a member with the same id is replaced
    pub fn add_member(&mut self, mut agent: AgentInstance) {
        agent.set_reporter(self.reporter.clone());
        match self.members.iter().position(|m| m.id() == agent.id()) {
            Some(idx) => self.members[idx] = agent,
            None => self.members.push(agent),
        }
    }

    /// Route progress to `reporter`, including tool calls made by members
    pub fn set_reporter(&mut self, reporter: Option<Arc<dyn StepReporter>>) {
        for member in &mut self.members {
            member.set_reporter(reporter.clone());
        }
        self.reporter = reporter;
    }

    pub fn mode(&self) -> &SocietyMode {
        &self.mode
    }

    pub fn members(&self) -> &[AgentInstance] {
        &self.members
    }

    /// Members are addressed by id first, then by name
    fn position(&self, key: &str) -> Option<usize> {
        self.members
            .iter()
            .position(|m| m.id() == key)
            .or_else(|| self.members.iter().position(|m| m.name() == key))
    }

    fn require(&self, key: &str) -> Result<usize> {
        self.position(key).ok_or_else(|| {
            Error::InvalidArgument(format!("society '{}' has no member '{}'", self.name, key))
        })
    }

    async fn report(&self, step: StepData) -> Result<()> {
        match &self.reporter {
            Some(reporter) => reporter.report_step(step).await,
            None => Ok(()),
        }
    }

    async fn run_planned(
        &mut self,
        task: &str,
        planner: &str,
        executor: &str,
        allowed: Option<&[String]>,
    ) -> Result<TaskOutcome> {
        let planner = self.require(planner)?;
        let executor = self.require(executor)?;

        let listing: Vec<String> = self.members[executor]
            .tool_definitions(allowed)
            .iter()
            .map(|d| d.prompt_line())
            .collect();
        let mut prompt = format!("Task: {}", task);
        if !listing.is_empty() {
            prompt.push_str("\n\nTools available to the executor:\n");
            prompt.push_str(&listing.join("\n"));
        }

        let reply = self.members[planner].ask(prompt).await?;
        let mut history = vec![HistoryEntry::new(self.members[planner].name(), &reply)];
        let plan = Plan::parse(&reply, task);
        info!(society = %self.name, steps = plan.len(), "Plan ready");
        self.report(StepData::new("Plan").result(serde_json::to_value(&plan)?))
            .await?;

        let mut results: Vec<(String, String)> = Vec::with_capacity(plan.len());
        for step in &plan.steps {
            let (output, tool) = self
                .execute_step(executor, task, step, &results, allowed)
                .await?;
            history.push(HistoryEntry::new(self.members[executor].name(), &output));

            let mut data = StepData::new(&step.description).result(output.clone());
            if let Some(tool) = tool {
                data = data.tool(tool);
            }
            self.report(data).await?;
            results.push((step.description.clone(), output));
        }

        let mut synthesis = format!("Original task: {}\n", task);
        if !plan.expected_result.is_empty() {
            synthesis.push_str(&format!("Expected result: {}\n", plan.expected_result));
        }
        synthesis.push_str("\nStep results:\n");
        synthesis.push_str(&results_block(&results));
        synthesis.push_str("\nCombine the step results into the final answer.");

        let answer = self.members[executor].ask(synthesis).await?;
        history.push(HistoryEntry::new(self.members[executor].name(), &answer));
        self.report(StepData::new("Synthesis").result(answer.clone()))
            .await?;

        Ok(TaskOutcome::new(answer)
            .with_history(history)
            .with_metadata("mode", "planner_executor")
            .with_metadata("plan", serde_json::to_value(&plan)?))
    }

    /// Run one planned step on the executor
    ///
    /// A step naming a usable tool calls it; when the call fails the executor
    /// answers the step by reasoning instead. Returns the output and the tool
    /// that was attempted.
    async fn execute_step(
        &mut self,
        executor: usize,
        task: &str,
        step: &PlanStep,
        previous: &[(String, String)],
        allowed: Option<&[String]>,
    ) -> Result<(String, Option<String>)> {
        let agent = &mut self.members[executor];
        let mut brief = format!("Task: {}\n", task);
        if !previous.is_empty() {
            brief.push_str("\nCompleted steps:\n");
            brief.push_str(&results_block(previous));
        }
        brief.push_str(&format!("\nCurrent step: {}", step.description));

        let tool = step.tool.as_deref().filter(|name| {
            agent.has_tool(name) && allowed.is_none_or(|names| names.iter().any(|n| n == name))
        });
        let Some(tool) = tool else {
            if let Some(name) = &step.tool {
                debug!(tool = %name, "Planned tool is not available, reasoning directly");
            }
            return Ok((agent.ask(brief).await?, None));
        };

        let input = match &step.input {
            Some(input) => input.clone(),
            None => {
                let reply = agent
                    .ask(format!(
                        "{}\n\nReply with only the JSON input object for the tool '{}'.",
                        brief, tool
                    ))
                    .await?;
                extract_json_object(&reply).unwrap_or_else(|| json!({}))
            }
        };

        let failure = match agent.call_tool(tool, input).await {
            Ok(result) if !result.is_error => return Ok((result.text(), Some(tool.to_string()))),
            Ok(result) => result.text(),
            Err(e) if e.is_transient() || matches!(e, Error::ToolExecution(_) | Error::InvalidArgument(_)) => {
                e.to_string()
            }
            Err(e) => return Err(e),
        };

        warn!(tool, error = %failure, "Tool step failed, falling back to reasoning");
        let reply = agent
            .ask(format!(
                "{}\n\nThe tool '{}' failed: {}\nComplete this step using your own reasoning.",
                brief, tool, failure
            ))
            .await?;
        Ok((reply, Some(tool.to_string())))
    }

    /// Run the declared steps in order
    ///
    /// The answer is the last output produced. When no step ran, the task text
    /// is the last available value and becomes the answer.
    async fn run_steps(
        &mut self,
        task: &str,
        steps: &[SocietyStep],
        allowed: Option<&[String]>,
    ) -> Result<TaskOutcome> {
        let mut results: Vec<Option<String>> = Vec::with_capacity(steps.len());
        let mut last: Option<String> = None;
        let mut history = Vec::new();

        for step in steps {
            let Some(idx) = self.position(&step.agent) else {
                warn!(society = %self.name, step = %step.name, agent = %step.agent, "No member for step, skipping");
                results.push(None);
                continue;
            };

            let input = render_input(&step.input, task, &results, last.as_deref());
            debug!(society = %self.name, step = %step.name, "Running society step");
            let outcome = self.members[idx].run_task(&input, allowed).await?;

            history.push(HistoryEntry::new(self.members[idx].name(), &outcome.answer));
            self.report(StepData::new(&step.name).result(outcome.answer.clone()))
                .await?;
            last = Some(outcome.answer.clone());
            results.push(Some(outcome.answer));
        }

        let executed = results.iter().filter(|r| r.is_some()).count();
        let answer = match last {
            Some(answer) => answer,
            None => {
                warn!(society = %self.name, "No society step ran, answering with the task");
                task.to_string()
            }
        };
        Ok(TaskOutcome::new(answer)
            .with_history(history)
            .with_metadata("mode", "workflow")
            .with_metadata("steps_executed", executed))
    }
}

fn results_block(results: &[(String, String)]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, (description, output))| format!("{}. {}: {}\n", i + 1, description, output))
        .collect()
}

/// Fill `{task}`, `{last_result}` and `{result_N}` (0-based) into a step input
///
/// `{last_result}` is the task until a step has produced output. References to
/// skipped or future steps become empty.
fn render_input(
    template: &str,
    task: &str,
    results: &[Option<String>],
    last: Option<&str>,
) -> String {
    TEMPLATE_RE
        .replace_all(template, |caps: &Captures| match &caps[1] {
            "task" => task.to_string(),
            "last_result" => last.unwrap_or(task).to_string(),
            _ => caps
                .get(2)
                .and_then(|n| n.as_str().parse::<usize>().ok())
                .and_then(|i| results.get(i).cloned().flatten())
                .unwrap_or_default(),
        })
        .into_owned()
}

#[async_trait]
impl TaskRunner for Society {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_task(&mut self, task: &str, tools: Option<&[String]>) -> Result<TaskOutcome> {
        info!(society = %self.name, members = self.members.len(), "Society starting task");
        match self.mode.clone() {
            SocietyMode::PlannerExecutor { planner, executor } => {
                self.run_planned(task, &planner, &executor, tools).await
            }
            SocietyMode::Workflow(steps) => self.run_steps(task, &steps, tools).await,
        }
    }
}
