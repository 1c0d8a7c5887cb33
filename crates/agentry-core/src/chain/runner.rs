//! End-to-end execution of an agent definition inside a tracked chain

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{error, info};

use crate::agents::{AgentBuilder, AgentDefinition, AgentInstance, TaskRunner, TeamSpec};
use crate::chain::{ChainManager, ChainState, ChainStatus, StepReporter};
use crate::collab::{ExpertTeam, PanelMode, Society};
use crate::config::{Config, ExpertConfig};
use crate::resolve::AgentDefinitionResolver;
use crate::response::ServiceResponse;
use crate::{Error, Result};

/// What a caller learns about a finished chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub chain_id: String,
    pub run_id: String,
    pub status: ChainStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<JsonValue>,
    pub steps: usize,
    pub tools_used: usize,
}

impl From<&ChainState> for RunSummary {
    fn from(state: &ChainState) -> Self {
        Self {
            chain_id: state.chain_id.clone(),
            run_id: state.agent_run_id.clone(),
            status: state.status(),
            answer: state
                .outputs
                .as_ref()
                .and_then(|o| o.get("answer"))
                .and_then(|a| a.as_str())
                .map(String::from),
            outputs: state.outputs.clone(),
            steps: state.steps.len(),
            tools_used: state.tools_used.len(),
        }
    }
}

/// Creates a chain, builds the agent or team, runs the task and settles the chain
#[derive(Clone)]
pub struct ChainRunner {
    manager: ChainManager,
    builder: AgentBuilder,
    definitions: Arc<dyn AgentDefinitionResolver>,
    experts: ExpertConfig,
    retention: Duration,
}

impl ChainRunner {
    pub fn new(
        manager: ChainManager,
        builder: AgentBuilder,
        definitions: Arc<dyn AgentDefinitionResolver>,
    ) -> Self {
        let config = Config::default();
        Self {
            manager,
            builder,
            definitions,
            experts: config.experts,
            retention: retention(config.chain.retention_hours),
        }
    }

    pub fn with_config(mut self, config: &Config) -> Self {
        self.experts = config.experts.clone();
        self.retention = retention(config.chain.retention_hours);
        self
    }

    pub fn manager(&self) -> &ChainManager {
        &self.manager
    }

    /// Run `definition_id` on `inputs`
    ///
    /// The task text is `inputs.task` when present, otherwise the inputs
    /// themselves. `inputs.tools`, a list of tool names, restricts which
    /// bound tools may be used. When the run fails after the chain was
    /// created, the response carries the failed chain's summary as well as
    /// the error.
    pub async fn run(&self, definition_id: &str, inputs: JsonValue) -> ServiceResponse<RunSummary> {
        let chain_id = match self.manager.create_chain(definition_id, inputs.clone()).await {
            Ok(chain_id) => chain_id,
            Err(e) => return ServiceResponse::err(&e),
        };

        match self.drive(&chain_id, definition_id, &inputs).await {
            Ok(state) => ServiceResponse::ok(RunSummary::from(&state)),
            Err(e) => {
                error!(chain_id = %chain_id, agent = %definition_id, "Chain run failed: {}", e);
                let details = match &e {
                    Error::WorkflowAborted { history, .. } => serde_json::to_value(history).ok(),
                    _ => None,
                };
                let mut response = ServiceResponse::err(&e);
                match self.manager.fail_chain(&chain_id, &e.to_string(), details).await {
                    Ok(state) => response.data = Some(RunSummary::from(&state)),
                    Err(fail_err) => {
                        error!(chain_id = %chain_id, "Could not mark chain failed: {}", fail_err);
                    }
                }
                response
            }
        }
    }

    async fn drive(&self, chain_id: &str, definition_id: &str, inputs: &JsonValue) -> Result<ChainState> {
        let definition = self
            .definitions
            .get(definition_id)
            .await?
            .ok_or_else(|| Error::AgentDefinitionNotFound(definition_id.to_string()))?;
        let reporter: Arc<dyn StepReporter> = Arc::new(self.manager.handle(chain_id));

        let mut runner = self.assemble(&definition, reporter).await?;
        let task = task_text(inputs);
        let tools = allowed_tools(inputs);
        info!(chain_id = %chain_id, agent = %definition_id, runner = %runner.name(), "Running chain task");

        let outcome = runner.run_task(&task, tools.as_deref()).await?;
        self.manager
            .complete_chain(chain_id, outcome.to_outputs())
            .await
    }

    /// The single agent or team that will run the task, reporting into the chain
    async fn assemble(
        &self,
        definition: &AgentDefinition,
        reporter: Arc<dyn StepReporter>,
    ) -> Result<Box<dyn TaskRunner>> {
        let Some(team) = &definition.team else {
            let mut agent = self.builder.build(definition).await?;
            agent.set_reporter(Some(reporter));
            return Ok(Box::new(agent));
        };

        match team {
            TeamSpec::PlannerExecutor { planner, executor } => {
                let mut society = Society::planner_executor(
                    &definition.name,
                    self.member(planner).await?,
                    self.member(executor).await?,
                );
                society.set_reporter(Some(reporter));
                Ok(Box::new(society))
            }
            TeamSpec::Workflow { steps } => {
                let mut society = Society::workflow(&definition.name, steps.clone());
                let ids: BTreeSet<&str> = steps.iter().map(|s| s.agent.as_str()).collect();
                for id in ids {
                    society.add_member(self.member(id).await?);
                }
                society.set_reporter(Some(reporter));
                Ok(Box::new(society))
            }
            TeamSpec::Experts {
                experts,
                moderator,
                parallel,
            } => {
                let mut panel = self
                    .panel(&definition.name, experts, moderator.as_deref())
                    .await?
                    .parallel(parallel.unwrap_or(self.experts.parallel));
                panel.set_reporter(Some(reporter));
                Ok(Box::new(panel))
            }
            TeamSpec::Debate {
                experts,
                moderator,
                rounds,
            } => {
                let mut panel = self
                    .panel(&definition.name, experts, moderator.as_deref())
                    .await?
                    .parallel(self.experts.parallel)
                    .with_mode(PanelMode::Debate {
                        rounds: rounds.unwrap_or(self.experts.debate_rounds),
                    });
                panel.set_reporter(Some(reporter));
                Ok(Box::new(panel))
            }
        }
    }

    async fn member(&self, definition_id: &str) -> Result<AgentInstance> {
        self.builder
            .build_by_id(self.definitions.as_ref(), definition_id)
            .await
    }

    async fn panel(
        &self,
        name: &str,
        experts: &[String],
        moderator: Option<&str>,
    ) -> Result<ExpertTeam> {
        let mut members = Vec::with_capacity(experts.len());
        for id in experts {
            members.push(self.member(id).await?);
        }
        let mut panel = ExpertTeam::new(name, members);
        if let Some(id) = moderator {
            panel = panel.with_moderator(self.member(id).await?);
        }
        Ok(panel)
    }

    /// Evict terminal chains older than the configured retention
    pub async fn cleanup(&self) -> Result<usize> {
        self.manager.cleanup_completed_chains(self.retention).await
    }
}

fn retention(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(3600))
}

fn task_text(inputs: &JsonValue) -> String {
    match inputs {
        JsonValue::String(task) => task.clone(),
        other => match other.get("task").and_then(|t| t.as_str()) {
            Some(task) => task.to_string(),
            None => other.to_string(),
        },
    }
}

fn allowed_tools(inputs: &JsonValue) -> Option<Vec<String>> {
    let names = inputs.get("tools")?.as_array()?;
    Some(
        names
            .iter()
            .filter_map(|n| n.as_str())
            .map(String::from)
            .collect(),
    )
}
