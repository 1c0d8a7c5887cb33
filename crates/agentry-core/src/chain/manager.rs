//! Chain lifecycle management

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::chain::{
    ChainError, ChainHandle, ChainState, ChainStatus, ChainStep, NewRun, RunStore, RunUpdate,
    StepData, ToolExecutionRecord,
};
use crate::resolve::AgentDefinitionResolver;
use crate::{Error, Result};

type ChainCell = Arc<Mutex<ChainState>>;

/// Restricts [`ChainManager::list_active_chains`]
#[derive(Debug, Clone, Default)]
pub struct ChainFilter {
    pub agent_definition_id: Option<String>,
}

impl ChainFilter {
    pub fn agent(agent_definition_id: impl Into<String>) -> Self {
        Self {
            agent_definition_id: Some(agent_definition_id.into()),
        }
    }

    fn matches(&self, state: &ChainState) -> bool {
        self.agent_definition_id
            .as_deref()
            .is_none_or(|id| id == state.agent_definition_id)
    }
}

/// Creates chains and records their progress
///
/// Cheap to clone; clones share the same cache and collaborators. Construct
/// one per process and pass it where needed.
#[derive(Clone)]
pub struct ChainManager {
    chains: Arc<DashMap<String, ChainCell>>,
    store: Arc<dyn RunStore>,
    definitions: Arc<dyn AgentDefinitionResolver>,
}

impl ChainManager {
    pub fn new(store: Arc<dyn RunStore>, definitions: Arc<dyn AgentDefinitionResolver>) -> Self {
        Self {
            chains: Arc::new(DashMap::new()),
            store,
            definitions,
        }
    }

    /// Start a chain for an agent definition
    ///
    /// Opens a persisted run and caches a running state. Does not execute
    /// anything; the caller drives the steps.
    pub async fn create_chain(
        &self,
        agent_definition_id: &str,
        inputs: JsonValue,
    ) -> Result<String> {
        if self.definitions.get(agent_definition_id).await?.is_none() {
            return Err(Error::AgentDefinitionNotFound(
                agent_definition_id.to_string(),
            ));
        }

        let mut state = ChainState::new(agent_definition_id, inputs);
        state.transition(ChainStatus::Running)?;
        state.agent_run_id = self.store.create(NewRun::from_state(&state)).await?;

        let chain_id = state.chain_id.clone();
        info!(
            chain_id = %chain_id,
            agent = %agent_definition_id,
            run_id = %state.agent_run_id,
            "Chain created"
        );
        self.chains
            .insert(chain_id.clone(), Arc::new(Mutex::new(state)));
        Ok(chain_id)
    }

    /// Handle that reports steps and tool calls into `chain_id`
    pub fn handle(&self, chain_id: impl Into<String>) -> ChainHandle {
        ChainHandle::new(self.clone(), chain_id.into())
    }

    /// Cached cell for a chain, rebuilding it from the store on a miss
    async fn cell(&self, chain_id: &str) -> Result<ChainCell> {
        if let Some(cell) = self.chains.get(chain_id) {
            return Ok(cell.clone());
        }

        let record = self
            .store
            .find_by_chain(chain_id)
            .await?
            .ok_or_else(|| Error::ChainNotFound(chain_id.to_string()))?;
        debug!(chain_id = %chain_id, "Chain state rebuilt from run store");

        let cell = self
            .chains
            .entry(chain_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ChainState::from(record))))
            .clone();
        Ok(cell)
    }

    pub async fn get_chain_state(&self, chain_id: &str) -> Result<ChainState> {
        let cell = self.cell(chain_id).await?;
        let state = cell.lock().await;
        Ok(state.clone())
    }

    /// Append a step at the next position and persist the step list
    pub async fn update_chain_step(&self, chain_id: &str, step: StepData) -> Result<ChainStep> {
        let cell = self.cell(chain_id).await?;
        let mut state = cell.lock().await;
        ensure_active(&state)?;

        let step = ChainStep::from_data(step, state.steps.len());
        let mut steps = state.steps.clone();
        steps.push(step.clone());
        self.store
            .update(&state.agent_run_id, RunUpdate::default().steps(steps.clone()))
            .await?;

        state.steps = steps;
        state.touch();
        debug!(
            chain_id = %chain_id,
            position = step.position,
            tool = ?step.tool,
            "Chain step recorded"
        );
        Ok(step)
    }

    /// Append a tool-call audit record; the status is unchanged
    pub async fn add_tool_execution(
        &self,
        chain_id: &str,
        record: ToolExecutionRecord,
    ) -> Result<()> {
        let cell = self.cell(chain_id).await?;
        let mut state = cell.lock().await;
        ensure_active(&state)?;

        let mut tools_used = state.tools_used.clone();
        tools_used.push(record);
        self.store
            .update(
                &state.agent_run_id,
                RunUpdate::default().tools_used(tools_used.clone()),
            )
            .await?;

        state.tools_used = tools_used;
        state.touch();
        Ok(())
    }

    /// Move a running chain to `completed`
    ///
    /// A chain that is already terminal is rejected with
    /// [`Error::InvalidTransition`].
    pub async fn complete_chain(&self, chain_id: &str, outputs: JsonValue) -> Result<ChainState> {
        self.finish_chain(chain_id, outputs, ChainStatus::Completed)
            .await
    }

    /// Settle a running chain in the terminal `status` with `outputs`
    ///
    /// Only `completed` and `failed` are accepted; any other status, or a
    /// chain that is already terminal, is an [`Error::InvalidTransition`].
    pub async fn finish_chain(
        &self,
        chain_id: &str,
        outputs: JsonValue,
        status: ChainStatus,
    ) -> Result<ChainState> {
        let cell = self.cell(chain_id).await?;
        let mut state = cell.lock().await;

        if !status.is_terminal() {
            return Err(Error::InvalidTransition {
                chain_id: chain_id.to_string(),
                from: state.status(),
                to: status,
            });
        }

        let mut next = state.clone();
        next.transition(status)?;
        next.outputs = Some(outputs.clone());
        self.store
            .update(
                &state.agent_run_id,
                RunUpdate::default().status(status).outputs(outputs),
            )
            .await?;

        *state = next;
        info!(chain_id = %chain_id, status = %status, steps = state.steps.len(), "Chain finished");
        Ok(state.clone())
    }

    /// Move a running chain to `failed`, recording the error
    pub async fn fail_chain(
        &self,
        chain_id: &str,
        error_message: &str,
        details: Option<JsonValue>,
    ) -> Result<ChainState> {
        let cell = self.cell(chain_id).await?;
        let mut state = cell.lock().await;

        let mut next = state.clone();
        next.transition(ChainStatus::Failed)?;
        next.errors.push(ChainError {
            message: error_message.to_string(),
            details,
            timestamp: Utc::now(),
        });
        self.store
            .update(
                &state.agent_run_id,
                RunUpdate::default()
                    .status(ChainStatus::Failed)
                    .errors(next.errors.clone()),
            )
            .await?;

        *state = next;
        error!(chain_id = %chain_id, "Chain failed: {}", error_message);
        Ok(state.clone())
    }

    /// Pending and running chains, oldest first
    ///
    /// Running runs found in the store but missing from the cache are loaded
    /// into it first.
    pub async fn list_active_chains(&self, filter: Option<&ChainFilter>) -> Result<Vec<ChainState>> {
        let persisted = self
            .store
            .list_by_status(&[ChainStatus::Pending, ChainStatus::Running])
            .await?;
        for record in persisted {
            if !self.chains.contains_key(&record.chain_id) {
                debug!(chain_id = %record.chain_id, "Reconciling persisted chain into cache");
                self.chains
                    .entry(record.chain_id.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(ChainState::from(record))));
            }
        }

        let mut active = Vec::new();
        for cell in self.cells() {
            let state = cell.lock().await;
            if state.status().is_active() && filter.is_none_or(|f| f.matches(&state)) {
                active.push(state.clone());
            }
        }
        active.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.chain_id.cmp(&b.chain_id))
        });
        Ok(active)
    }

    /// Evict terminal chains last updated at least `max_age` ago
    ///
    /// Only the cache is touched; persisted runs stay. Returns the number of
    /// evicted chains.
    pub async fn cleanup_completed_chains(&self, max_age: Duration) -> Result<usize> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| Error::InvalidArgument(format!("retention out of range: {}", e)))?;
        let cutoff = Utc::now() - max_age;

        let mut expired = Vec::new();
        for (chain_id, cell) in self.entries() {
            let state = cell.lock().await;
            if state.is_terminal() && state.updated_at <= cutoff {
                expired.push(chain_id);
            }
        }

        for chain_id in &expired {
            self.chains.remove(chain_id);
        }
        if !expired.is_empty() {
            info!(evicted = expired.len(), "Cleaned up terminal chains");
        }
        Ok(expired.len())
    }

    /// Drop a chain from the cache; the next read rebuilds it from the store
    pub fn evict(&self, chain_id: &str) -> bool {
        let removed = self.chains.remove(chain_id).is_some();
        if !removed {
            warn!(chain_id = %chain_id, "Evict requested for uncached chain");
        }
        removed
    }

    pub fn cached_count(&self) -> usize {
        self.chains.len()
    }

    // Snapshots so no map shard lock is held across an await.
    fn cells(&self) -> Vec<ChainCell> {
        self.chains.iter().map(|e| e.value().clone()).collect()
    }

    fn entries(&self) -> Vec<(String, ChainCell)> {
        self.chains
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

/// Progress can only be reported while a chain is still running
fn ensure_active(state: &ChainState) -> Result<()> {
    if state.is_terminal() {
        return Err(Error::InvalidTransition {
            chain_id: state.chain_id.clone(),
            from: state.status(),
            to: ChainStatus::Running,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentDefinition;
    use crate::chain::{InMemoryRunStore, SqliteRunStore, StepReporter};
    use crate::resolve::InMemoryDefinitions;
    use serde_json::json;
    use std::collections::HashSet;

    fn manager_with(store: Arc<dyn RunStore>) -> ChainManager {
        let defs = InMemoryDefinitions::new()
            .with(AgentDefinition::new("helper", "Helper", "assistant"))
            .with(AgentDefinition::new("other", "Other", "assistant"));
        ChainManager::new(store, Arc::new(defs))
    }

    fn manager() -> ChainManager {
        manager_with(Arc::new(InMemoryRunStore::new()))
    }

    #[tokio::test]
    async fn test_chain_ids_are_unique() {
        let manager = manager();
        let mut ids = HashSet::new();
        for _ in 0..50 {
            let id = manager.create_chain("helper", json!({})).await.unwrap();
            assert!(ids.insert(id));
        }
        assert_eq!(manager.cached_count(), 50);
    }

    #[tokio::test]
    async fn test_create_requires_known_definition() {
        let manager = manager();
        let err = manager.create_chain("ghost", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::AgentDefinitionNotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_new_chain_is_running() {
        let manager = manager();
        let id = manager
            .create_chain("helper", json!({"task": "hi"}))
            .await
            .unwrap();
        let state = manager.get_chain_state(&id).await.unwrap();
        assert_eq!(state.status(), ChainStatus::Running);
        assert_eq!(state.inputs, json!({"task": "hi"}));
        assert!(!state.agent_run_id.is_empty());
    }

    #[tokio::test]
    async fn test_steps_get_sequential_positions() {
        let manager = manager();
        let id = manager.create_chain("helper", json!({})).await.unwrap();

        for i in 0..3 {
            let step = manager
                .update_chain_step(&id, StepData::new(format!("step {i}")))
                .await
                .unwrap();
            assert_eq!(step.position, i);
        }
        manager
            .add_tool_execution(&id, ToolExecutionRecord::success("glob", json!({}), json!([])))
            .await
            .unwrap();

        let state = manager.get_chain_state(&id).await.unwrap();
        assert_eq!(state.steps.len(), 3);
        assert_eq!(state.tools_used.len(), 1);
        assert_eq!(state.status(), ChainStatus::Running);
    }

    #[tokio::test]
    async fn test_concurrent_step_reports_are_not_lost() {
        let manager = manager();
        let id = manager.create_chain("helper", json!({})).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..20 {
            let handle = manager.handle(id.clone());
            tasks.push(tokio::spawn(async move {
                handle.report_step(StepData::new(format!("s{i}"))).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let state = manager.get_chain_state(&id).await.unwrap();
        let positions: Vec<usize> = state.steps.iter().map(|s| s.position).collect();
        assert_eq!(positions, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_terminal_chains_reject_transitions() {
        let manager = manager();
        let id = manager.create_chain("helper", json!({})).await.unwrap();
        manager.complete_chain(&id, json!("done")).await.unwrap();

        assert!(matches!(
            manager.complete_chain(&id, json!("again")).await,
            Err(Error::InvalidTransition { .. })
        ));
        assert!(matches!(
            manager.fail_chain(&id, "late", None).await,
            Err(Error::InvalidTransition {
                from: ChainStatus::Completed,
                to: ChainStatus::Failed,
                ..
            })
        ));
        assert!(matches!(
            manager.update_chain_step(&id, StepData::new("x")).await,
            Err(Error::InvalidTransition {
                from: ChainStatus::Completed,
                ..
            })
        ));
        let late_tool = manager
            .add_tool_execution(&id, ToolExecutionRecord::success("echo", json!({}), json!(1)))
            .await
            .unwrap_err();
        assert_eq!(late_tool.error_code(), "INVALID_TRANSITION");

        let state = manager.get_chain_state(&id).await.unwrap();
        assert_eq!(state.status(), ChainStatus::Completed);
        assert_eq!(state.outputs, Some(json!("done")));
    }

    #[tokio::test]
    async fn test_finish_chain_accepts_terminal_statuses_only() {
        let manager = manager();
        let id = manager.create_chain("helper", json!({})).await.unwrap();

        assert!(matches!(
            manager.finish_chain(&id, json!({}), ChainStatus::Pending).await,
            Err(Error::InvalidTransition {
                from: ChainStatus::Running,
                to: ChainStatus::Pending,
                ..
            })
        ));
        assert_eq!(
            manager.get_chain_state(&id).await.unwrap().status(),
            ChainStatus::Running
        );

        let state = manager
            .finish_chain(&id, json!({"partial": true}), ChainStatus::Failed)
            .await
            .unwrap();
        assert_eq!(state.status(), ChainStatus::Failed);
        assert_eq!(state.outputs, Some(json!({"partial": true})));

        manager.evict(&id);
        let reloaded = manager.get_chain_state(&id).await.unwrap();
        assert_eq!(reloaded.status(), ChainStatus::Failed);
        assert_eq!(reloaded.outputs, Some(json!({"partial": true})));
    }

    #[tokio::test]
    async fn test_fail_chain_records_error() {
        let manager = manager();
        let id = manager.create_chain("helper", json!({})).await.unwrap();
        let state = manager
            .fail_chain(&id, "tool crashed", Some(json!({"step": 2})))
            .await
            .unwrap();
        assert_eq!(state.status(), ChainStatus::Failed);
        assert_eq!(state.errors.len(), 1);
        assert_eq!(state.errors[0].details, Some(json!({"step": 2})));
    }

    #[tokio::test]
    async fn test_state_rebuilt_after_eviction() {
        let manager = manager_with(Arc::new(SqliteRunStore::in_memory().unwrap()));
        let id = manager.create_chain("helper", json!({"q": 1})).await.unwrap();
        manager
            .update_chain_step(&id, StepData::new("plan").result("ok"))
            .await
            .unwrap();
        manager
            .update_chain_step(&id, StepData::new("search").tool("glob").result(json!(["a.rs"])))
            .await
            .unwrap();
        manager.complete_chain(&id, json!({"answer": 42})).await.unwrap();
        let before = manager.get_chain_state(&id).await.unwrap();

        assert!(manager.evict(&id));
        assert_eq!(manager.cached_count(), 0);

        let after = manager.get_chain_state(&id).await.unwrap();
        assert_eq!(after.steps, before.steps);
        assert_eq!(after.status(), before.status());
        assert_eq!(after.outputs, before.outputs);
        assert_eq!(after.inputs, before.inputs);
        assert_eq!(manager.cached_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_chain() {
        let manager = manager();
        assert!(matches!(
            manager.get_chain_state("nope").await,
            Err(Error::ChainNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cleanup_zero_removes_terminal_only() {
        let manager = manager();
        let running = manager.create_chain("helper", json!({})).await.unwrap();
        let done = manager.create_chain("helper", json!({})).await.unwrap();
        let failed = manager.create_chain("helper", json!({})).await.unwrap();
        manager.complete_chain(&done, json!(1)).await.unwrap();
        manager.fail_chain(&failed, "x", None).await.unwrap();

        let removed = manager
            .cleanup_completed_chains(Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(manager.cached_count(), 1);
        assert_eq!(
            manager.get_chain_state(&running).await.unwrap().status(),
            ChainStatus::Running
        );
        // persisted records survive eviction
        assert_eq!(
            manager.get_chain_state(&done).await.unwrap().status(),
            ChainStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_cleanup_respects_age() {
        let manager = manager();
        let done = manager.create_chain("helper", json!({})).await.unwrap();
        manager.complete_chain(&done, json!(1)).await.unwrap();

        let removed = manager
            .cleanup_completed_chains(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert_eq!(manager.cached_count(), 1);
    }

    #[tokio::test]
    async fn test_list_active_reconciles_from_store() {
        let store: Arc<dyn RunStore> = Arc::new(InMemoryRunStore::new());
        let first = manager_with(store.clone());
        let a = first.create_chain("helper", json!({})).await.unwrap();
        let b = first.create_chain("other", json!({})).await.unwrap();
        let c = first.create_chain("helper", json!({})).await.unwrap();
        first.complete_chain(&c, json!(null)).await.unwrap();

        // a second manager over the same store starts with an empty cache
        let second = manager_with(store);
        assert_eq!(second.cached_count(), 0);

        let active = second.list_active_chains(None).await.unwrap();
        let ids: Vec<&str> = active.iter().map(|s| s.chain_id.as_str()).collect();
        assert_eq!(ids, vec![a.as_str(), b.as_str()]);
        assert_eq!(second.cached_count(), 2);

        let filtered = second
            .list_active_chains(Some(&ChainFilter::agent("other")))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].chain_id, b);
    }
}
