//! Progress reporting from running tasks into chains

use async_trait::async_trait;

use crate::chain::{ChainManager, ChainStep, StepData, ToolExecutionRecord};
use crate::Result;

/// Receives progress from whatever is executing a task
#[async_trait]
pub trait StepReporter: Send + Sync {
    async fn report_step(&self, step: StepData) -> Result<()>;

    async fn report_tool(&self, record: ToolExecutionRecord) -> Result<()>;
}

/// Reports into one chain of a [`ChainManager`]
#[derive(Clone)]
pub struct ChainHandle {
    manager: ChainManager,
    chain_id: String,
}

impl ChainHandle {
    pub(crate) fn new(manager: ChainManager, chain_id: String) -> Self {
        Self { manager, chain_id }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub async fn record_step(&self, step: StepData) -> Result<ChainStep> {
        self.manager.update_chain_step(&self.chain_id, step).await
    }
}

#[async_trait]
impl StepReporter for ChainHandle {
    async fn report_step(&self, step: StepData) -> Result<()> {
        self.record_step(step).await.map(|_| ())
    }

    async fn report_tool(&self, record: ToolExecutionRecord) -> Result<()> {
        self.manager.add_tool_execution(&self.chain_id, record).await
    }
}
