//! agentry-core: agent orchestration engine
//!
//! Builds agents from stored definitions, runs declarative tool workflows,
//! coordinates planner/executor societies and expert panels, and tracks
//! every run as a chain with persisted steps and tool calls.

pub mod agents;
pub mod chain;
pub mod collab;
pub mod config;
pub mod error;
pub mod llm;
pub mod resolve;
pub mod response;
pub mod telemetry;
pub mod text;
pub mod tool;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use agents::{AgentBuilder, AgentDefinition, AgentInstance, TaskOutcome, TaskRunner};
pub use chain::{ChainManager, ChainRunner, ChainState, ChainStatus, RunStore};
pub use collab::{ExpertTeam, Society};
pub use config::{Config, LlmConfig};
pub use error::{Error, Result};
pub use llm::{ChatModel, ChatRequest, ChatResponse};
pub use response::ServiceResponse;
pub use tool::{Tool, ToolRegistry, ToolResult};
pub use workflow::{ToolOrchestrator, WorkflowDefinition, WorkflowOutcome};
