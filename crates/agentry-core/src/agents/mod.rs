//! Agents
//!
//! ```text
//! AgentDefinition ──► AgentBuilder ──► AgentInstance ──► run_task
//!                      │        │
//!       AgentTypeRegistry    ToolResolver + ToolFactoryRegistry
//! ```
//!
//! Every agent and every collaboration implements [`TaskRunner`], so callers
//! drive them the same way.

pub mod builder;
pub mod definition;
pub mod instance;
pub mod registry;
pub mod task;

pub use builder::AgentBuilder;
pub use definition::{AgentDefinition, ModelSettings, SocietyStep, TeamSpec, ToolBinding};
pub use instance::{AgentInstance, ToolCallRecord};
pub use registry::{expert_prompt, AgentConstructor, AgentSeed, AgentTypeRegistry, MODERATOR_PROMPT};
pub use task::{HistoryEntry, TaskOutcome, TaskRunner};
