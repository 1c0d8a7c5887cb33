//! Chain state machine
//!
//! A chain is one tracked execution of an agent task. [`ChainManager`]
//! creates chains, records their steps and tool calls, and drives them to a
//! terminal state. State lives in an injected cache in front of a
//! [`RunStore`]; updates to one chain are serialized behind that chain's
//! lock.

pub mod manager;
pub mod reporter;
pub mod runner;
pub mod store;
pub mod types;

pub use manager::{ChainFilter, ChainManager};
pub use reporter::{ChainHandle, StepReporter};
pub use runner::{ChainRunner, RunSummary};
pub use store::{InMemoryRunStore, NewRun, RunRecord, RunStore, RunUpdate, SqliteRunStore};
pub use types::{
    ChainError, ChainState, ChainStatus, ChainStep, StepData, ToolExecutionRecord,
};
