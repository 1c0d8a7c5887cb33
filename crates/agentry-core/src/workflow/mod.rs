//! Declarative tool workflows
//!
//! A [`WorkflowDefinition`] is an ordered list of steps. The
//! [`ToolOrchestrator`] runs it against an [`ExecutionContext`] seeded from
//! the caller's input, evaluating step conditions with the restricted
//! grammar in [`expr`].

pub mod context;
pub mod definition;
pub mod expr;
pub mod orchestrator;

pub use context::ExecutionContext;
pub use definition::{OnError, Step, WorkflowDefinition};
pub use expr::Condition;
pub use orchestrator::{StepRecord, StepStatus, ToolOrchestrator, WorkflowOutcome, WorkflowStatus};
