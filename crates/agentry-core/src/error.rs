//! Error types for agentry-core

use thiserror::Error;

use crate::chain::ChainStatus;
use crate::workflow::StepRecord;

/// Main error type for agentry-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Unknown agent type: {0}")]
    UnknownAgentType(String),

    #[error("Agent definition not found: {0}")]
    AgentDefinitionNotFound(String),

    #[error("Tool resolution failed for '{tool_id}': {reason}")]
    ToolResolution { tool_id: String, reason: String },

    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// A step with `on_error = fail` stopped the workflow.
    /// `history` holds every record produced up to and including the failing step.
    #[error("Workflow '{workflow}' aborted at step '{step}': {message}")]
    WorkflowAborted {
        workflow: String,
        step: String,
        message: String,
        history: Vec<StepRecord>,
    },

    #[error("Workflow '{0}' finished without writing a result")]
    EmptyWorkflowResult(String),

    #[error("Invalid condition expression: {0}")]
    Condition(String),

    #[error("Chain not found: {0}")]
    ChainNotFound(String),

    #[error("Chain {chain_id} cannot move from {from} to {to}")]
    InvalidTransition {
        chain_id: String,
        from: ChainStatus,
        to: ChainStatus,
    },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Stable machine-readable code for the service response envelope
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::WorkflowNotFound(_) => "WORKFLOW_NOT_FOUND",
            Self::ToolNotFound(_) => "TOOL_NOT_FOUND",
            Self::UnknownAgentType(_) => "UNKNOWN_AGENT_TYPE",
            Self::AgentDefinitionNotFound(_) => "AGENT_NOT_FOUND",
            Self::ToolResolution { .. } => "TOOL_RESOLUTION_ERROR",
            Self::ToolExecution(_) => "TOOL_EXECUTION_ERROR",
            Self::WorkflowAborted { .. } => "WORKFLOW_ABORTED",
            Self::EmptyWorkflowResult(_) => "EMPTY_WORKFLOW_RESULT",
            Self::Condition(_) => "INVALID_CONDITION",
            Self::ChainNotFound(_) => "CHAIN_NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Model(_) => "MODEL_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::Json(_) | Self::Yaml(_) => "SERIALIZATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Definition errors fail fast and are never retried
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            Self::WorkflowNotFound(_)
                | Self::ToolNotFound(_)
                | Self::UnknownAgentType(_)
                | Self::AgentDefinitionNotFound(_)
                | Self::ToolResolution { .. }
        )
    }

    /// Whether a retry around a model or tool call could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Model(_) | Self::Io(_))
    }
}

/// Result type alias for agentry-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::WorkflowNotFound("w".into()).error_code(),
            "WORKFLOW_NOT_FOUND"
        );
        assert_eq!(Error::ChainNotFound("c".into()).error_code(), "CHAIN_NOT_FOUND");
        assert_eq!(Error::Timeout(10).error_code(), "TIMEOUT");
    }

    #[test]
    fn test_definition_errors_are_not_transient() {
        let err = Error::UnknownAgentType("robot".into());
        assert!(err.is_definition_error());
        assert!(!err.is_transient());

        let err = Error::Timeout(100);
        assert!(!err.is_definition_error());
        assert!(err.is_transient());
    }
}
