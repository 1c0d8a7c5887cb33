//! Chain state types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::chain::RunRecord;
use crate::{Error, Result};

/// Lifecycle of a chain
///
/// Moves forward only: `pending -> running -> completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ChainStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(self, next: ChainStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::Persistence(format!("unknown chain status '{}'", other))),
        }
    }
}

/// Step payload reported by whoever drives the chain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepData {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
}

impl StepData {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn result(mut self, result: impl Into<JsonValue>) -> Self {
        self.result = Some(result.into());
        self
    }
}

/// A recorded step with its position in the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainStep {
    pub id: String,
    pub position: usize,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    pub timestamp: DateTime<Utc>,
}

impl ChainStep {
    pub(crate) fn from_data(data: StepData, position: usize) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            position,
            description: data.description,
            tool: data.tool,
            result: data.result,
            timestamp: Utc::now(),
        }
    }
}

/// Audit record of one tool call made during a chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecutionRecord {
    pub tool: String,
    pub inputs: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub elapsed_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl ToolExecutionRecord {
    pub fn success(tool: impl Into<String>, inputs: JsonValue, output: JsonValue) -> Self {
        Self {
            tool: tool.into(),
            inputs,
            output: Some(output),
            error: None,
            elapsed_ms: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(tool: impl Into<String>, inputs: JsonValue, error: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            inputs,
            output: None,
            error: Some(error.into()),
            elapsed_ms: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// An error recorded against a chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
    pub timestamp: DateTime<Utc>,
}

/// Full state of one chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainState {
    pub chain_id: String,
    pub agent_run_id: String,
    pub agent_definition_id: String,
    status: ChainStatus,
    pub steps: Vec<ChainStep>,
    pub tools_used: Vec<ToolExecutionRecord>,
    pub errors: Vec<ChainError>,
    pub inputs: JsonValue,
    pub outputs: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChainState {
    pub(crate) fn new(agent_definition_id: impl Into<String>, inputs: JsonValue) -> Self {
        let now = Utc::now();
        Self {
            chain_id: Uuid::now_v7().to_string(),
            agent_run_id: String::new(),
            agent_definition_id: agent_definition_id.into(),
            status: ChainStatus::Pending,
            steps: Vec::new(),
            tools_used: Vec::new(),
            errors: Vec::new(),
            inputs,
            outputs: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> ChainStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Advance the status, rejecting anything but a forward move
    pub(crate) fn transition(&mut self, next: ChainStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                chain_id: self.chain_id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn last_step(&self) -> Option<&ChainStep> {
        self.steps.last()
    }
}

impl From<RunRecord> for ChainState {
    fn from(record: RunRecord) -> Self {
        Self {
            chain_id: record.chain_id,
            agent_run_id: record.run_id,
            agent_definition_id: record.agent_definition_id,
            status: record.status,
            steps: record.steps,
            tools_used: record.tools_used,
            errors: record.errors,
            inputs: record.inputs,
            outputs: record.outputs,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
