//! The uniform task interface shared by agents and collaborations

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::Result;

/// One line of a task transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Who produced the entry: an agent name, `user`, or `tool:<name>`
    pub actor: String,
    pub content: String,
}

impl HistoryEntry {
    pub fn new(actor: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            content: content.into(),
        }
    }
}

/// What `run_task` returns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub answer: String,
    pub history: Vec<HistoryEntry>,
    pub metadata: Map<String, JsonValue>,
}

impl TaskOutcome {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// JSON form stored as a chain's outputs
    pub fn to_outputs(&self) -> JsonValue {
        serde_json::json!({
            "answer": self.answer,
            "metadata": self.metadata,
        })
    }
}

/// Anything that can take a task and produce an answer
///
/// `tools`, when given, restricts which bound tools may be used.
#[async_trait]
pub trait TaskRunner: Send {
    fn name(&self) -> &str;

    async fn run_task(&mut self, task: &str, tools: Option<&[String]>) -> Result<TaskOutcome>;
}
