//! Test doubles shared by the unit tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use crate::chain::{StepData, StepReporter, ToolExecutionRecord};
use crate::llm::{ChatModel, ChatRequest, ChatResponse, TokenUsage};
use crate::tool::{Tool, ToolResult};
use crate::{Error, Result};

type Responder = Box<dyn Fn(&ChatRequest) -> Result<String> + Send + Sync>;

/// Chat model answering from a closure and recording every request
pub struct ScriptedModel {
    name: String,
    responder: Responder,
    queue: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(
        name: &str,
        responder: impl Fn(&ChatRequest) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            responder: Box::new(responder),
            queue: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers with `"<name>: <last user message>"`
    pub fn echo(name: &str) -> Self {
        let prefix = name.to_string();
        Self::new(name, move |req| {
            Ok(format!("{}: {}", prefix, req.last_user_text().unwrap_or("")))
        })
    }

    /// Replies from the queue in order, then falls back to a fixed reply
    pub fn queued(name: &str, replies: &[&str], fallback: &str) -> Self {
        let fallback = fallback.to_string();
        let model = Self::new(name, move |_| Ok(fallback.clone()));
        *model.queue.lock().unwrap() = replies.iter().map(|s| s.to_string()).collect();
        model
    }

    /// Always fails with a model error
    pub fn failing(name: &str) -> Self {
        Self::new(name, |_| Err(Error::Model("model unavailable".into())))
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let queued = self.queue.lock().unwrap().pop_front();
        let text = match queued {
            Some(text) => text,
            None => (self.responder)(&request)?,
        };
        Ok(ChatResponse::new(text, TokenUsage::new(10, 5)))
    }
}

/// Returns its input unchanged
pub struct EchoTool {
    name: String,
}

impl EchoTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Echo the input back"
    }

    fn input_schema(&self) -> JsonValue {
        json!({"type": "object"})
    }

    async fn execute(&self, input: JsonValue) -> Result<ToolResult> {
        Ok(ToolResult::success(input))
    }
}

/// Always reports a tool-level failure
pub struct FailingTool {
    name: String,
}

impl FailingTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn input_schema(&self) -> JsonValue {
        json!({"type": "object"})
    }

    async fn execute(&self, _input: JsonValue) -> Result<ToolResult> {
        Ok(ToolResult::error(format!("{} failed", self.name)))
    }
}

/// Sleeps longer than any test timeout
pub struct SlowTool;

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }

    fn description(&self) -> &str {
        "Never finishes in time"
    }

    fn input_schema(&self) -> JsonValue {
        json!({"type": "object"})
    }

    async fn execute(&self, _input: JsonValue) -> Result<ToolResult> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(ToolResult::success("late"))
    }
}

/// Collects everything reported to it
#[derive(Default)]
pub struct RecordingReporter {
    steps: Mutex<Vec<StepData>>,
    tools: Mutex<Vec<ToolExecutionRecord>>,
}

impl RecordingReporter {
    pub fn steps(&self) -> Vec<StepData> {
        self.steps.lock().unwrap().clone()
    }

    pub fn tools(&self) -> Vec<ToolExecutionRecord> {
        self.tools.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepReporter for RecordingReporter {
    async fn report_step(&self, step: StepData) -> Result<()> {
        self.steps.lock().unwrap().push(step);
        Ok(())
    }

    async fn report_tool(&self, record: ToolExecutionRecord) -> Result<()> {
        self.tools.lock().unwrap().push(record);
        Ok(())
    }
}
