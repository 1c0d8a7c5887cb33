//! Run a shell command under a timeout

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agentry_core::tool::{Tool, ToolResult};
use agentry_core::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::process::Command;
use tokio::time::timeout;

use crate::{parse_input, parse_params};

pub const TOOL_NAME: &str = "shell";

const DEFAULT_TIMEOUT_MS: u64 = 120_000;
const MAX_TIMEOUT_MS: u64 = 600_000;

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ShellParams {
    shell: String,
    /// Default and upper bound for a call's timeout
    timeout_ms: u64,
    working_dir: Option<PathBuf>,
}

impl Default for ShellParams {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            working_dir: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ShellInput {
    command: String,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ShellOutput {
    stdout: String,
    stderr: String,
    exit_code: Option<i32>,
}

#[derive(Debug)]
pub struct ShellTool {
    shell: String,
    timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl Default for ShellTool {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }
}

impl ShellTool {
    pub fn new(timeout: Duration) -> Self {
        Self {
            shell: "bash".to_string(),
            timeout: timeout.min(Duration::from_millis(MAX_TIMEOUT_MS)),
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn from_params(params: &Value) -> Result<Self> {
        let params: ShellParams = parse_params(TOOL_NAME, params)?;
        Ok(Self {
            shell: params.shell,
            timeout: Duration::from_millis(params.timeout_ms.min(MAX_TIMEOUT_MS)),
            working_dir: params.working_dir,
        })
    }
}

pub(crate) fn construct(params: &Value) -> Result<Arc<dyn Tool>> {
    Ok(Arc::new(ShellTool::from_params(params)?))
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Execute a shell command and return stdout, stderr and the exit code. A non-zero exit is a failure."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "The command to execute"},
                "timeout_ms": {
                    "type": "integer",
                    "description": "Timeout in milliseconds, capped by the tool's configured limit"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        let input: ShellInput = match parse_input(TOOL_NAME, input) {
            Ok(input) => input,
            Err(result) => return Ok(result),
        };
        let limit = input
            .timeout_ms
            .map(Duration::from_millis)
            .map_or(self.timeout, |t| t.min(self.timeout));

        tracing::debug!(command = %input.command, timeout_ms = limit.as_millis() as u64, "Executing shell command");

        let mut command = Command::new(&self.shell);
        command.arg("-c").arg(&input.command).kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let output = match timeout(limit, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Ok(ToolResult::error(format!("Failed to execute command: {}", e)));
            }
            Err(_) => {
                return Ok(ToolResult::error(format!(
                    "Command timed out after {}ms",
                    limit.as_millis()
                )));
            }
        };

        let result = serde_json::to_value(ShellOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })?;
        if output.status.success() {
            Ok(ToolResult::success(result))
        } else {
            Ok(ToolResult {
                content: result,
                is_error: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_echo() {
        let result = ShellTool::default()
            .execute(json!({"command": "echo hello"}))
            .await
            .unwrap();

        assert!(!result.is_error);
        assert_eq!(result.content["stdout"], "hello\n");
        assert_eq!(result.content["exit_code"], 0);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_error_result() {
        let result = ShellTool::default()
            .execute(json!({"command": "echo oops >&2; exit 3"}))
            .await
            .unwrap();

        assert!(result.is_error);
        assert_eq!(result.content["exit_code"], 3);
        assert_eq!(result.content["stderr"], "oops\n");
    }

    #[tokio::test]
    async fn test_timeout() {
        let result = ShellTool::default()
            .execute(json!({"command": "sleep 10", "timeout_ms": 100}))
            .await
            .unwrap();

        assert!(result.is_error);
        assert!(result.text().contains("timed out"));
    }

    #[tokio::test]
    async fn test_configured_limit_caps_requested_timeout() {
        let tool = ShellTool::from_params(&json!({"timeout_ms": 100})).unwrap();
        let result = tool
            .execute(json!({"command": "sleep 10", "timeout_ms": 60000}))
            .await
            .unwrap();
        assert!(result.text().contains("timed out after 100ms"));
    }

    #[tokio::test]
    async fn test_working_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();
        let result = ShellTool::default()
            .with_working_dir(dir.path())
            .execute(json!({"command": "ls"}))
            .await
            .unwrap();
        assert!(result.content["stdout"].as_str().unwrap().contains("marker"));
    }
}
