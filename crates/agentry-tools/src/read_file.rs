//! Read file contents, optionally a line window

use std::path::PathBuf;
use std::sync::Arc;

use agentry_core::tool::{Tool, ToolResult};
use agentry_core::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;

use crate::{parse_input, parse_params, sandboxed};

pub const TOOL_NAME: &str = "read_file";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReadFileParams {
    /// Directory that every path is confined to
    root: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ReadFileInput {
    path: String,
    /// First line to return, 1-indexed
    #[serde(default = "first_line")]
    offset: usize,
    limit: Option<usize>,
}

fn first_line() -> usize {
    1
}

#[derive(Debug, Default)]
pub struct ReadFileTool {
    root: Option<PathBuf>,
}

impl ReadFileTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn from_params(params: &Value) -> Result<Self> {
        let params: ReadFileParams = parse_params(TOOL_NAME, params)?;
        Ok(Self { root: params.root })
    }
}

pub(crate) fn construct(params: &Value) -> Result<Arc<dyn Tool>> {
    Ok(Arc::new(ReadFileTool::from_params(params)?))
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Read a text file. Supports a line window via offset (1-indexed) and limit."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path of the file to read"},
                "offset": {"type": "integer", "description": "First line to return (1-indexed)"},
                "limit": {"type": "integer", "description": "Maximum number of lines to return"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        let input: ReadFileInput = match parse_input(TOOL_NAME, input) {
            Ok(input) => input,
            Err(result) => return Ok(result),
        };
        let path = match sandboxed(self.root.as_deref(), &input.path) {
            Ok(path) => path,
            Err(reason) => return Ok(ToolResult::error(reason)),
        };

        tracing::debug!(path = %path.display(), offset = input.offset, limit = ?input.limit, "Reading file");

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                return Ok(ToolResult::error(format!(
                    "Failed to read file '{}': {}",
                    input.path, e
                )));
            }
        };

        let lines: Vec<&str> = content.lines().collect();
        let start = input.offset.saturating_sub(1).min(lines.len());
        let end = match input.limit {
            Some(limit) => start.saturating_add(limit).min(lines.len()),
            None => lines.len(),
        };

        Ok(ToolResult::success(json!({
            "path": input.path,
            "content": lines[start..end].join("\n"),
            "start_line": start + 1,
            "lines": end - start,
            "total_lines": lines.len(),
        })))
    }
}
