//! Create or overwrite a file

use std::path::PathBuf;
use std::sync::Arc;

use agentry_core::tool::{Tool, ToolResult};
use agentry_core::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;

use crate::{parse_input, parse_params, sandboxed};

pub const TOOL_NAME: &str = "write_file";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WriteFileParams {
    root: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct WriteFileInput {
    path: String,
    content: String,
    #[serde(default)]
    append: bool,
}

#[derive(Debug, Default)]
pub struct WriteFileTool {
    root: Option<PathBuf>,
}

impl WriteFileTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn from_params(params: &Value) -> Result<Self> {
        let params: WriteFileParams = parse_params(TOOL_NAME, params)?;
        Ok(Self { root: params.root })
    }
}

pub(crate) fn construct(params: &Value) -> Result<Arc<dyn Tool>> {
    Ok(Arc::new(WriteFileTool::from_params(params)?))
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Write text to a file, creating parent directories. Overwrites unless append is set."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path of the file to write"},
                "content": {"type": "string", "description": "Text to write"},
                "append": {"type": "boolean", "description": "Append instead of overwriting", "default": false}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        let input: WriteFileInput = match parse_input(TOOL_NAME, input) {
            Ok(input) => input,
            Err(result) => return Ok(result),
        };
        let path = match sandboxed(self.root.as_deref(), &input.path) {
            Ok(path) => path,
            Err(reason) => return Ok(ToolResult::error(reason)),
        };

        tracing::debug!(path = %path.display(), bytes = input.content.len(), append = input.append, "Writing file");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(parent).await {
                return Ok(ToolResult::error(format!(
                    "Failed to create parent directories: {}",
                    e
                )));
            }
        }

        let written = if input.append {
            append(&path, &input.content).await
        } else {
            fs::write(&path, &input.content).await
        };

        match written {
            Ok(()) => Ok(ToolResult::success(json!({
                "path": input.path,
                "bytes_written": input.content.len(),
                "appended": input.append,
            }))),
            Err(e) => Ok(ToolResult::error(format!(
                "Failed to write file '{}': {}",
                input.path, e
            ))),
        }
    }
}

async fn append(path: &std::path::Path, content: &str) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_nested_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/dir/out.txt");

        let result = WriteFileTool::new()
            .execute(json!({"path": path.to_str().unwrap(), "content": "Hello"}))
            .await
            .unwrap();

        assert!(!result.is_error);
        assert_eq!(result.content["bytes_written"], 5);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Hello");
    }

    #[tokio::test]
    async fn test_overwrite_and_append() {
        let dir = TempDir::new().unwrap();
        let tool = WriteFileTool::with_root(dir.path());

        tool.execute(json!({"path": "log.txt", "content": "old"})).await.unwrap();
        tool.execute(json!({"path": "log.txt", "content": "new"})).await.unwrap();
        tool.execute(json!({"path": "log.txt", "content": "+more", "append": true}))
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("log.txt")).unwrap(),
            "new+more"
        );
    }

    #[tokio::test]
    async fn test_missing_content_is_error_result() {
        let result = WriteFileTool::new()
            .execute(json!({"path": "x.txt"}))
            .await
            .unwrap();
        assert!(result.is_error);
    }
}
