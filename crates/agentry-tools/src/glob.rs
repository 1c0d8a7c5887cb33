//! Find files by glob pattern

use std::path::PathBuf;
use std::sync::Arc;

use agentry_core::tool::{Tool, ToolResult};
use agentry_core::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{parse_input, parse_params};

pub const TOOL_NAME: &str = "glob";

const DEFAULT_MAX_RESULTS: usize = 1_000;

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GlobParams {
    /// Base directory when a call gives none
    root: Option<PathBuf>,
    max_results: usize,
}

impl Default for GlobParams {
    fn default() -> Self {
        Self {
            root: None,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GlobInput {
    pattern: String,
    path: Option<String>,
}

#[derive(Debug)]
pub struct GlobTool {
    root: Option<PathBuf>,
    max_results: usize,
}

impl Default for GlobTool {
    fn default() -> Self {
        Self {
            root: None,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl GlobTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_params(params: &Value) -> Result<Self> {
        let params: GlobParams = parse_params(TOOL_NAME, params)?;
        Ok(Self {
            root: params.root,
            max_results: params.max_results.max(1),
        })
    }
}

pub(crate) fn construct(params: &Value) -> Result<Arc<dyn Tool>> {
    Ok(Arc::new(GlobTool::from_params(params)?))
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern (e.g. '**/*.rs'), sorted by path"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Glob pattern, e.g. '**/*.rs'"},
                "path": {"type": "string", "description": "Base directory to search from"}
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: Value) -> Result<ToolResult> {
        let input: GlobInput = match parse_input(TOOL_NAME, input) {
            Ok(input) => input,
            Err(result) => return Ok(result),
        };

        let base = input
            .path
            .map(PathBuf::from)
            .or_else(|| self.root.clone());
        let full_pattern = match &base {
            Some(base) => format!(
                "{}/{}",
                base.display().to_string().trim_end_matches('/'),
                input.pattern
            ),
            None => input.pattern.clone(),
        };

        tracing::debug!(pattern = %full_pattern, "Globbing files");

        let paths = match glob::glob(&full_pattern) {
            Ok(paths) => paths,
            Err(e) => return Ok(ToolResult::error(format!("Invalid glob pattern: {}", e))),
        };

        let mut matches = Vec::new();
        for entry in paths {
            match entry {
                Ok(path) => matches.push(path.display().to_string()),
                Err(e) => tracing::warn!("Glob error: {}", e),
            }
        }
        matches.sort();
        let truncated = matches.len() > self.max_results;
        matches.truncate(self.max_results);

        Ok(ToolResult::success(json!({
            "pattern": input.pattern,
            "count": matches.len(),
            "truncated": truncated,
            "matches": matches,
        })))
    }
}
