//! agentry-tools: built-in tools for agentry
//!
//! Every tool answers with structured JSON. Bad arguments and failed
//! operations come back as error results so a workflow can decide whether
//! to stop or continue.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use agentry_core::tool::{ToolFactoryRegistry, ToolRegistry, ToolResult};
use agentry_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub mod glob;
pub mod http;
pub mod read_file;
pub mod shell;
pub mod write_file;

pub use self::glob::GlobTool;
pub use http::HttpRequestTool;
pub use read_file::ReadFileTool;
pub use shell::ShellTool;
pub use write_file::WriteFileTool;

/// Register every built-in tool with default settings
pub fn register_default_tools(registry: &mut ToolRegistry) -> Result<()> {
    registry.register(Arc::new(ReadFileTool::default()))?;
    registry.register(Arc::new(WriteFileTool::default()))?;
    registry.register(Arc::new(ShellTool::default()))?;
    registry.register(Arc::new(GlobTool::default()))?;
    registry.register(Arc::new(HttpRequestTool::new()?))?;
    Ok(())
}

/// Register constructors for the built-in type tags
///
/// Tags match the tool names: `read_file`, `write_file`, `shell`, `glob`
/// and `http_request`.
pub fn register_builtin_factories(factories: &mut ToolFactoryRegistry) {
    factories.register(read_file::TOOL_NAME, read_file::construct);
    factories.register(write_file::TOOL_NAME, write_file::construct);
    factories.register(shell::TOOL_NAME, shell::construct);
    factories.register(self::glob::TOOL_NAME, self::glob::construct);
    factories.register(http::TOOL_NAME, http::construct);
}

/// Constructor parameters; null means all defaults
pub(crate) fn parse_params<T: DeserializeOwned + Default>(tool: &str, params: &Value) -> Result<T> {
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params.clone())
        .map_err(|e| Error::InvalidArgument(format!("{} parameters: {}", tool, e)))
}

/// Call input, or the error result to hand back
pub(crate) fn parse_input<T: DeserializeOwned>(
    tool: &str,
    input: Value,
) -> std::result::Result<T, ToolResult> {
    serde_json::from_value(input)
        .map_err(|e| ToolResult::error(format!("{}: invalid input: {}", tool, e)))
}

/// Resolve `path` against an optional sandbox root
///
/// With a root, relative paths are joined onto it and anything that would
/// leave it is refused.
pub(crate) fn sandboxed(root: Option<&Path>, path: &str) -> std::result::Result<PathBuf, String> {
    let Some(root) = root else {
        return Ok(PathBuf::from(path));
    };
    let candidate = Path::new(path);
    if candidate.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(format!("path '{}' may not contain '..'", path));
    }
    if candidate.is_absolute() {
        if candidate.starts_with(root) {
            return Ok(candidate.to_path_buf());
        }
        return Err(format!("path '{}' is outside {}", path, root.display()));
    }
    Ok(root.join(candidate))
}
