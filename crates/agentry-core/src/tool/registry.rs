//! Registry of named tools
//!
//! Read-mostly after startup: registration happens during initialisation and
//! the registry is then shared behind an `Arc` by every chain.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::tool::{Tool, ToolDefinition, ToolResult};
use crate::{Error, Result};

/// A registered tool with its observability counter
pub struct ToolRegistration {
    pub name: String,
    pub tool: Arc<dyn Tool>,
    pub description: String,
    usage_count: AtomicU64,
}

impl ToolRegistration {
    /// Successful invocations so far
    pub fn usage_count(&self) -> u64 {
        self.usage_count.load(Ordering::Relaxed)
    }

    pub(crate) fn record_use(&self) {
        self.usage_count.fetch_add(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for ToolRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistration")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("usage_count", &self.usage_count())
            .finish()
    }
}

/// Tools indexed by name
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<ToolRegistration>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under `name`
    ///
    /// Re-registering a name replaces the previous tool and resets its count.
    pub fn register_tool(
        &mut self,
        name: impl Into<String>,
        tool: Arc<dyn Tool>,
        description: impl Into<String>,
    ) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "tool name must not be empty".to_string(),
            ));
        }
        debug!(tool = %name, "Registering tool");
        let registration = ToolRegistration {
            name: name.clone(),
            tool,
            description: description.into(),
            usage_count: AtomicU64::new(0),
        };
        self.tools.insert(name, Arc::new(registration));
        Ok(())
    }

    /// Register a tool under its own name and description
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        let description = tool.description().to_string();
        self.register_tool(name, tool, description)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolRegistration>> {
        self.tools.get(name).cloned()
    }

    pub fn tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|r| r.tool.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Usage count for `name`, or `None` if it is not registered
    pub fn usage_count(&self, name: &str) -> Option<u64> {
        self.tools.get(name).map(|r| r.usage_count())
    }

    /// Execute a tool by name, counting the call when it succeeds
    pub async fn execute(&self, name: &str, input: JsonValue) -> Result<ToolResult> {
        let registration = self
            .get(name)
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;
        let result = registration.tool.execute(input).await?;
        if !result.is_error {
            registration.record_use();
        }
        Ok(result)
    }

    /// Definitions of every registered tool, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|r| ToolDefinition::new(&r.name, &r.description, r.tool.input_schema()))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Registered names, sorted
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EchoTool, FailingTool};
    use serde_json::json;

    #[test]
    fn test_empty_name_rejected() {
        let mut registry = ToolRegistry::new();
        let err = registry
            .register_tool("  ", Arc::new(EchoTool::new("echo")), "echo")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reregistration_overwrites() {
        let mut registry = ToolRegistry::new();
        registry
            .register_tool("t", Arc::new(EchoTool::new("echo")), "first")
            .unwrap();
        registry
            .register_tool("t", Arc::new(FailingTool::new("fail")), "second")
            .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("t").unwrap().description, "second");
    }

    #[tokio::test]
    async fn test_usage_counts_successes_only() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new("echo"))).unwrap();
        registry.register(Arc::new(FailingTool::new("fail"))).unwrap();

        registry.execute("echo", json!({"x": 1})).await.unwrap();
        registry.execute("echo", json!({"x": 2})).await.unwrap();
        let failed = registry.execute("fail", json!({})).await.unwrap();

        assert!(failed.is_error);
        assert_eq!(registry.usage_count("echo"), Some(2));
        assert_eq!(registry.usage_count("fail"), Some(0));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.execute("missing", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(name) if name == "missing"));
    }
}
