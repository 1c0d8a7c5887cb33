//! Lookup collaborators
//!
//! The engine never owns agent or tool catalogues. It asks an
//! [`AgentDefinitionResolver`] for definitions and a [`ToolResolver`] for
//! tool records; the in-memory implementations here back tests and
//! embedded use.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::agents::AgentDefinition;
use crate::Result;

/// Resolves agent definitions by id
#[async_trait]
pub trait AgentDefinitionResolver: Send + Sync {
    async fn get(&self, definition_id: &str) -> Result<Option<AgentDefinition>>;
}

/// Catalogue entry describing how to construct a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRecord {
    pub id: String,
    /// Constructor tag in the tool factory registry
    pub type_tag: String,
    #[serde(default)]
    pub parameters_schema: JsonValue,
    /// Default constructor parameters
    #[serde(default)]
    pub parameters: JsonValue,
}

impl ToolRecord {
    pub fn new(id: impl Into<String>, type_tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_tag: type_tag.into(),
            parameters_schema: JsonValue::Null,
            parameters: JsonValue::Null,
        }
    }

    pub fn with_parameters(mut self, parameters: JsonValue) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Resolves tool records by id
#[async_trait]
pub trait ToolResolver: Send + Sync {
    async fn get_by_id(&self, tool_id: &str) -> Result<Option<ToolRecord>>;
}

/// Definitions held in memory
#[derive(Debug, Default)]
pub struct InMemoryDefinitions {
    definitions: DashMap<String, AgentDefinition>,
}

impl InMemoryDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, definition: AgentDefinition) {
        self.definitions.insert(definition.id.clone(), definition);
    }

    pub fn with(self, definition: AgentDefinition) -> Self {
        self.insert(definition);
        self
    }

    pub fn remove(&self, definition_id: &str) -> Option<AgentDefinition> {
        self.definitions.remove(definition_id).map(|(_, d)| d)
    }
}

#[async_trait]
impl AgentDefinitionResolver for InMemoryDefinitions {
    async fn get(&self, definition_id: &str) -> Result<Option<AgentDefinition>> {
        Ok(self.definitions.get(definition_id).map(|d| d.clone()))
    }
}

/// Tool records held in memory
#[derive(Debug, Default)]
pub struct InMemoryToolCatalog {
    records: DashMap<String, ToolRecord>,
}

impl InMemoryToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: ToolRecord) {
        self.records.insert(record.id.clone(), record);
    }

    pub fn with(self, record: ToolRecord) -> Self {
        self.insert(record);
        self
    }
}

#[async_trait]
impl ToolResolver for InMemoryToolCatalog {
    async fn get_by_id(&self, tool_id: &str) -> Result<Option<ToolRecord>> {
        Ok(self.records.get(tool_id).map(|r| r.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_definitions() {
        let defs = InMemoryDefinitions::new().with(AgentDefinition::new("a", "Alpha", "assistant"));
        assert_eq!(defs.get("a").await.unwrap().unwrap().name, "Alpha");
        assert!(defs.get("b").await.unwrap().is_none());
        defs.remove("a");
        assert!(defs.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_tool_catalog() {
        let catalog = InMemoryToolCatalog::new().with(ToolRecord::new("reader", "read_file"));
        let record = catalog.get_by_id("reader").await.unwrap().unwrap();
        assert_eq!(record.type_tag, "read_file");
    }
}
