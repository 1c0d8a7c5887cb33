//! Compile-time registry of tool constructors keyed by type tag

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::tool::Tool;
use crate::{Error, Result};

/// Builds a tool instance from its merged parameters
pub type ToolConstructor = fn(&JsonValue) -> Result<Arc<dyn Tool>>;

/// Type tag to constructor mapping, populated at startup
#[derive(Default, Clone)]
pub struct ToolFactoryRegistry {
    constructors: HashMap<String, ToolConstructor>,
}

impl ToolFactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_tag: impl Into<String>, constructor: ToolConstructor) {
        self.constructors.insert(type_tag.into(), constructor);
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.constructors.contains_key(type_tag)
    }

    /// Instantiate the tool registered under `type_tag`
    pub fn create(&self, type_tag: &str, parameters: &JsonValue) -> Result<Arc<dyn Tool>> {
        let constructor =
            self.constructors
                .get(type_tag)
                .ok_or_else(|| Error::ToolResolution {
                    tool_id: type_tag.to_string(),
                    reason: format!("no constructor registered for type '{}'", type_tag),
                })?;
        constructor(parameters)
    }

    pub fn type_tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.constructors.keys().map(|s| s.as_str()).collect();
        tags.sort_unstable();
        tags
    }
}

/// Shallow-merge `overrides` over `defaults`
///
/// Both sides are expected to be objects; a non-object override replaces the
/// defaults entirely, and a null override keeps them.
pub fn merge_parameters(defaults: &JsonValue, overrides: &JsonValue) -> JsonValue {
    match (defaults, overrides) {
        (JsonValue::Object(base), JsonValue::Object(extra)) => {
            let mut merged = base.clone();
            for (key, value) in extra {
                merged.insert(key.clone(), value.clone());
            }
            JsonValue::Object(merged)
        }
        (base, JsonValue::Null) => base.clone(),
        (_, other) => other.clone(),
    }
}
