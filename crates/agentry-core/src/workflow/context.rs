//! Execution context and binding resolution

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

static TEMPLATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{\s*([A-Za-z0-9_.\-]+)\s*\}").expect("valid template regex"));

/// Look up a dotted path (`a.b.0.c`) inside a JSON value
///
/// Numeric segments index into arrays. Returns `None` when any segment is
/// missing.
pub fn lookup_path<'a>(root: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let mut current = root;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            JsonValue::Object(map) => map.get(segment)?,
            JsonValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Key/value map threaded through one workflow execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext {
    values: Map<String, JsonValue>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a context from caller input
    ///
    /// Objects become the top-level keys; any other value is stored under
    /// `input`.
    pub fn from_input(input: JsonValue) -> Self {
        let values = match input {
            JsonValue::Object(map) => map,
            JsonValue::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("input".to_string(), other);
                map
            }
        };
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: JsonValue) {
        self.values.insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Dotted lookup from the top of the context
    pub fn lookup(&self, path: &str) -> Option<&JsonValue> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let value = self.values.get(head)?;
        match rest {
            Some(rest) => lookup_path(value, rest),
            None => Some(value),
        }
    }

    /// Resolve an input binding against the context
    ///
    /// A string that is exactly `${path}` yields the referenced value with its
    /// type intact; strings with embedded references are interpolated;
    /// objects and arrays resolve element-wise; everything else is literal.
    /// Missing references resolve to null (or an empty string when
    /// interpolated).
    pub fn resolve(&self, binding: &JsonValue) -> JsonValue {
        match binding {
            JsonValue::String(s) => self.resolve_str(s),
            JsonValue::Array(items) => {
                JsonValue::Array(items.iter().map(|v| self.resolve(v)).collect())
            }
            JsonValue::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn resolve_str(&self, s: &str) -> JsonValue {
        if let Some(caps) = TEMPLATE.captures(s) {
            if caps.get(0).is_some_and(|m| m.as_str().len() == s.len()) {
                return self.lookup(&caps[1]).cloned().unwrap_or(JsonValue::Null);
            }
        } else {
            return JsonValue::String(s.to_string());
        }
        JsonValue::String(self.interpolate(s))
    }

    /// Replace every `${path}` in `template` with the text of its value
    pub fn interpolate(&self, template: &str) -> String {
        TEMPLATE
            .replace_all(template, |caps: &regex::Captures<'_>| {
                match self.lookup(&caps[1]) {
                    Some(JsonValue::String(s)) => s.clone(),
                    Some(JsonValue::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                }
            })
            .into_owned()
    }

    pub fn as_map(&self) -> &Map<String, JsonValue> {
        &self.values
    }

    pub fn into_value(self) -> JsonValue {
        JsonValue::Object(self.values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        ExecutionContext::from_input(json!({
            "user": {"name": "ada", "tags": ["x", "y"], "age": 36},
            "count": 3,
            "empty": null
        }))
    }

    #[test]
    fn test_dotted_lookup() {
        let ctx = ctx();
        assert_eq!(ctx.lookup("user.name"), Some(&json!("ada")));
        assert_eq!(ctx.lookup("user.tags.1"), Some(&json!("y")));
        assert_eq!(ctx.lookup("user.missing"), None);
        assert_eq!(ctx.lookup("nope"), None);
    }

    #[test]
    fn test_exact_reference_preserves_type() {
        let ctx = ctx();
        assert_eq!(ctx.resolve(&json!("${count}")), json!(3));
        assert_eq!(ctx.resolve(&json!("${user.tags}")), json!(["x", "y"]));
        assert_eq!(ctx.resolve(&json!("${ missing.path }")), JsonValue::Null);
    }

    #[test]
    fn test_embedded_reference_interpolates() {
        let ctx = ctx();
        assert_eq!(
            ctx.resolve(&json!("${user.name} is ${user.age}")),
            json!("ada is 36")
        );
        assert_eq!(ctx.resolve(&json!("hi ${missing}!")), json!("hi !"));
    }

    #[test]
    fn test_nested_and_literal_bindings() {
        let ctx = ctx();
        let resolved = ctx.resolve(&json!({
            "who": "${user.name}",
            "list": ["${count}", 7],
            "flag": true,
            "plain": "no refs"
        }));
        assert_eq!(
            resolved,
            json!({"who": "ada", "list": [3, 7], "flag": true, "plain": "no refs"})
        );
    }

    #[test]
    fn test_non_object_input() {
        let ctx = ExecutionContext::from_input(json!("raw"));
        assert_eq!(ctx.get("input"), Some(&json!("raw")));
        assert!(ExecutionContext::from_input(JsonValue::Null).is_empty());
    }
}
