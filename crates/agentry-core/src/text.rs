//! Helpers for pulling structured data out of model replies

use serde_json::Value as JsonValue;

/// Every top-level JSON object embedded in `text`, in order
///
/// Tracks brace depth outside string literals so prose around the objects
/// (and braces inside strings) does not confuse the scan.
pub fn extract_json_objects(text: &str) -> Vec<JsonValue> {
    let mut values = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escape_next => escape_next = false,
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        if let Ok(value) = serde_json::from_str::<JsonValue>(&text[s..=i]) {
                            values.push(value);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    values
}

/// The first JSON object in `text`, preferring a fenced ```json block
pub fn extract_json_object(text: &str) -> Option<JsonValue> {
    if let Some(fenced) = fenced_block(text) {
        if let Ok(value) = serde_json::from_str::<JsonValue>(fenced.trim()) {
            if value.is_object() {
                return Some(value);
            }
        }
    }
    extract_json_objects(text).into_iter().next()
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_objects_inside_prose() {
        let text = r#"Sure! {"a": 1} and then {"b": {"c": "}"}} done"#;
        assert_eq!(
            extract_json_objects(text),
            vec![json!({"a": 1}), json!({"b": {"c": "}"}})]
        );
    }

    #[test]
    fn test_escaped_quotes() {
        let text = r#"{"say": "he said \"hi {\""}"#;
        assert_eq!(extract_json_objects(text), vec![json!({"say": "he said \"hi {\""})]);
    }

    #[test]
    fn test_fenced_block_preferred() {
        let text = "Plan {not json}\n```json\n{\"steps\": []}\n```\n";
        assert_eq!(extract_json_object(text), Some(json!({"steps": []})));
    }

    #[test]
    fn test_no_json() {
        assert_eq!(extract_json_object("nothing here"), None);
        assert!(extract_json_objects("unbalanced { here").is_empty());
    }
}
