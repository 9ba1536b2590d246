//! Lenient extraction of JSON objects from free-form model output.
//!
//! Models wrap JSON in code fences or surround it with prose despite being
//! told not to. The first `{ ... }` block (up to the first closing brace)
//! wins; everything around it is ignored.

use crate::error::{EvalError, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static FIRST_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[\s\S]*?\}").expect("static regex is valid"));

/// Return the first `{ ... }` block in `text`, if any.
pub fn extract_first_object(text: &str) -> Option<&str> {
    FIRST_OBJECT.find(text).map(|m| m.as_str())
}

/// Extract and parse the first JSON object in `text`.
pub fn parse_first_object(text: &str) -> Result<Map<String, Value>> {
    let block = extract_first_object(text)
        .ok_or_else(|| EvalError::LlmParse("no JSON object found in content".to_string()))?;

    match serde_json::from_str::<Value>(block.trim())? {
        Value::Object(map) => Ok(map),
        other => Err(EvalError::LlmParse(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_from_fences_and_prose() {
        let content = "Here you go: ```json\n{\"7\":1,\"8\":0}\n``` thanks";
        assert_eq!(extract_first_object(content), Some("{\"7\":1,\"8\":0}"));

        let map = parse_first_object(content).unwrap();
        assert_eq!(map["7"], 1);
        assert_eq!(map["8"], 0);
    }

    #[test]
    fn test_first_block_wins() {
        let content = "{\"a\":1} and later {\"b\":0}";
        let map = parse_first_object(content).unwrap();
        assert!(map.contains_key("a"));
        assert!(!map.contains_key("b"));
    }

    #[test]
    fn test_no_braces_is_an_error() {
        assert!(extract_first_object("all correct").is_none());
        assert!(matches!(
            parse_first_object("all correct"),
            Err(EvalError::LlmParse(_))
        ));
    }

    #[test]
    fn test_invalid_json_inside_braces_is_an_error() {
        assert!(parse_first_object("{7: yes}").is_err());
    }
}
