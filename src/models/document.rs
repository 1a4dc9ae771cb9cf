//! Documents and the collections that hold them.

use serde_json::{Map, Value};

use crate::error::{EsError, Result};

/// A stored document: field name to JSON value.
pub type Document = Map<String, Value>;

/// Addresses a collection of documents: an index and a document type.
///
/// Types are deprecated by the engine and the typeless API ignores them for
/// reads and writes. The type is still carried so mapping sources keyed by
/// type can be unwrapped, and so log lines name the full collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub index: String,
    pub doc_type: String,
}

impl Target {
    pub fn new(index: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.index, self.doc_type)
    }
}

/// Parse a raw JSON string into a document. Only JSON objects are accepted.
pub fn parse_document(json: &str) -> Result<Document> {
    into_document(serde_json::from_str(json)?)
}

pub fn into_document(value: Value) -> Result<Document> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(EsError::InvalidDocument(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_object() {
        let doc = parse_document(r#"{"name": "a", "count": 2}"#).unwrap();
        assert_eq!(doc["name"], json!("a"));
        assert_eq!(doc["count"], json!(2));
    }

    #[test]
    fn test_parse_rejects_array() {
        let err = parse_document("[1, 2]").unwrap_err();
        assert!(matches!(err, EsError::InvalidDocument(msg) if msg.contains("an array")));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_document("{name"), Err(EsError::Parse(_))));
    }

    #[test]
    fn test_target_display() {
        assert_eq!(Target::new("t", "doc").to_string(), "t/doc");
    }
}
