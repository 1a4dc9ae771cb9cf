//! Elasticsearch index mapping handling.

use serde_json::Value;

use crate::error::{EsError, Result};
use crate::models::document::json_kind;

/// Top-level keys of a mappings object. A single key from this list is never
/// treated as a type wrapper.
const MAPPING_KEYS: &[&str] = &[
    "properties",
    "dynamic",
    "dynamic_templates",
    "_source",
    "_routing",
    "_meta",
    "runtime",
    "enabled",
    "date_detection",
    "numeric_detection",
];

/// Parse a mapping source into a typeless mappings object.
///
/// Accepts the bare form `{"properties": {...}}`, the type-keyed form
/// `{"<doc_type>": {"properties": {...}}}` and either one wrapped in
/// `{"mappings": ...}`.
pub fn normalize_mapping(doc_type: &str, schema_json: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(schema_json)?;
    let mapping = unwrap_single(value, "mappings");
    let mapping = if MAPPING_KEYS.contains(&doc_type) {
        mapping
    } else {
        unwrap_single(mapping, doc_type)
    };

    if !mapping.is_object() {
        return Err(EsError::InvalidDocument(format!(
            "mapping must be a JSON object, got {}",
            json_kind(&mapping)
        )));
    }
    Ok(mapping)
}

/// Replace `{key: inner}` with `inner` when `key` is the object's only entry.
fn unwrap_single(value: Value, key: &str) -> Value {
    match value {
        Value::Object(mut map) if map.len() == 1 && map.get(key).is_some_and(Value::is_object) => {
            map.remove(key).unwrap_or_default()
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_mapping() {
        let mapping = normalize_mapping("doc", r#"{"properties": {"name": {"type": "keyword"}}}"#)
            .unwrap();
        assert_eq!(mapping, json!({ "properties": { "name": { "type": "keyword" } } }));
    }

    #[test]
    fn test_type_keyed_mapping() {
        let mapping = normalize_mapping(
            "doc",
            r#"{"mappings": {"doc": {"properties": {"name": {"type": "text"}}}}}"#,
        )
        .unwrap();
        assert_eq!(mapping, json!({ "properties": { "name": { "type": "text" } } }));
    }

    #[test]
    fn test_type_named_like_mapping_key_is_not_unwrapped() {
        let mapping =
            normalize_mapping("properties", r#"{"properties": {"a": {"type": "long"}}}"#).unwrap();
        assert_eq!(mapping, json!({ "properties": { "a": { "type": "long" } } }));
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(matches!(
            normalize_mapping("doc", "[]"),
            Err(EsError::InvalidDocument(_))
        ));
    }
}
