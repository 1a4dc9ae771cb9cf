//! Update script for bulk field assignment.

use serde_json::{json, Value};

use crate::models::Document;

/// Assigns every entry of `params.fields` onto the matched document. Values
/// travel as script parameters and never become part of the script source.
/// Dotted keys are object paths; missing or non-object parents are replaced
/// by objects.
const ASSIGN_FIELDS: &str = "\
for (entry in params.fields.entrySet()) { \
  Map target = ctx._source; \
  String[] path = entry.getKey().splitOnToken('.'); \
  for (int i = 0; i < path.length - 1; i++) { \
    if (!(target.get(path[i]) instanceof Map)) { target.put(path[i], new HashMap()); } \
    target = (Map) target.get(path[i]); \
  } \
  target.put(path[path.length - 1], entry.getValue()); \
}";

/// Build the `script` object of an update-by-query request.
pub fn assignment_script(fields: &Document) -> Value {
    json!({
        "source": ASSIGN_FIELDS,
        "lang": "painless",
        "params": { "fields": fields }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_are_bound_not_interpolated() {
        let mut fields = Document::new();
        fields.insert("name".into(), json!("x'; ctx.op = 'delete"));
        fields.insert("count".into(), json!(3));

        let script = assignment_script(&fields);
        let source = script["source"].as_str().unwrap();

        assert!(!source.contains("delete"));
        assert!(!source.contains("count"));
        assert_eq!(script["params"]["fields"]["name"], json!("x'; ctx.op = 'delete"));
        assert_eq!(script["params"]["fields"]["count"], json!(3));
        assert_eq!(script["lang"], json!("painless"));
    }

    #[test]
    fn test_dotted_keys_walk_object_paths() {
        let source = ASSIGN_FIELDS;
        assert!(source.contains("splitOnToken('.')"));
        assert!(source.contains("new HashMap()"));
        assert!(!source.contains("ctx._source[entry.getKey()]"));
    }
}
