//! Query DSL evaluation over stored documents.
//!
//! Covers the subset the façade and its callers use: `match_all`,
//! `match_none`, `term`, `terms`, `ids`, `match`, `range`, `exists` and
//! `bool`. `term` compares exact values (keyword semantics); `match` splits
//! strings on non-alphanumeric characters and matches any shared lowercase token.

use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::error::{EsError, Result};
use crate::models::{Document, Sort, SortOrder};

pub(super) fn matches(query: &Value, id: &str, doc: &Document) -> Result<bool> {
    let (kind, body) = single_entry(query)?;

    match kind {
        "match_all" => Ok(true),
        "match_none" => Ok(false),
        "term" => {
            let (field, expected) = field_clause(body)?;
            let expected = expected.get("value").unwrap_or(expected);
            Ok(field_values(id, doc, field)
                .iter()
                .any(|v| values_equal(v, expected)))
        }
        "terms" => {
            let (field, expected) = field_clause(body)?;
            let expected = expected
                .as_array()
                .ok_or_else(|| EsError::invalid_query("terms expects an array of values"))?;
            Ok(field_values(id, doc, field)
                .iter()
                .any(|v| expected.iter().any(|e| values_equal(v, e))))
        }
        "ids" => {
            let values = body["values"]
                .as_array()
                .ok_or_else(|| EsError::invalid_query("ids expects a values array"))?;
            Ok(values.iter().any(|v| v.as_str() == Some(id)))
        }
        "match" => {
            let (field, text) = field_clause(body)?;
            let text = text.get("query").unwrap_or(text);
            Ok(field_values(id, doc, field)
                .iter()
                .any(|v| text_matches(v, text)))
        }
        "range" => {
            let (field, bounds) = field_clause(body)?;
            Ok(field_values(id, doc, field)
                .iter()
                .any(|v| in_range(v, bounds)))
        }
        "exists" => {
            let field = body["field"]
                .as_str()
                .ok_or_else(|| EsError::invalid_query("exists expects a field name"))?;
            Ok(!field_values(id, doc, field).is_empty())
        }
        "bool" => matches_bool(body, id, doc),
        other => Err(EsError::unsupported(format!("query type '{}'", other))),
    }
}

fn matches_bool(body: &Value, id: &str, doc: &Document) -> Result<bool> {
    let must = clauses(body, "must");
    let filter = clauses(body, "filter");
    let should = clauses(body, "should");

    for query in must.iter().chain(filter.iter()) {
        if !matches(query, id, doc)? {
            return Ok(false);
        }
    }
    for query in clauses(body, "must_not") {
        if matches(query, id, doc)? {
            return Ok(false);
        }
    }

    if should.is_empty() {
        return Ok(true);
    }
    let required = body["minimum_should_match"].as_u64().unwrap_or(
        if must.is_empty() && filter.is_empty() {
            1
        } else {
            0
        },
    );
    let mut matched = 0;
    for query in should {
        if matches(query, id, doc)? {
            matched += 1;
        }
    }
    Ok(matched >= required)
}

/// A bool clause may hold one query or an array of them.
fn clauses<'a>(body: &'a Value, key: &str) -> Vec<&'a Value> {
    match body.get(key) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(query @ Value::Object(_)) => vec![query],
        _ => Vec::new(),
    }
}

fn single_entry(query: &Value) -> Result<(&str, &Value)> {
    match query.as_object() {
        Some(map) if map.len() == 1 => map
            .iter()
            .next()
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| EsError::invalid_query("empty query")),
        _ => Err(EsError::invalid_query(format!(
            "expected an object with exactly one query type, got {}",
            query
        ))),
    }
}

fn field_clause(body: &Value) -> Result<(&str, &Value)> {
    let map = body
        .as_object()
        .ok_or_else(|| EsError::invalid_query("expected {field: ...}"))?;
    // `boost` and friends may sit beside the field in `terms`.
    map.iter()
        .find(|(k, _)| !matches!(k.as_str(), "boost" | "_name"))
        .map(|(k, v)| (k.as_str(), v))
        .ok_or_else(|| EsError::invalid_query("missing field name"))
}

/// All non-null values at a dotted path. Arrays are flattened; `_id` is the document id.
pub(super) fn field_values(id: &str, doc: &Document, path: &str) -> Vec<Value> {
    if path == "_id" {
        return vec![Value::String(id.to_string())];
    }

    let mut current: Vec<&Value> = Vec::new();
    let mut parts = path.split('.');
    if let Some(first) = parts.next() {
        current.extend(doc.get(first));
    }
    for part in parts {
        current = current
            .into_iter()
            .flat_map(|v| match v {
                Value::Array(items) => items.iter().filter_map(|i| i.get(part)).collect::<Vec<_>>(),
                other => other.get(part).into_iter().collect::<Vec<_>>(),
            })
            .collect();
    }

    current
        .into_iter()
        .flat_map(|v| match v {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        })
        .filter(|v| !v.is_null())
        .collect()
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

pub(super) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn text_matches(value: &Value, query: &Value) -> bool {
    match (value, query) {
        (Value::String(stored), Value::String(text)) => {
            let stored = tokens(stored);
            tokens(text).iter().any(|t| stored.contains(t))
        }
        (Value::String(_), _) => false,
        (other, Value::String(text)) => other.to_string() == *text,
        (other, query) => values_equal(other, query),
    }
}

fn in_range(value: &Value, bounds: &Value) -> bool {
    let checks: [(&str, fn(Ordering) -> bool); 4] = [
        ("gte", |o| o != Ordering::Less),
        ("gt", |o| o == Ordering::Greater),
        ("lte", |o| o != Ordering::Greater),
        ("lt", |o| o == Ordering::Less),
    ];

    checks.iter().all(|(key, accept)| match bounds.get(*key) {
        None | Some(Value::Null) => true,
        Some(bound) => compare_values(value, bound).is_some_and(|o| accept(o)),
    })
}

/// Stable sort; documents missing a sort field go last in either order.
pub(super) fn sort_documents(docs: &mut [(String, Document)], sort: &[Sort]) {
    docs.sort_by(|(a_id, a), (b_id, b)| {
        for key in sort {
            let a_val = field_values(a_id, a, &key.field).into_iter().next();
            let b_val = field_values(b_id, b, &key.field).into_iter().next();
            let ordering = match (a_val, b_val) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(x), Some(y)) => {
                    let o = compare_values(&x, &y).unwrap_or(Ordering::Equal);
                    match key.order {
                        SortOrder::Asc => o,
                        SortOrder::Desc => o.reverse(),
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

/// Keep only the requested (possibly dotted) fields of a source.
pub(super) fn filter_source(doc: &Document, fields: &[String]) -> Document {
    let mut filtered = Map::new();
    for field in fields {
        let parts: Vec<&str> = field.split('.').collect();
        if let Some(value) = lookup(doc, &parts) {
            insert_path(&mut filtered, &parts, value.clone());
        }
    }
    filtered
}

fn lookup<'a>(doc: &'a Document, parts: &[&str]) -> Option<&'a Value> {
    let (first, rest) = parts.split_first()?;
    let mut current = doc.get(*first)?;
    for part in rest {
        current = current.as_object()?.get(*part)?;
    }
    Some(current)
}

/// Set `value` at the object path `parts`, replacing non-object parents.
pub(crate) fn insert_path(target: &mut Document, parts: &[&str], value: Value) {
    let Some((first, rest)) = parts.split_first() else {
        return;
    };
    if rest.is_empty() {
        target.insert(first.to_string(), value);
        return;
    }
    let entry = target
        .entry(first.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Some(child) = entry.as_object_mut() {
        insert_path(child, rest, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_term_and_ids() {
        let d = doc(json!({ "name": "a", "tags": ["x", "y"], "n": 3 }));
        assert!(matches(&json!({ "term": { "name": "a" } }), "1", &d).unwrap());
        assert!(matches(&json!({ "term": { "tags": { "value": "y" } } }), "1", &d).unwrap());
        assert!(matches(&json!({ "term": { "n": 3.0 } }), "1", &d).unwrap());
        assert!(!matches(&json!({ "term": { "name": "b" } }), "1", &d).unwrap());
        assert!(matches(&json!({ "ids": { "values": ["1", "2"] } }), "1", &d).unwrap());
        assert!(matches(&json!({ "term": { "_id": "1" } }), "1", &d).unwrap());
    }

    #[test]
    fn test_match_tokens() {
        let d = doc(json!({ "title": "Quick Brown Fox" }));
        assert!(matches(&json!({ "match": { "title": "fox" } }), "1", &d).unwrap());
        assert!(matches(&json!({ "match": { "title": { "query": "slow brown" } } }), "1", &d).unwrap());
        assert!(!matches(&json!({ "match": { "title": "dog" } }), "1", &d).unwrap());
    }

    #[test]
    fn test_range_and_exists() {
        let d = doc(json!({ "age": 30, "address": { "city": "Oslo" } }));
        assert!(matches(&json!({ "range": { "age": { "gte": 30, "lt": 31 } } }), "1", &d).unwrap());
        assert!(!matches(&json!({ "range": { "age": { "gt": 30 } } }), "1", &d).unwrap());
        assert!(matches(&json!({ "exists": { "field": "address.city" } }), "1", &d).unwrap());
        assert!(!matches(&json!({ "exists": { "field": "address.zip" } }), "1", &d).unwrap());
    }

    #[test]
    fn test_bool() {
        let d = doc(json!({ "name": "a", "state": "open" }));
        let query = json!({
            "bool": {
                "must": { "term": { "name": "a" } },
                "must_not": [{ "term": { "state": "closed" } }]
            }
        });
        assert!(matches(&query, "1", &d).unwrap());

        let should_only = json!({
            "bool": { "should": [{ "term": { "name": "x" } }, { "term": { "name": "y" } }] }
        });
        assert!(!matches(&should_only, "1", &d).unwrap());
    }

    #[test]
    fn test_unsupported_query() {
        let d = doc(json!({}));
        let err = matches(&json!({ "geo_shape": {} }), "1", &d).unwrap_err();
        assert!(matches!(err, EsError::Unsupported(_)));
    }

    #[test]
    fn test_sort_missing_last() {
        let mut docs = vec![
            ("1".to_string(), doc(json!({ "n": 2 }))),
            ("2".to_string(), doc(json!({}))),
            ("3".to_string(), doc(json!({ "n": 5 }))),
        ];
        let sort = [Sort {
            field: "n".into(),
            order: SortOrder::Desc,
        }];
        sort_documents(&mut docs, &sort);
        let ids: Vec<&str> = docs.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }

    #[test]
    fn test_filter_source() {
        let d = doc(json!({ "name": "a", "address": { "city": "Oslo", "zip": "0150" }, "n": 1 }));
        let filtered = filter_source(&d, &["name".into(), "address.city".into(), "missing".into()]);
        assert_eq!(
            Value::Object(filtered),
            json!({ "name": "a", "address": { "city": "Oslo" } })
        );
    }
}
