//! Aggregations over matched documents: `terms`, `value_count`, `min`,
//! `max`, `sum` and `avg`. Sub-aggregations are not evaluated.

use serde_json::{json, Map, Value};
use std::cmp::Ordering;

use super::eval::{compare_values, field_values};
use crate::error::{EsError, Result};
use crate::models::Document;

const DEFAULT_TERMS_SIZE: usize = 10;

pub(super) fn aggregate(aggs: &Value, docs: &[(String, Document)]) -> Result<Value> {
    let aggs = aggs
        .as_object()
        .ok_or_else(|| EsError::invalid_query("aggregations must be an object"))?;

    let mut results = Map::new();
    for (name, definition) in aggs {
        results.insert(name.clone(), evaluate(name, definition, docs)?);
    }
    Ok(Value::Object(results))
}

fn evaluate(name: &str, definition: &Value, docs: &[(String, Document)]) -> Result<Value> {
    let definition = definition
        .as_object()
        .ok_or_else(|| EsError::invalid_query(format!("aggregation '{}' must be an object", name)))?;
    if definition.contains_key("aggs") || definition.contains_key("aggregations") {
        return Err(EsError::unsupported(format!(
            "sub-aggregations in '{}'",
            name
        )));
    }
    let (kind, params) = definition
        .iter()
        .next()
        .ok_or_else(|| EsError::invalid_query(format!("aggregation '{}' is empty", name)))?;
    let field = params["field"].as_str().ok_or_else(|| {
        EsError::invalid_query(format!("aggregation '{}' needs a field", name))
    })?;

    let values: Vec<Value> = docs
        .iter()
        .flat_map(|(id, doc)| field_values(id, doc, field))
        .collect();

    match kind.as_str() {
        "terms" => {
            let size = params["size"]
                .as_u64()
                .map(|s| s as usize)
                .unwrap_or(DEFAULT_TERMS_SIZE);
            Ok(terms(values, size))
        }
        "value_count" => Ok(json!({ "value": values.len() })),
        "min" | "max" | "sum" | "avg" => {
            let numbers: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
            Ok(json!({ "value": metric(kind, &numbers) }))
        }
        other => Err(EsError::unsupported(format!("aggregation type '{}'", other))),
    }
}

fn terms(values: Vec<Value>, size: usize) -> Value {
    let mut counts: Vec<(Value, u64)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(key, _)| *key == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((value, 1)),
        }
    }

    // Highest count first, ties broken by key.
    counts.sort_by(|(a_key, a_count), (b_key, b_count)| {
        b_count
            .cmp(a_count)
            .then_with(|| compare_values(a_key, b_key).unwrap_or(Ordering::Equal))
    });

    let other: u64 = counts.iter().skip(size).map(|(_, c)| c).sum();
    let buckets: Vec<Value> = counts
        .into_iter()
        .take(size)
        .map(|(key, count)| json!({ "key": key, "doc_count": count }))
        .collect();

    json!({
        "doc_count_error_upper_bound": 0,
        "sum_other_doc_count": other,
        "buckets": buckets
    })
}

fn metric(kind: &str, numbers: &[f64]) -> Option<f64> {
    match kind {
        "sum" => Some(numbers.iter().sum()),
        _ if numbers.is_empty() => None,
        "min" => numbers.iter().copied().reduce(f64::min),
        "max" => numbers.iter().copied().reduce(f64::max),
        "avg" => Some(numbers.iter().sum::<f64>() / numbers.len() as f64),
        _ => None,
    }
}
