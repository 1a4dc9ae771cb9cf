//! Typed views over engine responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Document;
use crate::error::Result;

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    pub index: String,
    pub id: String,
    pub score: Option<f64>,
    /// The stored document. Empty when `_source` was not returned.
    pub source: Document,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResponse {
    pub took: u64,
    /// Total matching documents, not the number of hits returned.
    pub total_hits: u64,
    pub hits: Vec<Hit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scroll_id: Option<String>,
}

#[derive(Deserialize)]
struct RawSearchResponse {
    #[serde(default)]
    took: u64,
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: RawHits,
    aggregations: Option<Value>,
}

#[derive(Deserialize)]
struct RawHits {
    total: Option<RawTotal>,
    #[serde(default)]
    hits: Vec<RawHit>,
}

/// Older engines report a bare count, newer ones `{ "value": n, "relation": "eq" }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTotal {
    Count(u64),
    Object { value: u64 },
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_index", default)]
    index: String,
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score")]
    score: Option<f64>,
    #[serde(rename = "_source")]
    source: Option<Document>,
    sort: Option<Vec<Value>>,
}

impl From<RawSearchResponse> for SearchResponse {
    fn from(raw: RawSearchResponse) -> Self {
        let total_hits = match raw.hits.total {
            Some(RawTotal::Count(n)) | Some(RawTotal::Object { value: n }) => n,
            None => raw.hits.hits.len() as u64,
        };

        Self {
            took: raw.took,
            total_hits,
            hits: raw
                .hits
                .hits
                .into_iter()
                .map(|hit| Hit {
                    index: hit.index,
                    id: hit.id,
                    score: hit.score,
                    source: hit.source.unwrap_or_default(),
                    sort: hit.sort,
                })
                .collect(),
            aggregations: raw.aggregations,
            scroll_id: raw.scroll_id,
        }
    }
}

impl SearchResponse {
    /// Decode a search or scroll API response body.
    pub fn from_value(body: Value) -> Result<Self> {
        let raw: RawSearchResponse = serde_json::from_value(body)?;
        Ok(raw.into())
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Sources of the returned hits, in engine order.
    pub fn sources(&self) -> Vec<Document> {
        self.hits.iter().map(|hit| hit.source.clone()).collect()
    }

    pub fn into_sources(self) -> Vec<Document> {
        self.hits.into_iter().map(|hit| hit.source).collect()
    }
}

/// Outcome of a single-document write (index, update, delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteResponse {
    pub status: u16,
    pub id: Option<String>,
    /// Engine result keyword: `created`, `updated`, `deleted`, `noop`, `not_found`.
    pub result: Option<String>,
}

impl WriteResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            id: None,
            result: None,
        }
    }

    /// Build from a status code and whatever body the engine returned.
    pub fn from_body(status: u16, body: &Value) -> Self {
        Self {
            status,
            id: body["_id"].as_str().map(String::from),
            result: body["result"].as_str().map(String::from),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

/// Counters reported by update-by-query and delete-by-query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByQueryResponse {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub updated: u64,
    #[serde(default)]
    pub deleted: u64,
    #[serde(default)]
    pub version_conflicts: u64,
}

impl ByQueryResponse {
    pub fn from_value(body: Value) -> Result<Self> {
        Ok(serde_json::from_value(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_total_as_object() {
        let response = SearchResponse::from_value(json!({
            "took": 3,
            "_scroll_id": "abc",
            "hits": {
                "total": { "value": 2, "relation": "eq" },
                "hits": [
                    { "_index": "t", "_id": "1", "_score": 1.0, "_source": { "name": "a" } },
                    { "_index": "t", "_id": "2", "_score": 0.5, "_source": { "name": "b" } }
                ]
            }
        }))
        .unwrap();

        assert_eq!(response.total_hits, 2);
        assert_eq!(response.scroll_id.as_deref(), Some("abc"));
        assert_eq!(response.hits[1].id, "2");
        assert_eq!(response.sources()[0]["name"], json!("a"));
    }

    #[test]
    fn test_total_as_number_and_missing_source() {
        let response = SearchResponse::from_value(json!({
            "hits": {
                "total": 7,
                "hits": [{ "_index": "t", "_id": "1", "_score": null }]
            }
        }))
        .unwrap();

        assert_eq!(response.total_hits, 7);
        assert!(response.hits[0].source.is_empty());
        assert_eq!(response.hits[0].score, None);
    }

    #[test]
    fn test_missing_hits_is_an_error() {
        assert!(SearchResponse::from_value(json!({ "took": 1 })).is_err());
    }

    #[test]
    fn test_write_status_range() {
        assert!(WriteResponse::new(200).is_success());
        assert!(WriteResponse::new(201).is_success());
        assert!(WriteResponse::new(299).is_success());
        assert!(!WriteResponse::new(404).is_success());
        assert!(!WriteResponse::new(199).is_success());
    }

    #[test]
    fn test_by_query_counters() {
        let response = ByQueryResponse::from_value(json!({
            "took": 12,
            "total": 3,
            "deleted": 3,
            "version_conflicts": 0,
            "failures": []
        }))
        .unwrap();
        assert_eq!(response.deleted, 3);
        assert_eq!(response.updated, 0);
    }
}
