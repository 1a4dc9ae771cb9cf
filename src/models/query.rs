//! Query predicates and search request bodies.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::str::FromStr;

use crate::error::{EsError, Result};

/// A query DSL predicate. The façade passes it to the engine unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(Value);

impl Query {
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Parse a query from its JSON form, e.g. `{"term": {"name": "a"}}`.
    pub fn parse(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        if !value.is_object() {
            return Err(EsError::invalid_query("query must be a JSON object"));
        }
        Ok(Self(value))
    }

    pub fn match_all() -> Self {
        Self(json!({ "match_all": {} }))
    }

    pub fn term(field: &str, value: impl Into<Value>) -> Self {
        let value: Value = value.into();
        Self(json!({ "term": { field: value } }))
    }

    pub fn terms(field: &str, values: Vec<Value>) -> Self {
        Self(json!({ "terms": { field: values } }))
    }

    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = ids.into_iter().map(Into::into).collect();
        Self(json!({ "ids": { "values": values } }))
    }

    pub fn match_query(field: &str, text: &str) -> Self {
        Self(json!({ "match": { field: { "query": text } } }))
    }

    /// Range over a field; either bound may be open.
    pub fn range(field: &str, gte: Option<Value>, lte: Option<Value>) -> Self {
        let mut bounds = Map::new();
        if let Some(gte) = gte {
            bounds.insert("gte".to_string(), gte);
        }
        if let Some(lte) = lte {
            bounds.insert("lte".to_string(), lte);
        }
        Self(json!({ "range": { field: bounds } }))
    }

    pub fn exists(field: &str) -> Self {
        Self(json!({ "exists": { "field": field } }))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::match_all()
    }
}

impl From<BoolQuery> for Query {
    fn from(query: BoolQuery) -> Self {
        query.build()
    }
}

/// Builder for `bool` compound queries.
#[derive(Debug, Clone, Default)]
pub struct BoolQuery {
    must: Vec<Query>,
    filter: Vec<Query>,
    should: Vec<Query>,
    must_not: Vec<Query>,
}

impl BoolQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, query: Query) -> Self {
        self.must.push(query);
        self
    }

    pub fn filter(mut self, query: Query) -> Self {
        self.filter.push(query);
        self
    }

    pub fn should(mut self, query: Query) -> Self {
        self.should.push(query);
        self
    }

    pub fn must_not(mut self, query: Query) -> Self {
        self.must_not.push(query);
        self
    }

    pub fn build(self) -> Query {
        let mut clauses = Map::new();
        for (name, queries) in [
            ("must", self.must),
            ("filter", self.filter),
            ("should", self.should),
            ("must_not", self.must_not),
        ] {
            if !queries.is_empty() {
                let values: Vec<Value> = queries.into_iter().map(Query::into_value).collect();
                clauses.insert(name.to_string(), Value::Array(values));
            }
        }
        Query(json!({ "bool": clauses }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = EsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(EsError::invalid_query(format!(
                "unknown sort order '{}', expected asc or desc",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub order: SortOrder,
}

/// Body of a search request as the façade builds it.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: Query,
    pub size: usize,
    pub sort: Vec<Sort>,
    /// Restricts `_source` to these fields when set.
    pub source_fields: Option<Vec<String>>,
    pub aggregations: Option<Value>,
}

impl SearchRequest {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            size: 10,
            sort: Vec::new(),
            source_fields: None,
            aggregations: None,
        }
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn sorted_by(mut self, field: &str, order: SortOrder) -> Self {
        self.sort.push(Sort {
            field: field.to_string(),
            order,
        });
        self
    }

    pub fn with_source_fields<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.source_fields = Some(fields.iter().map(|f| f.as_ref().to_string()).collect());
        self
    }

    pub fn with_aggregations(mut self, aggregations: Value) -> Self {
        self.aggregations = Some(aggregations);
        self
    }

    /// Render the request as a search API body.
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "query": self.query.as_value(),
            "size": self.size,
            "track_total_hits": true
        });

        if !self.sort.is_empty() {
            let sort: Vec<Value> = self
                .sort
                .iter()
                .map(|s| json!({ &s.field: { "order": s.order.as_str() } }))
                .collect();
            body["sort"] = Value::Array(sort);
        }

        if let Some(ref fields) = self.source_fields {
            body["_source"] = json!(fields);
        }

        if let Some(ref aggs) = self.aggregations {
            body["aggs"] = aggs.clone();
        }

        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_query_skips_empty_clauses() {
        let query = BoolQuery::new()
            .must(Query::term("name", "a"))
            .must_not(Query::exists("deleted"))
            .build();

        assert_eq!(
            query.as_value(),
            &json!({
                "bool": {
                    "must": [{ "term": { "name": "a" } }],
                    "must_not": [{ "exists": { "field": "deleted" } }]
                }
            })
        );
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(matches!(Query::parse("\"x\""), Err(EsError::InvalidQuery(_))));
    }

    #[test]
    fn test_request_body() {
        let request = SearchRequest::new(Query::match_all())
            .with_size(25)
            .sorted_by("created", SortOrder::Desc)
            .with_source_fields(&["name", "created"]);

        let body = request.to_body();
        assert_eq!(body["size"], json!(25));
        assert_eq!(body["sort"], json!([{ "created": { "order": "desc" } }]));
        assert_eq!(body["_source"], json!(["name", "created"]));
        assert!(body.get("aggs").is_none());
    }

    #[test]
    fn test_sort_order_from_str() {
        assert_eq!("DESC".parse::<SortOrder>().unwrap(), SortOrder::Desc);
        assert!("sideways".parse::<SortOrder>().is_err());
    }
}
