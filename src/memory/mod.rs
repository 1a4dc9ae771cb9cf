//! In-process `SearchBackend`.
//!
//! Keeps indices in memory and mirrors the engine behaviors the façade relies
//! on: writes become searchable only after a refresh (gets are real-time),
//! missing indices answer with 404s, scroll contexts expire after their TTL,
//! and mapping updates may add fields but not change a field's type.

mod aggs;
mod eval;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::backend::SearchBackend;
use crate::error::{EsError, Result};
use crate::models::{
    ByQueryResponse, Document, Hit, Query, SearchRequest, SearchResponse, WriteResponse,
};

/// Round-trips served so far, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestStats {
    pub searches: usize,
    pub scroll_opens: usize,
    pub scroll_pages: usize,
    pub scroll_clears: usize,
    pub refreshes: usize,
}

impl RequestStats {
    /// Requests that returned a page of scroll results.
    pub fn scroll_requests(&self) -> usize {
        self.scroll_opens + self.scroll_pages
    }
}

#[derive(Default)]
struct MemIndex {
    mappings: Map<String, Value>,
    live: Vec<(String, Document)>,
    /// Snapshot of `live` taken at the last refresh.
    searchable: Vec<(String, Document)>,
}

impl MemIndex {
    fn position(&self, id: &str) -> Option<usize> {
        self.live.iter().position(|(doc_id, _)| doc_id == id)
    }

    fn matching(&self, query: &Query) -> Result<Vec<(String, Document)>> {
        let mut matched = Vec::new();
        for (id, doc) in &self.searchable {
            if eval::matches(query.as_value(), id, doc)? {
                matched.push((id.clone(), doc.clone()));
            }
        }
        Ok(matched)
    }
}

struct ScrollCursor {
    index: String,
    total: u64,
    remaining: VecDeque<Hit>,
    page_size: usize,
    expires_at: Instant,
}

#[derive(Default)]
struct State {
    indices: HashMap<String, MemIndex>,
    scrolls: HashMap<String, ScrollCursor>,
    next_scroll: u64,
    stats: RequestStats,
}

impl State {
    fn index(&self, name: &str) -> Result<&MemIndex> {
        self.indices.get(name).ok_or_else(|| index_not_found(name))
    }

    fn index_mut(&mut self, name: &str) -> Result<&mut MemIndex> {
        self.indices
            .get_mut(name)
            .ok_or_else(|| index_not_found(name))
    }

    /// Matching documents after sorting, plus aggregations over all of them.
    fn run_search(
        &self,
        index: &str,
        request: &SearchRequest,
    ) -> Result<(Vec<Hit>, Option<Value>)> {
        let mut matched = self.index(index)?.matching(&request.query)?;
        eval::sort_documents(&mut matched, &request.sort);

        let aggregations = request
            .aggregations
            .as_ref()
            .map(|definition| aggs::aggregate(definition, &matched))
            .transpose()?;

        let hits = matched
            .into_iter()
            .map(|(id, doc)| to_hit(index, id, doc, request))
            .collect();
        Ok((hits, aggregations))
    }
}

fn to_hit(index: &str, id: String, doc: Document, request: &SearchRequest) -> Hit {
    let sort = (!request.sort.is_empty()).then(|| {
        request
            .sort
            .iter()
            .map(|s| {
                eval::field_values(&id, &doc, &s.field)
                    .into_iter()
                    .next()
                    .unwrap_or(Value::Null)
            })
            .collect()
    });
    let source = match request.source_fields {
        Some(ref fields) => eval::filter_source(&doc, fields),
        None => doc,
    };

    Hit {
        index: index.to_string(),
        id,
        score: if sort.is_some() { None } else { Some(1.0) },
        source,
        sort,
    }
}

fn index_not_found(index: &str) -> EsError {
    EsError::engine(
        404,
        json!({
            "error": {
                "type": "index_not_found_exception",
                "reason": format!("no such index [{}]", index)
            },
            "status": 404
        })
        .to_string(),
    )
}

fn search_context_missing(scroll_id: &str) -> EsError {
    EsError::engine(
        404,
        json!({
            "error": {
                "type": "search_context_missing_exception",
                "reason": format!("No search context found for id [{}]", scroll_id)
            },
            "status": 404
        })
        .to_string(),
    )
}

/// Recursively merge `patch` into `target`, the way partial updates merge objects.
fn merge(target: &mut Document, patch: &Document) {
    for (key, value) in patch {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => merge(existing, incoming),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<RwLock<State>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stats(&self) -> RequestStats {
        self.state.read().await.stats
    }

    /// Current mappings of an index, `None` if it does not exist.
    pub async fn mappings(&self, index: &str) -> Option<Value> {
        let state = self.state.read().await;
        state
            .indices
            .get(index)
            .map(|idx| Value::Object(idx.mappings.clone()))
    }

    /// Number of scroll contexts still held open.
    pub async fn open_scrolls(&self) -> usize {
        self.state.read().await.scrolls.len()
    }
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    async fn index(
        &self,
        index: &str,
        id: Option<&str>,
        document: &Document,
    ) -> Result<WriteResponse> {
        if id == Some("") {
            return Ok(WriteResponse::new(400));
        }
        let id = id
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        let mut state = self.state.write().await;
        let idx = state.indices.entry(index.to_string()).or_default();

        let (status, result) = match idx.position(&id) {
            Some(pos) => {
                idx.live[pos].1 = document.clone();
                (200, "updated")
            }
            None => {
                idx.live.push((id.clone(), document.clone()));
                (201, "created")
            }
        };
        debug!(index, id = %id, result, "Stored document");

        Ok(WriteResponse {
            status,
            id: Some(id),
            result: Some(result.to_string()),
        })
    }

    async fn get(&self, index: &str, id: &str) -> Result<Option<Document>> {
        let state = self.state.read().await;
        Ok(state.indices.get(index).and_then(|idx| {
            idx.position(id).map(|pos| idx.live[pos].1.clone())
        }))
    }

    async fn update(&self, index: &str, id: &str, fields: &Document) -> Result<WriteResponse> {
        let mut state = self.state.write().await;
        let Some(idx) = state.indices.get_mut(index) else {
            return Ok(WriteResponse::new(404));
        };
        let Some(pos) = idx.position(id) else {
            return Ok(WriteResponse::new(404));
        };

        let doc = &mut idx.live[pos].1;
        let before = doc.clone();
        merge(doc, fields);
        let result = if *doc == before { "noop" } else { "updated" };

        Ok(WriteResponse {
            status: 200,
            id: Some(id.to_string()),
            result: Some(result.to_string()),
        })
    }

    async fn delete(&self, index: &str, id: &str) -> Result<WriteResponse> {
        let mut state = self.state.write().await;
        let Some(idx) = state.indices.get_mut(index) else {
            return Ok(WriteResponse::new(404));
        };

        let (status, result) = match idx.position(id) {
            Some(pos) => {
                idx.live.remove(pos);
                (200, "deleted")
            }
            None => (404, "not_found"),
        };
        Ok(WriteResponse {
            status,
            id: Some(id.to_string()),
            result: Some(result.to_string()),
        })
    }

    async fn delete_by_query(&self, index: &str, query: &Query) -> Result<ByQueryResponse> {
        let mut state = self.state.write().await;
        let idx = state.index_mut(index)?;
        let matched = idx.matching(query)?;

        let mut deleted = 0;
        for (id, _) in &matched {
            if let Some(pos) = idx.position(id) {
                idx.live.remove(pos);
                deleted += 1;
            }
        }
        Ok(ByQueryResponse {
            total: matched.len() as u64,
            deleted,
            ..Default::default()
        })
    }

    async fn update_by_query(
        &self,
        index: &str,
        query: &Query,
        fields: &Document,
    ) -> Result<ByQueryResponse> {
        let mut state = self.state.write().await;
        let idx = state.index_mut(index)?;
        let matched = idx.matching(query)?;

        let mut updated = 0;
        let mut version_conflicts = 0;
        for (id, _) in &matched {
            match idx.position(id) {
                Some(pos) => {
                    let doc = &mut idx.live[pos].1;
                    for (key, value) in fields {
                        let path: Vec<&str> = key.split('.').collect();
                        eval::insert_path(doc, &path, value.clone());
                    }
                    updated += 1;
                }
                // Deleted since the last refresh.
                None => version_conflicts += 1,
            }
        }
        Ok(ByQueryResponse {
            total: matched.len() as u64,
            updated,
            version_conflicts,
            ..Default::default()
        })
    }

    async fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchResponse> {
        let mut state = self.state.write().await;
        state.stats.searches += 1;

        let (hits, aggregations) = state.run_search(index, request)?;
        Ok(SearchResponse {
            took: 0,
            total_hits: hits.len() as u64,
            hits: hits.into_iter().take(request.size).collect(),
            aggregations,
            scroll_id: None,
        })
    }

    async fn open_scroll(
        &self,
        index: &str,
        request: &SearchRequest,
        ttl: Duration,
    ) -> Result<SearchResponse> {
        let mut state = self.state.write().await;
        state.stats.scroll_opens += 1;

        let (hits, aggregations) = state.run_search(index, request)?;
        let total = hits.len() as u64;
        let mut remaining: VecDeque<Hit> = hits.into();
        let page_size = request.size;
        let first: Vec<Hit> = remaining
            .drain(..page_size.min(remaining.len()))
            .collect();

        state.next_scroll += 1;
        let scroll_id = format!("scroll-{}", state.next_scroll);
        state.scrolls.insert(
            scroll_id.clone(),
            ScrollCursor {
                index: index.to_string(),
                total,
                remaining,
                page_size,
                expires_at: Instant::now() + ttl,
            },
        );

        Ok(SearchResponse {
            took: 0,
            total_hits: total,
            hits: first,
            aggregations,
            scroll_id: Some(scroll_id),
        })
    }

    async fn scroll(&self, scroll_id: &str, ttl: Duration) -> Result<SearchResponse> {
        let mut state = self.state.write().await;
        state.stats.scroll_pages += 1;

        let now = Instant::now();
        let expired = match state.scrolls.get(scroll_id) {
            Some(cursor) => cursor.expires_at <= now,
            None => return Err(search_context_missing(scroll_id)),
        };
        if expired {
            state.scrolls.remove(scroll_id);
            return Err(search_context_missing(scroll_id));
        }

        let cursor = state
            .scrolls
            .get_mut(scroll_id)
            .ok_or_else(|| search_context_missing(scroll_id))?;
        cursor.expires_at = now + ttl;
        let take = cursor.page_size.min(cursor.remaining.len());
        let hits: Vec<Hit> = cursor.remaining.drain(..take).collect();
        debug!(
            index = %cursor.index,
            scroll_id,
            returned = hits.len(),
            "Scroll page"
        );

        Ok(SearchResponse {
            took: 0,
            total_hits: cursor.total,
            hits,
            aggregations: None,
            scroll_id: Some(scroll_id.to_string()),
        })
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.stats.scroll_clears += 1;
        match state.scrolls.remove(scroll_id) {
            Some(_) => Ok(()),
            None => Err(search_context_missing(scroll_id)),
        }
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.stats.refreshes += 1;
        let idx = state.index_mut(index)?;
        idx.searchable = idx.live.clone();
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.state.read().await.indices.contains_key(index))
    }

    async fn create_index(&self, index: &str, mappings: &Value) -> Result<()> {
        let mappings = mappings
            .as_object()
            .cloned()
            .ok_or_else(|| EsError::engine(400, "mappings must be an object"))?;

        let mut state = self.state.write().await;
        if state.indices.contains_key(index) {
            return Err(EsError::engine(
                400,
                json!({
                    "error": {
                        "type": "resource_already_exists_exception",
                        "reason": format!("index [{}] already exists", index)
                    },
                    "status": 400
                })
                .to_string(),
            ));
        }
        state.indices.insert(
            index.to_string(),
            MemIndex {
                mappings,
                ..Default::default()
            },
        );
        Ok(())
    }

    async fn put_mapping(&self, index: &str, mappings: &Value) -> Result<()> {
        let incoming = mappings
            .as_object()
            .ok_or_else(|| EsError::engine(400, "mappings must be an object"))?;

        let mut state = self.state.write().await;
        let idx = state.index_mut(index)?;

        let empty = Map::new();
        let new_properties = incoming
            .get("properties")
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        let existing = idx
            .mappings
            .entry("properties")
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(existing) = existing.as_object_mut() else {
            return Err(EsError::engine(400, "existing properties are not an object"));
        };

        for (field, definition) in new_properties {
            let old_type = existing.get(field).and_then(|d| d.get("type"));
            let new_type = definition.get("type");
            if old_type.is_some() && new_type.is_some() && old_type != new_type {
                return Err(EsError::engine(
                    400,
                    json!({
                        "error": {
                            "type": "illegal_argument_exception",
                            "reason": format!(
                                "mapper [{}] cannot be changed from type [{}] to [{}]",
                                field,
                                old_type.and_then(Value::as_str).unwrap_or_default(),
                                new_type.and_then(Value::as_str).unwrap_or_default()
                            )
                        },
                        "status": 400
                    })
                    .to_string(),
                ));
            }
        }
        for (field, definition) in new_properties {
            existing.insert(field.clone(), definition.clone());
        }
        for (key, value) in incoming {
            if key != "properties" {
                idx.mappings.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.indices.remove(index).is_none() {
            return Err(index_not_found(index));
        }
        state.scrolls.retain(|_, cursor| cursor.index != index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_writes_visible_after_refresh() {
        let backend = InMemoryBackend::new();
        backend
            .index("t", Some("1"), &doc(json!({ "name": "a" })))
            .await
            .unwrap();

        let request = SearchRequest::new(Query::match_all());
        assert!(backend.search("t", &request).await.unwrap().is_empty());
        assert!(backend.get("t", "1").await.unwrap().is_some());

        backend.refresh("t").await.unwrap();
        assert_eq!(backend.search("t", &request).await.unwrap().total_hits, 1);
    }

    #[tokio::test]
    async fn test_index_statuses() {
        let backend = InMemoryBackend::new();
        let d = doc(json!({ "n": 1 }));

        let created = backend.index("t", Some("1"), &d).await.unwrap();
        assert_eq!(created.status, 201);
        let updated = backend.index("t", Some("1"), &d).await.unwrap();
        assert_eq!(updated.status, 200);
        assert_eq!(updated.result.as_deref(), Some("updated"));

        let generated = backend.index("t", None, &d).await.unwrap();
        assert!(generated.id.is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn test_missing_index_is_404() {
        let backend = InMemoryBackend::new();
        let err = backend
            .search("nope", &SearchRequest::new(Query::match_all()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(backend.delete("nope", "1").await.unwrap().status, 404);
    }

    #[tokio::test]
    async fn test_partial_update_merges_objects() {
        let backend = InMemoryBackend::new();
        backend
            .index("t", Some("1"), &doc(json!({ "a": { "x": 1, "y": 2 }, "b": 1 })))
            .await
            .unwrap();

        let response = backend
            .update("t", "1", &doc(json!({ "a": { "y": 3 } })))
            .await
            .unwrap();
        assert_eq!(response.result.as_deref(), Some("updated"));

        let stored = backend.get("t", "1").await.unwrap().unwrap();
        assert_eq!(Value::Object(stored), json!({ "a": { "x": 1, "y": 3 }, "b": 1 }));

        let noop = backend
            .update("t", "1", &doc(json!({ "b": 1 })))
            .await
            .unwrap();
        assert_eq!(noop.result.as_deref(), Some("noop"));
        assert_eq!(backend.update("t", "2", &doc(json!({}))).await.unwrap().status, 404);
    }

    #[tokio::test]
    async fn test_scroll_context_lifecycle() {
        let backend = InMemoryBackend::new();
        for i in 0..5 {
            backend
                .index("t", Some(i.to_string().as_str()), &doc(json!({ "i": i })))
                .await
                .unwrap();
        }
        backend.refresh("t").await.unwrap();

        let request = SearchRequest::new(Query::match_all()).with_size(2);
        let first = backend
            .open_scroll("t", &request, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(first.hits.len(), 2);
        assert_eq!(first.total_hits, 5);

        let scroll_id = first.scroll_id.unwrap();
        let second = backend.scroll(&scroll_id, Duration::from_secs(60)).await.unwrap();
        let third = backend.scroll(&scroll_id, Duration::from_secs(60)).await.unwrap();
        let fourth = backend.scroll(&scroll_id, Duration::from_secs(60)).await.unwrap();
        assert_eq!(
            (second.hits.len(), third.hits.len(), fourth.hits.len()),
            (2, 1, 0)
        );

        backend.clear_scroll(&scroll_id).await.unwrap();
        assert_eq!(backend.open_scrolls().await, 0);
        let err = backend
            .scroll(&scroll_id, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_expired_scroll_is_missing() {
        let backend = InMemoryBackend::new();
        backend.index("t", Some("1"), &doc(json!({}))).await.unwrap();
        backend.refresh("t").await.unwrap();

        let first = backend
            .open_scroll(
                "t",
                &SearchRequest::new(Query::match_all()).with_size(1),
                Duration::ZERO,
            )
            .await
            .unwrap();
        let err = backend
            .scroll(first.scroll_id.as_deref().unwrap(), Duration::ZERO)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(backend.open_scrolls().await, 0);
    }

    #[tokio::test]
    async fn test_put_mapping_rejects_type_change() {
        let backend = InMemoryBackend::new();
        backend
            .create_index("t", &json!({ "properties": { "n": { "type": "long" } } }))
            .await
            .unwrap();

        backend
            .put_mapping("t", &json!({ "properties": { "s": { "type": "keyword" } } }))
            .await
            .unwrap();
        let err = backend
            .put_mapping("t", &json!({ "properties": { "n": { "type": "text" } } }))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));

        let mappings = backend.mappings("t").await.unwrap();
        assert_eq!(mappings["properties"]["n"]["type"], json!("long"));
        assert_eq!(mappings["properties"]["s"]["type"], json!("keyword"));
    }

    #[tokio::test]
    async fn test_zero_size_scroll_opens_with_empty_page() {
        let backend = InMemoryBackend::new();
        backend
            .index("t", Some("1"), &doc(json!({ "a": 1 })))
            .await
            .unwrap();
        backend.refresh("t").await.unwrap();

        let page = backend
            .open_scroll(
                "t",
                &SearchRequest::new(Query::match_all()).with_size(0),
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        assert!(page.hits.is_empty());
        assert_eq!(page.total_hits, 1);
    }
}
