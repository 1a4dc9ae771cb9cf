//! Search backend trait definition.
//!
//! The query façade is written against this trait. Each method is a single
//! round-trip to the engine; the façade composes them (write, then refresh).
//! `EsClient` implements it over the Elasticsearch client and
//! `InMemoryBackend` implements it in-process.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::error::Result;
use crate::models::{ByQueryResponse, Document, Query, SearchRequest, SearchResponse, WriteResponse};

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Index a full document. The engine assigns an id when `id` is `None`.
    ///
    /// Non-success statuses are reported in the returned `WriteResponse`,
    /// not as errors.
    async fn index(&self, index: &str, id: Option<&str>, document: &Document)
        -> Result<WriteResponse>;

    /// Fetch a document source by id. `None` when the document does not exist.
    async fn get(&self, index: &str, id: &str) -> Result<Option<Document>>;

    /// Merge `fields` into an existing document.
    async fn update(&self, index: &str, id: &str, fields: &Document) -> Result<WriteResponse>;

    async fn delete(&self, index: &str, id: &str) -> Result<WriteResponse>;

    async fn delete_by_query(&self, index: &str, query: &Query) -> Result<ByQueryResponse>;

    /// Assign `fields` on every document matching `query`. Version conflicts
    /// are skipped rather than aborting the operation.
    async fn update_by_query(
        &self,
        index: &str,
        query: &Query,
        fields: &Document,
    ) -> Result<ByQueryResponse>;

    async fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchResponse>;

    /// Run a search that keeps a scroll context alive for `ttl`.
    /// `request.size` is the page size.
    async fn open_scroll(
        &self,
        index: &str,
        request: &SearchRequest,
        ttl: Duration,
    ) -> Result<SearchResponse>;

    /// Fetch the next page of an open scroll context.
    async fn scroll(&self, scroll_id: &str, ttl: Duration) -> Result<SearchResponse>;

    async fn clear_scroll(&self, scroll_id: &str) -> Result<()>;

    /// Make all writes to `index` visible to search.
    async fn refresh(&self, index: &str) -> Result<()>;

    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// Create `index` with the given mappings object.
    async fn create_index(&self, index: &str, mappings: &Value) -> Result<()>;

    /// Add the given mappings to an existing index.
    async fn put_mapping(&self, index: &str, mappings: &Value) -> Result<()>;

    async fn delete_index(&self, index: &str) -> Result<()>;
}

/// Render a duration the way the engine expects time values, e.g. `60s`.
pub fn time_value(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{}ms", millis)
    }
}
