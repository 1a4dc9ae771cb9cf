//! Query façade: document, search and index operations over one shared backend.
//!
//! Every write refreshes the target index before returning, so a following
//! search sees it. Single-document writes report success as a boolean taken
//! from the response status (200..=299); by-query writes report whether any
//! document was affected.

use serde_json::Value;
use tracing::{debug, info};

use crate::backend::SearchBackend;
use crate::config::{validate_max_hits, EsConfig, ScrollConfig, DEFAULT_MAX_HITS};
use crate::elasticsearch::normalize_mapping;
use crate::error::{EsError, Result};
use crate::models::{parse_document, Document, Query, SearchRequest, SearchResponse, SortOrder, Target};
use crate::scroll;

#[derive(Clone)]
pub struct EsQueries<B> {
    backend: B,
    max_hits: usize,
    scroll: ScrollConfig,
}

impl<B: SearchBackend> EsQueries<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            max_hits: DEFAULT_MAX_HITS,
            scroll: ScrollConfig::default(),
        }
    }

    /// Use the hit cap and scroll settings from `config`.
    pub fn from_config(backend: B, config: &EsConfig) -> Result<Self> {
        Self::new(backend)
            .with_max_hits(config.max_hits)?
            .with_scroll(config.scroll)
    }

    pub fn with_max_hits(mut self, max_hits: usize) -> Result<Self> {
        validate_max_hits(max_hits)?;
        self.max_hits = max_hits;
        Ok(self)
    }

    pub fn with_scroll(mut self, scroll: ScrollConfig) -> Result<Self> {
        scroll.validate()?;
        self.scroll = scroll;
        Ok(self)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn max_hits(&self) -> usize {
        self.max_hits
    }

    // Writes

    /// Index (create or replace) a document. The engine assigns an id when `id` is `None`.
    pub async fn index_document(
        &self,
        target: &Target,
        id: Option<&str>,
        document: &Document,
    ) -> Result<bool> {
        let response = self.backend.index(&target.index, id, document).await?;
        self.refresh_index(&target.index).await?;

        debug!(
            collection = %target,
            id = response.id.as_deref(),
            status = response.status,
            "Indexed document"
        );
        Ok(response.is_success())
    }

    /// Same as [`index_document`](Self::index_document) for a document given as raw JSON.
    pub async fn index_json(&self, target: &Target, id: Option<&str>, json: &str) -> Result<bool> {
        let document = parse_document(json)?;
        self.index_document(target, id, &document).await
    }

    pub async fn delete_document(&self, target: &Target, id: &str) -> Result<bool> {
        let response = self.backend.delete(&target.index, id).await?;
        self.refresh_index(&target.index).await?;

        debug!(collection = %target, id, status = response.status, "Deleted document");
        Ok(response.is_success())
    }

    /// Delete every document matching `query`. True if at least one was deleted.
    pub async fn delete_on_query_match(&self, target: &Target, query: &Query) -> Result<bool> {
        let response = self.backend.delete_by_query(&target.index, query).await?;
        self.refresh_index(&target.index).await?;

        debug!(collection = %target, deleted = response.deleted, "Delete by query");
        Ok(response.deleted > 0)
    }

    pub async fn delete_index(&self, index: &str) -> Result<()> {
        self.backend.delete_index(index).await?;
        info!(index, "Deleted index");
        Ok(())
    }

    /// Merge `fields` into the document with the given id.
    pub async fn update_document(&self, target: &Target, id: &str, fields: &Document) -> Result<bool> {
        let response = self.backend.update(&target.index, id, fields).await?;
        self.refresh_index(&target.index).await?;

        debug!(collection = %target, id, status = response.status, "Updated document");
        Ok(response.is_success())
    }

    pub async fn update_json(&self, target: &Target, id: &str, json: &str) -> Result<bool> {
        let fields = parse_document(json)?;
        self.update_document(target, id, &fields).await
    }

    /// Set `fields` on every document matching `query`. True if at least one was updated.
    ///
    /// A dotted key such as `address.city` sets the nested field, creating
    /// intermediate objects as needed.
    pub async fn update_on_query_match(
        &self,
        target: &Target,
        query: &Query,
        fields: &Document,
    ) -> Result<bool> {
        if fields.is_empty() {
            return Ok(false);
        }
        let response = self
            .backend
            .update_by_query(&target.index, query, fields)
            .await?;
        self.refresh_index(&target.index).await?;

        debug!(
            collection = %target,
            updated = response.updated,
            conflicts = response.version_conflicts,
            "Update by query"
        );
        Ok(response.updated > 0)
    }

    pub async fn refresh_index(&self, index: &str) -> Result<()> {
        self.backend.refresh(index).await
    }

    // Reads

    /// Source of the document with the given id.
    pub async fn get_json_for_id(&self, target: &Target, id: &str) -> Result<Document> {
        self.backend
            .get(&target.index, id)
            .await?
            .ok_or_else(|| EsError::DocumentNotFound {
                index: target.index.clone(),
                id: id.to_string(),
            })
    }

    /// Source of the first hit, or an empty document when nothing matches.
    pub async fn get_json_for_query(&self, target: &Target, query: &Query) -> Result<Document> {
        let request = SearchRequest::new(query.clone()).with_size(1);
        let response = self.backend.search(&target.index, &request).await?;
        Ok(response
            .into_sources()
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    /// Search returning at most `max_hits` hits.
    pub async fn get_search_response_for_query(
        &self,
        target: &Target,
        query: &Query,
    ) -> Result<SearchResponse> {
        self.search(target, self.capped(query)).await
    }

    /// Capped search with `_source` restricted to `fields`.
    pub async fn get_search_response_with_fields<S: AsRef<str>>(
        &self,
        target: &Target,
        query: &Query,
        fields: &[S],
    ) -> Result<SearchResponse> {
        self.search(target, self.capped(query).with_source_fields(fields))
            .await
    }

    /// Capped search sorted on one field.
    pub async fn get_sorted_search_response(
        &self,
        target: &Target,
        query: &Query,
        sort_field: &str,
        order: SortOrder,
    ) -> Result<SearchResponse> {
        self.search(target, self.capped(query).sorted_by(sort_field, order))
            .await
    }

    pub async fn get_json_array_for_query(
        &self,
        target: &Target,
        query: &Query,
    ) -> Result<Vec<Document>> {
        Ok(self
            .get_search_response_for_query(target, query)
            .await?
            .into_sources())
    }

    pub async fn get_json_array_with_fields<S: AsRef<str>>(
        &self,
        target: &Target,
        query: &Query,
        fields: &[S],
    ) -> Result<Vec<Document>> {
        Ok(self
            .get_search_response_with_fields(target, query, fields)
            .await?
            .into_sources())
    }

    pub async fn get_sorted_json_array_for_query(
        &self,
        target: &Target,
        query: &Query,
        sort_field: &str,
        order: SortOrder,
    ) -> Result<Vec<Document>> {
        Ok(self
            .get_sorted_search_response(target, query, sort_field, order)
            .await?
            .into_sources())
    }

    /// Every matching document, fetched through a scroll context. Not capped.
    pub async fn get_bulk_json_array_for_query(
        &self,
        target: &Target,
        query: &Query,
    ) -> Result<Vec<Document>> {
        scroll::collect_all(&self.backend, &target.index, query, self.scroll).await
    }

    /// Run aggregations over the matching documents without returning hits.
    pub async fn get_search_response_for_aggregation(
        &self,
        target: &Target,
        query: &Query,
        aggregations: Value,
    ) -> Result<SearchResponse> {
        let request = SearchRequest::new(query.clone())
            .with_size(0)
            .with_aggregations(aggregations);
        self.search(target, request).await
    }

    /// Id of the first hit, `None` when nothing matches.
    pub async fn get_document_id(&self, target: &Target, query: &Query) -> Result<Option<String>> {
        let request = SearchRequest::new(query.clone()).with_size(1);
        let response = self.backend.search(&target.index, &request).await?;
        Ok(response.hits.into_iter().next().map(|hit| hit.id))
    }

    /// True if at least one document matches `query`.
    pub async fn check_if_exists(&self, target: &Target, query: &Query) -> Result<bool> {
        let request = SearchRequest::new(query.clone()).with_size(0);
        let response = self.backend.search(&target.index, &request).await?;
        Ok(response.total_hits > 0)
    }

    // Index management

    /// Create the index with this mapping, or add the mapping to an existing index.
    pub async fn create_mapping(&self, target: &Target, schema_json: &str) -> Result<()> {
        let mappings = normalize_mapping(&target.doc_type, schema_json)?;

        if self.backend.index_exists(&target.index).await? {
            self.backend.put_mapping(&target.index, &mappings).await?;
            info!(collection = %target, "Updated mapping");
        } else {
            self.backend.create_index(&target.index, &mappings).await?;
            info!(collection = %target, "Created index with mapping");
        }
        Ok(())
    }

    fn capped(&self, query: &Query) -> SearchRequest {
        SearchRequest::new(query.clone()).with_size(self.max_hits)
    }

    async fn search(&self, target: &Target, request: SearchRequest) -> Result<SearchResponse> {
        let response = self.backend.search(&target.index, &request).await?;
        debug!(
            collection = %target,
            total = response.total_hits,
            returned = response.hits.len(),
            "Search"
        );
        Ok(response)
    }
}
