//! `SearchBackend` implementation over the Elasticsearch client.

use async_trait::async_trait;
use elasticsearch::http::response::Response;
use elasticsearch::indices::{
    IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts, IndicesPutMappingParts,
    IndicesRefreshParts,
};
use elasticsearch::params::Conflicts;
use elasticsearch::{
    ClearScrollParts, DeleteByQueryParts, DeleteParts, GetParts, IndexParts, ScrollParts,
    SearchParts, UpdateByQueryParts, UpdateParts,
};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::script::assignment_script;
use super::EsClient;
use crate::backend::{time_value, SearchBackend};
use crate::error::{EsError, Result};
use crate::models::{
    into_document, ByQueryResponse, Document, Query, SearchRequest, SearchResponse, WriteResponse,
};

/// Turn a non-success response into `EsError::Engine`, keeping the body.
pub(super) async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status_code();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(EsError::engine(status.as_u16(), body))
}

async fn write_response(response: Response) -> Result<WriteResponse> {
    let status = response.status_code().as_u16();
    let body = response.json::<Value>().await?;
    Ok(WriteResponse::from_body(status, &body))
}

async fn search_response(response: Response) -> Result<SearchResponse> {
    let body = ensure_success(response).await?.json::<Value>().await?;
    SearchResponse::from_value(body)
}

async fn by_query_response(response: Response) -> Result<ByQueryResponse> {
    let body = ensure_success(response).await?.json::<Value>().await?;
    ByQueryResponse::from_value(body)
}

#[async_trait]
impl SearchBackend for EsClient {
    async fn index(
        &self,
        index: &str,
        id: Option<&str>,
        document: &Document,
    ) -> Result<WriteResponse> {
        let parts = match id {
            Some(id) => IndexParts::IndexId(index, id),
            None => IndexParts::Index(index),
        };
        debug!(index, id, "Indexing document");

        let response = self.client().index(parts).body(document).send().await?;
        write_response(response).await
    }

    async fn get(&self, index: &str, id: &str) -> Result<Option<Document>> {
        let response = self.client().get(GetParts::IndexId(index, id)).send().await?;
        if response.status_code().as_u16() == 404 {
            return Ok(None);
        }

        let mut body = ensure_success(response).await?.json::<Value>().await?;
        if body["found"].as_bool() == Some(false) {
            return Ok(None);
        }
        match body.get_mut("_source").map(Value::take) {
            Some(source) => into_document(source).map(Some),
            None => Err(EsError::malformed(format!(
                "get {}/{} returned no _source",
                index, id
            ))),
        }
    }

    async fn update(&self, index: &str, id: &str, fields: &Document) -> Result<WriteResponse> {
        let response = self
            .client()
            .update(UpdateParts::IndexId(index, id))
            .body(json!({ "doc": fields }))
            .send()
            .await?;
        write_response(response).await
    }

    async fn delete(&self, index: &str, id: &str) -> Result<WriteResponse> {
        let response = self
            .client()
            .delete(DeleteParts::IndexId(index, id))
            .send()
            .await?;
        write_response(response).await
    }

    async fn delete_by_query(&self, index: &str, query: &Query) -> Result<ByQueryResponse> {
        let response = self
            .client()
            .delete_by_query(DeleteByQueryParts::Index(&[index]))
            .body(json!({ "query": query }))
            .send()
            .await?;
        by_query_response(response).await
    }

    async fn update_by_query(
        &self,
        index: &str,
        query: &Query,
        fields: &Document,
    ) -> Result<ByQueryResponse> {
        let response = self
            .client()
            .update_by_query(UpdateByQueryParts::Index(&[index]))
            .conflicts(Conflicts::Proceed)
            .body(json!({
                "query": query,
                "script": assignment_script(fields)
            }))
            .send()
            .await?;
        by_query_response(response).await
    }

    async fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchResponse> {
        let body = request.to_body();
        debug!(index, body = %body, "Search request");

        let response = self
            .client()
            .search(SearchParts::Index(&[index]))
            .body(body)
            .send()
            .await?;
        search_response(response).await
    }

    async fn open_scroll(
        &self,
        index: &str,
        request: &SearchRequest,
        ttl: Duration,
    ) -> Result<SearchResponse> {
        let ttl = time_value(ttl);
        let body = request.to_body();
        debug!(index, ttl = %ttl, body = %body, "Opening scroll");

        let response = self
            .client()
            .search(SearchParts::Index(&[index]))
            .scroll(&ttl)
            .body(body)
            .send()
            .await?;
        search_response(response).await
    }

    async fn scroll(&self, scroll_id: &str, ttl: Duration) -> Result<SearchResponse> {
        let response = self
            .client()
            .scroll(ScrollParts::None)
            .body(json!({
                "scroll": time_value(ttl),
                "scroll_id": scroll_id
            }))
            .send()
            .await?;
        search_response(response).await
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        let response = self
            .client()
            .clear_scroll(ClearScrollParts::None)
            .body(json!({ "scroll_id": [scroll_id] }))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        let response = self
            .client()
            .indices()
            .refresh(IndicesRefreshParts::Index(&[index]))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        let response = self
            .client()
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await?;
        Ok(response.status_code().is_success())
    }

    async fn create_index(&self, index: &str, mappings: &Value) -> Result<()> {
        let response = self
            .client()
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(json!({ "mappings": mappings }))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn put_mapping(&self, index: &str, mappings: &Value) -> Result<()> {
        let response = self
            .client()
            .indices()
            .put_mapping(IndicesPutMappingParts::Index(&[index]))
            .body(mappings)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let response = self
            .client()
            .indices()
            .delete(IndicesDeleteParts::Index(&[index]))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}
