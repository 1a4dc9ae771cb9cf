//! Scroll-based retrieval of large result sets.

use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::SearchBackend;
use crate::config::ScrollConfig;
use crate::error::{EsError, Result};
use crate::models::{Document, Query, SearchRequest};

/// Cursor state of one bulk fetch. Dropped once the empty page arrives.
#[derive(Debug, Clone)]
pub struct ScrollState {
    pub scroll_id: Option<String>,
    pub page_size: usize,
    pub ttl: Duration,
    /// Page requests issued so far, the opening search included.
    pub pages_fetched: usize,
}

impl ScrollState {
    pub fn new(config: ScrollConfig) -> Self {
        Self {
            scroll_id: None,
            page_size: config.page_size,
            ttl: config.ttl(),
            pages_fetched: 0,
        }
    }
}

/// Fetch the sources of every document matching `query`, page by page.
///
/// Pages are requested until one comes back empty, so `n` matches take
/// `ceil(n / page_size) + 1` page requests. Hit order is preserved across
/// pages. The scroll context is cleared at the end; a failure to clear it is
/// logged and does not fail the fetch.
pub async fn collect_all<B>(
    backend: &B,
    index: &str,
    query: &Query,
    config: ScrollConfig,
) -> Result<Vec<Document>>
where
    B: SearchBackend + ?Sized,
{
    let mut state = ScrollState::new(config);
    let result = drain(backend, index, query, &mut state).await;

    match &result {
        Ok(documents) => debug!(
            index,
            documents = documents.len(),
            pages = state.pages_fetched,
            "Scroll exhausted"
        ),
        Err(e) => warn!(
            index,
            pages = state.pages_fetched,
            error = %e,
            "Scroll aborted"
        ),
    }

    if let Some(scroll_id) = state.scroll_id.take() {
        if let Err(e) = backend.clear_scroll(&scroll_id).await {
            warn!(index, error = %e, "Failed to clear scroll context");
        }
    }

    result
}

/// Page through the scroll until an empty page, recording the latest scroll
/// id in `state` so the caller can clear it whatever the outcome.
async fn drain<B>(
    backend: &B,
    index: &str,
    query: &Query,
    state: &mut ScrollState,
) -> Result<Vec<Document>>
where
    B: SearchBackend + ?Sized,
{
    let request = SearchRequest::new(query.clone()).with_size(state.page_size);

    let mut page = backend.open_scroll(index, &request, state.ttl).await?;
    state.pages_fetched += 1;

    let mut documents = Vec::new();
    loop {
        if let Some(id) = page.scroll_id.take() {
            state.scroll_id = Some(id);
        }
        if page.hits.is_empty() {
            return Ok(documents);
        }

        documents.extend(page.hits.into_iter().map(|hit| hit.source));

        let scroll_id = state
            .scroll_id
            .as_deref()
            .ok_or_else(|| EsError::malformed("scroll page without _scroll_id"))?;
        page = backend.scroll(scroll_id, state.ttl).await?;
        state.pages_fetched += 1;
    }
}
