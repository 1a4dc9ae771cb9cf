//! Core data models shared by the backends and the query façade.

pub mod document;
pub mod query;
pub mod response;

pub use document::{into_document, parse_document, Document, Target};
pub use query::{BoolQuery, Query, SearchRequest, Sort, SortOrder};
pub use response::{ByQueryResponse, Hit, SearchResponse, WriteResponse};
