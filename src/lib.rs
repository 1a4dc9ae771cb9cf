//! esquery - document, search and index helpers over an Elasticsearch cluster.
//!
//! [`EsQueries`] is the entry point. It is built on any [`SearchBackend`]:
//! [`EsClient`](crate::elasticsearch::EsClient) for a real cluster, or
//! [`InMemoryBackend`](crate::memory::InMemoryBackend) in-process.

pub mod backend;
pub mod config;
pub mod elasticsearch;
pub mod error;
pub mod memory;
pub mod models;
pub mod queries;
pub mod scroll;

pub use backend::SearchBackend;
pub use config::{EsConfig, ScrollConfig};
pub use error::{EsError, Result};
pub use models::{BoolQuery, Document, Query, SearchResponse, SortOrder, Target};
pub use queries::EsQueries;
