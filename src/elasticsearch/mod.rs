//! Elasticsearch client and operations.

mod backend;
mod client;
mod schema;
mod script;

pub use client::EsClient;
pub use schema::normalize_mapping;
pub use script::assignment_script;
