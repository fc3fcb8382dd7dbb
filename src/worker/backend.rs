//! Search backend contract.
//!
//! The transport (HTTP client, auth, TLS) lives outside this crate. The
//! worker only needs the three calls below; implementations classify their
//! failures through [`BackendErrorKind`](crate::domain::BackendErrorKind) so
//! the admission controller knows which ones to retry.

use crate::domain::{BackendError, Document, FieldMetadata, IndexSummary};
use crate::query::CompiledQuery;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Calls the dashboard makes against an Elasticsearch-compatible store.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Runs `query` against `index`; hits in backend order.
    async fn search(&self, index: &str, query: &CompiledQuery) -> Result<Vec<Document>, BackendError>;

    /// Field capabilities of `index` for fields matching the glob `pattern`.
    async fn field_caps(&self, index: &str, pattern: &str) -> Result<BTreeMap<String, FieldMetadata>, BackendError>;

    /// Indices matching the glob `pattern`.
    async fn list_indices(&self, pattern: &str) -> Result<Vec<IndexSummary>, BackendError>;
}
