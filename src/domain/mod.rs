//! Domain layer for the dashboard engine.
//!
//! This module contains the core domain types, independent of the search
//! backend transport or the terminal renderer.
//!
//! # Organization
//!
//! - [`error`]: Error types and result aliases
//! - [`document`]: Recursive document values returned by searches
//! - [`field`]: Field name grammar and field metadata records
//! - [`index`]: Index listing and stats
//!
//! # Examples
//!
//! ```
//! use esview::domain::{Document, Result};
//!
//! fn first_host(docs: &[Document]) -> Result<String> {
//!     Ok(docs.first().map(|d| d.render_field("host.name")).unwrap_or_default())
//! }
//! ```

pub mod document;
pub mod error;
pub mod field;
pub mod index;

pub use document::{Document, Value};
pub use error::{BackendError, BackendErrorKind, EsviewError, QueryError, Result, Retryable};
pub use field::{is_valid_field_name, FieldMetadata};
pub use index::{aggregate_stats, IndexStats, IndexSummary};
