//! Application state aggregate.
//!
//! [`ApplicationState`] is the single source of truth for the dashboard:
//! pagination, search parameters, the active filters and columns, the result
//! sets derived from the last search, and UI flags. It is owned by the
//! [`StateEngine`](super::engine::StateEngine); everything else sees cloned
//! snapshots.
//!
//! # Derived data
//!
//! Three result sets hang off every search:
//!
//! ```text
//! current_results ──dedup on _dedup_id──► filtered_results ──page slice──► displayed_results
//!                                                                              │
//!                                                          column_cache ◄──────┘
//! ```
//!
//! [`ApplicationState::refresh_results`] rebuilds all of them after the raw
//! results change; [`ApplicationState::refresh_page`] rebuilds only the page
//! slice and column cache after the page, page size or columns change.

use crate::config::Config;
use crate::domain::{Document, IndexStats};
use crate::query::filter::DEDUP_FIELD;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Cancellation handle of the in-flight search.
///
/// Each handle carries a unique generation number, so two snapshots compare
/// equal only if they refer to the same search.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    generation: u64,
    token: CancellationToken,
}

impl CancelHandle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            generation: NEXT_GENERATION.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CancelHandle {
    fn eq(&self, other: &Self) -> bool {
        self.generation == other.generation
    }
}

impl Eq for CancelHandle {}

/// Page position. `1 <= current_page <= total_pages` after every commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub current_page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

impl Pagination {
    #[must_use]
    pub const fn new(page_size: usize) -> Self {
        Self {
            current_page: 1,
            page_size,
            total_pages: 1,
        }
    }
}

/// What is being searched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchState {
    pub current_index: String,
    /// Timeframe token; empty for no time bound.
    pub timeframe: String,
    /// Index names matching `current_index`.
    pub matching_indices: Vec<String>,
    pub index_stats: Option<IndexStats>,
    pub cancel_current_op: Option<CancelHandle>,
}

/// Filters, columns and results.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataState {
    /// Active filter expressions, unique and in insertion order.
    pub filters: Vec<String>,
    /// Known field names of the current index, sorted.
    pub fields: Vec<String>,
    /// Fields selected as table columns.
    pub active_fields: BTreeSet<String>,
    pub current_results: Vec<Document>,
    pub filtered_results: Vec<Document>,
    pub displayed_results: Vec<Document>,
    /// Column name to rendered cells of `displayed_results`, row order.
    pub column_cache: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UiState {
    pub loading: bool,
    pub show_field_list: bool,
    pub field_list_filter: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MiscState {
    /// Hits requested per search.
    pub num_results: usize,
    /// One-line message for the status bar.
    pub status_message: Option<String>,
}

/// The whole dashboard state.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationState {
    pub pagination: Pagination,
    pub search: SearchState,
    pub data: DataState,
    pub ui: UiState,
    pub misc: MiscState,
}

impl ApplicationState {
    /// Initial state from configuration defaults.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            pagination: Pagination::new(config.pagination.default_page_size),
            search: SearchState {
                current_index: config.default_index.clone(),
                timeframe: config.search.default_timeframe.trim().to_string(),
                matching_indices: Vec::new(),
                index_stats: None,
                cancel_current_op: None,
            },
            data: DataState::default(),
            ui: UiState::default(),
            misc: MiscState {
                num_results: config.search.default_result_count,
                status_message: None,
            },
        }
    }

    /// Rebuilds the filtered and displayed results from `current_results`.
    ///
    /// Keeps the current page if it still exists, otherwise moves to the last
    /// page.
    pub fn refresh_results(&mut self) {
        let mut seen = HashSet::new();
        self.data.filtered_results = self
            .data
            .current_results
            .iter()
            .filter(|doc| {
                doc.get_path(DEDUP_FIELD)
                    .map_or(true, |id| seen.insert(id.render()))
            })
            .cloned()
            .collect();

        self.pagination.total_pages = self.page_count();
        self.pagination.current_page = self
            .pagination
            .current_page
            .clamp(1, self.pagination.total_pages);
        self.refresh_page();

        tracing::debug!(
            current = self.data.current_results.len(),
            filtered = self.data.filtered_results.len(),
            pages = self.pagination.total_pages,
            "results refreshed"
        );
    }

    /// Rebuilds the page slice and the column cache.
    pub fn refresh_page(&mut self) {
        let size = self.pagination.page_size.max(1);
        let start = (self.pagination.current_page.saturating_sub(1)).saturating_mul(size);
        self.data.displayed_results = self
            .data
            .filtered_results
            .iter()
            .skip(start)
            .take(size)
            .cloned()
            .collect();

        self.data.column_cache = self
            .columns()
            .into_iter()
            .map(|column| {
                let cells = self
                    .data
                    .displayed_results
                    .iter()
                    .map(|doc| doc.render_field(&column))
                    .collect();
                (column, cells)
            })
            .collect();
    }

    /// Number of pages for the filtered results, at least one.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.data
            .filtered_results
            .len()
            .div_ceil(self.pagination.page_size.max(1))
            .max(1)
    }

    /// Table columns in display order.
    ///
    /// Selected fields in field-list order, followed by selected fields the
    /// index listing does not know. With nothing selected, every leaf field
    /// of the displayed rows in document order.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        if self.data.active_fields.is_empty() {
            let mut seen = HashSet::new();
            return self
                .data
                .displayed_results
                .iter()
                .flat_map(Document::leaf_fields)
                .filter(|field| seen.insert(field.clone()))
                .collect();
        }

        let mut columns: Vec<String> = self
            .data
            .fields
            .iter()
            .filter(|f| self.data.active_fields.contains(*f))
            .cloned()
            .collect();
        columns.extend(
            self.data
                .active_fields
                .iter()
                .filter(|f| !self.data.fields.contains(f))
                .cloned(),
        );
        columns
    }

    /// Field names matching the field-list filter.
    ///
    /// Fuzzy matched, best match first; ties keep field-list order. An empty
    /// filter returns every field.
    #[must_use]
    pub fn visible_fields(&self) -> Vec<String> {
        let filter = self.ui.field_list_filter.trim();
        if filter.is_empty() {
            return self.data.fields.clone();
        }

        let matcher = SkimMatcherV2::default();
        let mut scored: Vec<(i64, &String)> = self
            .data
            .fields
            .iter()
            .filter_map(|f| matcher.fuzzy_match(f, filter).map(|score| (score, f)))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().map(|(_, f)| f.clone()).collect()
    }
}
