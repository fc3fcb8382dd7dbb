//! View model types representing renderable dashboard state.
//!
//! View models are immutable, display-ready values computed from an
//! [`ApplicationState`] snapshot and the field cache. They contain no business
//! logic; the renderer (outside this crate) only lays them out.
//!
//! # Example
//!
//! ```
//! use esview::app::StateEngine;
//! use esview::ui::TableViewModel;
//! use esview::Config;
//!
//! let engine = StateEngine::new(Config::default());
//! let vm = TableViewModel::compute(&engine.get_snapshot(), engine.field_cache());
//! assert_eq!(vm.footer.page_indicator, "Page 1/1");
//! assert!(vm.empty_state.is_some());
//! ```

use crate::app::ApplicationState;
use crate::cache::FieldCache;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

/// Complete view model for the results screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableViewModel {
    pub header: HeaderInfo,

    /// Column titles in display order.
    pub columns: Vec<String>,

    /// One entry per displayed document; cells align with `columns`.
    pub rows: Vec<Vec<String>>,

    pub footer: FooterInfo,

    /// Shown instead of the table when the page has no rows.
    pub empty_state: Option<EmptyState>,

    /// Present while the field list is open.
    pub field_list: Option<FieldListInfo>,

    /// Status line message (errors, hints).
    pub status: Option<String>,

    pub loading: bool,
}

/// Top bar: index, hit counts, time window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderInfo {
    pub title: String,
    /// e.g. `"last 12h"` or `"all time"`.
    pub timeframe: String,
    /// Number of backend indices behind the current index pattern.
    pub matching_indices: usize,
}

/// Bottom bar: active filters and page position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FooterInfo {
    pub filters: Vec<String>,
    pub page_indicator: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmptyState {
    pub message: String,
    pub subtitle: String,
}

/// Side panel listing known fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldListInfo {
    pub filter: String,
    pub items: Vec<FieldItem>,
}

/// One entry of the field list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldItem {
    pub name: String,
    /// Mapping type, empty when the cache does not know the field.
    pub field_type: String,
    /// Shown as a table column.
    pub selected: bool,
    /// Occurs in the current results.
    pub present: bool,
    /// `(start, end)` char ranges matched by the filter, end exclusive.
    pub highlight_ranges: Vec<(usize, usize)>,
}

impl TableViewModel {
    /// Computes the view model for `state`.
    #[must_use]
    pub fn compute(state: &ApplicationState, cache: &FieldCache) -> Self {
        let _span = tracing::debug_span!(
            "compute_viewmodel",
            rows = state.data.displayed_results.len(),
            fields = state.data.fields.len()
        )
        .entered();

        let columns = state.columns();
        let rows = (0..state.data.displayed_results.len())
            .map(|row| {
                columns
                    .iter()
                    .map(|column| {
                        state
                            .data
                            .column_cache
                            .get(column)
                            .and_then(|cells| cells.get(row))
                            .cloned()
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect();

        Self {
            header: compute_header(state),
            columns,
            rows,
            footer: FooterInfo {
                filters: state.data.filters.clone(),
                page_indicator: format!(
                    "Page {}/{}",
                    state.pagination.current_page, state.pagination.total_pages
                ),
            },
            empty_state: compute_empty_state(state),
            field_list: state
                .ui
                .show_field_list
                .then(|| compute_field_list(state, cache)),
            status: state.misc.status_message.clone(),
            loading: state.ui.loading,
        }
    }
}

fn compute_header(state: &ApplicationState) -> HeaderInfo {
    let hits = state.data.filtered_results.len();
    let title = match &state.search.index_stats {
        Some(stats) => format!(" {} ({hits} of {} docs) ", state.search.current_index, stats.doc_count),
        None => format!(" {} ({hits}) ", state.search.current_index),
    };
    let timeframe = if state.search.timeframe.is_empty() {
        "all time".to_string()
    } else {
        format!("last {}", state.search.timeframe)
    };
    HeaderInfo {
        title,
        timeframe,
        matching_indices: state.search.matching_indices.len(),
    }
}

fn compute_empty_state(state: &ApplicationState) -> Option<EmptyState> {
    if !state.data.displayed_results.is_empty() {
        return None;
    }
    if state.ui.loading {
        return Some(EmptyState {
            message: "Searching...".to_string(),
            subtitle: String::new(),
        });
    }
    let subtitle = if state.data.filters.is_empty() {
        "Widen the timeframe or pick another index".to_string()
    } else {
        "Remove a filter or widen the timeframe".to_string()
    };
    Some(EmptyState {
        message: "No documents found".to_string(),
        subtitle,
    })
}

fn compute_field_list(state: &ApplicationState, cache: &FieldCache) -> FieldListInfo {
    let filter = state.ui.field_list_filter.trim();
    let matcher = (!filter.is_empty()).then(SkimMatcherV2::default);

    let items = state
        .visible_fields()
        .into_iter()
        .map(|name| {
            let meta = cache.get(&name);
            let highlight_ranges = matcher
                .as_ref()
                .map_or_else(Vec::new, |m| highlight_ranges(m, &name, filter));
            FieldItem {
                field_type: meta.as_ref().map(|m| m.field_type.clone()).unwrap_or_default(),
                present: meta.is_some_and(|m| m.active),
                selected: state.data.active_fields.contains(&name),
                highlight_ranges,
                name,
            }
        })
        .collect();

    FieldListInfo {
        filter: filter.to_string(),
        items,
    }
}

/// Coalesces fuzzy match indices into contiguous `(start, end)` ranges.
fn highlight_ranges(matcher: &SkimMatcherV2, text: &str, pattern: &str) -> Vec<(usize, usize)> {
    let Some((_score, indices)) = matcher.fuzzy_indices(text, pattern) else {
        return vec![];
    };

    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for idx in indices {
        match ranges.last_mut() {
            Some((_, end)) if *end == idx => *end = idx + 1,
            _ => ranges.push((idx, idx + 1)),
        }
    }
    ranges
}
