//! Named state operations.
//!
//! Each operation is one [`StateEngine::update_state`] transaction whose
//! mutator also checks the operation's own preconditions, so a rejected call
//! leaves the state untouched. The `get_*` getters return cloned slices of
//! the state for the presentation layer.

use super::engine::StateEngine;
use super::state::{ApplicationState, CancelHandle, DataState, MiscState, Pagination, SearchState, UiState};
use crate::domain::{Document, EsviewError, FieldMetadata, IndexStats, Result};
use crate::query::parse_timeframe;
use std::collections::{BTreeMap, HashSet};

fn leaf_union(docs: &[Document]) -> Vec<String> {
    let mut seen = HashSet::new();
    docs.iter()
        .flat_map(Document::leaf_fields)
        .filter(|f| seen.insert(f.clone()))
        .collect()
}

fn apply_results(state: &mut ApplicationState, documents: Vec<Document>) -> Vec<String> {
    state.data.current_results = documents;
    state.pagination.current_page = 1;
    state.refresh_results();
    leaf_union(&state.data.current_results)
}

fn non_negative(operation: &str, value: i64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| EsviewError::validation(operation, format!("value must be non-negative, got {value}")))
}

impl StateEngine {
    /// Moves to `page`.
    ///
    /// # Errors
    ///
    /// [`EsviewError::Validation`] unless `1 <= page <= total_pages`.
    pub fn set_page(&self, page: usize) -> Result<()> {
        const OP: &str = "set_page";
        self.update_state(OP, |s| {
            if page < 1 {
                return Err(EsviewError::validation(OP, "page must be >= 1"));
            }
            if page > s.pagination.total_pages {
                return Err(EsviewError::validation(
                    OP,
                    format!("page {page} exceeds total pages {}", s.pagination.total_pages),
                ));
            }
            s.pagination.current_page = page;
            s.refresh_page();
            Ok(())
        })
    }

    /// Advances one page.
    ///
    /// # Returns
    ///
    /// `false` without changing anything when already on the last page.
    ///
    /// # Errors
    ///
    /// Validator errors from the transaction.
    pub fn next_page(&self) -> Result<bool> {
        let mut moved = false;
        self.update_state("next_page", |s| {
            if s.pagination.current_page < s.pagination.total_pages {
                s.pagination.current_page += 1;
                s.refresh_page();
                moved = true;
            }
            Ok(())
        })?;
        Ok(moved)
    }

    /// Goes back one page; `false` when already on the first.
    ///
    /// # Errors
    ///
    /// Validator errors from the transaction.
    pub fn prev_page(&self) -> Result<bool> {
        let mut moved = false;
        self.update_state("prev_page", |s| {
            if s.pagination.current_page > 1 {
                s.pagination.current_page -= 1;
                s.refresh_page();
                moved = true;
            }
            Ok(())
        })?;
        Ok(moved)
    }

    /// Switches to another index.
    ///
    /// Clears everything tied to the previous index: fields, columns,
    /// results, the index listing and the field cache. The in-flight search
    /// is cancelled.
    ///
    /// # Errors
    ///
    /// [`EsviewError::Validation`] for an empty name.
    pub fn set_current_index(&self, index: &str) -> Result<()> {
        const OP: &str = "set_current_index";
        let index = index.trim();
        let mut previous_op = None;
        let changed = self.update_state_and_sync(
            OP,
            |s| {
                if index.is_empty() {
                    return Err(EsviewError::validation(OP, "index name cannot be empty"));
                }
                if s.search.current_index == index {
                    return Ok(false);
                }
                s.search.current_index = index.to_string();
                s.search.matching_indices.clear();
                s.search.index_stats = None;
                previous_op = s.search.cancel_current_op.take();
                s.data.fields.clear();
                s.data.active_fields.clear();
                s.data.current_results.clear();
                s.ui.loading = false;
                s.pagination.current_page = 1;
                s.refresh_results();
                Ok(true)
            },
            |changed, cache| {
                if changed {
                    cache.clear();
                }
                changed
            },
        )?;

        if let Some(op) = previous_op {
            op.cancel();
        }
        if changed {
            tracing::debug!(index, "index switched");
        }
        Ok(())
    }

    /// Adds a filter expression to the active set.
    ///
    /// The expression is stored trimmed. Compilation is the caller's concern.
    ///
    /// # Errors
    ///
    /// [`EsviewError::Validation`] for an empty expression or one already
    /// active.
    pub fn add_filter(&self, expr: &str) -> Result<()> {
        const OP: &str = "add_filter";
        let expr = expr.trim();
        self.update_state(OP, |s| {
            if expr.is_empty() {
                return Err(EsviewError::validation(OP, "filter cannot be empty"));
            }
            if s.data.filters.iter().any(|f| f == expr) {
                return Err(EsviewError::validation(OP, format!("filter already active: {expr}")));
            }
            s.data.filters.push(expr.to_string());
            Ok(())
        })
    }

    /// Removes the filter at `index`.
    ///
    /// # Returns
    ///
    /// The removed expression.
    ///
    /// # Errors
    ///
    /// [`EsviewError::Validation`] if `index` is out of range.
    pub fn remove_filter(&self, index: usize) -> Result<String> {
        const OP: &str = "remove_filter";
        let mut removed = String::new();
        self.update_state(OP, |s| {
            if index >= s.data.filters.len() {
                return Err(EsviewError::validation(
                    OP,
                    format!("filter index {index} out of range ({} active)", s.data.filters.len()),
                ));
            }
            removed = s.data.filters.remove(index);
            Ok(())
        })?;
        Ok(removed)
    }

    /// Shows or hides `field` as a table column.
    ///
    /// # Errors
    ///
    /// [`EsviewError::Validation`] for an empty field name.
    pub fn set_field_active(&self, field: &str, active: bool) -> Result<()> {
        const OP: &str = "set_field_active";
        let field = field.trim();
        self.update_state(OP, |s| {
            if field.is_empty() {
                return Err(EsviewError::validation(OP, "field name cannot be empty"));
            }
            let changed = if active {
                s.data.active_fields.insert(field.to_string())
            } else {
                s.data.active_fields.remove(field)
            };
            if changed {
                s.refresh_page();
            }
            Ok(())
        })
    }

    /// Flips a column's visibility; returns the new visibility.
    ///
    /// # Errors
    ///
    /// As [`StateEngine::set_field_active`].
    pub fn toggle_field(&self, field: &str) -> Result<bool> {
        const OP: &str = "toggle_field";
        let field = field.trim();
        let mut active = false;
        self.update_state(OP, |s| {
            if field.is_empty() {
                return Err(EsviewError::validation(OP, "field name cannot be empty"));
            }
            active = s.data.active_fields.insert(field.to_string());
            if !active {
                s.data.active_fields.remove(field);
            }
            s.refresh_page();
            Ok(())
        })?;
        Ok(active)
    }

    /// Replaces the result set.
    ///
    /// Rebuilds the derived results, returns to page 1 and marks the fields
    /// present in `documents` active in the field cache.
    ///
    /// # Errors
    ///
    /// Validator errors from the transaction.
    pub fn update_results(&self, documents: Vec<Document>) -> Result<()> {
        self.update_state_and_sync(
            "update_results",
            |s| Ok(apply_results(s, documents)),
            |present, cache| cache.mark_active(&present),
        )
    }

    /// Cancels the in-flight search and registers a new one.
    ///
    /// Sets the loading flag and clears the status line.
    ///
    /// # Returns
    ///
    /// The handle of the new search.
    ///
    /// # Errors
    ///
    /// Validator errors from the transaction; the prior search is then left
    /// running.
    pub fn begin_search(&self) -> Result<CancelHandle> {
        let handle = CancelHandle::new();
        let mut previous = None;
        self.update_state("begin_search", |s| {
            previous = s.search.cancel_current_op.replace(handle.clone());
            s.ui.loading = true;
            s.misc.status_message = None;
            Ok(())
        })?;
        if let Some(previous) = previous {
            tracing::debug!(generation = previous.generation(), "cancelling superseded search");
            previous.cancel();
        }
        Ok(handle)
    }

    /// Applies the results of search `generation`.
    ///
    /// # Returns
    ///
    /// `false` if that search was superseded or cancelled; its results are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Validator errors from the transaction.
    pub fn complete_search(&self, generation: u64, documents: Vec<Document>) -> Result<bool> {
        const OP: &str = "complete_search";
        let outcome = self.update_state_and_sync(
            OP,
            |s| {
                match &s.search.cancel_current_op {
                    Some(op) if op.generation() == generation && !op.is_cancelled() => {}
                    _ => return Err(EsviewError::Cancelled(OP.to_string())),
                }
                s.search.cancel_current_op = None;
                s.ui.loading = false;
                Ok(apply_results(s, documents))
            },
            |present, cache| cache.mark_active(&present),
        );

        match outcome {
            Ok(()) => Ok(true),
            Err(EsviewError::Cancelled(_)) => {
                tracing::debug!(generation, "discarding results of superseded search");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Records the failure of search `generation` in the status line.
    ///
    /// # Returns
    ///
    /// `false` if that search was superseded; nothing changes.
    ///
    /// # Errors
    ///
    /// Validator errors from the transaction.
    pub fn fail_search(&self, generation: u64, message: &str) -> Result<bool> {
        let mut current = false;
        self.update_state("fail_search", |s| {
            if s.search.cancel_current_op.as_ref().map(CancelHandle::generation) == Some(generation) {
                current = true;
                s.search.cancel_current_op = None;
                s.ui.loading = false;
                s.misc.status_message = Some(message.to_string());
            }
            Ok(())
        })?;
        Ok(current)
    }

    /// Sets the timeframe token; empty removes the time bound.
    ///
    /// # Errors
    ///
    /// [`EsviewError::Query`] if the token does not parse.
    pub fn set_timeframe(&self, token: &str) -> Result<()> {
        let token = token.trim();
        if !token.is_empty() {
            parse_timeframe(token)?;
        }
        self.update_state("set_timeframe", |s| {
            s.search.timeframe = token.to_string();
            Ok(())
        })
    }

    /// Sets the number of hits requested per search.
    ///
    /// # Errors
    ///
    /// [`EsviewError::Validation`] for negative counts or counts above the
    /// configured maximum.
    pub fn set_num_results(&self, count: i64) -> Result<()> {
        const OP: &str = "set_num_results";
        let count = non_negative(OP, count)?;
        let max = self.config().search.max_result_count;
        self.update_state(OP, |s| {
            if count > max {
                return Err(EsviewError::validation(OP, format!("{count} exceeds max result count {max}")));
            }
            s.misc.num_results = count;
            Ok(())
        })
    }

    /// Sets the page size and returns to page 1.
    ///
    /// # Errors
    ///
    /// [`EsviewError::Validation`] unless `1 <= size <= max_page_size`.
    pub fn set_page_size(&self, size: i64) -> Result<()> {
        const OP: &str = "set_page_size";
        let size = non_negative(OP, size)?;
        let max = self.config().pagination.max_page_size;
        self.update_state(OP, |s| {
            if size == 0 || size > max {
                return Err(EsviewError::validation(OP, format!("page size must be in 1..={max}, got {size}")));
            }
            s.pagination.page_size = size;
            s.pagination.current_page = 1;
            s.refresh_results();
            Ok(())
        })
    }

    /// Sets the loading flag.
    ///
    /// # Errors
    ///
    /// Validator errors from the transaction.
    pub fn set_loading(&self, loading: bool) -> Result<()> {
        self.update_state("set_loading", |s| {
            s.ui.loading = loading;
            Ok(())
        })
    }

    /// Shows or hides the field list; returns the new visibility.
    ///
    /// # Errors
    ///
    /// Validator errors from the transaction.
    pub fn toggle_field_list(&self) -> Result<bool> {
        let mut shown = false;
        self.update_state("toggle_field_list", |s| {
            s.ui.show_field_list = !s.ui.show_field_list;
            shown = s.ui.show_field_list;
            Ok(())
        })?;
        Ok(shown)
    }

    /// Sets the field-list filter text.
    ///
    /// # Errors
    ///
    /// Validator errors from the transaction.
    pub fn set_field_list_filter(&self, filter: &str) -> Result<()> {
        self.update_state("set_field_list_filter", |s| {
            s.ui.field_list_filter = filter.to_string();
            Ok(())
        })
    }

    /// Sets or clears the status line.
    ///
    /// # Errors
    ///
    /// Validator errors from the transaction.
    pub fn set_status(&self, message: Option<String>) -> Result<()> {
        self.update_state("set_status", |s| {
            s.misc.status_message = message;
            Ok(())
        })
    }

    /// Stores an index listing.
    ///
    /// # Errors
    ///
    /// Validator errors from the transaction.
    pub fn set_matching_indices(&self, names: Vec<String>, stats: Option<IndexStats>) -> Result<()> {
        self.update_state("set_matching_indices", |s| {
            s.search.matching_indices = names;
            s.search.index_stats = stats;
            Ok(())
        })
    }

    /// Applies a field introspection result for `index`.
    ///
    /// The field list and the cache are updated in one transaction, and only
    /// while `index` is still the current index. Fields present in the
    /// current results are marked active.
    ///
    /// # Returns
    ///
    /// Number of records cached, or `None` if the index changed meanwhile and
    /// nothing was applied.
    ///
    /// # Errors
    ///
    /// Validator errors from the transaction.
    pub fn load_fields(&self, index: &str, fields: &BTreeMap<String, FieldMetadata>) -> Result<Option<usize>> {
        const OP: &str = "load_fields";
        let outcome = self.update_state_and_sync(
            OP,
            |s| {
                if s.search.current_index != index {
                    return Err(EsviewError::Cancelled(OP.to_string()));
                }
                s.data.fields = fields.keys().cloned().collect();
                s.refresh_page();
                Ok(leaf_union(&s.data.current_results))
            },
            |present, cache| {
                let stored = cache.insert_all(fields.iter().map(|(name, meta)| (name.clone(), meta.clone())));
                cache.mark_active(&present);
                stored
            },
        );

        match outcome {
            Ok(stored) => Ok(Some(stored)),
            Err(EsviewError::Cancelled(_)) => {
                tracing::debug!(index, "dropping fields of a previous index");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[must_use]
    pub fn get_pagination(&self) -> Pagination {
        self.read_state(|s| s.pagination.clone())
    }

    #[must_use]
    pub fn get_ui_state(&self) -> UiState {
        self.read_state(|s| s.ui.clone())
    }

    #[must_use]
    pub fn get_search_state(&self) -> SearchState {
        self.read_state(|s| s.search.clone())
    }

    #[must_use]
    pub fn get_data_state(&self) -> DataState {
        self.read_state(|s| s.data.clone())
    }

    #[must_use]
    pub fn get_misc_state(&self) -> MiscState {
        self.read_state(|s| s.misc.clone())
    }
}
