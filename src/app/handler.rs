//! Event handling and state transition logic.
//!
//! [`handle_event`] is the single entry point for everything that happens to
//! the dashboard: user input from the presentation layer and completion
//! reports from the worker. It applies the matching state operation and
//! returns the backend jobs the change calls for.
//!
//! # Event Types
//!
//! - **Query editing**: `AddFilter`, `RemoveFilter`, `SetTimeframe`, `SetIndex`, `Refresh`
//! - **Navigation**: `NextPage`, `PrevPage`
//! - **Columns**: `ToggleField`, `ToggleFieldList`, `FieldListFilter`
//! - **Worker reports**: `SearchCompleted`, `SearchFailed`, `FieldsLoaded`,
//!   `IndicesListed`, `JobFailed`
//!
//! Input errors (a filter that does not compile, a duplicate filter, a
//! timeframe outside the whitelist) are written to the status line and also
//! returned, so the caller can keep the input field open.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use esview::app::{handle_event, Action, Event, StateEngine};
//! use esview::Config;
//!
//! let config = Config::default();
//! let engine = StateEngine::new(config.clone());
//! let (render, actions) = handle_event(&engine, &config, &Event::AddFilter("status=500".into()), Utc::now())?;
//! assert!(render);
//! assert!(matches!(actions.as_slice(), [Action::Search { .. }]));
//!
//! let err = handle_event(&engine, &config, &Event::AddFilter("name=*x".into()), Utc::now()).unwrap_err();
//! assert!(err.to_string().contains("wildcard query cannot start with *"));
//! # Ok::<(), esview::EsviewError>(())
//! ```

use super::engine::StateEngine;
use super::Action;
use crate::config::Config;
use crate::domain::{aggregate_stats, Document, FieldMetadata, IndexSummary, QueryError, Result};
use crate::query::{build_query, parse_filter};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Something that happened to the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Compiles and activates a filter expression, then searches.
    AddFilter(String),
    /// Drops the filter at the given position, then searches.
    RemoveFilter(usize),
    /// Changes the time window, then searches.
    SetTimeframe(String),
    /// Switches index, reloads its fields and listing, then searches.
    SetIndex(String),
    NextPage,
    PrevPage,
    /// Shows or hides a column.
    ToggleField(String),
    ToggleFieldList,
    /// Replaces the field-list filter text.
    FieldListFilter(String),
    /// Re-runs the current search and index listing.
    Refresh,

    /// Results of the search with the given generation.
    SearchCompleted {
        generation: u64,
        documents: Vec<Document>,
    },

    /// The search with the given generation failed after retries.
    SearchFailed {
        generation: u64,
        message: String,
    },

    /// Field introspection finished for `index`.
    FieldsLoaded {
        index: String,
        fields: BTreeMap<String, FieldMetadata>,
    },

    /// Index listing finished for `pattern`.
    IndicesListed {
        pattern: String,
        indices: Vec<IndexSummary>,
    },

    /// A field load or index listing failed.
    JobFailed {
        job: String,
        message: String,
    },
}

/// Writes an error to the status line before returning it.
fn report<T>(engine: &StateEngine, result: Result<T>) -> Result<T> {
    result.inspect_err(|e| {
        tracing::debug!(error = %e, "input rejected");
        if let Err(status_err) = engine.set_status(Some(e.to_string())) {
            tracing::warn!(error = %status_err, "could not update status line");
        }
    })
}

/// Compiles the current filters, timeframe and size into a search job.
///
/// # Errors
///
/// Any [`QueryError`] from compilation.
pub fn search_action(engine: &StateEngine, now: DateTime<Utc>) -> Result<Action> {
    let (index, filters, timeframe, size) = engine.read_state(|s| {
        (
            s.search.current_index.clone(),
            s.data.filters.clone(),
            s.search.timeframe.clone(),
            s.misc.num_results,
        )
    });
    let size = i64::try_from(size).unwrap_or(i64::MAX);
    let query = build_query(&filters, size, &timeframe, now)?;
    Ok(Action::Search { index, query })
}

/// Processes an event, mutates state, and returns jobs to execute.
///
/// # Parameters
///
/// * `engine` - State owner
/// * `config` - Validated configuration
/// * `event` - Event to process
/// * `now` - Clock reading used as the end of the time window
///
/// # Returns
///
/// Whether the view must be re-rendered, and the jobs to run.
///
/// # Errors
///
/// Input and state validation errors. Worker reports never fail unless a
/// validator rejects the resulting state.
#[allow(clippy::too_many_lines)]
pub fn handle_event(
    engine: &StateEngine,
    config: &Config,
    event: &Event,
    now: DateTime<Utc>,
) -> Result<(bool, Vec<Action>)> {
    let _span = tracing::debug_span!("handle_event", event = event_name(event)).entered();

    match event {
        Event::AddFilter(expr) => {
            report(engine, parse_filter(expr.trim()).map_err(Into::into))?;
            report(engine, engine.add_filter(expr))?;
            let search = report(engine, search_action(engine, now))?;
            engine.set_status(None)?;
            tracing::debug!(filter = %expr.trim(), "filter added");
            Ok((true, vec![search]))
        }
        Event::RemoveFilter(index) => {
            let removed = report(engine, engine.remove_filter(*index))?;
            tracing::debug!(filter = %removed, "filter removed");
            Ok((true, vec![search_action(engine, now)?]))
        }
        Event::SetTimeframe(token) => {
            if !config.search.is_timeframe_allowed(token) {
                let err = QueryError::timeframe(token.trim(), "not in allowed timeframes");
                return report(engine, Err(err.into()));
            }
            report(engine, engine.set_timeframe(token))?;
            let search = report(engine, search_action(engine, now))?;
            engine.set_status(None)?;
            Ok((true, vec![search]))
        }
        Event::SetIndex(index) => {
            report(engine, engine.set_current_index(index))?;
            let index = engine.read_state(|s| s.search.current_index.clone());
            Ok((
                true,
                vec![
                    Action::LoadFields {
                        index: index.clone(),
                        pattern: config.search.field_pattern.clone(),
                    },
                    Action::ListIndices { pattern: index },
                    search_action(engine, now)?,
                ],
            ))
        }
        Event::Refresh => {
            let index = engine.read_state(|s| s.search.current_index.clone());
            Ok((
                false,
                vec![Action::ListIndices { pattern: index }, search_action(engine, now)?],
            ))
        }
        Event::NextPage => Ok((engine.next_page()?, vec![])),
        Event::PrevPage => Ok((engine.prev_page()?, vec![])),
        Event::ToggleField(field) => {
            report(engine, engine.toggle_field(field))?;
            Ok((true, vec![]))
        }
        Event::ToggleFieldList => {
            engine.toggle_field_list()?;
            Ok((true, vec![]))
        }
        Event::FieldListFilter(text) => {
            engine.set_field_list_filter(text)?;
            Ok((true, vec![]))
        }
        Event::SearchCompleted { generation, documents } => {
            let applied = engine.complete_search(*generation, documents.clone())?;
            if applied {
                tracing::debug!(generation, hits = documents.len(), "search results applied");
            }
            Ok((applied, vec![]))
        }
        Event::SearchFailed { generation, message } => {
            let current = engine.fail_search(*generation, message)?;
            if current {
                tracing::warn!(generation, error = %message, "search failed");
            }
            Ok((current, vec![]))
        }
        Event::FieldsLoaded { index, fields } => {
            let Some(stored) = engine.load_fields(index, fields)? else {
                return Ok((false, vec![]));
            };
            tracing::debug!(index = %index, fields = fields.len(), stored, "fields loaded");
            Ok((true, vec![]))
        }
        Event::IndicesListed { pattern, indices } => {
            if engine.read_state(|s| s.search.current_index != *pattern) {
                return Ok((false, vec![]));
            }
            let names = indices.iter().map(|i| i.name.clone()).collect();
            engine.set_matching_indices(names, aggregate_stats(indices))?;
            Ok((true, vec![]))
        }
        Event::JobFailed { job, message } => {
            tracing::warn!(job = %job, error = %message, "background job failed");
            engine.set_status(Some(format!("{job}: {message}")))?;
            Ok((true, vec![]))
        }
    }
}

const fn event_name(event: &Event) -> &'static str {
    match event {
        Event::AddFilter(_) => "add_filter",
        Event::RemoveFilter(_) => "remove_filter",
        Event::SetTimeframe(_) => "set_timeframe",
        Event::SetIndex(_) => "set_index",
        Event::NextPage => "next_page",
        Event::PrevPage => "prev_page",
        Event::ToggleField(_) => "toggle_field",
        Event::ToggleFieldList => "toggle_field_list",
        Event::FieldListFilter(_) => "field_list_filter",
        Event::Refresh => "refresh",
        Event::SearchCompleted { .. } => "search_completed",
        Event::SearchFailed { .. } => "search_failed",
        Event::FieldsLoaded { .. } => "fields_loaded",
        Event::IndicesListed { .. } => "indices_listed",
        Event::JobFailed { .. } => "job_failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EsviewError, IndexStats};
    use chrono::TimeZone;
    use serde_json::json;

    fn setup() -> (StateEngine, Config) {
        let config = Config::default();
        (StateEngine::new(config.clone()), config)
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn search_body(actions: &[Action]) -> serde_json::Value {
        actions
            .iter()
            .find_map(|a| match a {
                Action::Search { query, .. } => Some(query.to_json()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn add_filter_emits_search_with_window_and_filter() {
        let (engine, config) = setup();
        let (render, actions) =
            handle_event(&engine, &config, &Event::AddFilter("age>=18".into()), now()).unwrap();
        assert!(render);
        let body = search_body(&actions);
        let must = body["query"]["bool"]["must"].as_array().unwrap();
        assert_eq!(must.len(), 2);
        assert_eq!(must[1], json!({"range": {"age": {"gte": 18.0}}}));
        assert_eq!(body["size"], json!(500));
    }

    #[test]
    fn compile_errors_land_in_the_status_line() {
        let (engine, config) = setup();
        let err = handle_event(&engine, &config, &Event::AddFilter("price>".into()), now()).unwrap_err();
        assert!(err.to_string().contains("missing value in range query"));
        let status = engine.get_misc_state().status_message.unwrap();
        assert!(status.contains("missing value in range query"));
        assert!(engine.get_data_state().filters.is_empty());
    }

    #[test]
    fn duplicate_filter_is_an_error() {
        let (engine, config) = setup();
        handle_event(&engine, &config, &Event::AddFilter("a=1".into()), now()).unwrap();
        let err = handle_event(&engine, &config, &Event::AddFilter("a=1".into()), now()).unwrap_err();
        assert!(matches!(err, EsviewError::Validation { .. }));
        assert_eq!(engine.get_data_state().filters.len(), 1);
    }

    #[test]
    fn timeframe_outside_whitelist_is_rejected() {
        let (engine, config) = setup();
        let err = handle_event(&engine, &config, &Event::SetTimeframe("2d".into()), now()).unwrap_err();
        assert!(err.to_string().contains("not in allowed timeframes"));
        assert_eq!(engine.get_search_state().timeframe, "12h");

        let (_, actions) = handle_event(&engine, &config, &Event::SetTimeframe("".into()), now()).unwrap();
        assert_eq!(search_body(&actions)["query"], json!({"match_all": {}}));
    }

    #[test]
    fn set_index_loads_fields_listing_and_results() {
        let (engine, config) = setup();
        let (_, actions) = handle_event(&engine, &config, &Event::SetIndex("audit".into()), now()).unwrap();
        assert_eq!(actions.len(), 3);
        assert_eq!(
            actions[0],
            Action::LoadFields { index: "audit".into(), pattern: "*".into() }
        );
        assert_eq!(actions[1], Action::ListIndices { pattern: "audit".into() });
        assert!(matches!(&actions[2], Action::Search { index, .. } if index == "audit"));
    }

    #[test]
    fn stale_reports_are_ignored() {
        let (engine, config) = setup();
        let handle = engine.begin_search().unwrap();
        let event = Event::SearchCompleted {
            generation: handle.generation() + 1_000,
            documents: vec![Document::from_json(json!({"a": 1}))],
        };
        assert_eq!(handle_event(&engine, &config, &event, now()).unwrap(), (false, vec![]));

        let fields = Event::FieldsLoaded {
            index: "elsewhere".into(),
            fields: BTreeMap::from([("a".to_string(), FieldMetadata::new("long", true, true))]),
        };
        assert_eq!(handle_event(&engine, &config, &fields, now()).unwrap(), (false, vec![]));
        assert!(engine.field_cache().is_empty());
    }

    #[test]
    fn worker_reports_update_state() {
        let (engine, config) = setup();
        let fields = Event::FieldsLoaded {
            index: "logs-*".into(),
            fields: BTreeMap::from([
                ("b".to_string(), FieldMetadata::new("keyword", true, true)),
                ("a".to_string(), FieldMetadata::new("long", true, true)),
            ]),
        };
        handle_event(&engine, &config, &fields, now()).unwrap();
        assert_eq!(engine.get_data_state().fields, vec!["a", "b"]);
        assert_eq!(engine.field_cache().len(), 2);

        let listing = Event::IndicesListed {
            pattern: "logs-*".into(),
            indices: vec![IndexSummary::new("logs-1", IndexStats { doc_count: 4, ..IndexStats::default() })],
        };
        handle_event(&engine, &config, &listing, now()).unwrap();
        let search = engine.get_search_state();
        assert_eq!(search.matching_indices, vec!["logs-1"]);
        assert_eq!(search.index_stats.unwrap().doc_count, 4);

        let failed = Event::JobFailed { job: "load_fields".into(), message: "403".into() };
        handle_event(&engine, &config, &failed, now()).unwrap();
        assert_eq!(engine.get_misc_state().status_message.as_deref(), Some("load_fields: 403"));
    }

    #[test]
    fn paging_events_report_whether_anything_moved() {
        let (engine, config) = setup();
        assert_eq!(handle_event(&engine, &config, &Event::NextPage, now()).unwrap(), (false, vec![]));
        assert_eq!(handle_event(&engine, &config, &Event::PrevPage, now()).unwrap(), (false, vec![]));
    }
}
