//! Esview: the interactive engine behind a terminal dashboard for an
//! Elasticsearch-compatible document store.
//!
//! Esview provides:
//! - A compiler from short filter expressions (`status=500`, `latency_ms>=250`,
//!   `host=web-*`) and timeframe tokens (`12h`, `week`) to the backend query DSL
//! - A transactional application-state engine with validators and post-commit
//!   hooks, safe under concurrent callers
//! - Admission control and exponential-backoff retries for backend calls
//! - A concurrent field metadata cache and display-ready view models

#![allow(clippy::multiple_crate_versions)]

//!
//! # Architecture
//!
//! The crate follows a layered architecture pattern:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  Presentation (outside this crate)                  │  ← Renders, sends Events
//! └─────────────────────────────────────────────────────┘
//!                        │
//! ┌─────────────────────────────────────────────────────┐
//! │  Application Layer (app/)                           │  ← State engine
//! │  - Event handling                                   │  ← Business logic
//! │  - Named state operations                           │
//! │  - Action dispatching                               │
//! └─────────────────────────────────────────────────────┘
//!         │                    │                    │
//! ┌───────────────┐   ┌───────────────┐   ┌───────────────┐
//! │ UI Layer      │   │ Query Layer   │   │ Worker Layer  │
//! │ (ui/)         │   │ (query/)      │   │ (worker/)     │
//! │ - View models │   │ - Filters     │   │ - Backend jobs│
//! │               │   │ - Timeframes  │   │ - Admission   │
//! │               │   │ - Query DSL   │   │ - Retries     │
//! └───────────────┘   └───────────────┘   └───────────────┘
//!         │                    │                    │
//! ┌─────────────────────────────────────────────────────┐
//! │  Domain & Infrastructure                            │
//! │  - Documents, fields, errors (domain/)              │
//! │  - Field cache (cache), admission (admission)       │
//! │  - Configuration (config)                           │
//! └─────────────────────────────────────────────────────┘
//!                        │
//! ┌─────────────────────────────────────────────────────┐
//! │  Observability (observability/)                     │  ← Optional
//! │  - File-based structured logging                    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`app`]: State engine, operations and the event/action model
//! - [`query`]: Filter and timeframe compiler
//! - [`admission`]: Concurrency gate and retry policy for backend calls
//! - [`cache`]: Concurrent field metadata cache
//! - [`worker`]: Backend contract and job execution
//! - [`ui`]: View models for the renderer
//! - [`domain`]: Documents, field metadata, errors
//! - [`config`]: Validated configuration
//! - [`observability`]: Log file setup
//!
//! # Flow
//!
//! 1. **Startup**: load a [`Config`], call [`observability::init_tracing`]
//!    and [`initialize`]
//! 2. **Input**: the presentation layer turns keystrokes into [`Event`]s and
//!    passes them to [`handle_event`]
//! 3. **Jobs**: the returned [`Action`]s go to a [`worker::SearchWorker`],
//!    which runs them against a [`worker::SearchBackend`] and feeds the
//!    results back as events
//! 4. **Render**: [`ui::TableViewModel::compute`] on a fresh snapshot
//!
//! Filter compilation is purely syntactic. [`query::parse_filter`] and
//! [`query::build_query`] therefore take no field cache; the cache only feeds
//! the field list of the view model. [`StateEngine::read_state`] cannot fail
//! and returns the reader's value directly.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use esview::{handle_event, initialize, Action, Config, Event};
//!
//! let config = Config::from_toml_str(r#"
//!     default_index = "logs-*"
//!     [search]
//!     default_timeframe = "week"
//! "#)?;
//! let engine = initialize(&config);
//!
//! let (_, actions) = handle_event(&engine, &config, &Event::AddFilter("level=error".into()), Utc::now())?;
//! let Action::Search { query, .. } = &actions[0] else { unreachable!() };
//! assert_eq!(query.to_json()["query"]["bool"]["must"][1], serde_json::json!({"match": {"level": "error"}}));
//! # Ok::<(), esview::EsviewError>(())
//! ```

pub mod admission;
pub mod app;
pub mod cache;
pub mod config;
pub mod domain;
pub mod query;
pub mod worker;

pub mod ui;

pub mod observability;

pub use app::{handle_event, Action, ApplicationState, Event, StateEngine};
pub use config::Config;
pub use domain::{EsviewError, QueryError, Result};

use std::sync::Arc;

/// Creates the state engine for a validated configuration.
///
/// The engine starts with the configured index, timeframe, page size and
/// result count, an empty field cache sized by `cache.field_cache_size`,
/// and the core state invariants as its only validator.
///
/// # Example
///
/// ```
/// use esview::{initialize, Config};
///
/// let engine = initialize(&Config::default());
/// assert_eq!(engine.get_search_state().current_index, "logs-*");
/// ```
#[must_use]
pub fn initialize(config: &Config) -> Arc<StateEngine> {
    tracing::debug!(index = %config.default_index, "initializing dashboard engine");
    Arc::new(StateEngine::new(config.clone()))
}
