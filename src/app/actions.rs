//! Side effects requested by the event handler.
//!
//! The handler never talks to the backend itself. It returns [`Action`]s,
//! which the [`SearchWorker`](crate::worker::SearchWorker) executes; each job
//! reports back as an [`Event`](super::Event).
//!
//! # Example
//!
//! ```
//! use esview::app::Action;
//!
//! let action = Action::LoadFields { index: "logs-*".into(), pattern: "*".into() };
//! assert_eq!(action.name(), "load_fields");
//! ```

use crate::query::CompiledQuery;

/// Backend jobs produced by the event handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Runs a search. Supersedes any search still in flight.
    Search {
        index: String,
        query: CompiledQuery,
    },

    /// Introspects the fields of `index` matching the glob `pattern`.
    LoadFields {
        index: String,
        pattern: String,
    },

    /// Lists the indices matching `pattern` with their stats.
    ListIndices {
        pattern: String,
    },
}

impl Action {
    /// Short job name used for logs and admission control.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Search { .. } => "search",
            Self::LoadFields { .. } => "load_fields",
            Self::ListIndices { .. } => "list_indices",
        }
    }
}
