//! Full query compilation.
//!
//! Combines the active filter expressions and the timeframe into one
//! [`CompiledQuery`]. Without filters or timeframe the query is `match_all`;
//! otherwise every part goes into a single `must` conjunction, time window
//! first, even when there is only one part.

use super::clause::{Clause, CompiledQuery};
use super::filter::parse_filter;
use super::timeframe::build_time_query;
use crate::domain::QueryError;
use chrono::{DateTime, Utc};

/// Compiles filters, size and timeframe into a search request body.
///
/// # Parameters
///
/// * `filters` - Filter expressions, compiled in order
/// * `size` - Maximum number of hits, must be non-negative
/// * `timeframe` - Timeframe token, empty for no time bound
/// * `now` - End of the time window
///
/// # Errors
///
/// [`QueryError::NegativeSize`] for a negative size, otherwise the first
/// filter or timeframe error, unchanged.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use esview::query::build_query;
/// use serde_json::json;
///
/// let query = build_query(&[] as &[&str], 10, "", Utc::now()).unwrap();
/// assert_eq!(query.to_json(), json!({"query": {"match_all": {}}, "size": 10}));
/// ```
#[tracing::instrument(level = "debug", skip(filters, now), fields(filter_count = filters.len()))]
pub fn build_query<S: AsRef<str>>(
    filters: &[S],
    size: i64,
    timeframe: &str,
    now: DateTime<Utc>,
) -> Result<CompiledQuery, QueryError> {
    let size = u64::try_from(size).map_err(|_| QueryError::NegativeSize(size))?;

    let mut must = Vec::with_capacity(filters.len() + 1);
    if let Some(window) = build_time_query(timeframe, now)? {
        must.push(window);
    }
    for expr in filters {
        must.push(parse_filter(expr.as_ref())?);
    }

    let query = if must.is_empty() {
        Clause::MatchAll
    } else {
        Clause::Must(must)
    };

    tracing::debug!(size, "query compiled");
    Ok(CompiledQuery::new(query, size))
}
