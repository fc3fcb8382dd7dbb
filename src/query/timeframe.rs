//! Timeframe tokens.
//!
//! A timeframe token bounds a search by recency: `12h`, `3d`, `2w`, or one of
//! the keywords `week`, `month`, `quarter`, `year`. Tokens are trimmed and
//! matched case-insensitively.
//!
//! The compiled window is a disjunction over two timestamp fields because
//! indices in the wild store either epoch seconds or epoch milliseconds.

use super::clause::{Clause, RangeOp};
use crate::domain::QueryError;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::json;

/// Field holding epoch seconds.
pub const SECONDS_FIELD: &str = "timestamp";

/// Field holding epoch milliseconds.
pub const MILLIS_FIELD: &str = "@timestamp";

const KEYWORDS: &[(&str, i64)] = &[("week", 7), ("month", 30), ("quarter", 90), ("year", 365)];

/// Resolves a timeframe token to a duration.
///
/// # Errors
///
/// [`QueryError::InvalidTimeframe`] for empty tokens, unknown keywords or
/// units, negative counts and counts too large to represent.
///
/// # Example
///
/// ```
/// use chrono::TimeDelta;
/// use esview::query::parse_timeframe;
///
/// assert_eq!(parse_timeframe(" 12H ").unwrap(), TimeDelta::hours(12));
/// assert_eq!(parse_timeframe("quarter").unwrap(), TimeDelta::days(90));
/// assert!(parse_timeframe("-1d").is_err());
/// ```
pub fn parse_timeframe(token: &str) -> Result<TimeDelta, QueryError> {
    let normalized = token.trim().to_ascii_lowercase();
    if normalized.is_empty() {
        return Err(QueryError::timeframe(token, "timeframe cannot be empty"));
    }

    if let Some((_, days)) = KEYWORDS.iter().find(|(k, _)| *k == normalized) {
        return Ok(TimeDelta::days(*days));
    }

    let Some(unit) = normalized.chars().last() else {
        return Err(QueryError::timeframe(token, "timeframe cannot be empty"));
    };
    let count = &normalized[..normalized.len() - unit.len_utf8()];
    if count.is_empty() || !count.trim_start_matches(['-', '+']).chars().all(|c| c.is_ascii_digit()) {
        return Err(QueryError::timeframe(token, "expected <number>h|d|w or week|month|quarter|year"));
    }

    let n: i64 = count
        .parse()
        .map_err(|_| QueryError::timeframe(token, "count out of range"))?;
    if n < 0 {
        return Err(QueryError::timeframe(token, "count must be non-negative"));
    }

    let delta = match unit {
        'h' => TimeDelta::try_hours(n),
        'd' => TimeDelta::try_days(n),
        'w' => TimeDelta::try_weeks(n),
        other => {
            return Err(QueryError::timeframe(token, format!("unknown unit '{other}'")));
        }
    };
    delta.ok_or_else(|| QueryError::timeframe(token, "count out of range"))
}

/// Compiles a timeframe into a two-field time window ending at `now`.
///
/// Returns `Ok(None)` for an empty token. Otherwise both range clauses are
/// always present: seconds on [`SECONDS_FIELD`] and the same window ×1000 on
/// [`MILLIS_FIELD`], joined with `minimum_should_match = 1`.
///
/// # Errors
///
/// Propagates [`parse_timeframe`] errors.
pub fn build_time_query(token: &str, now: DateTime<Utc>) -> Result<Option<Clause>, QueryError> {
    if token.trim().is_empty() {
        return Ok(None);
    }

    let window = parse_timeframe(token)?;
    let lte = now.timestamp();
    let gte = lte.saturating_sub(window.num_seconds());

    let seconds = Clause::Range {
        field: SECONDS_FIELD.to_string(),
        bounds: vec![(RangeOp::Gte, json!(gte)), (RangeOp::Lte, json!(lte))],
    };
    let millis = Clause::Range {
        field: MILLIS_FIELD.to_string(),
        bounds: vec![
            (RangeOp::Gte, json!(gte.saturating_mul(1000))),
            (RangeOp::Lte, json!(lte.saturating_mul(1000))),
        ],
    };

    tracing::debug!(token = %token.trim(), gte, lte, "time window compiled");

    Ok(Some(Clause::Should {
        clauses: vec![seconds, millis],
        minimum: 1,
    }))
}
