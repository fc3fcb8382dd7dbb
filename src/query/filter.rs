//! Filter expression parsing.
//!
//! Turns one user-typed `field OP value` expression into a [`Clause`]. Parsing
//! is purely syntax-driven: the field metadata cache is never consulted, so the
//! same expression always compiles to the same clause.
//!
//! # Equality rules
//!
//! | value                           | clause                      |
//! |---------------------------------|-----------------------------|
//! | `null` (any case)               | field does not exist        |
//! | `true` / `false` (any case)     | boolean term                |
//! | signed decimal or float         | numeric term (always float) |
//! | unescaped `*`/`?`, not leading  | wildcard, verbatim          |
//! | leading unescaped `*`           | error                       |
//! | anything else                   | match on the unescaped text |
//!
//! `_id` and `_dedup_id` bypass the table: the first becomes an id lookup, the
//! second an exact term.

use super::clause::{Clause, RangeOp, TermValue};
use crate::domain::field::is_valid_field_name;
use crate::domain::QueryError;
use regex::Regex;
use std::sync::LazyLock;

/// Field routed to an id lookup.
pub const ID_FIELD: &str = "_id";

/// Field routed to an exact term instead of free text.
pub const DEDUP_FIELD: &str = "_dedup_id";

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").expect("Invalid number regex")
});

/// Comparison operator of a filter expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    const fn range_op(self) -> Option<RangeOp> {
        match self {
            Self::Eq => None,
            Self::Gt => Some(RangeOp::Gt),
            Self::Gte => Some(RangeOp::Gte),
            Self::Lt => Some(RangeOp::Lt),
            Self::Lte => Some(RangeOp::Lte),
        }
    }
}

/// A filter expression split into its three parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterParts<'a> {
    pub field: &'a str,
    pub op: FilterOp,
    pub value: &'a str,
}

/// Splits an expression at its first operator.
///
/// `>=` and `<=` are preferred over `>` and `<` at the same position.
///
/// # Errors
///
/// [`QueryError::EmptyFilter`] for blank input, [`QueryError::InvalidFormat`]
/// when no operator is present or the field part is empty.
pub fn split_filter(expr: &str) -> Result<FilterParts<'_>, QueryError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(QueryError::EmptyFilter);
    }

    let (idx, first) = expr
        .char_indices()
        .find(|(_, c)| matches!(c, '=' | '<' | '>'))
        .ok_or_else(|| QueryError::InvalidFormat(expr.to_string()))?;

    let followed_by_eq = expr[idx + 1..].starts_with('=');
    let (op, len) = match (first, followed_by_eq) {
        ('>', true) => (FilterOp::Gte, 2),
        ('>', false) => (FilterOp::Gt, 1),
        ('<', true) => (FilterOp::Lte, 2),
        ('<', false) => (FilterOp::Lt, 1),
        _ => (FilterOp::Eq, 1),
    };

    let field = expr[..idx].trim();
    if field.is_empty() {
        return Err(QueryError::InvalidFormat(expr.to_string()));
    }

    Ok(FilterParts {
        field,
        op,
        value: expr[idx + len..].trim(),
    })
}

/// Parses one filter expression into a query clause.
///
/// # Errors
///
/// Returns the [`QueryError`] describing the first problem found.
///
/// # Example
///
/// ```
/// use esview::query::parse_filter;
/// use serde_json::json;
///
/// let clause = parse_filter("age=25").unwrap();
/// assert_eq!(clause.to_json(), json!({"term": {"age": 25.0}}));
///
/// let err = parse_filter("price>").unwrap_err();
/// assert!(err.to_string().contains("missing value in range query"));
/// ```
pub fn parse_filter(expr: &str) -> Result<Clause, QueryError> {
    let parts = split_filter(expr)?;
    let field = parts.field;

    let reserved = field == ID_FIELD || field == DEDUP_FIELD;
    if !reserved && !is_valid_field_name(field) {
        return Err(QueryError::InvalidFieldName(field.to_string()));
    }

    match parts.op.range_op() {
        None => parse_equality(field, parts.value, expr),
        Some(op) => parse_range(field, op, parts.value),
    }
}

fn parse_equality(field: &str, value: &str, expr: &str) -> Result<Clause, QueryError> {
    if value.is_empty() {
        return Err(QueryError::InvalidFormat(expr.trim().to_string()));
    }

    match field {
        ID_FIELD => {
            return Ok(Clause::Ids {
                values: vec![value.to_string()],
            })
        }
        DEDUP_FIELD => {
            return Ok(Clause::Term {
                field: field.to_string(),
                value: TermValue::Text(value.to_string()),
            })
        }
        _ => {}
    }

    let field = field.to_string();

    if value.eq_ignore_ascii_case("null") {
        return Ok(Clause::Missing { field });
    }
    if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") {
        return Ok(Clause::Term {
            field,
            value: TermValue::Bool(value.eq_ignore_ascii_case("true")),
        });
    }
    if let Some(n) = parse_number(value) {
        return Ok(Clause::Term {
            field,
            value: TermValue::Number(n),
        });
    }

    let scan = scan_wildcards(value);
    if scan.leading_star {
        return Err(QueryError::LeadingWildcard);
    }
    if scan.has_wildcard {
        return Ok(Clause::Wildcard {
            field,
            pattern: value.to_string(),
        });
    }

    Ok(Clause::Match {
        field,
        text: unescape(value),
    })
}

fn parse_range(field: &str, op: RangeOp, value: &str) -> Result<Clause, QueryError> {
    if value.is_empty() {
        return Err(QueryError::MissingRangeValue(field.to_string()));
    }
    let n = parse_number(value).ok_or_else(|| QueryError::InvalidRangeNumber(value.to_string()))?;
    Ok(Clause::range(field, op, n))
}

fn parse_number(value: &str) -> Option<f64> {
    if NUMBER.is_match(value) {
        value.parse::<f64>().ok().filter(|n| n.is_finite())
    } else {
        None
    }
}

#[derive(Debug, Default)]
struct WildcardScan {
    has_wildcard: bool,
    leading_star: bool,
}

fn scan_wildcards(value: &str) -> WildcardScan {
    let mut scan = WildcardScan::default();
    let mut escaped = false;
    for (i, c) in value.chars().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '*' | '?' => {
                scan.has_wildcard = true;
                if i == 0 && c == '*' {
                    scan.leading_star = true;
                }
            }
            _ => {}
        }
    }
    scan
}

/// Removes backslash escapes in front of `*`, `?`, `=` and `\`.
///
/// Any other backslash, including an unmatched trailing one, is kept.
#[must_use]
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if matches!(next, '*' | '?' | '=' | '\\') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}
