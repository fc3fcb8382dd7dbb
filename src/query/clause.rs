//! Typed query clauses.
//!
//! A [`Clause`] is one node of the boolean query tree sent to the backend. It
//! serialises to the backend's JSON query DSL through [`Clause::to_json`]; a
//! full request body is a [`CompiledQuery`].

use serde::Serialize;
use serde_json::{json, Map, Value as Json};

/// Bound applied by a range clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl RangeOp {
    /// The DSL key for this bound.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
        }
    }
}

/// Exact-match operand of a term clause.
#[derive(Debug, Clone, PartialEq)]
pub enum TermValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl TermValue {
    fn to_json(&self) -> Json {
        match self {
            Self::Bool(b) => Json::Bool(*b),
            Self::Number(n) => json!(n),
            Self::Text(s) => Json::String(s.clone()),
        }
    }
}

/// One node of a compiled query.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Matches every document.
    MatchAll,
    /// Free-text match on an analysed field.
    Match { field: String, text: String },
    /// Exact match.
    Term { field: String, value: TermValue },
    /// Pattern match with `*`/`?`, value passed through verbatim.
    Wildcard { field: String, pattern: String },
    /// Numeric range; `bounds` are applied together.
    Range { field: String, bounds: Vec<(RangeOp, Json)> },
    /// Documents in which `field` has no value.
    Missing { field: String },
    /// Lookup by document id.
    Ids { values: Vec<String> },
    /// All clauses must match.
    Must(Vec<Clause>),
    /// At least `minimum` of the clauses must match.
    Should { clauses: Vec<Clause>, minimum: u32 },
}

impl Clause {
    /// Single-bound numeric range clause.
    #[must_use]
    pub fn range(field: impl Into<String>, op: RangeOp, value: f64) -> Self {
        Self::Range {
            field: field.into(),
            bounds: vec![(op, json!(value))],
        }
    }

    /// Converts the clause into the backend's JSON DSL.
    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Self::MatchAll => json!({ "match_all": {} }),
            Self::Match { field, text } => json!({ "match": { field.as_str(): text } }),
            Self::Term { field, value } => json!({ "term": { field.as_str(): value.to_json() } }),
            Self::Wildcard { field, pattern } => {
                json!({ "wildcard": { field.as_str(): pattern } })
            }
            Self::Range { field, bounds } => {
                let bounds: Map<String, Json> = bounds
                    .iter()
                    .map(|(op, v)| (op.as_str().to_string(), v.clone()))
                    .collect();
                json!({ "range": { field.as_str(): bounds } })
            }
            Self::Missing { field } => {
                json!({ "bool": { "must_not": { "exists": { "field": field } } } })
            }
            Self::Ids { values } => json!({ "ids": { "values": values } }),
            Self::Must(clauses) => {
                let items: Vec<Json> = clauses.iter().map(Self::to_json).collect();
                json!({ "bool": { "must": items } })
            }
            Self::Should { clauses, minimum } => {
                let items: Vec<Json> = clauses.iter().map(Self::to_json).collect();
                json!({ "bool": { "should": items, "minimum_should_match": minimum } })
            }
        }
    }
}

impl Serialize for Clause {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// A complete search request body: `{"query": ..., "size": ...}`.
///
/// Built fresh for every search and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    query: Clause,
    size: u64,
}

impl CompiledQuery {
    pub(crate) const fn new(query: Clause, size: u64) -> Self {
        Self { query, size }
    }

    /// The top-level clause.
    #[must_use]
    pub const fn query(&self) -> &Clause {
        &self.query
    }

    /// Maximum number of hits requested.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// The request body as JSON.
    #[must_use]
    pub fn to_json(&self) -> Json {
        json!({ "query": self.query.to_json(), "size": self.size })
    }
}
