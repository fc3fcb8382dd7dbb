//! Error types for the dashboard engine.
//!
//! This module defines the crate-wide error type [`EsviewError`], the input
//! error type [`QueryError`] produced by the filter compiler, and the
//! [`BackendError`] returned by the search backend collaborator. All errors are
//! implemented using the `thiserror` crate.
//!
//! Message text of [`QueryError`] is shown verbatim in the status line and
//! matched by substring in tests, so the wording is part of the contract.

use std::time::Duration;
use thiserror::Error;

/// Input errors raised while compiling filter expressions and timeframes.
///
/// These are always returned to the immediate caller and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The filter expression was empty or only whitespace.
    #[error("filter expression cannot be empty")]
    EmptyFilter,

    /// No `field OP value` shape could be recognised.
    #[error("invalid filter format: '{0}' (expected field=value, field>value, field>=value, field<value or field<=value)")]
    InvalidFormat(String),

    /// The field part does not match the dotted-segment grammar.
    #[error("invalid field name: '{0}'")]
    InvalidFieldName(String),

    /// An equality value began with an unescaped `*`.
    #[error("wildcard query cannot start with *")]
    LeadingWildcard,

    /// A range operator had nothing on its right-hand side.
    #[error("missing value in range query for field '{0}'")]
    MissingRangeValue(String),

    /// A range operator's value did not parse as a number.
    #[error("invalid numeric value in range query: '{0}'")]
    InvalidRangeNumber(String),

    /// The requested result size was negative.
    #[error("size must be non-negative, got {0}")]
    NegativeSize(i64),

    /// The timeframe token could not be resolved to a duration.
    #[error("invalid timeframe '{token}': {reason}")]
    InvalidTimeframe {
        /// The token as typed by the user.
        token: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl QueryError {
    pub(crate) fn timeframe(token: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTimeframe {
            token: token.to_string(),
            reason: reason.into(),
        }
    }
}

/// Classification of a failed backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Connection reset, DNS failure, broken pipe.
    Transport,
    /// The backend did not answer in time.
    Timeout,
    /// The backend answered 502/503/504.
    Unavailable,
    /// The backend answered 429.
    RateLimited,
    /// Credentials missing or rejected.
    Auth,
    /// Credentials valid but not allowed to perform the call.
    Permission,
    /// The backend rejected the request body.
    BadRequest,
    /// Index or resource does not exist.
    NotFound,
}

/// Errors that can be retried by the admission controller.
///
/// The controller is generic over the error type; anything it retries must
/// say whether another attempt could succeed.
pub trait Retryable {
    /// Returns `true` if the same call may succeed when repeated.
    fn is_retryable(&self) -> bool;
}

/// A failed call to the search backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("backend {kind:?} error: {message}")]
pub struct BackendError {
    /// What went wrong, used for retry classification.
    pub kind: BackendErrorKind,
    /// Human readable detail from the transport.
    pub message: String,
}

impl BackendError {
    /// Creates a backend error of the given kind.
    #[must_use]
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl Retryable for BackendError {
    fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            BackendErrorKind::Transport
                | BackendErrorKind::Timeout
                | BackendErrorKind::Unavailable
                | BackendErrorKind::RateLimited
        )
    }
}

/// The main error type for dashboard engine operations.
///
/// Consolidates query compilation failures, rejected state transitions,
/// backend failures surfaced after the retry budget is spent, admission
/// timeouts and configuration problems.
///
/// # Examples
///
/// ```
/// use esview::EsviewError;
///
/// fn validate_index(name: &str) -> Result<(), EsviewError> {
///     if name.is_empty() {
///         return Err(EsviewError::validation("set_current_index", "index name cannot be empty"));
///     }
///     Ok(())
/// }
/// assert!(validate_index("").is_err());
/// ```
#[derive(Debug, Error)]
pub enum EsviewError {
    /// A filter expression, timeframe or size was rejected.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// A proposed state update failed validation and was discarded.
    #[error("{operation}: {message}")]
    Validation {
        /// Name of the rejected operation.
        operation: String,
        /// Which invariant failed.
        message: String,
    },

    /// The backend call failed terminally or exhausted its retries.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// No admission slot became free within the caller's timeout.
    #[error("{operation}: timed out after {waited:?} waiting for a free slot")]
    Timeout {
        /// Name of the gated operation.
        operation: String,
        /// How long the caller waited.
        waited: Duration,
    },

    /// The operation was cancelled by a newer request.
    #[error("{0}: operation cancelled")]
    Cancelled(String),

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem or I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EsviewError {
    /// Shorthand for a [`EsviewError::Validation`] error.
    #[must_use]
    pub fn validation(operation: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, EsviewError>;
