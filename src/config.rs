//! Dashboard configuration.
//!
//! [`Config`] is built once at startup, validated, and then passed by
//! reference to the components that need it. Nothing reads configuration from
//! the environment after that point.
//!
//! # Format
//!
//! ```toml
//! default_index = "logs-*"
//! trace_level = "debug"
//! log_dir = "/var/log/esview"
//!
//! [pagination]
//! default_page_size = 50
//! max_page_size = 500
//!
//! [search]
//! default_result_count = 500
//! max_result_count = 10000
//! default_timeframe = "12h"
//! allowed_timeframes = ["1h", "12h", "1d", "week", "month"]
//! search_timeout_ms = 30000
//! acquire_timeout_ms = 5000
//! field_pattern = "*"
//!
//! [rate_limit]
//! max_concurrent = 4
//! initial_retry_delay_ms = 100
//! max_retry_delay_ms = 5000
//! retry_multiplier = 2.0
//! max_retries = 3
//!
//! [cache]
//! field_cache_size = 10000
//! ```
//!
//! Every key is optional; missing keys take the [`Default`] values.

use crate::domain::{EsviewError, Result};
use crate::query::parse_timeframe;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete, validated configuration.
///
/// # Example
///
/// ```
/// use esview::Config;
///
/// let config = Config::from_toml_str(r#"
///     default_index = "metrics-*"
///     [pagination]
///     default_page_size = 25
/// "#)?;
/// assert_eq!(config.default_index, "metrics-*");
/// assert_eq!(config.pagination.default_page_size, 25);
/// assert_eq!(config.pagination.max_page_size, 500);
/// # Ok::<(), esview::EsviewError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Index (or index pattern) searched at startup.
    pub default_index: String,

    /// Tracing filter directive, e.g. `info` or `esview=debug`.
    ///
    /// Default: `"info"`
    pub trace_level: Option<String>,

    /// Directory for the log file. Logging is disabled when unset.
    pub log_dir: Option<PathBuf>,

    pub pagination: PaginationConfig,
    pub search: SearchConfig,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
}

/// `[pagination]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaginationConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

/// `[search]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Hits requested per search.
    pub default_result_count: usize,
    pub max_result_count: usize,
    /// Timeframe applied at startup; empty for no time bound.
    pub default_timeframe: String,
    /// Tokens the user may select. Empty allows any valid token.
    pub allowed_timeframes: Vec<String>,
    /// Upper bound for one backend call.
    pub search_timeout_ms: u64,
    /// Upper bound for waiting on an admission slot.
    pub acquire_timeout_ms: u64,
    /// Field glob passed to field introspection.
    pub field_pattern: String,
}

/// `[rate_limit]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    pub max_concurrent: usize,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub retry_multiplier: f64,
    pub max_retries: u32,
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Maximum number of distinct fields kept in the field cache.
    pub field_cache_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_index: "logs-*".to_string(),
            trace_level: None,
            log_dir: None,
            pagination: PaginationConfig::default(),
            search: SearchConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 500,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_result_count: 500,
            max_result_count: 10_000,
            default_timeframe: "12h".to_string(),
            allowed_timeframes: ["1h", "12h", "1d", "3d", "1w", "week", "month", "quarter", "year"]
                .into_iter()
                .map(String::from)
                .collect(),
            search_timeout_ms: 30_000,
            acquire_timeout_ms: 5_000,
            field_pattern: "*".to_string(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            initial_retry_delay_ms: 100,
            max_retry_delay_ms: 5_000,
            retry_multiplier: 2.0,
            max_retries: 3,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            field_cache_size: 10_000,
        }
    }
}

impl SearchConfig {
    /// Timeout for one backend call.
    #[must_use]
    pub const fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    /// Timeout for acquiring an admission slot.
    #[must_use]
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Returns `true` if the user may select `token`.
    ///
    /// The empty token (no time bound) is always allowed. Comparison ignores
    /// case and surrounding whitespace.
    #[must_use]
    pub fn is_timeframe_allowed(&self, token: &str) -> bool {
        let token = token.trim();
        token.is_empty()
            || self.allowed_timeframes.is_empty()
            || self
                .allowed_timeframes
                .iter()
                .any(|allowed| allowed.trim().eq_ignore_ascii_case(token))
    }
}

impl Config {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`EsviewError::Config`] on malformed TOML, unknown keys or any value
    /// rejected by [`Config::validate`].
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source).map_err(|e| EsviewError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// [`EsviewError::Io`] if the file cannot be read, otherwise as
    /// [`Config::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loading configuration");
        Self::from_toml_str(&source)
    }

    /// Checks every bound and cross-field constraint.
    ///
    /// # Errors
    ///
    /// [`EsviewError::Config`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(EsviewError::Config(msg));

        if self.default_index.trim().is_empty() {
            return fail("default_index cannot be empty".into());
        }

        let p = &self.pagination;
        if p.default_page_size == 0 {
            return fail("pagination.default_page_size must be at least 1".into());
        }
        if p.max_page_size < p.default_page_size {
            return fail(format!(
                "pagination.max_page_size ({}) must be >= default_page_size ({})",
                p.max_page_size, p.default_page_size
            ));
        }

        let s = &self.search;
        if s.default_result_count == 0 {
            return fail("search.default_result_count must be at least 1".into());
        }
        if s.max_result_count < s.default_result_count {
            return fail(format!(
                "search.max_result_count ({}) must be >= default_result_count ({})",
                s.max_result_count, s.default_result_count
            ));
        }
        for token in &s.allowed_timeframes {
            if let Err(e) = parse_timeframe(token) {
                return fail(format!("search.allowed_timeframes: {e}"));
            }
        }
        if !s.default_timeframe.trim().is_empty() {
            if let Err(e) = parse_timeframe(&s.default_timeframe) {
                return fail(format!("search.default_timeframe: {e}"));
            }
            if !s.is_timeframe_allowed(&s.default_timeframe) {
                return fail(format!(
                    "search.default_timeframe '{}' is not in allowed_timeframes",
                    s.default_timeframe
                ));
            }
        }
        if s.search_timeout_ms == 0 || s.acquire_timeout_ms == 0 {
            return fail("search timeouts must be greater than zero".into());
        }

        let r = &self.rate_limit;
        if r.max_concurrent == 0 {
            return fail("rate_limit.max_concurrent must be at least 1".into());
        }
        if r.retry_multiplier.is_nan() || r.retry_multiplier <= 1.0 {
            return fail(format!(
                "rate_limit.retry_multiplier must be greater than 1.0, got {}",
                r.retry_multiplier
            ));
        }
        if r.max_retry_delay_ms < r.initial_retry_delay_ms {
            return fail(format!(
                "rate_limit.max_retry_delay_ms ({}) must be >= initial_retry_delay_ms ({})",
                r.max_retry_delay_ms, r.initial_retry_delay_ms
            ));
        }

        if self.cache.field_cache_size == 0 {
            return fail("cache.field_cache_size must be at least 1".into());
        }

        Ok(())
    }
}
