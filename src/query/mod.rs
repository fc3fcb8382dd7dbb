//! Filter and time-window compiler.
//!
//! Stateless functions that turn the short expressions typed into the
//! dashboard into the backend's structured query representation.
//!
//! # Modules
//!
//! - [`filter`]: one `field OP value` expression → one clause
//! - [`timeframe`]: timeframe token → duration → two-field time window
//! - [`builder`]: filters + timeframe + size → request body
//! - [`clause`]: typed clause tree and its JSON form
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use esview::query::build_query;
//!
//! let query = build_query(&["status=error", "latency_ms>=250"], 50, "12h", Utc::now())?;
//! assert_eq!(query.size(), 50);
//! # Ok::<(), esview::QueryError>(())
//! ```

pub mod builder;
pub mod clause;
pub mod filter;
pub mod timeframe;

pub use builder::build_query;
pub use clause::{Clause, CompiledQuery, RangeOp, TermValue};
pub use filter::{parse_filter, split_filter, FilterOp};
pub use timeframe::{build_time_query, parse_timeframe};
