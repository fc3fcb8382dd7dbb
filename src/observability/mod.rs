//! Structured logging to a file.
//!
//! The dashboard owns the terminal, so log output goes to a file through a
//! non-blocking writer:
//!
//! ```text
//! tracing macros → EnvFilter → fmt layer → tracing-appender worker → <log_dir>/esview.log
//! ```
//!
//! # Configuration
//!
//! Trace level is controlled via:
//! 1. `RUST_LOG` environment variable (highest priority)
//! 2. `trace_level` in [`Config`](crate::Config)
//! 3. Default: `"info"`
//!
//! Logging is off unless `log_dir` is set.

mod init;

pub use init::{init_tracing, LOG_FILE_NAME};
