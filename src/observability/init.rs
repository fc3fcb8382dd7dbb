//! Tracing initialization and subscriber setup.

use crate::config::Config;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log file name inside `Config::log_dir`.
pub const LOG_FILE_NAME: &str = "esview.log";

/// Builds the filter from `RUST_LOG`, then `config.trace_level`, then `info`.
///
/// An unparseable directive falls through to the next source.
fn build_env_filter(config: &Config) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    config
        .trace_level
        .as_deref()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Initializes the tracing subscriber with a file-based `fmt` layer.
///
/// Sets up a subscriber pipeline that:
/// 1. Filters events based on the configured trace level
/// 2. Formats them as plain text without ANSI colours
/// 3. Hands them to a background thread that appends to
///    `<log_dir>/esview.log`
///
/// The dashboard draws on the terminal, so nothing is ever written to
/// stdout or stderr.
///
/// # Parameters
///
/// * `config` - Configuration containing `log_dir` and `trace_level`
///
/// # Returns
///
/// The writer guard; logs are flushed when it is dropped, so keep it alive
/// for the lifetime of the process. `None` when `log_dir` is unset or cannot
/// be created, in which case no subscriber is installed.
///
/// # Initialization Behavior
///
/// Idempotent: if a global subscriber is already set, the call leaves it in
/// place.
///
/// # Example
///
/// ```no_run
/// use esview::observability::init_tracing;
/// use esview::Config;
///
/// let config = Config {
///     log_dir: Some("/tmp/esview".into()),
///     trace_level: Some("esview=debug".to_string()),
///     ..Default::default()
/// };
///
/// let _guard = init_tracing(&config);
/// tracing::debug!("tracing is now active");
/// ```
#[must_use]
pub fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let dir = config.log_dir.as_deref()?;
    let (writer, guard) = file_writer(dir)?;

    let fmt_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_level(true);

    let _ = tracing_subscriber::registry()
        .with(build_env_filter(config))
        .with(fmt_layer)
        .try_init();

    Some(guard)
}

fn file_writer(dir: &Path) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    if let Err(_e) = std::fs::create_dir_all(dir) {
        return None;
    }
    let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
    Some(tracing_appender::non_blocking(appender))
}
