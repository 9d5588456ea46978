//! Logging entry point for guestlist binaries.

use observability::LogConfig;
use std::path::PathBuf;

/// Install the global subscriber.
///
/// `log_file` overrides the JSONL destination (normally derived from
/// [`crate::Paths::log_file`]). `GUESTLIST_LOG_STDERR=1` mirrors events to
/// stderr.
pub fn init_logging(service_name: &str, level: &str, log_file: Option<PathBuf>) {
    let also_stderr = std::env::var("GUESTLIST_LOG_STDERR")
        .map(|value| matches!(value.trim(), "1" | "true" | "yes"))
        .unwrap_or(false);

    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: parse_level(level).to_string().to_lowercase(),
        log_path: log_file,
        also_stderr,
    });
}

/// Normalize a level name; unknown names fall back to INFO.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.trim().to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
