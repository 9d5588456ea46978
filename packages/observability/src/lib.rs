//! # Observability
//!
//! Logging setup shared by every guestlist binary.
//!
//! Crates only ever use `tracing` macros. The binary calls
//! [`init_with_config`] once at startup, which decides where lines go:
//!
//! - `~/.guestlist/logs/guestlist.jsonl`, one JSON object per line
//! - optionally stderr, in the compact human format
//!
//! Fields whose names look like credentials (`password`, `access_token`,
//! `refresh_token`, `code`, ...) are masked before they reach the file.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "guestlist".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! ```

#[cfg(feature = "dev")]
mod dev;

mod json_layer;

pub use json_layer::{is_sensitive_field, LogEntry, REDACTED};

use std::path::PathBuf;

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the process writing the log ("guestlist", "email-check").
    pub service_name: String,

    /// Default filter directive. `RUST_LOG` wins when set.
    pub default_level: String,

    /// Override for the JSONL file location.
    pub log_path: Option<PathBuf>,

    /// Mirror events to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "guestlist".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Install the global subscriber described by `config`.
///
/// Calling this twice is harmless; the second call leaves the first
/// subscriber in place.
pub fn init_with_config(config: LogConfig) {
    #[cfg(feature = "dev")]
    {
        dev::init_dev_subscriber(&config);
    }

    #[cfg(not(feature = "dev"))]
    {
        use tracing_subscriber::util::SubscriberInitExt;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_level)),
            )
            .with_target(true)
            .compact()
            .finish()
            .try_init();
    }
}
