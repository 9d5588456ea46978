//! Configuration, paths and logging setup shared by the guestlist crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_CALLBACK_PORT, DEFAULT_LOG_LEVEL, DEFAULT_SUPABASE_PUBLISHABLE_KEY,
    DEFAULT_SUPABASE_URL, DEFAULT_WEB_APP_URL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
