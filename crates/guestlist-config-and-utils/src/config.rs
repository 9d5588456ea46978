//! Configuration loaded from `~/.guestlist/config.json` and `GUESTLIST_*`
//! environment variables.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Backend project URL baked in at build time, if provided.
pub const DEFAULT_SUPABASE_URL: &str = match option_env!("SUPABASE_URL") {
    Some(url) => url,
    None => "https://guestlist.supabase.co",
};

pub const DEFAULT_SUPABASE_PUBLISHABLE_KEY: &str = match option_env!("SUPABASE_PUBLISHABLE_KEY") {
    Some(key) => key,
    None => "public-anon-key",
};

/// Public web front-end, used to build shareable RSVP links.
pub const DEFAULT_WEB_APP_URL: &str = match option_env!("GUESTLIST_WEB_APP_URL") {
    Some(url) => url,
    None => "https://guestlist.app",
};

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Loopback port the sign-in redirect listener binds to.
pub const DEFAULT_CALLBACK_PORT: u16 = 54_321;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_supabase_url")]
    pub supabase_url: String,
    #[serde(default = "default_supabase_publishable_key")]
    pub supabase_publishable_key: String,
    /// Service-role key for the email existence endpoint. Never written back
    /// to disk.
    #[serde(default, skip_serializing)]
    pub supabase_service_key: Option<String>,
    /// Base URL of the email existence endpoint. When unset, sign-in skips
    /// the existence probe.
    #[serde(default)]
    pub email_check_url: Option<String>,
    #[serde(default = "default_callback_port")]
    pub callback_port: u16,
    #[serde(default = "default_web_app_url")]
    pub web_app_url: String,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_supabase_url() -> String {
    DEFAULT_SUPABASE_URL.to_string()
}

fn default_supabase_publishable_key() -> String {
    DEFAULT_SUPABASE_PUBLISHABLE_KEY.to_string()
}

fn default_callback_port() -> u16 {
    DEFAULT_CALLBACK_PORT
}

fn default_web_app_url() -> String {
    DEFAULT_WEB_APP_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            supabase_url: default_supabase_url(),
            supabase_publishable_key: default_supabase_publishable_key(),
            supabase_service_key: None,
            email_check_url: None,
            callback_port: DEFAULT_CALLBACK_PORT,
            web_app_url: default_web_app_url(),
        }
    }
}

impl Config {
    /// Read the config file if present, then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Apply `GUESTLIST_*` overrides. Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(level) = var("GUESTLIST_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = var("GUESTLIST_SUPABASE_URL") {
            self.supabase_url = url;
        }
        if let Some(key) = var("GUESTLIST_SUPABASE_PUBLISHABLE_KEY") {
            self.supabase_publishable_key = key;
        }
        if let Some(key) = var("GUESTLIST_SUPABASE_SERVICE_KEY") {
            self.supabase_service_key = Some(key);
        }
        if let Some(url) = var("GUESTLIST_EMAIL_CHECK_URL") {
            self.email_check_url = Some(url);
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.supabase_url()?;
        self.email_check_url()?;
        if self.supabase_publishable_key.trim().is_empty() {
            return Err(CoreError::Config(
                "supabase_publishable_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn supabase_url(&self) -> CoreResult<Url> {
        Url::parse(&self.supabase_url).map_err(CoreError::from)
    }

    pub fn email_check_url(&self) -> CoreResult<Option<Url>> {
        self.email_check_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(CoreError::from)
    }

    /// Public RSVP page for an event.
    pub fn rsvp_link(&self, event_id: &str) -> String {
        format!("{}/rsvp/{}", self.web_app_url.trim_end_matches('/'), event_id)
    }
}
