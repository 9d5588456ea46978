//! Authentication error types.

use thiserror::Error;

/// Shown when a failure carries no message fit for end users.
pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred. Please try again.";

#[derive(Error, Debug)]
pub enum AuthError {
    /// Input rejected locally, before any network call.
    #[error("{0}")]
    Validation(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Error reported by the auth provider, message kept verbatim.
    #[error("Auth provider error: {0}")]
    Provider(String),

    /// The configured provider does not offer this sign-in method.
    #[error("Sign-in method not supported: {0}")]
    Unsupported(&'static str),

    #[error("Email check failed: {0}")]
    Probe(String),

    /// A submission is already in flight.
    #[error("Another request is already in progress")]
    Busy,

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("Token refresh failed after {0} attempts")]
    RefreshExhausted(u32),

    #[error("Not logged in")]
    NotLoggedIn,

    /// Session was rejected server-side (revoked, signed out elsewhere).
    #[error("Session invalid: {0}")]
    SessionInvalid(String),

    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Storage error: {0}")]
    Storage(#[from] guestlist_storage::StorageError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Operation timed out")]
    Timeout,

    /// Provider answered with a 5xx.
    #[error("Auth service unavailable (HTTP {0})")]
    Unavailable(u16),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// True for failures worth retrying: connection problems, timeouts, 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Timeout | AuthError::Unavailable(_) => true,
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                e.status().is_some_and(|status| status.is_server_error())
            }
            _ => false,
        }
    }

    /// Text to show the person signing in. Provider and validation messages
    /// pass through unchanged; everything else becomes the generic message.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Validation(msg)
            | AuthError::InvalidCredentials(msg)
            | AuthError::Provider(msg)
            | AuthError::Probe(msg)
            | AuthError::OAuth(msg)
                if !msg.trim().is_empty() =>
            {
                msg.clone()
            }
            AuthError::Busy => self.to_string(),
            AuthError::Unsupported(method) => {
                format!("Signing in with {} is not available.", method)
            }
            _ => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
