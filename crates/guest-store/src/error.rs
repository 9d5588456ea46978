//! Error types for backend rows, validation and contact import.

use thiserror::Error;

pub const GENERIC_STORE_MESSAGE: &str = "Something went wrong talking to the server. Please try again.";

#[derive(Error, Debug)]
pub enum StoreError {
    /// Rejected locally before any backend call.
    #[error("{0}")]
    Validation(String),

    #[error("Another request is still in progress")]
    Busy,

    /// Uniqueness or foreign-key violation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Row-level rule rejected the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success status from the backend.
    #[error("Backend error: {status} - {message}")]
    Backend { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    Import(#[from] ImportError),
}

impl StoreError {
    /// Text shown next to the control that triggered the request. Backend
    /// messages pass through when present.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Busy => self.to_string(),
            Self::Conflict(message)
            | Self::Forbidden(message)
            | Self::NotFound(message)
            | Self::Backend { message, .. }
                if !message.trim().is_empty() =>
            {
                message.clone()
            }
            Self::Import(err) => err.to_string(),
            _ => GENERIC_STORE_MESSAGE.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Hard failures while reading an import file. A readable file with no
/// usable contacts is not an error; see `ImportReport::Empty`.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Error parsing CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV header is missing the required \"{0}\" column")]
    MissingColumn(&'static str),

    #[error("Error parsing VCF at line {line}: {message}")]
    Vcard { line: usize, message: String },

    #[error("Unsupported import file: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to read import file: {0}")]
    Io(#[from] std::io::Error),
}

pub type ImportResult<T> = Result<T, ImportError>;
