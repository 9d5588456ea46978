//! Local persistence for the signed-in session.
//!
//! Backends implement [`SecureStorage`]; [`SecretsManager`] layers typed
//! session accessors on top. [`FileStorage`] keeps a single JSON document
//! readable only by the current user, [`MemoryStorage`] backs tests.

mod file;
mod keys;
mod memory;
mod secrets;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use secrets::{SecretsManager, SessionMeta, StoredSession, EXPIRY_SKEW_SECS};
pub use traits::SecureStorage;

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    /// Stored data could not be encoded or decoded.
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Session manager over the file at `session_file`.
pub fn create_secrets_manager(session_file: &Path) -> SecretsManager {
    SecretsManager::new(Box::new(FileStorage::new(session_file)))
}
