//! Account lookup behind the existence endpoint.

use async_trait::async_trait;
use guest_store::{BackendStore, Collection, Query, StoreError};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("account lookup failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountStatus {
    pub verified: bool,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// `Ok(None)` when no account uses `email`.
    async fn find_by_email(&self, email: &str) -> Result<Option<AccountStatus>, DirectoryError>;
}

/// Account row as the `users` table exposes it. Either a `verified` flag or
/// a confirmation timestamp marks a verified address.
#[derive(Debug, Deserialize)]
struct UserRow {
    #[serde(default)]
    verified: Option<bool>,
    #[serde(default)]
    email_confirmed_at: Option<String>,
}

impl UserRow {
    fn is_verified(&self) -> bool {
        self.verified.unwrap_or(false) || self.email_confirmed_at.is_some()
    }
}

/// Looks accounts up in the backend `users` table. The store must carry
/// service credentials; the table is not readable otherwise.
pub struct StoreDirectory {
    store: Arc<dyn BackendStore>,
}

impl StoreDirectory {
    pub fn new(store: Arc<dyn BackendStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl UserDirectory for StoreDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<AccountStatus>, DirectoryError> {
        let rows = self
            .store
            .query(
                Query::new(Collection::Users)
                    .eq("email", email)
                    .page(1, 0),
            )
            .await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        let row: UserRow = serde_json::from_value(row).map_err(StoreError::from)?;
        Ok(Some(AccountStatus {
            verified: row.is_verified(),
        }))
    }
}
