//! Typed access to the persisted auth session.

use crate::{SecureStorage, StorageError, StorageKeys, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sessions with less than this many seconds left count as expired.
pub const EXPIRY_SKEW_SECS: i64 = 60;

/// Identity details kept next to the tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// RFC 3339.
    pub expires_at: String,
}

impl SessionMeta {
    pub fn expires_at(&self) -> StorageResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.expires_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StorageError::Encoding(e.to_string()))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> StorageResult<bool> {
        Ok(self.expires_at()?.signed_duration_since(now).num_seconds() < EXPIRY_SKEW_SECS)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    pub meta: SessionMeta,
}

pub struct SecretsManager {
    storage: Box<dyn SecureStorage>,
}

impl SecretsManager {
    pub fn new(storage: Box<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    pub fn get_access_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::ACCESS_TOKEN)
    }

    pub fn get_refresh_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::REFRESH_TOKEN)
    }

    pub fn get_session_meta(&self) -> StorageResult<Option<SessionMeta>> {
        match self.storage.get(StorageKeys::SESSION_META)? {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StorageError::Encoding(e.to_string())),
            None => Ok(None),
        }
    }

    pub fn set_session(&self, session: &StoredSession) -> StorageResult<()> {
        let meta = serde_json::to_string(&session.meta)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.storage
            .set(StorageKeys::ACCESS_TOKEN, &session.access_token)?;
        self.storage
            .set(StorageKeys::REFRESH_TOKEN, &session.refresh_token)?;
        self.storage.set(StorageKeys::SESSION_META, &meta)?;
        tracing::debug!(user_id = %session.meta.user_id, "session persisted");
        Ok(())
    }

    /// The stored session, if all three parts are present.
    pub fn get_session(&self) -> StorageResult<Option<StoredSession>> {
        let access_token = self.get_access_token()?;
        let refresh_token = self.get_refresh_token()?;
        let meta = self.get_session_meta()?;

        Ok(match (access_token, refresh_token, meta) {
            (Some(access_token), Some(refresh_token), Some(meta)) => Some(StoredSession {
                access_token,
                refresh_token,
                meta,
            }),
            _ => None,
        })
    }

    pub fn has_session(&self) -> StorageResult<bool> {
        Ok(self.storage.has(StorageKeys::ACCESS_TOKEN)?
            && self.storage.has(StorageKeys::SESSION_META)?)
    }

    /// A missing session counts as expired.
    pub fn is_session_expired(&self) -> StorageResult<bool> {
        match self.get_session_meta()? {
            Some(meta) => meta.is_expired_at(Utc::now()),
            None => Ok(true),
        }
    }

    /// Remove every session key. Individual delete failures are logged and
    /// skipped so a partial session never lingers.
    pub fn clear_session(&self) -> StorageResult<()> {
        for key in StorageKeys::ALL {
            if let Err(err) = self.storage.delete(key) {
                tracing::warn!(key, error = %err, "failed to delete session key");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;
    use chrono::Duration;

    fn manager() -> SecretsManager {
        SecretsManager::new(Box::new(MemoryStorage::new()))
    }

    fn session(expires_at: DateTime<Utc>) -> StoredSession {
        StoredSession {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            meta: SessionMeta {
                user_id: "user-1".to_string(),
                email: Some("host@example.com".to_string()),
                display_name: Some("Host".to_string()),
                avatar_url: None,
                expires_at: expires_at.to_rfc3339(),
            },
        }
    }

    #[test]
    fn test_session_roundtrip() {
        let secrets = manager();
        assert!(secrets.get_session().unwrap().is_none());
        assert!(!secrets.has_session().unwrap());

        let stored = session(Utc::now() + Duration::hours(1));
        secrets.set_session(&stored).unwrap();

        assert!(secrets.has_session().unwrap());
        assert_eq!(secrets.get_session().unwrap(), Some(stored));
    }

    #[test]
    fn test_expiry_uses_skew() {
        let secrets = manager();
        assert!(secrets.is_session_expired().unwrap());

        secrets
            .set_session(&session(Utc::now() + Duration::seconds(30)))
            .unwrap();
        assert!(secrets.is_session_expired().unwrap());

        secrets
            .set_session(&session(Utc::now() + Duration::hours(1)))
            .unwrap();
        assert!(!secrets.is_session_expired().unwrap());
    }

    #[test]
    fn test_clear_session() {
        let secrets = manager();
        secrets
            .set_session(&session(Utc::now() + Duration::hours(1)))
            .unwrap();

        secrets.clear_session().unwrap();
        assert!(secrets.get_access_token().unwrap().is_none());
        assert!(secrets.get_refresh_token().unwrap().is_none());
        assert!(secrets.get_session_meta().unwrap().is_none());
    }

    #[test]
    fn test_partial_session_is_none() {
        let storage = MemoryStorage::new();
        storage.set(StorageKeys::ACCESS_TOKEN, "access").unwrap();
        let secrets = SecretsManager::new(Box::new(storage));
        assert!(secrets.get_session().unwrap().is_none());
    }

    #[test]
    fn test_bad_expiry_is_encoding_error() {
        let meta = SessionMeta {
            user_id: "u".to_string(),
            email: None,
            display_name: None,
            avatar_url: None,
            expires_at: "tomorrow".to_string(),
        };
        assert!(matches!(
            meta.is_expired_at(Utc::now()),
            Err(StorageError::Encoding(_))
        ));
    }
}
