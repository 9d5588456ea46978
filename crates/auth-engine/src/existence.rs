//! Email existence probe.
//!
//! Asks the backend's `GET /custom/check-email-exists/:email` endpoint
//! whether an account exists so the sign-in flow can branch before asking
//! for a password.

use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailExistence {
    pub exists: bool,
    /// Only reported for existing accounts.
    #[serde(rename = "isVerified", default, skip_serializing_if = "Option::is_none")]
    pub is_verified: Option<bool>,
}

impl EmailExistence {
    pub fn missing() -> Self {
        Self {
            exists: false,
            is_verified: None,
        }
    }

    pub fn found(is_verified: bool) -> Self {
        Self {
            exists: true,
            is_verified: Some(is_verified),
        }
    }
}

#[async_trait]
pub trait ExistenceProbe: Send + Sync {
    /// `email` is already trimmed and non-empty.
    async fn check_email(&self, email: &str) -> AuthResult<EmailExistence>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct HttpExistenceProbe {
    http_client: Client,
    base_url: Url,
}

impl HttpExistenceProbe {
    pub fn new(base_url: Url) -> Self {
        Self {
            http_client: Client::new(),
            base_url,
        }
    }

    /// `{base}/custom/check-email-exists/{email}` with the email
    /// percent-encoded as a single path segment.
    pub fn endpoint(&self, email: &str) -> AuthResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AuthError::Config(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(["custom", "check-email-exists", email]);
        Ok(url)
    }
}

#[async_trait]
impl ExistenceProbe for HttpExistenceProbe {
    async fn check_email(&self, email: &str) -> AuthResult<EmailExistence> {
        let url = self.endpoint(email)?;
        debug!(url = %url, "checking email existence");

        let response = self.http_client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return Ok(serde_json::from_str(&body)?);
        }

        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
        Err(AuthError::Probe(message))
    }
}
