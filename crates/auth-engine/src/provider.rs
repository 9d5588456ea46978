//! Auth provider capability interface.
//!
//! Providers differ in which sign-in methods they offer. Every method has a
//! default that returns [`AuthError::Unsupported`], and
//! [`AuthProvider::capabilities`] tells callers which ones are real.

use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guestlist_storage::{SessionMeta, StoredSession};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub identity: Identity,
}

impl AuthSession {
    pub fn to_stored(&self) -> StoredSession {
        StoredSession {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            meta: SessionMeta {
                user_id: self.identity.id.clone(),
                email: self.identity.email.clone(),
                display_name: self.identity.display_name.clone(),
                avatar_url: self.identity.avatar_url.clone(),
                expires_at: self.expires_at.to_rfc3339(),
            },
        }
    }
}

impl From<&SessionMeta> for Identity {
    fn from(meta: &SessionMeta) -> Self {
        Self {
            id: meta.user_id.clone(),
            email: meta.email.clone(),
            display_name: meta.display_name.clone(),
            avatar_url: meta.avatar_url.clone(),
        }
    }
}

/// Result of creating an account.
#[derive(Debug, Clone, PartialEq)]
pub enum SignUpOutcome {
    /// Account exists but the email must be confirmed before signing in.
    VerificationRequired,
    /// The provider signed the new user in straight away.
    SignedIn(AuthSession),
}

/// Handle for a pending one-time code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpChallenge {
    pub otp_id: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    Github,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Github => "github",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OAuthProvider {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(OAuthProvider::Google),
            "github" => Ok(OAuthProvider::Github),
            other => Err(AuthError::Validation(format!(
                "Unknown sign-in provider: {}",
                other
            ))),
        }
    }
}

/// Sign-in methods a provider actually implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProviderCapabilities {
    pub password: bool,
    pub sign_up: bool,
    pub magic_link: bool,
    pub otp: bool,
    pub oauth: bool,
}

impl ProviderCapabilities {
    pub fn all() -> Self {
        Self {
            password: true,
            sign_up: true,
            magic_link: true,
            otp: true,
            oauth: true,
        }
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn capabilities(&self) -> ProviderCapabilities;

    async fn sign_in_with_password(&self, _email: &str, _password: &str) -> AuthResult<AuthSession> {
        Err(AuthError::Unsupported("password"))
    }

    async fn sign_up(&self, _email: &str, _password: &str) -> AuthResult<SignUpOutcome> {
        Err(AuthError::Unsupported("sign up"))
    }

    /// Email a sign-in link that lands on `redirect_to`.
    async fn send_magic_link(&self, _email: &str, _redirect_to: Option<&str>) -> AuthResult<()> {
        Err(AuthError::Unsupported("magic link"))
    }

    async fn request_otp(&self, _email: &str) -> AuthResult<OtpChallenge> {
        Err(AuthError::Unsupported("one-time code"))
    }

    async fn verify_otp(&self, _challenge: &OtpChallenge, _code: &str) -> AuthResult<AuthSession> {
        Err(AuthError::Unsupported("one-time code"))
    }

    /// URL to open in a browser to start an OAuth sign-in.
    fn oauth_authorize_url(&self, _provider: OAuthProvider, _redirect_to: &str) -> AuthResult<String> {
        Err(AuthError::Unsupported("OAuth"))
    }

    /// Resolve the user behind an access token. Fails if the token was revoked.
    async fn fetch_user(&self, access_token: &str) -> AuthResult<Identity>;

    async fn refresh_session(&self, refresh_token: &str) -> AuthResult<AuthSession>;

    async fn sign_out(&self, _access_token: &str) -> AuthResult<()> {
        Ok(())
    }
}
