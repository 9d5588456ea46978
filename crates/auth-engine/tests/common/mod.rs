#![allow(dead_code)]

use async_trait::async_trait;
use auth_engine::{
    AuthError, AuthProvider, AuthResult, AuthSession, EmailExistence, ExistenceProbe, Identity,
    OAuthProvider, OtpChallenge, ProviderCapabilities, RefreshConfig, SessionState, SignUpOutcome,
};
use chrono::{Duration, Utc};
use guestlist_storage::{MemoryStorage, SecretsManager};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const OTP_ID: &str = "X";
pub const OTP_CODE: &str = "123456";

pub fn identity_for(email: &str) -> Identity {
    Identity {
        id: format!("user-{}", email.split('@').next().unwrap_or("x")),
        email: Some(email.to_string()),
        display_name: None,
        avatar_url: None,
    }
}

pub fn session_for(email: &str, expires_in_secs: i64) -> AuthSession {
    AuthSession {
        access_token: format!("access-{}", email),
        refresh_token: format!("refresh-{}", email),
        expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        identity: identity_for(email),
    }
}

/// In-process provider with canned answers. Records every call.
pub struct ScriptedProvider {
    pub capabilities: ProviderCapabilities,
    pub passwords: HashMap<String, String>,
    pub sign_up_needs_verification: bool,
    /// Refresh failures returned before a refresh succeeds.
    pub refresh_failures: Mutex<Vec<AuthError>>,
    pub revoked_tokens: Vec<String>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            capabilities: ProviderCapabilities::all(),
            passwords: HashMap::from([("u@x.com".to_string(), "correct-horse".to_string())]),
            sign_up_needs_verification: true,
            refresh_failures: Mutex::new(Vec::new()),
            revoked_tokens: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn magic_link_only() -> Self {
        Self {
            capabilities: ProviderCapabilities {
                magic_link: true,
                ..Default::default()
            },
            ..Self::new()
        }
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthProvider for ScriptedProvider {
    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        self.record("sign_in_with_password");
        match self.passwords.get(email) {
            Some(expected) if expected == password => Ok(session_for(email, 3600)),
            _ => Err(AuthError::InvalidCredentials(
                "Invalid login credentials".to_string(),
            )),
        }
    }

    async fn sign_up(&self, email: &str, _password: &str) -> AuthResult<SignUpOutcome> {
        self.record("sign_up");
        if self.sign_up_needs_verification {
            Ok(SignUpOutcome::VerificationRequired)
        } else {
            Ok(SignUpOutcome::SignedIn(session_for(email, 3600)))
        }
    }

    async fn send_magic_link(&self, _email: &str, _redirect_to: Option<&str>) -> AuthResult<()> {
        self.record("send_magic_link");
        if self.capabilities.magic_link {
            Ok(())
        } else {
            Err(AuthError::Unsupported("magic link"))
        }
    }

    async fn request_otp(&self, email: &str) -> AuthResult<OtpChallenge> {
        self.record("request_otp");
        Ok(OtpChallenge {
            otp_id: OTP_ID.to_string(),
            email: email.to_string(),
        })
    }

    async fn verify_otp(&self, challenge: &OtpChallenge, code: &str) -> AuthResult<AuthSession> {
        self.record("verify_otp");
        if challenge.otp_id == OTP_ID && code == OTP_CODE {
            Ok(session_for(&challenge.email, 3600))
        } else {
            Err(AuthError::InvalidCredentials(
                "Token has expired or is invalid".to_string(),
            ))
        }
    }

    fn oauth_authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> AuthResult<String> {
        Ok(format!(
            "https://auth.test/authorize?provider={}&redirect_to={}",
            provider, redirect_to
        ))
    }

    async fn fetch_user(&self, access_token: &str) -> AuthResult<Identity> {
        self.record("fetch_user");
        if self.revoked_tokens.iter().any(|t| t == access_token) {
            return Err(AuthError::SessionInvalid("HTTP 401: revoked".to_string()));
        }
        let email = access_token.trim_start_matches("access-");
        Ok(identity_for(email))
    }

    async fn refresh_session(&self, refresh_token: &str) -> AuthResult<AuthSession> {
        self.record("refresh_session");
        if let Some(err) = self.refresh_failures.lock().unwrap().pop() {
            return Err(err);
        }
        let email = refresh_token.trim_start_matches("refresh-");
        Ok(session_for(email, 3600))
    }

    async fn sign_out(&self, _access_token: &str) -> AuthResult<()> {
        self.record("sign_out");
        Ok(())
    }
}

/// Probe answering from a fixed table; unknown emails do not exist.
pub struct StaticProbe {
    pub answers: HashMap<String, EmailExistence>,
    pub fail_with: Option<String>,
    pub calls: Mutex<u32>,
}

impl StaticProbe {
    pub fn new(answers: &[(&str, EmailExistence)]) -> Self {
        Self {
            answers: answers
                .iter()
                .map(|(email, existence)| (email.to_string(), *existence))
                .collect(),
            fail_with: None,
            calls: Mutex::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            answers: HashMap::new(),
            fail_with: Some(message.to_string()),
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ExistenceProbe for StaticProbe {
    async fn check_email(&self, email: &str) -> AuthResult<EmailExistence> {
        *self.calls.lock().unwrap() += 1;
        if let Some(message) = &self.fail_with {
            return Err(AuthError::Probe(message.clone()));
        }
        Ok(self
            .answers
            .get(email)
            .copied()
            .unwrap_or_else(EmailExistence::missing))
    }
}

/// Probe that holds every check open until released.
pub struct GatedProbe {
    pub answer: EmailExistence,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedProbe {
    pub fn new(answer: EmailExistence) -> Self {
        Self {
            answer,
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl ExistenceProbe for GatedProbe {
    async fn check_email(&self, _email: &str) -> AuthResult<EmailExistence> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(self.answer)
    }
}

pub fn memory_secrets() -> SecretsManager {
    SecretsManager::new(Box::new(MemoryStorage::new()))
}

pub fn fast_refresh() -> RefreshConfig {
    RefreshConfig {
        max_retries: 3,
        initial_delay_ms: 1,
        max_delay_ms: 2,
    }
}

pub fn session_state(provider: Arc<ScriptedProvider>) -> Arc<SessionState> {
    Arc::new(SessionState::with_refresh_config(
        provider,
        memory_secrets(),
        fast_refresh(),
    ))
}
