//! Session State: the single observable source of truth for "who is
//! signed in".
//!
//! Exactly one [`SessionState`] exists per process and is shared through an
//! `Arc`. Consumers call [`SessionState::subscribe`] and read the latest
//! [`SessionSnapshot`]; each underlying change is published once.

use crate::provider::{AuthProvider, AuthSession, Identity};
use crate::session_fsm::{
    RefreshConfig, SessionLifecycle, SessionMachine, SessionMachineInput,
};
use crate::{AuthError, AuthResult};
use chrono::{Duration, Utc};
use guestlist_storage::SecretsManager;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub lifecycle: SessionLifecycle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.lifecycle.is_authenticated() && self.identity.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.lifecycle.is_pending()
    }
}

/// Tokens handed back by a browser redirect (magic link or OAuth).
#[derive(Debug, Clone, PartialEq)]
pub struct RedirectTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

pub struct SessionState {
    provider: Arc<dyn AuthProvider>,
    secrets: SecretsManager,
    fsm: Mutex<SessionMachine>,
    refresh_config: RefreshConfig,
    tx: watch::Sender<SessionSnapshot>,
}

impl SessionState {
    pub fn new(provider: Arc<dyn AuthProvider>, secrets: SecretsManager) -> Self {
        Self::with_refresh_config(provider, secrets, RefreshConfig::default())
    }

    pub fn with_refresh_config(
        provider: Arc<dyn AuthProvider>,
        secrets: SecretsManager,
        refresh_config: RefreshConfig,
    ) -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot {
            lifecycle: SessionLifecycle::Unresolved,
            identity: None,
        });
        Self {
            provider,
            secrets,
            fsm: Mutex::new(SessionMachine::new()),
            refresh_config,
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.tx.borrow().identity.clone()
    }

    fn lock_fsm(&self) -> MutexGuard<'_, SessionMachine> {
        self.fsm.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, input: SessionMachineInput) -> AuthResult<SessionLifecycle> {
        self.transition_with(input, None)
    }

    /// Move the machine and publish the resulting snapshot. `identity`
    /// replaces the published identity; signing out always clears it.
    fn transition_with(
        &self,
        input: SessionMachineInput,
        identity: Option<Identity>,
    ) -> AuthResult<SessionLifecycle> {
        let mut fsm = self.lock_fsm();
        fsm.consume(&input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;
        let lifecycle = SessionLifecycle::from(fsm.state());

        // Published under the fsm lock so subscribers see changes in order.
        self.tx.send_if_modified(|snapshot| {
            let identity = match lifecycle {
                SessionLifecycle::SignedOut => None,
                _ => identity.or_else(|| snapshot.identity.clone()),
            };
            let next = SessionSnapshot {
                lifecycle,
                identity,
            };
            if *snapshot == next {
                return false;
            }
            debug!(
                from = ?snapshot.lifecycle,
                to = ?next.lifecycle,
                user_id = next.identity.as_ref().map(|i| i.id.as_str()).unwrap_or(""),
                "session state changed"
            );
            *snapshot = next;
            true
        });

        Ok(lifecycle)
    }

    /// Resolve the stored session at startup.
    ///
    /// Unexpired tokens are verified with the provider; expired ones are
    /// refreshed with backoff. Anything rejected is cleared from storage.
    /// Returns whether a session is now active.
    pub async fn restore(&self) -> AuthResult<bool> {
        self.transition(SessionMachineInput::RestoreStarted)?;

        let stored = match self.secrets.get_session() {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                info!("no stored session");
                self.secrets.clear_session()?;
                self.transition(SessionMachineInput::NoSession)?;
                return Ok(false);
            }
            Err(err) => {
                warn!(error = %err, "stored session unreadable, clearing");
                self.secrets.clear_session()?;
                self.transition(SessionMachineInput::NoSession)?;
                return Ok(false);
            }
        };

        let expired = stored.meta.is_expired_at(Utc::now()).unwrap_or(true);
        if expired {
            info!(user_id = %stored.meta.user_id, "stored session expired, refreshing");
            self.transition(SessionMachineInput::SessionExpired)?;
            self.refresh_with_backoff(&stored.refresh_token).await?;
            return Ok(true);
        }

        self.transition(SessionMachineInput::TokenNotExpired)?;
        match self.provider.fetch_user(&stored.access_token).await {
            Ok(identity) => {
                info!(user_id = %identity.id, "stored session verified");
                self.transition_with(SessionMachineInput::ServerVerified, Some(identity))?;
                Ok(true)
            }
            Err(err) => {
                warn!(user_id = %stored.meta.user_id, error = %err, "stored session rejected, clearing");
                self.secrets.clear_session()?;
                self.transition(SessionMachineInput::ServerRejected)?;
                Err(err)
            }
        }
    }

    /// Record a completed sign-in.
    pub fn establish(&self, session: AuthSession) -> AuthResult<()> {
        self.secrets.set_session(&session.to_stored())?;
        info!(user_id = %session.identity.id, "signed in");
        self.transition_with(SessionMachineInput::SessionEstablished, Some(session.identity))?;
        Ok(())
    }

    /// Finish a browser round-trip: resolve the user behind the tokens and
    /// establish the session.
    pub async fn complete_redirect(&self, tokens: RedirectTokens) -> AuthResult<Identity> {
        let identity = self.provider.fetch_user(&tokens.access_token).await?;
        self.establish(AuthSession {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: Utc::now() + Duration::seconds(tokens.expires_in),
            identity: identity.clone(),
        })?;
        Ok(identity)
    }

    /// Current access token, refreshed first if it is about to expire.
    pub async fn valid_access_token(&self) -> AuthResult<String> {
        let stored = self.secrets.get_session()?.ok_or(AuthError::NotLoggedIn)?;

        if !stored.meta.is_expired_at(Utc::now())? {
            return Ok(stored.access_token);
        }

        info!("access token expired, refreshing");
        self.transition(SessionMachineInput::TokenExpired)?;
        let session = self.refresh_with_backoff(&stored.refresh_token).await?;
        Ok(session.access_token)
    }

    async fn refresh_with_backoff(&self, refresh_token: &str) -> AuthResult<AuthSession> {
        let mut last_error = None;

        for attempt in 0..self.refresh_config.max_retries {
            match self.provider.refresh_session(refresh_token).await {
                Ok(session) => {
                    self.secrets.set_session(&session.to_stored())?;
                    info!(user_id = %session.identity.id, "session refreshed");
                    self.transition_with(
                        SessionMachineInput::RefreshSuccess,
                        Some(session.identity.clone()),
                    )?;
                    return Ok(session);
                }
                Err(err) if err.is_transient() => {
                    last_error = Some(err);
                    if attempt + 1 < self.refresh_config.max_retries {
                        self.transition(SessionMachineInput::RefreshRetry)?;
                        let delay = self.refresh_config.delay_for_attempt(attempt);
                        debug!(
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            "transient refresh failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "refresh rejected");
                    self.secrets.clear_session()?;
                    self.transition(SessionMachineInput::RefreshFailed)?;
                    return Err(err);
                }
            }
        }

        warn!(
            attempts = self.refresh_config.max_retries,
            "refresh retries exhausted"
        );
        self.secrets.clear_session()?;
        self.transition(SessionMachineInput::RefreshFailed)?;
        Err(last_error.unwrap_or(AuthError::RefreshExhausted(self.refresh_config.max_retries)))
    }

    /// Revoke the session with the provider (best effort) and forget it
    /// locally.
    pub async fn sign_out(&self) -> AuthResult<()> {
        let signed_in = self.current().lifecycle.is_authenticated();
        if signed_in {
            self.transition(SessionMachineInput::SignOutRequested)?;
        }

        if let Some(access_token) = self.secrets.get_access_token()? {
            if let Err(err) = self.provider.sign_out(&access_token).await {
                warn!(error = %err, "provider sign-out failed, clearing local session anyway");
            }
        }
        self.secrets.clear_session()?;

        if signed_in {
            self.transition(SessionMachineInput::SignOutComplete)?;
        }
        info!("signed out");
        Ok(())
    }

    /// Wait until a sign-in lands, e.g. from the redirect listener.
    pub async fn wait_until_authenticated(
        &self,
        timeout: std::time::Duration,
    ) -> AuthResult<Identity> {
        let mut rx = self.subscribe();
        let result = tokio::time::timeout(timeout, rx.wait_for(|s| s.is_authenticated())).await;
        match result {
            Ok(Ok(snapshot)) => snapshot.identity.clone().ok_or(AuthError::NotLoggedIn),
            Ok(Err(_)) => Err(AuthError::NotLoggedIn),
            Err(_) => Err(AuthError::Timeout),
        }
    }
}
