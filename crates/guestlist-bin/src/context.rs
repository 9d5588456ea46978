//! Shared runtime state for one CLI invocation.

use crate::output::OutputFormat;
use anyhow::{anyhow, bail, Result};
use auth_engine::{
    AuthProvider, ExistenceProbe, GuardDecision, HttpExistenceProbe, Identity, RouteGuard,
    SessionState, SupabaseAuthProvider, LOGIN_PATH,
};
use guest_store::{BackendStore, SupabaseStore};
use guestlist_config_and_utils::{Config, Paths};
use guestlist_storage::create_secrets_manager;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

pub struct AppContext {
    pub paths: Paths,
    pub config: Config,
    pub format: OutputFormat,
    pub provider: Arc<dyn AuthProvider>,
    pub session: Arc<SessionState>,
}

impl AppContext {
    pub fn load(base_dir: Option<PathBuf>, format: OutputFormat) -> Result<Self> {
        let paths = match base_dir {
            Some(base) => Paths::with_base_dir(base),
            None => Paths::new()?,
        };
        let config = Config::load(&paths)?;
        Self::with_config(paths, config, format)
    }

    pub fn with_config(paths: Paths, config: Config, format: OutputFormat) -> Result<Self> {
        let provider: Arc<dyn AuthProvider> = Arc::new(SupabaseAuthProvider::new(
            &config.supabase_url()?,
            &config.supabase_publishable_key,
        ));
        let secrets = create_secrets_manager(&paths.session_file());
        let session = Arc::new(SessionState::new(Arc::clone(&provider), secrets));
        Ok(Self {
            paths,
            config,
            format,
            provider,
            session,
        })
    }

    pub fn probe(&self) -> Result<Option<Arc<dyn ExistenceProbe>>> {
        Ok(self
            .config
            .email_check_url()?
            .map(|url| Arc::new(HttpExistenceProbe::new(url)) as Arc<dyn ExistenceProbe>))
    }

    /// Resolve the stored session once per invocation.
    pub async fn resolve_session(&self) -> Result<()> {
        if self.session.current().is_pending() {
            let restored = self.session.restore().await?;
            debug!(restored, "session resolved");
        }
        Ok(())
    }

    /// Run the route guard for `path`, returning the signed-in user for
    /// protected routes.
    pub async fn authorize(&self, path: &str) -> Result<Identity> {
        self.resolve_session().await?;
        let mut guard = RouteGuard::new(&self.session);
        let decision = guard.resolve(path).await;
        if let Some(message) = denial_message(&decision) {
            bail!(message);
        }
        self.session
            .identity()
            .ok_or_else(|| anyhow!(SIGN_IN_FIRST))
    }

    /// Store acting as the signed-in user.
    pub async fn user_store(&self) -> Result<Arc<dyn BackendStore>> {
        let token = self.session.valid_access_token().await?;
        Ok(Arc::new(self.public_rest()?.with_access_token(token)))
    }

    /// Store acting as an anonymous guest.
    pub fn public_store(&self) -> Result<Arc<dyn BackendStore>> {
        Ok(Arc::new(self.public_rest()?))
    }

    fn public_rest(&self) -> Result<SupabaseStore> {
        Ok(SupabaseStore::new(
            &self.config.supabase_url()?,
            self.config.supabase_publishable_key.clone(),
        ))
    }
}

pub const SIGN_IN_FIRST: &str = "Not signed in. Run `guestlist login` first.";

/// CLI text for a guard decision that does not allow the route.
pub fn denial_message(decision: &GuardDecision) -> Option<String> {
    match decision {
        GuardDecision::Allow => None,
        GuardDecision::Redirect(to) if to == LOGIN_PATH => Some(SIGN_IN_FIRST.to_string()),
        GuardDecision::Redirect(to) => Some(format!("Already signed in (continue at {}).", to)),
        GuardDecision::Wait => Some("Session is still loading.".to_string()),
    }
}
