//! Multi-path sign-in flow.
//!
//! The person enters an email; an existence probe decides whether they get
//! the existing-user options (password or one-time code) or account
//! creation. What is offered follows the provider's capabilities: when the
//! methods a branch needs are missing but magic links work, the flow skips
//! straight to `AwaitingMagicLink`.
//!
//! ```text
//!                 ┌──────── EmailRejected ───────┐
//!                 ▼                              │
//!             Initial ──KnownEmail──► ExistingUserOptions ──PasswordAccepted──► Authenticated
//!              │   │                     │   ▲                                      ▲
//!  UnknownEmail│   │MagicLinkSent  OtpSent│   │UsePassword                           │
//!              ▼   ▼                     ▼   │                                      │
//!  NewUserCreation  AwaitingMagicLink   OtpLogin ───────────CodeAccepted────────────┤
//!        │                                                                          │
//!        ├──AccountPendingVerification──► AwaitingVerification                      │
//!        └──AccountSignedIn─────────────────────────────────────────────────────────┘
//! ```
//!
//! `Reset` returns every state except `Authenticated` to `Initial`. A flow
//! left in `Authenticated` returns to `Initial` once the session signs out.

use crate::existence::ExistenceProbe;
use crate::provider::{
    AuthProvider, OAuthProvider, OtpChallenge, ProviderCapabilities, SignUpOutcome,
};
use crate::session::SessionState;
use crate::{AuthError, AuthResult};
use rust_fsm::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub login_machine(Initial)

    Initial => {
        EmailRejected => Initial,
        KnownEmail => ExistingUserOptions,
        UnknownEmail => NewUserCreation,
        MagicLinkSent => AwaitingMagicLink,
        Reset => Initial
    },
    ExistingUserOptions => {
        PasswordAccepted => Authenticated,
        PasswordRejected => ExistingUserOptions,
        OtpSent => OtpLogin,
        OtpRequestFailed => ExistingUserOptions,
        Reset => Initial
    },
    NewUserCreation => {
        SignUpRejected => NewUserCreation,
        AccountPendingVerification => AwaitingVerification,
        AccountSignedIn => Authenticated,
        Reset => Initial
    },
    OtpLogin => {
        CodeAccepted => Authenticated,
        CodeRejected => OtpLogin,
        UsePassword => ExistingUserOptions,
        Reset => Initial
    },
    AwaitingMagicLink => {
        Reset => Initial
    },
    AwaitingVerification => {
        Reset => Initial
    },
    Authenticated => {
        SignedOut => Initial
    }
}

pub use login_machine::Input as LoginMachineInput;
pub use login_machine::State as LoginMachineState;
pub use login_machine::StateMachine as LoginMachine;

pub const EMPTY_EMAIL_MESSAGE: &str = "Please enter your email address.";
pub const EMPTY_PASSWORD_MESSAGE: &str = "Please enter your password.";
pub const PASSWORD_MISMATCH_MESSAGE: &str = "Passwords do not match.";
pub const EMPTY_CODE_MESSAGE: &str = "Please enter the code from your email.";
pub const UNVERIFIED_WARNING: &str =
    "Your email address has not been verified yet. Check your inbox for the verification link.";
pub const MAGIC_LINK_SENT_MESSAGE: &str = "Check your email for a sign-in link.";
pub const VERIFY_EMAIL_MESSAGE: &str = "Account created. Check your email to verify your account.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginStep {
    Initial,
    ExistingUserOptions,
    NewUserCreation,
    AwaitingMagicLink,
    AwaitingVerification,
    OtpLogin,
    Authenticated,
}

impl From<&LoginMachineState> for LoginStep {
    fn from(state: &LoginMachineState) -> Self {
        match state {
            LoginMachineState::Initial => LoginStep::Initial,
            LoginMachineState::ExistingUserOptions => LoginStep::ExistingUserOptions,
            LoginMachineState::NewUserCreation => LoginStep::NewUserCreation,
            LoginMachineState::AwaitingMagicLink => LoginStep::AwaitingMagicLink,
            LoginMachineState::AwaitingVerification => LoginStep::AwaitingVerification,
            LoginMachineState::OtpLogin => LoginStep::OtpLogin,
            LoginMachineState::Authenticated => LoginStep::Authenticated,
        }
    }
}

/// What a sign-in screen renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginFlowView {
    pub step: LoginStep,
    pub email: Option<String>,
    pub error: Option<String>,
    pub info: Option<String>,
    pub warning: Option<String>,
    /// Actions the provider cannot perform should be hidden.
    pub capabilities: ProviderCapabilities,
    /// Inputs should be disabled while true.
    pub busy: bool,
}

struct FlowInner {
    machine: LoginMachine,
    email: Option<String>,
    otp: Option<OtpChallenge>,
    error: Option<String>,
    info: Option<String>,
    warning: Option<String>,
}

impl FlowInner {
    fn new() -> Self {
        Self {
            machine: LoginMachine::new(),
            email: None,
            otp: None,
            error: None,
            info: None,
            warning: None,
        }
    }

    fn step(&self) -> LoginStep {
        LoginStep::from(self.machine.state())
    }

    /// The unverified warning belongs to the email and survives retries.
    fn clear_messages(&mut self) {
        self.error = None;
        self.info = None;
    }

    fn forget_email(&mut self) {
        self.email = None;
        self.otp = None;
        self.warning = None;
        self.clear_messages();
    }

    fn apply(&mut self, input: LoginMachineInput) -> AuthResult<LoginStep> {
        let from = self.step();
        self.machine.consume(&input).map_err(|_| {
            AuthError::InvalidStateTransition(format!("Cannot apply {:?} in step {:?}", input, from))
        })?;
        let to = self.step();
        if from != to {
            debug!(from = ?from, to = ?to, "sign-in step changed");
        }
        Ok(to)
    }
}

/// Clears the in-flight flag on every exit path.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> AuthResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| AuthError::Busy)?;
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives one sign-in attempt against an [`AuthProvider`].
///
/// Successful sign-ins are handed to [`SessionState`]; magic-link and OAuth
/// completions arrive there directly through the redirect listener.
pub struct LoginFlow {
    provider: Arc<dyn AuthProvider>,
    probe: Option<Arc<dyn ExistenceProbe>>,
    session: Arc<SessionState>,
    redirect_to: Option<String>,
    inner: Mutex<FlowInner>,
    in_flight: AtomicBool,
}

impl LoginFlow {
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        probe: Option<Arc<dyn ExistenceProbe>>,
        session: Arc<SessionState>,
    ) -> Self {
        Self {
            provider,
            probe,
            session,
            redirect_to: None,
            inner: Mutex::new(FlowInner::new()),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Where magic links should land.
    pub fn with_redirect(mut self, redirect_to: impl Into<String>) -> Self {
        self.redirect_to = Some(redirect_to.into());
        self
    }

    fn lock(&self) -> MutexGuard<'_, FlowInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock the flow, first returning an `Authenticated` flow to `Initial`
    /// if the session has since signed out.
    fn synced(&self) -> MutexGuard<'_, FlowInner> {
        let mut inner = self.lock();
        if inner.step() == LoginStep::Authenticated && !self.session.current().is_authenticated() {
            match inner.apply(LoginMachineInput::SignedOut) {
                Ok(_) => {
                    debug!("session ended, sign-in flow reset");
                    inner.forget_email();
                }
                Err(err) => warn!(error = %err, "failed to reset sign-in flow"),
            }
        }
        inner
    }

    pub fn step(&self) -> LoginStep {
        self.synced().step()
    }

    pub fn view(&self) -> LoginFlowView {
        let inner = self.synced();
        LoginFlowView {
            step: inner.step(),
            email: inner.email.clone(),
            error: inner.error.clone(),
            info: inner.info.clone(),
            warning: inner.warning.clone(),
            capabilities: self.provider.capabilities(),
            busy: self.in_flight.load(Ordering::Acquire),
        }
    }

    /// Check the step and clear the previous submission's messages.
    fn begin(&self, allowed: &[LoginStep]) -> AuthResult<Option<String>> {
        let mut inner = self.synced();
        let step = inner.step();
        if !allowed.contains(&step) {
            return Err(AuthError::InvalidStateTransition(format!(
                "Operation not available in step {:?}",
                step
            )));
        }
        inner.clear_messages();
        Ok(inner.email.clone())
    }

    /// Record a failure, moving the machine with `input` when given.
    fn fail(&self, input: Option<LoginMachineInput>, err: AuthError) -> AuthError {
        let mut inner = self.lock();
        if let Some(input) = input {
            if let Err(transition_err) = inner.apply(input) {
                warn!(error = %transition_err, "failed to record sign-in failure");
            }
        }
        inner.error = Some(err.user_message());
        err
    }

    fn reject(&self, message: &str) -> AuthError {
        self.fail(None, AuthError::Validation(message.to_string()))
    }

    /// Refuse a method the provider does not offer without calling it.
    fn require(&self, available: bool, method: &'static str) -> AuthResult<()> {
        if available {
            Ok(())
        } else {
            Err(self.fail(None, AuthError::Unsupported(method)))
        }
    }

    async fn send_magic_link(&self, email: String) -> AuthResult<LoginStep> {
        if let Err(err) = self
            .provider
            .send_magic_link(&email, self.redirect_to.as_deref())
            .await
        {
            return Err(self.fail(Some(LoginMachineInput::EmailRejected), err));
        }
        info!("magic link sent");
        let mut inner = self.lock();
        inner.email = Some(email);
        inner.info = Some(MAGIC_LINK_SENT_MESSAGE.to_string());
        inner.apply(LoginMachineInput::MagicLinkSent)
    }

    /// Step 1: probe the email and branch.
    pub async fn submit_email(&self, email: &str) -> AuthResult<LoginStep> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        self.begin(&[LoginStep::Initial])?;

        let email = email.trim().to_string();
        self.lock().warning = None;
        if email.is_empty() {
            return Err(self.reject(EMPTY_EMAIL_MESSAGE));
        }

        let capabilities = self.provider.capabilities();
        let existing_user_options = capabilities.password || capabilities.otp;

        // Without a probe the email cannot be classified; treat it as known.
        let existence = match &self.probe {
            Some(probe) => match probe.check_email(&email).await {
                Ok(existence) => Some(existence),
                Err(err) => {
                    warn!(error = %err, "email existence check failed");
                    return Err(self.fail(Some(LoginMachineInput::EmailRejected), err));
                }
            },
            None => None,
        };
        let known = existence.map_or(true, |e| e.exists);

        let (input, usable) = if known {
            (LoginMachineInput::KnownEmail, existing_user_options)
        } else {
            (LoginMachineInput::UnknownEmail, capabilities.sign_up)
        };
        if !usable {
            if capabilities.magic_link {
                return self.send_magic_link(email).await;
            }
            let method = if known { "password" } else { "sign up" };
            return Err(self.fail(
                Some(LoginMachineInput::EmailRejected),
                AuthError::Unsupported(method),
            ));
        }

        let mut inner = self.lock();
        inner.email = Some(email);
        if existence.and_then(|e| e.is_verified) == Some(false) {
            inner.warning = Some(UNVERIFIED_WARNING.to_string());
        }
        inner.apply(input)
    }

    pub async fn submit_password(&self, password: &str) -> AuthResult<LoginStep> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        let email = self
            .begin(&[LoginStep::ExistingUserOptions])?
            .unwrap_or_default();
        self.require(self.provider.capabilities().password, "password")?;

        if password.is_empty() {
            return Err(self.reject(EMPTY_PASSWORD_MESSAGE));
        }

        let session = match self.provider.sign_in_with_password(&email, password).await {
            Ok(session) => session,
            Err(err) => {
                return Err(self.fail(Some(LoginMachineInput::PasswordRejected), err));
            }
        };

        if let Err(err) = self.session.establish(session) {
            return Err(self.fail(Some(LoginMachineInput::PasswordRejected), err));
        }
        self.lock().apply(LoginMachineInput::PasswordAccepted)
    }

    pub async fn request_otp(&self) -> AuthResult<LoginStep> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        let email = self
            .begin(&[LoginStep::ExistingUserOptions])?
            .unwrap_or_default();
        self.require(self.provider.capabilities().otp, "one-time code")?;

        match self.provider.request_otp(&email).await {
            Ok(challenge) => {
                let mut inner = self.lock();
                inner.info = Some(format!("We sent a sign-in code to {}.", challenge.email));
                inner.otp = Some(challenge);
                inner.apply(LoginMachineInput::OtpSent)
            }
            Err(err) => Err(self.fail(Some(LoginMachineInput::OtpRequestFailed), err)),
        }
    }

    pub async fn submit_otp(&self, code: &str) -> AuthResult<LoginStep> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        self.begin(&[LoginStep::OtpLogin])?;

        let code = code.trim();
        if code.is_empty() {
            return Err(self.reject(EMPTY_CODE_MESSAGE));
        }

        let challenge = self.lock().otp.clone().ok_or_else(|| {
            AuthError::InvalidStateTransition("No one-time code was requested".to_string())
        })?;

        let session = match self.provider.verify_otp(&challenge, code).await {
            Ok(session) => session,
            Err(err) => return Err(self.fail(Some(LoginMachineInput::CodeRejected), err)),
        };

        if let Err(err) = self.session.establish(session) {
            return Err(self.fail(Some(LoginMachineInput::CodeRejected), err));
        }
        let mut inner = self.lock();
        inner.otp = None;
        inner.apply(LoginMachineInput::CodeAccepted)
    }

    pub fn use_password_instead(&self) -> AuthResult<LoginStep> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        self.begin(&[LoginStep::OtpLogin])?;
        self.require(self.provider.capabilities().password, "password")?;
        let mut inner = self.lock();
        inner.otp = None;
        inner.apply(LoginMachineInput::UsePassword)
    }

    pub async fn sign_up(&self, password: &str, confirm_password: &str) -> AuthResult<LoginStep> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        let email = self
            .begin(&[LoginStep::NewUserCreation])?
            .unwrap_or_default();
        self.require(self.provider.capabilities().sign_up, "sign up")?;

        if password.is_empty() {
            return Err(self.reject(EMPTY_PASSWORD_MESSAGE));
        }
        if password != confirm_password {
            return Err(self.fail(
                Some(LoginMachineInput::SignUpRejected),
                AuthError::Validation(PASSWORD_MISMATCH_MESSAGE.to_string()),
            ));
        }

        match self.provider.sign_up(&email, password).await {
            Ok(SignUpOutcome::VerificationRequired) => {
                info!("account created, verification pending");
                let mut inner = self.lock();
                inner.info = Some(VERIFY_EMAIL_MESSAGE.to_string());
                inner.apply(LoginMachineInput::AccountPendingVerification)
            }
            Ok(SignUpOutcome::SignedIn(session)) => {
                if let Err(err) = self.session.establish(session) {
                    return Err(self.fail(Some(LoginMachineInput::SignUpRejected), err));
                }
                self.lock().apply(LoginMachineInput::AccountSignedIn)
            }
            Err(err) => Err(self.fail(Some(LoginMachineInput::SignUpRejected), err)),
        }
    }

    /// "Use a different email": back to the start with nothing retained.
    pub fn use_different_email(&self) -> AuthResult<LoginStep> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        let mut inner = self.synced();
        let step = inner.apply(LoginMachineInput::Reset)?;
        inner.forget_email();
        Ok(step)
    }

    /// Authorize URL for a browser sign-in. Does not change the step; the
    /// result arrives through [`SessionState`].
    pub fn start_oauth(&self, provider: OAuthProvider, redirect_to: &str) -> AuthResult<String> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        self.begin(&[
            LoginStep::Initial,
            LoginStep::ExistingUserOptions,
            LoginStep::NewUserCreation,
        ])?;
        self.require(self.provider.capabilities().oauth, "OAuth")?;

        self.provider
            .oauth_authorize_url(provider, redirect_to)
            .map_err(|err| self.fail(None, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_step() {
        let machine = LoginMachine::new();
        assert_eq!(LoginStep::from(machine.state()), LoginStep::Initial);
    }

    #[test]
    fn test_known_email_password_path() {
        let mut machine = LoginMachine::new();
        machine.consume(&LoginMachineInput::KnownEmail).unwrap();
        machine.consume(&LoginMachineInput::PasswordRejected).unwrap();
        assert_eq!(*machine.state(), LoginMachineState::ExistingUserOptions);
        machine.consume(&LoginMachineInput::PasswordAccepted).unwrap();
        assert_eq!(*machine.state(), LoginMachineState::Authenticated);
    }

    #[test]
    fn test_otp_path_with_fallback_to_password() {
        let mut machine = LoginMachine::new();
        machine.consume(&LoginMachineInput::KnownEmail).unwrap();
        machine.consume(&LoginMachineInput::OtpSent).unwrap();
        machine.consume(&LoginMachineInput::CodeRejected).unwrap();
        assert_eq!(*machine.state(), LoginMachineState::OtpLogin);
        machine.consume(&LoginMachineInput::UsePassword).unwrap();
        assert_eq!(*machine.state(), LoginMachineState::ExistingUserOptions);
    }

    #[test]
    fn test_new_user_paths() {
        let mut machine = LoginMachine::new();
        machine.consume(&LoginMachineInput::UnknownEmail).unwrap();
        machine.consume(&LoginMachineInput::SignUpRejected).unwrap();
        machine
            .consume(&LoginMachineInput::AccountPendingVerification)
            .unwrap();
        assert_eq!(*machine.state(), LoginMachineState::AwaitingVerification);
        assert!(machine.consume(&LoginMachineInput::CodeAccepted).is_err());
        machine.consume(&LoginMachineInput::Reset).unwrap();
        assert_eq!(*machine.state(), LoginMachineState::Initial);
    }

    #[test]
    fn test_every_pending_step_resets() {
        let routes: [&[LoginMachineInput]; 5] = [
            &[LoginMachineInput::KnownEmail],
            &[LoginMachineInput::UnknownEmail],
            &[LoginMachineInput::MagicLinkSent],
            &[LoginMachineInput::KnownEmail, LoginMachineInput::OtpSent],
            &[
                LoginMachineInput::UnknownEmail,
                LoginMachineInput::AccountPendingVerification,
            ],
        ];

        for inputs in routes {
            let mut machine = LoginMachine::new();
            for input in inputs {
                machine.consume(input).unwrap();
            }
            machine.consume(&LoginMachineInput::Reset).unwrap();
            assert_eq!(*machine.state(), LoginMachineState::Initial);
        }
    }

    #[test]
    fn test_authenticated_is_terminal_until_sign_out() {
        let mut machine = LoginMachine::new();
        machine.consume(&LoginMachineInput::KnownEmail).unwrap();
        machine.consume(&LoginMachineInput::PasswordAccepted).unwrap();
        assert!(machine.consume(&LoginMachineInput::Reset).is_err());
        machine.consume(&LoginMachineInput::SignedOut).unwrap();
        assert_eq!(*machine.state(), LoginMachineState::Initial);
    }

    #[test]
    fn test_cannot_skip_probe() {
        let mut machine = LoginMachine::new();
        assert!(machine.consume(&LoginMachineInput::PasswordAccepted).is_err());
        assert!(machine.consume(&LoginMachineInput::OtpSent).is_err());
    }
}
