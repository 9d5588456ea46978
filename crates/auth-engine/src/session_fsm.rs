//! Session lifecycle state machine.
//!
//! ```text
//!  Unresolved ──RestoreStarted──► Validating ──TokenNotExpired──► VerifyingWithServer
//!      │                              │  │                           │          │
//!      │ NoSession          NoSession │  │ SessionExpired  ServerVerified  ServerRejected
//!      ▼                              ▼  ▼                           ▼          ▼
//!  SignedOut ◄──RefreshFailed──── Refreshing ──RefreshSuccess──► SignedIn    SignedOut
//!      ▲                                ▲                           │
//!      │ SignOutComplete                └────TokenExpired───────────┤
//!  SigningOut ◄─────────────SignOutRequested────────────────────────┘
//! ```
//!
//! `SessionEstablished` moves `Unresolved`, `SignedOut` or `SignedIn` to
//! `SignedIn` when a sign-in completes.

use rust_fsm::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub session_machine(Unresolved)

    Unresolved => {
        RestoreStarted => Validating,
        SessionEstablished => SignedIn,
        NoSession => SignedOut
    },
    SignedOut => {
        RestoreStarted => Validating,
        SessionEstablished => SignedIn
    },
    Validating => {
        TokenNotExpired => VerifyingWithServer,
        SessionExpired => Refreshing,
        NoSession => SignedOut
    },
    VerifyingWithServer => {
        ServerVerified => SignedIn,
        ServerRejected => SignedOut
    },
    SignedIn => {
        SessionEstablished => SignedIn,
        TokenExpired => Refreshing,
        SignOutRequested => SigningOut
    },
    Refreshing => {
        RefreshSuccess => SignedIn,
        RefreshRetry => Refreshing,
        RefreshFailed => SignedOut
    },
    SigningOut => {
        SignOutComplete => SignedOut
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Serializable view of [`SessionMachineState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionLifecycle {
    /// Startup restore has not run yet.
    Unresolved,
    SignedOut,
    Validating,
    VerifyingWithServer,
    SignedIn,
    Refreshing,
    SigningOut,
}

impl SessionLifecycle {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionLifecycle::SignedIn)
    }

    /// True while the outcome is not known yet. Guards wait instead of
    /// redirecting.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            SessionLifecycle::Unresolved
                | SessionLifecycle::Validating
                | SessionLifecycle::VerifyingWithServer
                | SessionLifecycle::Refreshing
                | SessionLifecycle::SigningOut
        )
    }
}

impl From<&SessionMachineState> for SessionLifecycle {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::Unresolved => SessionLifecycle::Unresolved,
            SessionMachineState::SignedOut => SessionLifecycle::SignedOut,
            SessionMachineState::Validating => SessionLifecycle::Validating,
            SessionMachineState::VerifyingWithServer => SessionLifecycle::VerifyingWithServer,
            SessionMachineState::SignedIn => SessionLifecycle::SignedIn,
            SessionMachineState::Refreshing => SessionLifecycle::Refreshing,
            SessionMachineState::SigningOut => SessionLifecycle::SigningOut,
        }
    }
}

/// Retry policy for token refresh.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RefreshConfig {
    /// Exponential backoff for a 0-indexed attempt, capped at `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_unresolved() {
        let machine = SessionMachine::new();
        assert_eq!(*machine.state(), SessionMachineState::Unresolved);
    }

    #[test]
    fn test_restore_verified() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::RestoreStarted).unwrap();
        machine.consume(&SessionMachineInput::TokenNotExpired).unwrap();
        machine.consume(&SessionMachineInput::ServerVerified).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::SignedIn);
    }

    #[test]
    fn test_restore_cannot_skip_server_verification() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::RestoreStarted).unwrap();
        assert!(machine.consume(&SessionMachineInput::ServerVerified).is_err());
        assert_eq!(*machine.state(), SessionMachineState::Validating);
    }

    #[test]
    fn test_expired_session_refresh_retry_then_fail() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::RestoreStarted).unwrap();
        machine.consume(&SessionMachineInput::SessionExpired).unwrap();
        machine.consume(&SessionMachineInput::RefreshRetry).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::Refreshing);
        machine.consume(&SessionMachineInput::RefreshFailed).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::SignedOut);
    }

    #[test]
    fn test_sign_in_and_out() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::NoSession).unwrap();
        machine.consume(&SessionMachineInput::SessionEstablished).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::SignedIn);

        machine.consume(&SessionMachineInput::SignOutRequested).unwrap();
        machine.consume(&SessionMachineInput::SignOutComplete).unwrap();
        assert_eq!(*machine.state(), SessionMachineState::SignedOut);
    }

    #[test]
    fn test_sign_out_requires_session() {
        let mut machine = SessionMachine::new();
        machine.consume(&SessionMachineInput::NoSession).unwrap();
        assert!(machine.consume(&SessionMachineInput::SignOutRequested).is_err());
    }

    #[test]
    fn test_lifecycle_flags() {
        assert!(SessionLifecycle::SignedIn.is_authenticated());
        assert!(!SessionLifecycle::Refreshing.is_authenticated());
        assert!(SessionLifecycle::Unresolved.is_pending());
        assert!(SessionLifecycle::Refreshing.is_pending());
        assert!(!SessionLifecycle::SignedOut.is_pending());
        assert!(!SessionLifecycle::SignedIn.is_pending());
    }

    #[test]
    fn test_refresh_backoff() {
        let config = RefreshConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(5000));
        assert_eq!(config.delay_for_attempt(40), Duration::from_millis(5000));
    }
}
