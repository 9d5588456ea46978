//! Authentication for guestlist.
//!
//! - [`LoginFlow`]: the multi-path sign-in state machine
//! - [`SessionState`]: observable, persisted session with refresh
//! - [`RouteGuard`]: protected-route decisions driven by the session
//! - [`AuthProvider`]: capability interface, implemented for Supabase Auth
//! - [`HttpExistenceProbe`]: client for the email existence endpoint
//! - [`RedirectListener`]: loopback completion of magic-link and OAuth sign-ins

mod callback;
mod error;
mod existence;
mod guard;
mod login_flow;
mod provider;
mod session;
mod session_fsm;
mod supabase_auth;

pub use callback::{RedirectListener, DEFAULT_REDIRECT_TIMEOUT};
pub use error::{AuthError, AuthResult, GENERIC_ERROR_MESSAGE};
pub use existence::{EmailExistence, ExistenceProbe, HttpExistenceProbe};
pub use guard::{access_for, decide, GuardDecision, RouteAccess, RouteGuard, HOME_PATH, LOGIN_PATH};
pub use login_flow::{
    login_machine, LoginFlow, LoginFlowView, LoginMachine, LoginMachineInput, LoginMachineState,
    LoginStep, EMPTY_CODE_MESSAGE, EMPTY_EMAIL_MESSAGE, EMPTY_PASSWORD_MESSAGE,
    MAGIC_LINK_SENT_MESSAGE, PASSWORD_MISMATCH_MESSAGE, UNVERIFIED_WARNING, VERIFY_EMAIL_MESSAGE,
};
pub use provider::{
    AuthProvider, AuthSession, Identity, OAuthProvider, OtpChallenge, ProviderCapabilities,
    SignUpOutcome,
};
pub use session::{RedirectTokens, SessionSnapshot, SessionState};
pub use session_fsm::{
    session_machine, RefreshConfig, SessionLifecycle, SessionMachine, SessionMachineInput,
    SessionMachineState,
};
pub use supabase_auth::SupabaseAuthProvider;
