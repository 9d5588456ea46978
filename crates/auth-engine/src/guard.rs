//! Route guard for protected screens.

use crate::session::{SessionSnapshot, SessionState};
use tokio::sync::watch;

pub const LOGIN_PATH: &str = "/login";
pub const HOME_PATH: &str = "/dashboard";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    Public,
    Protected,
    /// Sign-in screens; signed-in users are sent home.
    GuestOnly,
}

/// Application routes. `:name` segments match any single segment.
pub const ROUTES: &[(&str, RouteAccess)] = &[
    ("/", RouteAccess::Public),
    ("/pricing", RouteAccess::Public),
    ("/rsvp/:event_id", RouteAccess::Public),
    ("/login", RouteAccess::GuestOnly),
    ("/dashboard", RouteAccess::Protected),
    ("/contacts", RouteAccess::Protected),
    ("/events/new", RouteAccess::Protected),
    ("/events/:event_id", RouteAccess::Protected),
    ("/guest-list", RouteAccess::Protected),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    /// Session is still being resolved.
    Wait,
    Redirect(String),
}

fn matches_pattern(pattern: &str, path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let path = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };

    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let path_segments: Vec<&str> = path.split('/').collect();
    pattern_segments.len() == path_segments.len()
        && pattern_segments
            .iter()
            .zip(&path_segments)
            .all(|(p, s)| if p.starts_with(':') { !s.is_empty() } else { p == s })
}

/// Unknown paths are public (they render the not-found page).
pub fn access_for(path: &str) -> RouteAccess {
    ROUTES
        .iter()
        .find(|(pattern, _)| matches_pattern(pattern, path))
        .map(|(_, access)| *access)
        .unwrap_or(RouteAccess::Public)
}

/// Decide what to do with `path` for a given session snapshot.
pub fn decide(snapshot: &SessionSnapshot, path: &str) -> GuardDecision {
    match access_for(path) {
        RouteAccess::Public => GuardDecision::Allow,
        _ if snapshot.is_pending() => GuardDecision::Wait,
        RouteAccess::Protected if snapshot.is_authenticated() => GuardDecision::Allow,
        RouteAccess::Protected => GuardDecision::Redirect(LOGIN_PATH.to_string()),
        RouteAccess::GuestOnly if snapshot.is_authenticated() => {
            GuardDecision::Redirect(HOME_PATH.to_string())
        }
        RouteAccess::GuestOnly => GuardDecision::Allow,
    }
}

/// Session-aware guard. Holds its own subscription to [`SessionState`].
pub struct RouteGuard {
    session: watch::Receiver<SessionSnapshot>,
}

impl RouteGuard {
    pub fn new(session: &SessionState) -> Self {
        Self {
            session: session.subscribe(),
        }
    }

    pub fn check(&self, path: &str) -> GuardDecision {
        decide(&self.session.borrow(), path)
    }

    /// Like [`RouteGuard::check`], but waits out pending session states.
    pub async fn resolve(&mut self, path: &str) -> GuardDecision {
        match self.session.wait_for(|snapshot| !snapshot.is_pending()).await {
            Ok(snapshot) => decide(&snapshot, path),
            // Sender gone: nothing will ever sign in.
            Err(_) => GuardDecision::Redirect(LOGIN_PATH.to_string()),
        }
    }
}
