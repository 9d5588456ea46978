//! Guest responses. Anyone holding an event id may submit; only the host
//! reads them back.

use crate::gate::SubmitGate;
use crate::models::{RsvpEntry, RsvpSubmission};
use crate::store::{decode_rows, BackendStore, Collection, Query};
use crate::{StoreError, StoreResult};
use regex::Regex;
use serde_json::json;
use std::sync::{Arc, OnceLock};
use tracing::info;

pub const RSVP_EVENT_MISSING: &str = "Event ID is missing. Cannot submit RSVP.";
pub const RSVP_FIELDS_REQUIRED: &str = "Name and Email are required to RSVP.";
pub const RSVP_EMAIL_INVALID: &str = "Please enter a valid email address.";

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\S+@\S+\.\S+").expect("email pattern compiles"))
}

/// Local checks run before anything is sent.
pub fn validate_submission(
    event_id: &str,
    submission: &RsvpSubmission,
) -> StoreResult<RsvpSubmission> {
    if event_id.trim().is_empty() {
        return Err(StoreError::Validation(RSVP_EVENT_MISSING.to_string()));
    }
    let name = submission.name.trim();
    let email = submission.email.trim();
    if name.is_empty() || email.is_empty() {
        return Err(StoreError::Validation(RSVP_FIELDS_REQUIRED.to_string()));
    }
    if !email_pattern().is_match(email) {
        return Err(StoreError::Validation(RSVP_EMAIL_INVALID.to_string()));
    }
    Ok(RsvpSubmission {
        name: name.to_string(),
        email: email.to_string(),
        status: submission.status,
    })
}

pub struct RsvpRepo {
    store: Arc<dyn BackendStore>,
    gate: SubmitGate,
}

impl RsvpRepo {
    pub fn new(store: Arc<dyn BackendStore>) -> Self {
        Self {
            store,
            gate: SubmitGate::new(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    /// Record a response. Returns the cleaned submission as stored.
    pub async fn submit(
        &self,
        event_id: &str,
        submission: RsvpSubmission,
    ) -> StoreResult<RsvpSubmission> {
        let _permit = self.gate.enter()?;
        let submission = validate_submission(event_id, &submission)?;

        let row = json!({
            "event_id": event_id.trim(),
            "name": submission.name,
            "email": submission.email,
            "status": submission.status,
        });
        // Guests cannot read rsvps, so nothing is returned.
        self.store.insert_minimal(Collection::Rsvps, vec![row]).await?;
        info!(event_id, status = %submission.status, "rsvp recorded");
        Ok(submission)
    }

    /// Responses for one event, oldest first. Empty for anyone but the host.
    pub async fn list_for_event(&self, event_id: &str) -> StoreResult<Vec<RsvpEntry>> {
        let rows = self
            .store
            .query(
                Query::new(Collection::Rsvps)
                    .eq("event_id", event_id)
                    .order_by("submitted_at", true),
            )
            .await?;
        decode_rows(rows)
    }
}
