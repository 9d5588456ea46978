//! Events owned by a host, plus the public view the RSVP page reads.

use crate::gate::SubmitGate;
use crate::models::{non_blank, Event, EventSummary, NewEvent};
use crate::store::{decode_rows, BackendStore, Collection, Query};
use crate::{StoreError, StoreResult};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

pub const EVENT_NAME_REQUIRED: &str = "Event name is required.";
pub const EVENT_DATE_REQUIRED: &str = "Event date is required.";

const SUMMARY_COLUMNS: &[&str] = &["id", "name", "event_date"];

pub struct EventsRepo {
    store: Arc<dyn BackendStore>,
    gate: SubmitGate,
}

impl EventsRepo {
    pub fn new(store: Arc<dyn BackendStore>) -> Self {
        Self {
            store,
            gate: SubmitGate::new(),
        }
    }

    pub async fn create(&self, owner_id: &str, event: NewEvent) -> StoreResult<Event> {
        let _permit = self.gate.enter()?;
        let name = event.name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation(EVENT_NAME_REQUIRED.to_string()));
        }
        let event_date = event
            .event_date
            .ok_or_else(|| StoreError::Validation(EVENT_DATE_REQUIRED.to_string()))?;

        let row = json!({
            "user_id": owner_id,
            "name": name,
            "description": non_blank(event.description.as_deref()),
            "event_date": event_date.to_rfc3339(),
            "location": non_blank(event.location.as_deref()),
            "is_public": event.is_public,
        });
        let created: Event = decode_rows(self.store.insert(Collection::Events, vec![row]).await?)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend {
                status: 200,
                message: "Insert returned no rows".to_string(),
            })?;
        info!(event_id = %created.id, "event created");
        Ok(created)
    }

    /// The owner's events by name, for pickers and the dashboard.
    pub async fn list_for_owner(&self, owner_id: &str) -> StoreResult<Vec<EventSummary>> {
        let rows = self
            .store
            .query(
                Query::new(Collection::Events)
                    .eq("user_id", owner_id)
                    .select(SUMMARY_COLUMNS)
                    .order_by("name", true),
            )
            .await?;
        decode_rows(rows)
    }

    /// Full detail for the owner. Someone else's event is `None`.
    pub async fn get(&self, owner_id: &str, event_id: &str) -> StoreResult<Option<Event>> {
        let rows = self
            .store
            .query(
                Query::new(Collection::Events)
                    .eq("id", event_id)
                    .eq("user_id", owner_id),
            )
            .await?;
        Ok(decode_rows(rows)?.into_iter().next())
    }

    /// What a guest sees on the RSVP page; readable without signing in.
    pub async fn public_summary(&self, event_id: &str) -> StoreResult<Option<EventSummary>> {
        if event_id.trim().is_empty() {
            return Ok(None);
        }
        let rows = self
            .store
            .query(
                Query::new(Collection::Events)
                    .eq("id", event_id)
                    .select(SUMMARY_COLUMNS),
            )
            .await?;
        Ok(decode_rows(rows)?.into_iter().next())
    }
}
