use super::user_facing;
use crate::output::{self, OutputFormat};
use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use guest_store::{BackendStore, EventsRepo, NewEvent};
use guestlist_config_and_utils::Config;
use serde_json::json;
use std::sync::Arc;

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM` or `YYYY-MM-DD` (midnight). Times
/// without an offset are taken as UTC.
pub fn parse_event_date(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(input) {
        return Ok(date.with_timezone(&Utc));
    }
    for pattern in ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"] {
        if let Ok(date) = NaiveDateTime::parse_from_str(input, pattern) {
            return Ok(date.and_utc());
        }
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|date| date.and_utc())
        .ok_or_else(|| anyhow!("Unrecognized date: {}", input))
}

fn display_date(date: Option<&DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub async fn list(store: Arc<dyn BackendStore>, owner_id: &str, format: OutputFormat) -> Result<()> {
    let events = EventsRepo::new(store)
        .list_for_owner(owner_id)
        .await
        .map_err(user_facing)?;

    output::print_with(&events, format, |events| {
        if events.is_empty() {
            println!("No events yet. Create one with `guestlist events create`.");
            return;
        }
        output::print_heading("Events");
        for event in events {
            println!("  {}  {}  {}", event.id, display_date(event.event_date.as_ref()), event.name);
        }
    });
    Ok(())
}

pub struct CreateArgs {
    pub name: String,
    pub date: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub private: bool,
}

pub async fn create(
    store: Arc<dyn BackendStore>,
    owner_id: &str,
    args: CreateArgs,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let event_date = args.date.as_deref().map(parse_event_date).transpose()?;
    let event = EventsRepo::new(store)
        .create(
            owner_id,
            NewEvent {
                name: args.name,
                description: args.description,
                event_date,
                location: args.location,
                is_public: !args.private,
            },
        )
        .await
        .map_err(user_facing)?;

    let link = config.rsvp_link(&event.id);
    match format {
        OutputFormat::Text => {
            output::print_success(&format!("Event \"{}\" created.", event.name), format);
            output::print_row("ID", &event.id);
            output::print_row("RSVP link", &link);
        }
        OutputFormat::Json => {
            output::print_with(&json!({ "event": event, "rsvp_link": link }), format, |_| {})
        }
    }
    Ok(())
}

pub async fn show(
    store: Arc<dyn BackendStore>,
    owner_id: &str,
    event_id: &str,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let Some(event) = EventsRepo::new(store)
        .get(owner_id, event_id)
        .await
        .map_err(user_facing)?
    else {
        bail!("Event not found.");
    };

    let link = config.rsvp_link(&event.id);
    output::print_with(&json!({ "event": event, "rsvp_link": link }), format, |_| {
        output::print_heading(&event.name);
        output::print_row("ID", &event.id);
        output::print_row("Date", &display_date(event.event_date.as_ref()));
        output::print_row("Location", output::or_dash(event.location.as_deref()));
        output::print_row("Description", output::or_dash(event.description.as_deref()));
        output::print_row("Public", if event.is_public { "yes" } else { "no" });
        output::print_row("RSVP link", &link);
    });
    Ok(())
}
