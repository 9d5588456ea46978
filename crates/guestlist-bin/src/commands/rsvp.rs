use super::user_facing;
use crate::output::{self, OutputFormat};
use anyhow::{bail, Result};
use guest_store::{BackendStore, EventsRepo, RsvpRepo, RsvpStatus, RsvpSubmission};
use std::sync::Arc;

/// Respond to an invitation as a guest. No account is involved.
pub async fn submit(
    store: Arc<dyn BackendStore>,
    event_id: &str,
    name: &str,
    email: &str,
    status: RsvpStatus,
    format: OutputFormat,
) -> Result<()> {
    let Some(event) = EventsRepo::new(Arc::clone(&store))
        .public_summary(event_id)
        .await
        .map_err(user_facing)?
    else {
        bail!("Event not found.");
    };

    let recorded = RsvpRepo::new(store)
        .submit(&event.id, RsvpSubmission::new(name, email).with_status(status))
        .await
        .map_err(user_facing)?;
    if format == OutputFormat::Text {
        println!("{}", event.name);
    }
    output::print_success(&recorded.confirmation(), format);
    Ok(())
}

pub async fn list(
    store: Arc<dyn BackendStore>,
    event_id: &str,
    format: OutputFormat,
) -> Result<()> {
    let responses = RsvpRepo::new(store)
        .list_for_event(event_id)
        .await
        .map_err(user_facing)?;

    output::print_with(&responses, format, |responses| {
        if responses.is_empty() {
            println!("No RSVPs yet.");
            return;
        }
        let attending = responses
            .iter()
            .filter(|r| r.status == RsvpStatus::Attending)
            .count();
        output::print_heading(&format!(
            "RSVPs: {} attending, {} not attending",
            attending,
            responses.len() - attending
        ));
        for response in responses {
            println!(
                "  {}  {:<24} {:<28} {}",
                response.submitted_at.format("%Y-%m-%d %H:%M"),
                response.name,
                response.email,
                response.status
            );
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use guest_store::{MemoryStore, NewEvent, RSVP_EMAIL_INVALID};

    #[tokio::test]
    async fn test_guest_submits_and_host_reads() {
        let memory = MemoryStore::new();
        let host: Arc<dyn BackendStore> = Arc::new(memory.as_user("host"));
        let event = EventsRepo::new(Arc::clone(&host))
            .create(
                "host",
                NewEvent {
                    name: "Picnic".to_string(),
                    event_date: Some(Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let guest: Arc<dyn BackendStore> = Arc::new(memory.anonymous());
        submit(
            Arc::clone(&guest),
            &event.id,
            "Gail",
            "gail@x.com",
            RsvpStatus::NotAttending,
            OutputFormat::Json,
        )
        .await
        .unwrap();

        let err = submit(guest, &event.id, "Gail", "gail", RsvpStatus::Attending, OutputFormat::Json)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), RSVP_EMAIL_INVALID);

        let responses = RsvpRepo::new(host).list_for_event(&event.id).await.unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status, RsvpStatus::NotAttending);
    }

    #[tokio::test]
    async fn test_unknown_event() {
        let guest: Arc<dyn BackendStore> = Arc::new(MemoryStore::new().anonymous());
        let err = submit(guest, "nope", "Gail", "gail@x.com", RsvpStatus::Attending, OutputFormat::Json)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Event not found.");
    }
}
