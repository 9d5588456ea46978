use super::contacts::print_contact_line;
use super::user_facing;
use crate::output::{self, OutputFormat};
use anyhow::{bail, Result};
use guest_store::{BackendStore, EventsRepo, GuestListManager, GuestListRepo};
use std::sync::Arc;
use tracing::debug;

/// Manager with `event_id` selected, after checking the caller owns it.
async fn open_event(
    store: Arc<dyn BackendStore>,
    owner_id: &str,
    event_id: &str,
) -> Result<GuestListManager> {
    let owned = EventsRepo::new(Arc::clone(&store))
        .get(owner_id, event_id)
        .await
        .map_err(user_facing)?;
    if owned.is_none() {
        bail!("Event not found.");
    }
    let mut manager = GuestListManager::new(GuestListRepo::new(store), owner_id);
    manager
        .select_event(Some(event_id))
        .await
        .map_err(user_facing)?;
    Ok(manager)
}

pub async fn list(
    store: Arc<dyn BackendStore>,
    owner_id: &str,
    event_id: &str,
    format: OutputFormat,
) -> Result<()> {
    let manager = open_event(store, owner_id, event_id).await?;
    output::print_with(&manager.members(), format, |members| {
        if members.is_empty() {
            println!("No guests on this list yet.");
            return;
        }
        output::print_heading(&format!("Guest list ({})", members.len()));
        for member in members.iter() {
            print_contact_line(&member.contact);
        }
    });
    Ok(())
}

pub async fn available(
    store: Arc<dyn BackendStore>,
    owner_id: &str,
    event_id: &str,
    search: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let mut manager = open_event(store, owner_id, event_id).await?;
    if let Some(search) = search {
        manager.set_search(search);
    }
    let available = manager.available();
    output::print_with(&available, format, |available| {
        if available.is_empty() {
            println!("All contacts are already on this guest list.");
            return;
        }
        output::print_heading("Contacts you can add");
        for contact in available {
            print_contact_line(contact);
        }
    });
    Ok(())
}

pub async fn add(
    store: Arc<dyn BackendStore>,
    owner_id: &str,
    event_id: &str,
    contact_ids: &[String],
    format: OutputFormat,
) -> Result<()> {
    let mut manager = open_event(store, owner_id, event_id).await?;
    for contact_id in contact_ids {
        if !manager.toggle(contact_id, true) {
            debug!(contact_id = %contact_id, "not selectable");
            println!("Skipping {}: not an available contact.", contact_id);
        }
    }
    if manager.selection().is_empty() {
        bail!("Select at least one contact to add.");
    }
    let added = manager.add_selected().await.map_err(user_facing)?;
    output::print_success(&format!("{} guest(s) added.", added), format);
    Ok(())
}

pub async fn remove(
    store: Arc<dyn BackendStore>,
    owner_id: &str,
    event_id: &str,
    contact_id: &str,
    format: OutputFormat,
) -> Result<()> {
    let mut manager = open_event(store, owner_id, event_id).await?;
    manager.remove(contact_id).await.map_err(user_facing)?;
    output::print_success("Guest removed.", format);
    Ok(())
}
