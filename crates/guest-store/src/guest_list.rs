//! Per-event guest lists over the owner's global contacts.
//!
//! Membership is a row per `(event_id, contact_id)`; the backend enforces
//! uniqueness. A contact is either a member of an event or available to add
//! to it, never both.

use crate::contacts::ContactsRepo;
use crate::gate::SubmitGate;
use crate::models::{Contact, GuestListEntry, GuestListMember, INVITED_STATUS};
use crate::store::{decode_rows, BackendStore, Collection, Filter, Query};
use crate::{StoreError, StoreResult};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const SELECT_EVENT_FIRST: &str = "Please select an event first to manage its contacts.";

pub struct GuestListRepo {
    store: Arc<dyn BackendStore>,
    contacts: ContactsRepo,
    gate: SubmitGate,
}

impl GuestListRepo {
    pub fn new(store: Arc<dyn BackendStore>) -> Self {
        Self {
            contacts: ContactsRepo::new(Arc::clone(&store)),
            store,
            gate: SubmitGate::new(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    /// Members of `event_id` with their contact details, oldest first. An
    /// empty list is a normal result. Only `owner_id`'s contacts are read.
    pub async fn list_for_event(
        &self,
        event_id: &str,
        owner_id: &str,
    ) -> StoreResult<Vec<GuestListMember>> {
        let entries: Vec<GuestListEntry> = decode_rows(
            self.store
                .query(
                    Query::new(Collection::GuestList)
                        .eq("event_id", event_id)
                        .order_by("added_at", true),
                )
                .await?,
        )?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = entries.iter().map(|e| e.contact_id.as_str()).collect();
        let contacts: Vec<Contact> = decode_rows(
            self.store
                .query(
                    Query::new(Collection::Contacts)
                        .eq("user_id", owner_id)
                        .is_in("id", ids),
                )
                .await?,
        )?;
        let mut by_id: HashMap<String, Contact> =
            contacts.into_iter().map(|c| (c.id.clone(), c)).collect();

        let mut members = Vec::with_capacity(entries.len());
        for entry in entries {
            match by_id.remove(&entry.contact_id) {
                Some(contact) => members.push(GuestListMember {
                    contact,
                    status: entry.status,
                    added_at: entry.added_at,
                }),
                None => warn!(
                    event_id,
                    contact_id = %entry.contact_id,
                    "guest list entry without contact details"
                ),
            }
        }
        Ok(members)
    }

    /// The owner's contacts not yet on the event's list, optionally
    /// narrowed by a case-insensitive search over name, email and phone.
    pub async fn available_to_add(
        &self,
        event_id: &str,
        owner_id: &str,
        search: Option<&str>,
    ) -> StoreResult<Vec<Contact>> {
        let members = self.list_for_event(event_id, owner_id).await?;
        let contacts = self.contacts.list(owner_id).await?;
        Ok(filter_available(&contacts, &members, search.unwrap_or("")))
    }

    /// Add every id as an `Invited` entry in one batch. Either all are
    /// added or the call fails; a contact already on the list fails the
    /// whole batch.
    pub async fn add_many(&self, event_id: &str, contact_ids: &HashSet<String>) -> StoreResult<usize> {
        if contact_ids.is_empty() {
            return Ok(0);
        }
        let _permit = self.gate.enter()?;

        let mut ids: Vec<&String> = contact_ids.iter().collect();
        ids.sort();
        let rows: Vec<Value> = ids
            .iter()
            .map(|contact_id| {
                json!({
                    "event_id": event_id,
                    "contact_id": contact_id,
                    "status": INVITED_STATUS,
                })
            })
            .collect();

        let inserted = self.store.insert(Collection::GuestList, rows).await?;
        if inserted.len() != ids.len() {
            return Err(StoreError::Backend {
                status: 200,
                message: format!(
                    "Expected {} guest list entries, backend stored {}",
                    ids.len(),
                    inserted.len()
                ),
            });
        }
        info!(event_id, count = ids.len(), "contacts added to guest list");
        Ok(ids.len())
    }

    /// Remove one contact from the event. Removing a contact that is not on
    /// the list succeeds.
    pub async fn remove(&self, event_id: &str, contact_id: &str) -> StoreResult<()> {
        let _permit = self.gate.enter()?;
        let removed = self
            .store
            .delete(
                Collection::GuestList,
                Filter::new()
                    .eq("event_id", event_id)
                    .eq("contact_id", contact_id),
            )
            .await?;
        if removed == 0 {
            debug!(event_id, contact_id, "guest list remove matched no rows");
        } else {
            info!(event_id, contact_id, "contact removed from guest list");
        }
        Ok(())
    }
}

/// `contacts` minus `members`, keyed by contact id, then searched.
pub fn filter_available(contacts: &[Contact], members: &[GuestListMember], search: &str) -> Vec<Contact> {
    let member_ids: HashSet<&str> = members.iter().map(GuestListMember::contact_id).collect();
    contacts
        .iter()
        .filter(|c| !member_ids.contains(c.id.as_str()))
        .filter(|c| c.matches(search))
        .cloned()
        .collect()
}

/// Guest-list editing state for one selected event at a time.
///
/// Selection and search belong to the selected event; switching events
/// clears them and reloads membership.
pub struct GuestListManager {
    repo: GuestListRepo,
    owner_id: String,
    selected_event_id: Option<String>,
    members: Vec<GuestListMember>,
    contacts: Vec<Contact>,
    selection: HashSet<String>,
    search: String,
}

impl GuestListManager {
    pub fn new(repo: GuestListRepo, owner_id: impl Into<String>) -> Self {
        Self {
            repo,
            owner_id: owner_id.into(),
            selected_event_id: None,
            members: Vec::new(),
            contacts: Vec::new(),
            selection: HashSet::new(),
            search: String::new(),
        }
    }

    pub fn selected_event_id(&self) -> Option<&str> {
        self.selected_event_id.as_deref()
    }

    pub fn members(&self) -> &[GuestListMember] {
        &self.members
    }

    pub fn selection(&self) -> &HashSet<String> {
        &self.selection
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn is_busy(&self) -> bool {
        self.repo.is_busy()
    }

    /// Switch to `event_id` (or to nothing), dropping all state that
    /// belonged to the previous event. If loading the new event fails,
    /// nothing is available until a refresh succeeds.
    pub async fn select_event(&mut self, event_id: Option<&str>) -> StoreResult<()> {
        self.selected_event_id = event_id.map(str::to_string);
        self.selection.clear();
        self.search.clear();
        self.members.clear();
        self.contacts.clear();
        self.refresh().await
    }

    /// Reload membership and the owner's contacts.
    pub async fn refresh(&mut self) -> StoreResult<()> {
        let Some(event_id) = self.selected_event_id.as_deref() else {
            self.members.clear();
            self.contacts.clear();
            return Ok(());
        };
        let members = self.repo.list_for_event(event_id, &self.owner_id).await?;
        let contacts = self.repo.contacts.list(&self.owner_id).await?;

        self.members = members;
        self.contacts = contacts;
        let available: HashSet<String> = self.available().into_iter().map(|c| c.id).collect();
        self.selection.retain(|id| available.contains(id));
        Ok(())
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.search = search.into();
    }

    /// Contacts that can still be added, after the current search.
    pub fn available(&self) -> Vec<Contact> {
        if self.selected_event_id.is_none() {
            return Vec::new();
        }
        filter_available(&self.contacts, &self.members, &self.search)
    }

    /// Tick or untick a contact for adding. Members cannot be selected.
    pub fn toggle(&mut self, contact_id: &str, checked: bool) -> bool {
        if !checked {
            return self.selection.remove(contact_id);
        }
        let is_member = self.members.iter().any(|m| m.contact_id() == contact_id);
        let is_contact = self.contacts.iter().any(|c| c.id == contact_id);
        if is_member || !is_contact {
            return false;
        }
        self.selection.insert(contact_id.to_string())
    }

    /// Add the selected contacts, then reload. The selection is kept if the
    /// add fails so it can be retried.
    pub async fn add_selected(&mut self) -> StoreResult<usize> {
        let event_id = self
            .selected_event_id
            .clone()
            .ok_or_else(|| StoreError::Validation(SELECT_EVENT_FIRST.to_string()))?;
        if self.selection.is_empty() {
            return Ok(0);
        }
        let added = self.repo.add_many(&event_id, &self.selection).await?;
        self.selection.clear();
        self.refresh().await?;
        Ok(added)
    }

    pub async fn remove(&mut self, contact_id: &str) -> StoreResult<()> {
        let event_id = self
            .selected_event_id
            .clone()
            .ok_or_else(|| StoreError::Validation(SELECT_EVENT_FIRST.to_string()))?;
        self.repo.remove(&event_id, contact_id).await?;
        self.refresh().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContactSource;
    use chrono::Utc;

    fn contact(id: &str, name: &str) -> Contact {
        Contact {
            id: id.to_string(),
            user_id: "u1".to_string(),
            name: name.to_string(),
            email: Some(format!("{}@x.com", name.to_lowercase())),
            phone: None,
            source: ContactSource::Manual,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn member(c: &Contact) -> GuestListMember {
        GuestListMember {
            contact: c.clone(),
            status: INVITED_STATUS.to_string(),
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_filter_available_excludes_members() {
        let contacts = vec![contact("1", "Alice"), contact("2", "Bob"), contact("3", "Carol")];
        let members = vec![member(&contacts[1])];

        let ids: Vec<String> = filter_available(&contacts, &members, "")
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_filter_available_search() {
        let contacts = vec![contact("1", "Alice"), contact("2", "Bob"), contact("3", "Carol")];
        let found = filter_available(&contacts, &[], "CAROL@");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "3");

        // Search never brings a member back.
        let members = vec![member(&contacts[2])];
        assert!(filter_available(&contacts, &members, "carol").is_empty());
    }
}
