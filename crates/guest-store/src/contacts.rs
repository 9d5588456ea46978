//! Owner address book.

use crate::gate::SubmitGate;
use crate::import::{ImportReport, ParsedImport};
use crate::models::{Contact, ContactSource, NewContact};
use crate::store::{decode_rows, BackendStore, Collection, Filter, Query};
use crate::{StoreError, StoreResult};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

pub const CONTACT_NAME_REQUIRED: &str = "Contact name is required.";

pub struct ContactsRepo {
    store: Arc<dyn BackendStore>,
    gate: SubmitGate,
}

impl ContactsRepo {
    pub fn new(store: Arc<dyn BackendStore>) -> Self {
        Self {
            store,
            gate: SubmitGate::new(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    /// Every contact `owner_id` owns, by name.
    pub async fn list(&self, owner_id: &str) -> StoreResult<Vec<Contact>> {
        let rows = self
            .store
            .query(
                Query::new(Collection::Contacts)
                    .eq("user_id", owner_id)
                    .order_by("name", true),
            )
            .await?;
        decode_rows(rows)
    }

    pub async fn create(&self, owner_id: &str, contact: NewContact) -> StoreResult<Contact> {
        let _permit = self.gate.enter()?;
        let contact = contact
            .normalized()
            .ok_or_else(|| StoreError::Validation(CONTACT_NAME_REQUIRED.to_string()))?;

        let rows = self
            .store
            .insert(
                Collection::Contacts,
                vec![contact_row(owner_id, &contact, ContactSource::Manual)],
            )
            .await?;
        let created = single(decode_rows::<Contact>(rows)?)?;
        info!(contact_id = %created.id, "contact created");
        Ok(created)
    }

    /// Replace the editable fields and stamp `updated_at`.
    pub async fn update(
        &self,
        owner_id: &str,
        contact_id: &str,
        contact: NewContact,
    ) -> StoreResult<Contact> {
        let _permit = self.gate.enter()?;
        let contact = contact
            .normalized()
            .ok_or_else(|| StoreError::Validation(CONTACT_NAME_REQUIRED.to_string()))?;

        let patch = json!({
            "name": contact.name,
            "email": contact.email,
            "phone": contact.phone,
            "updated_at": Utc::now().to_rfc3339(),
        });
        let rows = self
            .store
            .update(
                Collection::Contacts,
                Filter::new().eq("id", contact_id).eq("user_id", owner_id),
                patch,
            )
            .await?;
        let updated = decode_rows::<Contact>(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("Contact {} not found", contact_id)))?;
        info!(contact_id, "contact updated");
        Ok(updated)
    }

    /// Returns whether a row was removed.
    pub async fn delete(&self, owner_id: &str, contact_id: &str) -> StoreResult<bool> {
        let _permit = self.gate.enter()?;
        let removed = self
            .store
            .delete(
                Collection::Contacts,
                Filter::new().eq("id", contact_id).eq("user_id", owner_id),
            )
            .await?;
        if removed == 0 {
            debug!(contact_id, "contact delete matched no rows");
        } else {
            info!(contact_id, "contact deleted");
        }
        Ok(removed > 0)
    }

    /// Insert parsed import rows in one batch. Existing contacts are not
    /// consulted, so importing the same file twice creates duplicates.
    pub async fn import(&self, owner_id: &str, parsed: ParsedImport) -> StoreResult<ImportReport> {
        let _permit = self.gate.enter()?;
        if parsed.contacts.is_empty() {
            info!(format = %parsed.format, "import found no valid contacts");
            return Ok(ImportReport::Empty {
                format: parsed.format,
            });
        }

        let source = parsed.format.source();
        let rows: Vec<Value> = parsed
            .contacts
            .iter()
            .map(|contact| contact_row(owner_id, contact, source))
            .collect();
        let count = rows.len();
        self.store.insert_minimal(Collection::Contacts, rows).await?;

        info!(format = %parsed.format, count, skipped = parsed.skipped, "contacts imported");
        Ok(ImportReport::Imported {
            format: parsed.format,
            count,
            skipped: parsed.skipped,
        })
    }
}

fn contact_row(owner_id: &str, contact: &NewContact, source: ContactSource) -> Value {
    json!({
        "user_id": owner_id,
        "name": contact.name,
        "email": contact.email,
        "phone": contact.phone,
        "source": source,
    })
}

fn single<T>(rows: Vec<T>) -> StoreResult<T> {
    rows.into_iter().next().ok_or_else(|| StoreError::Backend {
        status: 200,
        message: "Insert returned no rows".to_string(),
    })
}
