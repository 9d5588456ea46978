use super::user_facing;
use crate::output::{self, OutputFormat};
use anyhow::{bail, Result};
use guest_store::{import, BackendStore, Contact, ContactsRepo, NewContact};
use std::path::Path;
use std::sync::Arc;

pub async fn list(
    store: Arc<dyn BackendStore>,
    owner_id: &str,
    search: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let mut contacts = ContactsRepo::new(store)
        .list(owner_id)
        .await
        .map_err(user_facing)?;
    if let Some(search) = search {
        contacts.retain(|contact| contact.matches(search));
    }

    output::print_with(&contacts, format, |contacts| {
        if contacts.is_empty() {
            println!("No contacts found.");
            return;
        }
        output::print_heading("Contacts");
        for contact in contacts {
            print_contact_line(contact);
        }
    });
    Ok(())
}

pub(crate) fn print_contact_line(contact: &Contact) {
    println!(
        "  {}  {:<24} {:<28} {}",
        contact.id,
        contact.name,
        output::or_dash(contact.email.as_deref()),
        output::or_dash(contact.phone.as_deref()),
    );
}

#[derive(Debug, Default, Clone)]
pub struct ContactFields {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl ContactFields {
    /// Apply the given fields over `existing`. An empty string clears an
    /// optional field.
    pub fn merge_into(self, existing: &Contact) -> NewContact {
        NewContact {
            name: self.name.unwrap_or_else(|| existing.name.clone()),
            email: self.email.or_else(|| existing.email.clone()),
            phone: self.phone.or_else(|| existing.phone.clone()),
        }
    }
}

pub async fn add(
    store: Arc<dyn BackendStore>,
    owner_id: &str,
    fields: ContactFields,
    format: OutputFormat,
) -> Result<()> {
    let contact = NewContact {
        name: fields.name.unwrap_or_default(),
        email: fields.email,
        phone: fields.phone,
    };
    let created = ContactsRepo::new(store)
        .create(owner_id, contact)
        .await
        .map_err(user_facing)?;
    output::print_with(&created, format, |created| {
        output::print_success(&format!("Contact \"{}\" added.", created.name), format);
        output::print_row("ID", &created.id);
    });
    Ok(())
}

pub async fn edit(
    store: Arc<dyn BackendStore>,
    owner_id: &str,
    contact_id: &str,
    fields: ContactFields,
    format: OutputFormat,
) -> Result<()> {
    let repo = ContactsRepo::new(store);
    let contacts = repo.list(owner_id).await.map_err(user_facing)?;
    let Some(existing) = contacts.iter().find(|c| c.id == contact_id) else {
        bail!("Contact not found.");
    };
    let updated = repo
        .update(owner_id, contact_id, fields.merge_into(existing))
        .await
        .map_err(user_facing)?;
    output::print_with(&updated, format, |updated| {
        output::print_success(&format!("Contact \"{}\" updated.", updated.name), format);
    });
    Ok(())
}

pub async fn delete(
    store: Arc<dyn BackendStore>,
    owner_id: &str,
    contact_id: &str,
    format: OutputFormat,
) -> Result<()> {
    let removed = ContactsRepo::new(store)
        .delete(owner_id, contact_id)
        .await
        .map_err(user_facing)?;
    if !removed {
        bail!("Contact not found.");
    }
    output::print_success("Contact deleted.", format);
    Ok(())
}

pub async fn import_file(
    store: Arc<dyn BackendStore>,
    owner_id: &str,
    path: &Path,
    format: OutputFormat,
) -> Result<()> {
    let parsed = import::parse_file(path)?;
    let skipped = parsed.skipped;
    let report = ContactsRepo::new(store)
        .import(owner_id, parsed)
        .await
        .map_err(user_facing)?;

    output::print_success(&report.to_string(), format);
    if skipped > 0 && format == OutputFormat::Text {
        println!("Skipped {} record(s) without a name.", skipped);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use guest_store::{ContactSource, MemoryStore};
    use std::io::Write;

    fn existing() -> Contact {
        Contact {
            id: "c1".to_string(),
            user_id: "host".to_string(),
            name: "Alice".to_string(),
            email: Some("alice@x.com".to_string()),
            phone: Some("555".to_string()),
            source: ContactSource::Manual,
            created_at: chrono::Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let merged = ContactFields {
            phone: Some("777".to_string()),
            ..Default::default()
        }
        .merge_into(&existing());
        assert_eq!(merged.name, "Alice");
        assert_eq!(merged.email.as_deref(), Some("alice@x.com"));
        assert_eq!(merged.phone.as_deref(), Some("777"));
    }

    #[test]
    fn test_merge_empty_string_clears() {
        let merged = ContactFields {
            email: Some(String::new()),
            ..Default::default()
        }
        .merge_into(&existing());
        assert_eq!(merged.normalized().unwrap().email, None);
    }

    #[tokio::test]
    async fn test_import_then_edit_and_delete() {
        let memory = MemoryStore::new();
        let store: Arc<dyn BackendStore> = Arc::new(memory.as_user("host"));

        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Name,Email,Phone\nAlice,alice@x.com,555\n,nobody@x.com,").unwrap();
        import_file(Arc::clone(&store), "host", file.path(), OutputFormat::Json)
            .await
            .unwrap();

        let contacts = ContactsRepo::new(Arc::clone(&store)).list("host").await.unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].source, ContactSource::CsvImport);

        let id = contacts[0].id.clone();
        edit(
            Arc::clone(&store),
            "host",
            &id,
            ContactFields {
                name: Some("Alice B".to_string()),
                ..Default::default()
            },
            OutputFormat::Json,
        )
        .await
        .unwrap();
        let contacts = ContactsRepo::new(Arc::clone(&store)).list("host").await.unwrap();
        assert_eq!(contacts[0].name, "Alice B");
        assert_eq!(contacts[0].phone.as_deref(), Some("555"));

        delete(Arc::clone(&store), "host", &id, OutputFormat::Json).await.unwrap();
        let err = delete(store, "host", &id, OutputFormat::Json).await.unwrap_err();
        assert_eq!(err.to_string(), "Contact not found.");
    }
}
