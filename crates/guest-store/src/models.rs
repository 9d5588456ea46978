//! Row types for the backend tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Guest-list status written on insert. Nothing moves an entry off it yet.
pub const INVITED_STATUS: &str = "Invited";

/// How a contact entered the address book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContactSource {
    #[default]
    Manual,
    CsvImport,
    VcardImport,
}

impl ContactSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::CsvImport => "csv_import",
            Self::VcardImport => "vcard_import",
        }
    }
}

impl fmt::Display for ContactSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A person in the owner's address book, independent of any event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub source: ContactSource,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Contact {
    /// Case-insensitive substring match on name, email or phone.
    pub fn matches(&self, search: &str) -> bool {
        let needle = search.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let hit = |field: Option<&str>| {
            field
                .map(|value| value.to_lowercase().contains(&needle))
                .unwrap_or(false)
        };
        hit(Some(&self.name)) || hit(self.email.as_deref()) || hit(self.phone.as_deref())
    }
}

/// Fields a person types when adding or editing a contact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewContact {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl NewContact {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Trimmed copy with blank optional fields dropped, or `None` when the
    /// name is blank.
    pub fn normalized(&self) -> Option<Self> {
        let name = self.name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            email: non_blank(self.email.as_deref()),
            phone: non_blank(self.phone.as_deref()),
        })
    }
}

/// Trim, mapping empty to `None`.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub event_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_true")]
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

/// The columns anyone may read: the RSVP page and the event picker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub event_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub name: String,
    pub description: Option<String>,
    pub event_date: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub is_public: bool,
}

impl Default for NewEvent {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: None,
            event_date: None,
            location: None,
            is_public: true,
        }
    }
}

/// Membership row linking a contact to one event's guest list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestListEntry {
    pub event_id: String,
    pub contact_id: String,
    #[serde(default = "default_status")]
    pub status: String,
    pub added_at: DateTime<Utc>,
}

fn default_status() -> String {
    INVITED_STATUS.to_string()
}

/// A guest-list entry joined with its contact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuestListMember {
    pub contact: Contact,
    pub status: String,
    pub added_at: DateTime<Utc>,
}

impl GuestListMember {
    pub fn contact_id(&self) -> &str {
        &self.contact.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RsvpStatus {
    #[default]
    Attending,
    NotAttending,
}

impl RsvpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attending => "attending",
            Self::NotAttending => "not_attending",
        }
    }
}

impl fmt::Display for RsvpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RsvpStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "attending" | "yes" => Ok(Self::Attending),
            "not_attending" | "no" => Ok(Self::NotAttending),
            other => Err(format!("unknown RSVP status: {}", other)),
        }
    }
}

/// Append-only response from a guest. Not linked to a contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsvpEntry {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub email: String,
    pub status: RsvpStatus,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsvpSubmission {
    pub name: String,
    pub email: String,
    pub status: RsvpStatus,
}

impl RsvpSubmission {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            status: RsvpStatus::default(),
        }
    }

    pub fn with_status(mut self, status: RsvpStatus) -> Self {
        self.status = status;
        self
    }

    pub fn confirmation(&self) -> String {
        format!(
            "Thank you for RSVPing, {}! Your response ({}) has been recorded.",
            self.name, self.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn contact(name: &str, email: Option<&str>, phone: Option<&str>) -> Contact {
        Contact {
            id: "c1".to_string(),
            user_id: "u1".to_string(),
            name: name.to_string(),
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            source: ContactSource::Manual,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_search_is_case_insensitive_across_fields() {
        let c = contact("Alice Smith", Some("Alice@Example.com"), Some("+1 555 0100"));
        assert!(c.matches("alice"));
        assert!(c.matches("EXAMPLE"));
        assert!(c.matches("555"));
        assert!(c.matches("  "));
        assert!(!c.matches("bob"));
    }

    #[test]
    fn test_search_ignores_missing_fields() {
        let c = contact("Bob", None, None);
        assert!(!c.matches("example.com"));
    }

    #[test]
    fn test_new_contact_normalization() {
        let input = NewContact::new("  Carol ")
            .with_email("   ")
            .with_phone(" 555 ");
        let normalized = input.normalized().unwrap();
        assert_eq!(normalized.name, "Carol");
        assert_eq!(normalized.email, None);
        assert_eq!(normalized.phone.as_deref(), Some("555"));

        assert!(NewContact::new(" \t").normalized().is_none());
    }

    #[test]
    fn test_contact_wire_format() {
        let row = json!({
            "id": "c1",
            "user_id": "u1",
            "name": "Alice",
            "email": null,
            "source": "csv_import",
            "created_at": "2025-05-01T10:00:00+00:00",
            "updated_at": null
        });
        let c: Contact = serde_json::from_value(row).unwrap();
        assert_eq!(c.source, ContactSource::CsvImport);
        assert!(c.phone.is_none());
    }

    #[test]
    fn test_guest_list_status_defaults_to_invited() {
        let row = json!({
            "event_id": "e1",
            "contact_id": "c1",
            "added_at": "2025-05-01T10:00:00Z"
        });
        let entry: GuestListEntry = serde_json::from_value(row).unwrap();
        assert_eq!(entry.status, INVITED_STATUS);
    }

    #[test]
    fn test_rsvp_status_parsing() {
        assert_eq!("attending".parse::<RsvpStatus>(), Ok(RsvpStatus::Attending));
        assert_eq!(
            "not-attending".parse::<RsvpStatus>(),
            Ok(RsvpStatus::NotAttending)
        );
        assert!("maybe".parse::<RsvpStatus>().is_err());
        assert_eq!(
            serde_json::to_value(RsvpStatus::NotAttending).unwrap(),
            json!("not_attending")
        );
    }

    #[test]
    fn test_rsvp_confirmation() {
        let submission = RsvpSubmission::new("Carl", "carl@x.com");
        assert_eq!(
            submission.confirmation(),
            "Thank you for RSVPing, Carl! Your response (attending) has been recorded."
        );
    }
}
