//! Data layer for guestlist: contacts, events, per-event guest lists, RSVPs
//! and contact import.
//!
//! Everything goes through [`BackendStore`]. [`SupabaseStore`] talks to the
//! hosted PostgREST API; [`MemoryStore`] keeps rows in process and applies
//! the same row-level rules, so repositories behave identically over both.
//!
//! ```ignore
//! let store: Arc<dyn BackendStore> = Arc::new(supabase.with_access_token(token));
//! let guests = GuestListRepo::new(store);
//! let added = guests.add_many(&event_id, &selected).await?;
//! ```

mod contacts;
mod error;
mod events;
mod gate;
mod guest_list;
pub mod import;
mod models;
mod rsvp;
pub mod store;

pub use contacts::{ContactsRepo, CONTACT_NAME_REQUIRED};
pub use error::{ImportError, ImportResult, StoreError, StoreResult, GENERIC_STORE_MESSAGE};
pub use events::{EventsRepo, EVENT_DATE_REQUIRED, EVENT_NAME_REQUIRED};
pub use gate::{SubmitGate, SubmitPermit};
pub use guest_list::{filter_available, GuestListManager, GuestListRepo, SELECT_EVENT_FIRST};
pub use import::{ImportFormat, ImportReport, ParsedImport};
pub use models::*;
pub use rsvp::{
    validate_submission, RsvpRepo, RSVP_EMAIL_INVALID, RSVP_EVENT_MISSING, RSVP_FIELDS_REQUIRED,
};
pub use store::{Access, BackendStore, Collection, Filter, MemoryStore, Query, SupabaseStore};
