//! Command implementations.

pub mod auth;
pub mod contacts;
pub mod events;
pub mod guests;
pub mod rsvp;
pub mod serve;

use anyhow::anyhow;
use guest_store::StoreError;
use std::io::{self, Write};

/// Surface the text a user should see for a store failure.
pub(crate) fn user_facing(err: StoreError) -> anyhow::Error {
    anyhow!(err.user_message())
}

/// Read one trimmed line from stdin after showing `label`.
pub(crate) fn prompt(label: &str) -> io::Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
