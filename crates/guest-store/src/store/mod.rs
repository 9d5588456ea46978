//! Backend store abstraction.
//!
//! Rows travel as JSON objects. Row-level rules live in the backend; callers
//! still add the owner filter to every owner-scoped query.

mod memory;
mod supabase;

pub use memory::{Access, MemoryStore};
pub use supabase::SupabaseStore;

use crate::StoreResult;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// Backend tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Events,
    Contacts,
    Rsvps,
    GuestList,
}

impl Collection {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Events => "events",
            Self::Contacts => "contacts",
            Self::Rsvps => "rsvps",
            Self::GuestList => "event_guest_list_contacts",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Eq(String, String),
    In(String, Vec<String>),
}

impl Condition {
    pub fn column(&self) -> &str {
        match self {
            Self::Eq(column, _) | Self::In(column, _) => column,
        }
    }
}

/// Conjunction of column conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<String>) -> Self {
        self.conditions
            .push(Condition::Eq(column.to_string(), value.into()));
        self
    }

    pub fn is_in<I, S>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conditions.push(Condition::In(
            column.to_string(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Value of an equality condition on `column`, if any.
    pub fn eq_value(&self, column: &str) -> Option<&str> {
        self.conditions.iter().find_map(|c| match c {
            Condition::Eq(col, value) if col == column => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub collection: Collection,
    pub filter: Filter,
    /// Empty selects every column.
    pub select: Vec<String>,
    pub order: Option<Order>,
    pub page: Option<Page>,
}

impl Query {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            filter: Filter::new(),
            select: Vec::new(),
            order: None,
            page: None,
        }
    }

    pub fn eq(mut self, column: &str, value: impl Into<String>) -> Self {
        self.filter = self.filter.eq(column, value);
        self
    }

    pub fn is_in<I, S>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter = self.filter.is_in(column, values);
        self
    }

    pub fn select(mut self, columns: &[&str]) -> Self {
        self.select = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.page = Some(Page { limit, offset });
        self
    }
}

#[async_trait]
pub trait BackendStore: Send + Sync {
    async fn query(&self, query: Query) -> StoreResult<Vec<Value>>;

    /// Insert all rows or none, returning them as stored.
    async fn insert(&self, collection: Collection, rows: Vec<Value>) -> StoreResult<Vec<Value>>;

    /// Insert without reading the rows back. Needed where the caller may
    /// write but not read, as with anonymous RSVPs.
    async fn insert_minimal(&self, collection: Collection, rows: Vec<Value>) -> StoreResult<()>;

    /// Apply `patch` to every matching row, returning the updated rows.
    async fn update(
        &self,
        collection: Collection,
        filter: Filter,
        patch: Value,
    ) -> StoreResult<Vec<Value>>;

    /// Delete matching rows, returning how many were removed.
    async fn delete(&self, collection: Collection, filter: Filter) -> StoreResult<u64>;
}

/// Decode rows into a typed model.
pub fn decode_rows<T: serde::de::DeserializeOwned>(rows: Vec<Value>) -> StoreResult<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(Into::into))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builder() {
        let query = Query::new(Collection::Contacts)
            .eq("user_id", "u1")
            .is_in("id", ["a", "b"])
            .select(&["id", "name"])
            .order_by("name", true);

        assert_eq!(query.filter.eq_value("user_id"), Some("u1"));
        assert_eq!(query.filter.eq_value("id"), None);
        assert_eq!(query.filter.conditions.len(), 2);
        assert_eq!(query.select, vec!["id", "name"]);
        assert_eq!(query.order.unwrap().column, "name");
    }

    #[test]
    fn test_table_names() {
        assert_eq!(Collection::GuestList.table(), "event_guest_list_contacts");
        assert_eq!(Collection::Rsvps.to_string(), "rsvps");
    }
}
