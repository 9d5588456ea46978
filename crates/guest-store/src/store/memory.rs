//! In-process backend with the hosted row-level rules and constraints.
//!
//! Handles share one set of tables; each handle acts with its own
//! [`Access`]. Used by tests and by the existence endpoint's offline mode.

use super::{BackendStore, Collection, Condition, Filter, Query};
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

type Row = Map<String, Value>;

/// Who a [`MemoryStore`] handle acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Anonymous,
    User(String),
    /// Service role: rules do not apply.
    Service,
}

#[derive(Default)]
struct Tables {
    rows: HashMap<Collection, Vec<Row>>,
}

impl Tables {
    fn table(&self, collection: Collection) -> &[Row] {
        self.rows.get(&collection).map(Vec::as_slice).unwrap_or(&[])
    }

    fn table_mut(&mut self, collection: Collection) -> &mut Vec<Row> {
        self.rows.entry(collection).or_default()
    }

    fn event_owner(&self, event_id: &str) -> Option<String> {
        self.table(Collection::Events)
            .iter()
            .find(|row| text(row, "id").as_deref() == Some(event_id))
            .and_then(|row| text(row, "user_id"))
    }

    fn exists(&self, collection: Collection, id: &str) -> bool {
        self.table(collection)
            .iter()
            .any(|row| text(row, "id").as_deref() == Some(id))
    }
}

#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    access: Access,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store with a service-role handle.
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            access: Access::Service,
        }
    }

    /// Handle on the same tables acting as `access`.
    pub fn with_access(&self, access: Access) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
            access,
        }
    }

    pub fn as_user(&self, user_id: impl Into<String>) -> Self {
        self.with_access(Access::User(user_id.into()))
    }

    pub fn anonymous(&self) -> Self {
        self.with_access(Access::Anonymous)
    }

    pub fn access(&self) -> &Access {
        &self.access
    }

    /// Add an account row, returning its id.
    pub fn seed_user(&self, email: &str, verified: bool) -> String {
        let id = Uuid::new_v4().to_string();
        let mut row = Row::new();
        row.insert("id".to_string(), Value::String(id.clone()));
        row.insert("email".to_string(), Value::String(email.to_string()));
        row.insert("verified".to_string(), Value::Bool(verified));
        row.insert("created_at".to_string(), Value::String(now()));
        self.lock().table_mut(Collection::Users).push(row);
        id
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn user_id(&self) -> Option<&str> {
        match &self.access {
            Access::User(id) => Some(id),
            _ => None,
        }
    }

    /// Read rule for one row.
    fn can_read(&self, tables: &Tables, collection: Collection, row: &Row, filter: &Filter) -> bool {
        if self.access == Access::Service {
            return true;
        }
        let user_id = self.user_id();
        match collection {
            Collection::Users => user_id.is_some() && text(row, "id").as_deref() == user_id,
            Collection::Contacts => user_id.is_some() && text(row, "user_id").as_deref() == user_id,
            Collection::Events => {
                // Anyone holding an event id may read it.
                filter.eq_value("id").is_some()
                    || (user_id.is_some() && text(row, "user_id").as_deref() == user_id)
            }
            Collection::Rsvps | Collection::GuestList => {
                let owner = text(row, "event_id").and_then(|id| tables.event_owner(&id));
                user_id.is_some() && owner.as_deref() == user_id
            }
        }
    }

    /// Write rule for one row (insert, update or delete).
    fn can_write(&self, tables: &Tables, collection: Collection, row: &Row) -> bool {
        if self.access == Access::Service {
            return true;
        }
        let user_id = self.user_id();
        match collection {
            Collection::Users => false,
            Collection::Contacts | Collection::Events => {
                user_id.is_some() && text(row, "user_id").as_deref() == user_id
            }
            Collection::Rsvps => true,
            Collection::GuestList => {
                let owner = text(row, "event_id").and_then(|id| tables.event_owner(&id));
                user_id.is_some() && owner.as_deref() == user_id
            }
        }
    }

    fn prepare_insert(
        &self,
        tables: &Tables,
        collection: Collection,
        rows: Vec<Value>,
    ) -> StoreResult<Vec<Row>> {
        let mut prepared: Vec<Row> = Vec::with_capacity(rows.len());
        for value in rows {
            let Value::Object(mut row) = value else {
                return Err(StoreError::Backend {
                    status: 400,
                    message: "Row must be a JSON object".to_string(),
                });
            };
            fill_defaults(collection, &mut row);
            check_not_null(collection, &row)?;

            if !self.can_write(tables, collection, &row) {
                return Err(rls_violation(collection));
            }
            check_references(tables, collection, &row)?;
            check_unique(tables, collection, &row, &prepared)?;
            prepared.push(row);
        }
        Ok(prepared)
    }

    /// Check every row, then store them all. With `read_back` the caller
    /// must also be allowed to read the new rows.
    fn insert_rows(
        &self,
        collection: Collection,
        rows: Vec<Value>,
        read_back: bool,
    ) -> StoreResult<Vec<Row>> {
        let mut tables = self.lock();
        let prepared = self.prepare_insert(&tables, collection, rows)?;
        if read_back
            && prepared
                .iter()
                .any(|row| !self.can_read(&tables, collection, row, &Filter::new()))
        {
            return Err(rls_violation(collection));
        }
        tables.table_mut(collection).extend(prepared.iter().cloned());
        debug!(table = collection.table(), count = prepared.len(), "memory insert");
        Ok(prepared)
    }
}

#[async_trait]
impl BackendStore for MemoryStore {
    async fn query(&self, query: Query) -> StoreResult<Vec<Value>> {
        let tables = self.lock();
        let mut rows: Vec<&Row> = tables
            .table(query.collection)
            .iter()
            .filter(|row| matches(row, &query.filter))
            .filter(|row| self.can_read(&tables, query.collection, row, &query.filter))
            .collect();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ordering = compare(a.get(&order.column), b.get(&order.column));
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        let rows = rows.into_iter();
        let rows: Vec<&Row> = match query.page {
            Some(page) => rows.skip(page.offset).take(page.limit).collect(),
            None => rows.collect(),
        };

        Ok(rows
            .into_iter()
            .map(|row| Value::Object(project(row, &query.select)))
            .collect())
    }

    async fn insert(&self, collection: Collection, rows: Vec<Value>) -> StoreResult<Vec<Value>> {
        let inserted = self.insert_rows(collection, rows, true)?;
        Ok(inserted.into_iter().map(Value::Object).collect())
    }

    async fn insert_minimal(&self, collection: Collection, rows: Vec<Value>) -> StoreResult<()> {
        self.insert_rows(collection, rows, false)?;
        Ok(())
    }

    async fn update(
        &self,
        collection: Collection,
        filter: Filter,
        patch: Value,
    ) -> StoreResult<Vec<Value>> {
        let Value::Object(patch) = patch else {
            return Err(StoreError::Backend {
                status: 400,
                message: "Patch must be a JSON object".to_string(),
            });
        };

        let mut tables = self.lock();
        let targets: Vec<usize> = tables
            .table(collection)
            .iter()
            .enumerate()
            .filter(|(_, row)| matches(row, &filter))
            .filter(|(_, row)| self.can_read(&tables, collection, row, &filter))
            .filter(|(_, row)| self.can_write(&tables, collection, row))
            .map(|(index, _)| index)
            .collect();

        let table = tables.table_mut(collection);
        let mut updated = Vec::with_capacity(targets.len());
        for index in targets {
            let row = &mut table[index];
            for (key, value) in &patch {
                row.insert(key.clone(), value.clone());
            }
            updated.push(Value::Object(row.clone()));
        }
        debug!(table = collection.table(), count = updated.len(), "memory update");
        Ok(updated)
    }

    async fn delete(&self, collection: Collection, filter: Filter) -> StoreResult<u64> {
        let mut tables = self.lock();
        let doomed: Vec<Row> = tables
            .table(collection)
            .iter()
            .filter(|row| matches(row, &filter))
            .filter(|row| self.can_read(&tables, collection, row, &filter))
            .filter(|row| self.can_write(&tables, collection, row))
            .cloned()
            .collect();

        let doomed_ids: Vec<String> = doomed.iter().filter_map(|row| text(row, "id")).collect();
        let before = tables.table(collection).len();
        tables
            .table_mut(collection)
            .retain(|row| !doomed.contains(row));
        let removed = (before - tables.table(collection).len()) as u64;

        cascade(&mut tables, collection, &doomed_ids);
        debug!(table = collection.table(), removed, "memory delete");
        Ok(removed)
    }
}

/// ON DELETE CASCADE for the foreign keys between tables.
fn cascade(tables: &mut Tables, collection: Collection, ids: &[String]) {
    if ids.is_empty() {
        return;
    }
    let references: &[(Collection, &str)] = match collection {
        Collection::Contacts => &[(Collection::GuestList, "contact_id")],
        Collection::Events => &[(Collection::GuestList, "event_id"), (Collection::Rsvps, "event_id")],
        _ => &[],
    };
    for (child, column) in references {
        tables.table_mut(*child).retain(|row| {
            text(row, column)
                .map(|value| !ids.contains(&value))
                .unwrap_or(true)
        });
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn fill_defaults(collection: Collection, row: &mut Row) {
    let mut default = |key: &str, value: Value| {
        if row.get(key).map(Value::is_null).unwrap_or(true) {
            row.insert(key.to_string(), value);
        }
    };
    match collection {
        Collection::GuestList => {
            default("status", Value::String(crate::INVITED_STATUS.to_string()));
            default("added_at", Value::String(now()));
        }
        Collection::Rsvps => {
            default("id", Value::String(Uuid::new_v4().to_string()));
            default("submitted_at", Value::String(now()));
        }
        Collection::Events => {
            default("id", Value::String(Uuid::new_v4().to_string()));
            default("is_public", Value::Bool(true));
            default("created_at", Value::String(now()));
        }
        Collection::Contacts => {
            default("id", Value::String(Uuid::new_v4().to_string()));
            default("source", Value::String("manual".to_string()));
            default("created_at", Value::String(now()));
            default("updated_at", Value::Null);
        }
        Collection::Users => {
            default("id", Value::String(Uuid::new_v4().to_string()));
            default("verified", Value::Bool(false));
            default("created_at", Value::String(now()));
        }
    }
}

fn required_columns(collection: Collection) -> &'static [&'static str] {
    match collection {
        Collection::Users => &["email"],
        Collection::Events => &["user_id", "name"],
        Collection::Contacts => &["user_id", "name"],
        Collection::Rsvps => &["event_id", "name", "email", "status"],
        Collection::GuestList => &["event_id", "contact_id"],
    }
}

fn check_not_null(collection: Collection, row: &Row) -> StoreResult<()> {
    for column in required_columns(collection) {
        if row.get(*column).map(Value::is_null).unwrap_or(true) {
            return Err(StoreError::Backend {
                status: 400,
                message: format!(
                    "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                    column,
                    collection.table()
                ),
            });
        }
    }
    Ok(())
}

fn check_references(tables: &Tables, collection: Collection, row: &Row) -> StoreResult<()> {
    let references: &[(&str, Collection)] = match collection {
        Collection::Rsvps => &[("event_id", Collection::Events)],
        Collection::GuestList => &[("event_id", Collection::Events), ("contact_id", Collection::Contacts)],
        _ => &[],
    };
    for (column, parent) in references {
        let present = text(row, column)
            .map(|id| tables.exists(*parent, &id))
            .unwrap_or(false);
        if !present {
            return Err(StoreError::Conflict(format!(
                "insert or update on table \"{}\" violates foreign key constraint on \"{}\"",
                collection.table(),
                column
            )));
        }
    }
    Ok(())
}

fn unique_key(collection: Collection, row: &Row) -> Option<Vec<String>> {
    let columns: &[&str] = match collection {
        Collection::GuestList => &["event_id", "contact_id"],
        Collection::Users => &["email"],
        _ => &["id"],
    };
    columns.iter().map(|column| text(row, column)).collect()
}

fn check_unique(tables: &Tables, collection: Collection, row: &Row, pending: &[Row]) -> StoreResult<()> {
    let Some(key) = unique_key(collection, row) else {
        return Ok(());
    };
    let clash = tables
        .table(collection)
        .iter()
        .chain(pending)
        .any(|existing| unique_key(collection, existing).as_ref() == Some(&key));
    if clash {
        return Err(StoreError::Conflict(format!(
            "duplicate key value violates unique constraint \"{}_pkey\"",
            collection.table()
        )));
    }
    Ok(())
}

fn rls_violation(collection: Collection) -> StoreError {
    StoreError::Forbidden(format!(
        "new row violates row-level security policy for table \"{}\"",
        collection.table()
    ))
}

/// Column value as PostgREST compares it: text.
fn text(row: &Row, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn matches(row: &Row, filter: &Filter) -> bool {
    filter.conditions.iter().all(|condition| match condition {
        Condition::Eq(column, value) => text(row, column).as_deref() == Some(value.as_str()),
        Condition::In(column, values) => text(row, column)
            .map(|v| values.contains(&v))
            .unwrap_or(false),
    })
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        // Nulls sort last, as in Postgres ascending order.
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Greater,
        (_, None | Some(Value::Null)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

fn project(row: &Row, select: &[String]) -> Row {
    if select.is_empty() {
        return row.clone();
    }
    select
        .iter()
        .map(|column| (column.clone(), row.get(column).cloned().unwrap_or(Value::Null)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn seed_event(store: &MemoryStore, owner: &str) -> String {
        let rows = store
            .as_user(owner)
            .insert(Collection::Events, vec![json!({"user_id": owner, "name": "Launch"})])
            .await
            .unwrap();
        rows[0]["id"].as_str().unwrap().to_string()
    }

    async fn seed_contact(store: &MemoryStore, owner: &str, name: &str) -> String {
        let rows = store
            .as_user(owner)
            .insert(Collection::Contacts, vec![json!({"user_id": owner, "name": name})])
            .await
            .unwrap();
        rows[0]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_insert_fills_defaults() {
        let store = MemoryStore::new();
        let rows = store
            .as_user("u1")
            .insert(Collection::Contacts, vec![json!({"user_id": "u1", "name": "Alice"})])
            .await
            .unwrap();
        let row = &rows[0];
        assert!(row["id"].is_string());
        assert_eq!(row["source"], "manual");
        assert!(row["created_at"].is_string());
        assert!(row["updated_at"].is_null());
    }

    #[tokio::test]
    async fn test_contacts_are_owner_scoped() {
        let store = MemoryStore::new();
        seed_contact(&store, "u1", "Alice").await;
        seed_contact(&store, "u2", "Mallory").await;

        let visible = store
            .as_user("u1")
            .query(Query::new(Collection::Contacts))
            .await
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0]["name"], "Alice");

        let err = store
            .as_user("u1")
            .insert(Collection::Contacts, vec![json!({"user_id": "u2", "name": "Eve"})])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));

        let anonymous = store
            .anonymous()
            .query(Query::new(Collection::Contacts))
            .await
            .unwrap();
        assert!(anonymous.is_empty());
    }

    #[tokio::test]
    async fn test_events_readable_by_id_only() {
        let store = MemoryStore::new();
        let event_id = seed_event(&store, "u1").await;

        let by_id = store
            .anonymous()
            .query(Query::new(Collection::Events).eq("id", event_id.clone()))
            .await
            .unwrap();
        assert_eq!(by_id.len(), 1);

        let listing = store
            .as_user("u2")
            .query(Query::new(Collection::Events))
            .await
            .unwrap();
        assert!(listing.is_empty());
    }

    #[tokio::test]
    async fn test_rsvps_insert_anyone_read_owner() {
        let store = MemoryStore::new();
        let event_id = seed_event(&store, "u1").await;
        let rsvp = json!({"event_id": event_id, "name": "Carl", "email": "carl@x.com", "status": "attending"});

        // Anonymous may write but not read back.
        let err = store
            .anonymous()
            .insert(Collection::Rsvps, vec![rsvp.clone()])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));
        store
            .anonymous()
            .insert_minimal(Collection::Rsvps, vec![rsvp])
            .await
            .unwrap();

        let owner_view = store
            .as_user("u1")
            .query(Query::new(Collection::Rsvps).eq("event_id", event_id.clone()))
            .await
            .unwrap();
        let stranger_view = store
            .as_user("u2")
            .query(Query::new(Collection::Rsvps).eq("event_id", event_id))
            .await
            .unwrap();
        assert_eq!(owner_view.len(), 1);
        assert!(stranger_view.is_empty());
    }

    #[tokio::test]
    async fn test_guest_list_uniqueness_is_atomic() {
        let store = MemoryStore::new();
        let event_id = seed_event(&store, "u1").await;
        let a = seed_contact(&store, "u1", "Alice").await;
        let b = seed_contact(&store, "u1", "Bob").await;
        let owner = store.as_user("u1");

        owner
            .insert(Collection::GuestList, vec![json!({"event_id": event_id, "contact_id": a})])
            .await
            .unwrap();

        let err = owner
            .insert(
                Collection::GuestList,
                vec![
                    json!({"event_id": event_id, "contact_id": b}),
                    json!({"event_id": event_id, "contact_id": a}),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let rows = owner
            .query(Query::new(Collection::GuestList).eq("event_id", event_id))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["status"], "Invited");
    }

    #[tokio::test]
    async fn test_guest_list_requires_event_owner() {
        let store = MemoryStore::new();
        let event_id = seed_event(&store, "u1").await;
        let c = seed_contact(&store, "u2", "Mallory").await;

        let err = store
            .as_user("u2")
            .insert(Collection::GuestList, vec![json!({"event_id": event_id, "contact_id": c})])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_delete_reports_affected_rows_and_cascades() {
        let store = MemoryStore::new();
        let event_id = seed_event(&store, "u1").await;
        let a = seed_contact(&store, "u1", "Alice").await;
        let owner = store.as_user("u1");
        owner
            .insert(Collection::GuestList, vec![json!({"event_id": event_id, "contact_id": a})])
            .await
            .unwrap();

        let removed = owner
            .delete(Collection::Contacts, Filter::new().eq("id", a.clone()))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        let again = owner
            .delete(Collection::Contacts, Filter::new().eq("id", a))
            .await
            .unwrap();
        assert_eq!(again, 0);

        let entries = owner
            .query(Query::new(Collection::GuestList).eq("event_id", event_id))
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_update_only_touches_owned_rows() {
        let store = MemoryStore::new();
        let a = seed_contact(&store, "u1", "Alice").await;

        let stolen = store
            .as_user("u2")
            .update(Collection::Contacts, Filter::new().eq("id", a.clone()), json!({"name": "Eve"}))
            .await
            .unwrap();
        assert!(stolen.is_empty());

        let updated = store
            .as_user("u1")
            .update(Collection::Contacts, Filter::new().eq("id", a), json!({"name": "Alicia"}))
            .await
            .unwrap();
        assert_eq!(updated[0]["name"], "Alicia");
    }

    #[tokio::test]
    async fn test_order_select_and_page() {
        let store = MemoryStore::new();
        for name in ["Carol", "alice", "Bob"] {
            seed_contact(&store, "u1", name).await;
        }
        let rows = store
            .as_user("u1")
            .query(
                Query::new(Collection::Contacts)
                    .select(&["name"])
                    .order_by("name", true)
                    .page(2, 0),
            )
            .await
            .unwrap();
        assert_eq!(rows, vec![json!({"name": "Bob"}), json!({"name": "Carol"})]);
    }

    #[tokio::test]
    async fn test_users_hidden_except_to_service() {
        let store = MemoryStore::new();
        store.seed_user("u@x.com", true);

        let as_anon = store
            .anonymous()
            .query(Query::new(Collection::Users).eq("email", "u@x.com"))
            .await
            .unwrap();
        assert!(as_anon.is_empty());

        let as_service = store
            .query(Query::new(Collection::Users).eq("email", "u@x.com"))
            .await
            .unwrap();
        assert_eq!(as_service[0]["verified"], true);
    }
}
