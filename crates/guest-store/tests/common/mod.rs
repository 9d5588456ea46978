#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use guest_store::{
    BackendStore, Collection, ContactsRepo, EventsRepo, Filter, MemoryStore, NewContact, NewEvent,
    Query, StoreError, StoreResult,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const HOST: &str = "host-1";

/// Wraps a store and counts every call that reaches it.
pub struct CountingStore<S> {
    inner: S,
    calls: AtomicUsize,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S: BackendStore> BackendStore for CountingStore<S> {
    async fn query(&self, query: Query) -> StoreResult<Vec<Value>> {
        self.tick();
        self.inner.query(query).await
    }

    async fn insert(&self, collection: Collection, rows: Vec<Value>) -> StoreResult<Vec<Value>> {
        self.tick();
        self.inner.insert(collection, rows).await
    }

    async fn insert_minimal(&self, collection: Collection, rows: Vec<Value>) -> StoreResult<()> {
        self.tick();
        self.inner.insert_minimal(collection, rows).await
    }

    async fn update(
        &self,
        collection: Collection,
        filter: Filter,
        patch: Value,
    ) -> StoreResult<Vec<Value>> {
        self.tick();
        self.inner.update(collection, filter, patch).await
    }

    async fn delete(&self, collection: Collection, filter: Filter) -> StoreResult<u64> {
        self.tick();
        self.inner.delete(collection, filter).await
    }
}

/// Wraps a store, records every query and can fail guest-list reads.
pub struct FlakyStore<S> {
    inner: S,
    fail_guest_list: AtomicBool,
    queries: Mutex<Vec<Query>>,
}

impl<S> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_guest_list: AtomicBool::new(false),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_guest_list(&self, fail: bool) {
        self.fail_guest_list.store(fail, Ordering::SeqCst);
    }

    pub fn queries_of(&self, collection: Collection) -> Vec<Query> {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.collection == collection)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl<S: BackendStore> BackendStore for FlakyStore<S> {
    async fn query(&self, query: Query) -> StoreResult<Vec<Value>> {
        self.queries.lock().unwrap().push(query.clone());
        if query.collection == Collection::GuestList && self.fail_guest_list.load(Ordering::SeqCst) {
            return Err(StoreError::Backend {
                status: 503,
                message: "down".to_string(),
            });
        }
        self.inner.query(query).await
    }

    async fn insert(&self, collection: Collection, rows: Vec<Value>) -> StoreResult<Vec<Value>> {
        self.inner.insert(collection, rows).await
    }

    async fn insert_minimal(&self, collection: Collection, rows: Vec<Value>) -> StoreResult<()> {
        self.inner.insert_minimal(collection, rows).await
    }

    async fn update(
        &self,
        collection: Collection,
        filter: Filter,
        patch: Value,
    ) -> StoreResult<Vec<Value>> {
        self.inner.update(collection, filter, patch).await
    }

    async fn delete(&self, collection: Collection, filter: Filter) -> StoreResult<u64> {
        self.inner.delete(collection, filter).await
    }
}

pub fn host_store(store: &MemoryStore) -> Arc<dyn BackendStore> {
    Arc::new(store.as_user(HOST))
}

pub async fn create_event(store: &MemoryStore, name: &str) -> String {
    EventsRepo::new(host_store(store))
        .create(
            HOST,
            NewEvent {
                name: name.to_string(),
                event_date: Some(Utc.with_ymd_and_hms(2026, 9, 12, 19, 0, 0).unwrap()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .id
}

pub async fn create_contacts(store: &MemoryStore, names: &[&str]) -> Vec<String> {
    let contacts = ContactsRepo::new(host_store(store));
    let mut ids = Vec::new();
    for name in names {
        let contact = contacts
            .create(
                HOST,
                NewContact::new(*name).with_email(format!("{}@x.com", name.to_lowercase())),
            )
            .await
            .unwrap();
        ids.push(contact.id);
    }
    ids
}
