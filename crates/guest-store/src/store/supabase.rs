//! PostgREST client for the hosted backend.

use super::{BackendStore, Collection, Condition, Filter, Query};
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

const MAX_ERROR_BODY_CHARS: usize = 400;

/// PostgREST error body.
#[derive(Debug, serde::Deserialize)]
struct RestError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Clone)]
pub struct SupabaseStore {
    http_client: reqwest::Client,
    api_url: Url,
    api_key: String,
    /// Bearer for row-level rules. Falls back to the API key, which is
    /// anonymous for a publishable key and unrestricted for a service key.
    access_token: Option<String>,
}

impl SupabaseStore {
    /// Create a client for `api_url` (e.g. `https://xyz.supabase.co`).
    pub fn new(api_url: &Url, api_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.clone(),
            api_key: api_key.into(),
            access_token: None,
        }
    }

    /// Same client acting as the signed-in user.
    pub fn with_access_token(&self, access_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            ..self.clone()
        }
    }

    fn rest_url(&self, collection: Collection) -> StoreResult<Url> {
        let base = self.api_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{}/rest/v1/{}", base, collection.table()))?)
    }

    fn bearer(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.api_key)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.bearer()))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> StoreResult<reqwest::Response> {
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!(status = status.as_u16(), body = %summarize(&body), "backend request failed");
        Err(map_error(status, &body))
    }
}

/// Build the PostgREST URL for a read.
pub(crate) fn query_url(base: Url, query: &Query) -> Url {
    let mut url = base;
    {
        let mut pairs = url.query_pairs_mut();
        let select = if query.select.is_empty() {
            "*".to_string()
        } else {
            query.select.join(",")
        };
        pairs.append_pair("select", &select);
        append_filter(&mut pairs, &query.filter);
        if let Some(order) = &query.order {
            let direction = if order.ascending { "asc" } else { "desc" };
            pairs.append_pair("order", &format!("{}.{}", order.column, direction));
        }
        if let Some(page) = query.page {
            pairs.append_pair("limit", &page.limit.to_string());
            pairs.append_pair("offset", &page.offset.to_string());
        }
    }
    url
}

fn filter_url(base: Url, filter: &Filter) -> Url {
    let mut url = base;
    append_filter(&mut url.query_pairs_mut(), filter);
    url
}

fn append_filter(pairs: &mut url::form_urlencoded::Serializer<'_, url::UrlQuery<'_>>, filter: &Filter) {
    for condition in &filter.conditions {
        match condition {
            Condition::Eq(column, value) => {
                pairs.append_pair(column, &format!("eq.{}", value));
            }
            Condition::In(column, values) => {
                let quoted: Vec<String> = values
                    .iter()
                    .map(|v| format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
                    .collect();
                pairs.append_pair(column, &format!("in.({})", quoted.join(",")));
            }
        }
    }
}

fn summarize(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return trimmed.to_string();
    }
    let truncated: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    format!("{}...", truncated)
}

/// Map a failed PostgREST response onto `StoreError`, keeping the server's
/// message.
pub(crate) fn map_error(status: StatusCode, body: &str) -> StoreError {
    let parsed: Option<RestError> = serde_json::from_str(body).ok();
    let code = parsed.as_ref().and_then(|e| e.code.clone()).unwrap_or_default();
    let message = parsed
        .and_then(|e| e.message.or(e.details))
        .unwrap_or_else(|| summarize(body));

    // 23505 unique_violation, 23503 foreign_key_violation, 42501 RLS.
    match (status, code.as_str()) {
        (_, "23505") | (_, "23503") | (StatusCode::CONFLICT, _) => StoreError::Conflict(message),
        (_, "42501") | (StatusCode::UNAUTHORIZED, _) | (StatusCode::FORBIDDEN, _) => {
            StoreError::Forbidden(message)
        }
        (StatusCode::NOT_FOUND, _) => StoreError::NotFound(message),
        _ => StoreError::Backend {
            status: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl BackendStore for SupabaseStore {
    async fn query(&self, query: Query) -> StoreResult<Vec<Value>> {
        let url = query_url(self.rest_url(query.collection)?, &query);
        debug!(table = query.collection.table(), "backend query");
        let response = self.send(self.request(reqwest::Method::GET, url)).await?;
        Ok(response.json().await?)
    }

    async fn insert(&self, collection: Collection, rows: Vec<Value>) -> StoreResult<Vec<Value>> {
        debug!(table = collection.table(), count = rows.len(), "backend insert");
        let request = self
            .request(reqwest::Method::POST, self.rest_url(collection)?)
            .header("Prefer", "return=representation")
            .json(&rows);
        Ok(self.send(request).await?.json().await?)
    }

    async fn insert_minimal(&self, collection: Collection, rows: Vec<Value>) -> StoreResult<()> {
        debug!(table = collection.table(), count = rows.len(), "backend insert");
        let request = self
            .request(reqwest::Method::POST, self.rest_url(collection)?)
            .header("Prefer", "return=minimal")
            .json(&rows);
        self.send(request).await?;
        Ok(())
    }

    async fn update(
        &self,
        collection: Collection,
        filter: Filter,
        patch: Value,
    ) -> StoreResult<Vec<Value>> {
        if filter.is_empty() {
            return Err(StoreError::Validation(
                "Refusing to update without a filter".to_string(),
            ));
        }
        debug!(table = collection.table(), "backend update");
        let url = filter_url(self.rest_url(collection)?, &filter);
        let request = self
            .request(reqwest::Method::PATCH, url)
            .header("Prefer", "return=representation")
            .json(&patch);
        Ok(self.send(request).await?.json().await?)
    }

    async fn delete(&self, collection: Collection, filter: Filter) -> StoreResult<u64> {
        if filter.is_empty() {
            return Err(StoreError::Validation(
                "Refusing to delete without a filter".to_string(),
            ));
        }
        debug!(table = collection.table(), "backend delete");
        let url = filter_url(self.rest_url(collection)?, &filter);
        let request = self
            .request(reqwest::Method::DELETE, url)
            .header("Prefer", "return=representation");
        let removed: Vec<Value> = self.send(request).await?.json().await?;
        Ok(removed.len() as u64)
    }
}

impl std::fmt::Debug for SupabaseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseStore")
            .field("api_url", &self.api_url.as_str())
            .field("authenticated", &self.access_token.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SupabaseStore {
        SupabaseStore::new(&Url::parse("https://test.supabase.co/").unwrap(), "anon")
    }

    #[test]
    fn test_rest_url() {
        assert_eq!(
            store().rest_url(Collection::GuestList).unwrap().as_str(),
            "https://test.supabase.co/rest/v1/event_guest_list_contacts"
        );
    }

    #[test]
    fn test_query_url_encodes_filters() {
        let query = Query::new(Collection::Contacts)
            .eq("user_id", "u1")
            .is_in("id", ["a", "b"])
            .order_by("name", true);
        let url = query_url(store().rest_url(Collection::Contacts).unwrap(), &query);

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("select".to_string(), "*".to_string()),
                ("user_id".to_string(), "eq.u1".to_string()),
                ("id".to_string(), "in.(\"a\",\"b\")".to_string()),
                ("order".to_string(), "name.asc".to_string()),
            ]
        );
    }

    #[test]
    fn test_query_url_select_and_page() {
        let query = Query::new(Collection::Events)
            .select(&["id", "name"])
            .page(10, 20);
        let url = query_url(store().rest_url(Collection::Events).unwrap(), &query);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("select".to_string(), "id,name".to_string())));
        assert!(pairs.contains(&("limit".to_string(), "10".to_string())));
        assert!(pairs.contains(&("offset".to_string(), "20".to_string())));
    }

    #[test]
    fn test_unique_violation_is_conflict() {
        let body = r#"{"code":"23505","message":"duplicate key value violates unique constraint \"event_guest_list_contacts_pkey\"","details":null}"#;
        match map_error(StatusCode::CONFLICT, body) {
            StoreError::Conflict(message) => assert!(message.starts_with("duplicate key")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rls_violation_is_forbidden() {
        let body = r#"{"code":"42501","message":"new row violates row-level security policy for table \"contacts\""}"#;
        assert!(matches!(
            map_error(StatusCode::FORBIDDEN, body),
            StoreError::Forbidden(_)
        ));
    }

    #[test]
    fn test_unstructured_error_body() {
        match map_error(StatusCode::BAD_GATEWAY, "upstream unavailable") {
            StoreError::Backend { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream unavailable");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_with_access_token_keeps_key() {
        let authed = store().with_access_token("jwt");
        assert_eq!(authed.bearer(), "jwt");
        assert_eq!(store().bearer(), "anon");
    }
}
