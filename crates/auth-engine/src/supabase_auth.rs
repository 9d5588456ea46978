//! GoTrue (Supabase Auth) implementation of [`AuthProvider`].

use crate::provider::{
    AuthProvider, AuthSession, Identity, OAuthProvider, OtpChallenge, ProviderCapabilities,
    SignUpOutcome,
};
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{debug, warn};
use url::Url;

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Pull the human-readable message out of a GoTrue error body.
fn provider_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["msg", "error_description", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .filter(|msg| !msg.trim().is_empty())
}

#[derive(Debug, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<UserMetadata>,
}

impl From<UserResponse> for Identity {
    fn from(user: UserResponse) -> Self {
        let (display_name, avatar_url) = match user.user_metadata {
            Some(meta) => (meta.full_name.or(meta.name), meta.avatar_url),
            None => (None, None),
        };
        Identity {
            id: user.id,
            email: user.email,
            display_name,
            avatar_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: UserResponse,
}

impl From<TokenResponse> for AuthSession {
    fn from(token: TokenResponse) -> Self {
        AuthSession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
            identity: token.user.into(),
        }
    }
}

#[derive(Clone)]
pub struct SupabaseAuthProvider {
    http_client: Client,
    api_url: String,
    publishable_key: String,
}

impl SupabaseAuthProvider {
    pub fn new(api_url: &Url, publishable_key: &str) -> Self {
        Self {
            http_client: Client::new(),
            api_url: api_url.as_str().trim_end_matches('/').to_string(),
            publishable_key: publishable_key.to_string(),
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.api_url, path)
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.publishable_key)
            .header("Accept", "application/json")
    }

    /// Send and return the body, mapping failures to `on_error`.
    async fn send(
        &self,
        operation: &'static str,
        builder: RequestBuilder,
        on_error: fn(StatusCode, String) -> AuthError,
    ) -> AuthResult<String> {
        let response: Response = self.request(builder).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            debug!(operation, status = %status, "auth request succeeded");
            return Ok(body);
        }

        warn!(
            operation,
            status = %status,
            body_summary = %summarize_response_body(&body),
            "auth request failed"
        );
        let message = provider_message(&body).unwrap_or_default();
        Err(on_error(status, message))
    }
}

fn provider_error(status: StatusCode, message: String) -> AuthError {
    if status.is_server_error() {
        return AuthError::Unavailable(status.as_u16());
    }
    AuthError::Provider(message)
}

fn credentials_error(status: StatusCode, message: String) -> AuthError {
    if status.is_server_error() {
        return AuthError::Unavailable(status.as_u16());
    }
    AuthError::InvalidCredentials(message)
}

fn session_error(status: StatusCode, message: String) -> AuthError {
    if status.is_server_error() {
        return AuthError::Unavailable(status.as_u16());
    }
    AuthError::SessionInvalid(format!("HTTP {}: {}", status.as_u16(), message))
}

fn refresh_error(status: StatusCode, message: String) -> AuthError {
    if status.is_server_error() {
        return AuthError::Unavailable(status.as_u16());
    }
    AuthError::TokenRefresh(format!("HTTP {}: {}", status.as_u16(), message))
}

#[async_trait]
impl AuthProvider for SupabaseAuthProvider {
    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::all()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        let builder = self
            .http_client
            .post(self.auth_url("token?grant_type=password"))
            .json(&json!({ "email": email, "password": password }));
        let body = self.send("password_sign_in", builder, credentials_error).await?;
        let token: TokenResponse = serde_json::from_str(&body)?;
        Ok(token.into())
    }

    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<SignUpOutcome> {
        let builder = self
            .http_client
            .post(self.auth_url("signup"))
            .json(&json!({ "email": email, "password": password }));
        let body = self.send("sign_up", builder, provider_error).await?;

        // With email confirmation enabled GoTrue returns only the user.
        let value: Value = serde_json::from_str(&body)?;
        if value.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(value)?;
            return Ok(SignUpOutcome::SignedIn(token.into()));
        }
        Ok(SignUpOutcome::VerificationRequired)
    }

    async fn send_magic_link(&self, email: &str, redirect_to: Option<&str>) -> AuthResult<()> {
        let mut builder = self
            .http_client
            .post(self.auth_url("otp"))
            .json(&json!({ "email": email, "create_user": true }));
        if let Some(redirect_to) = redirect_to {
            builder = builder.query(&[("redirect_to", redirect_to)]);
        }
        self.send("magic_link", builder, provider_error).await?;
        Ok(())
    }

    async fn request_otp(&self, email: &str) -> AuthResult<OtpChallenge> {
        let builder = self
            .http_client
            .post(self.auth_url("otp"))
            .json(&json!({ "email": email, "create_user": false }));
        let body = self.send("request_otp", builder, provider_error).await?;

        let otp_id = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message_id").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| email.to_string());
        Ok(OtpChallenge {
            otp_id,
            email: email.to_string(),
        })
    }

    async fn verify_otp(&self, challenge: &OtpChallenge, code: &str) -> AuthResult<AuthSession> {
        let builder = self.http_client.post(self.auth_url("verify")).json(&json!({
            "type": "email",
            "email": challenge.email,
            "token": code,
        }));
        let body = self.send("verify_otp", builder, credentials_error).await?;
        let token: TokenResponse = serde_json::from_str(&body)?;
        Ok(token.into())
    }

    fn oauth_authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> AuthResult<String> {
        let url = Url::parse_with_params(
            &self.auth_url("authorize"),
            &[("provider", provider.as_str()), ("redirect_to", redirect_to)],
        )?;
        Ok(url.into())
    }

    async fn fetch_user(&self, access_token: &str) -> AuthResult<Identity> {
        let builder = self
            .http_client
            .get(self.auth_url("user"))
            .bearer_auth(access_token);
        let body = self.send("fetch_user", builder, session_error).await?;
        let user: UserResponse = serde_json::from_str(&body)?;
        Ok(user.into())
    }

    async fn refresh_session(&self, refresh_token: &str) -> AuthResult<AuthSession> {
        let builder = self
            .http_client
            .post(self.auth_url("token?grant_type=refresh_token"))
            .json(&json!({ "refresh_token": refresh_token }));
        let body = self.send("refresh", builder, refresh_error).await?;
        let token: TokenResponse = serde_json::from_str(&body)?;
        Ok(token.into())
    }

    async fn sign_out(&self, access_token: &str) -> AuthResult<()> {
        let builder = self
            .http_client
            .post(self.auth_url("logout"))
            .bearer_auth(access_token);
        self.send("sign_out", builder, session_error).await?;
        Ok(())
    }
}
