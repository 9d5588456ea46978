use crate::directory::UserDirectory;
use auth_engine::EmailExistence;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

pub const CHECK_EMAIL_PATH: &str = "/custom/check-email-exists";
pub const EMPTY_EMAIL_ERROR: &str = "Email parameter is required and cannot be empty.";
pub const LOOKUP_FAILED_ERROR: &str = "Server error while checking email.";

#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<dyn UserDirectory>,
}

impl AppState {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            &format!("{}/:email", CHECK_EMAIL_PATH),
            get(check_email_exists),
        )
        .route(CHECK_EMAIL_PATH, get(missing_email))
        .route(&format!("{}/", CHECK_EMAIL_PATH), get(missing_email))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn missing_email() -> Response {
    error_response(StatusCode::BAD_REQUEST, EMPTY_EMAIL_ERROR)
}

/// Only the two booleans ever leave this handler; no account details.
async fn check_email_exists(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Response {
    let email = email.trim();
    if email.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, EMPTY_EMAIL_ERROR);
    }

    match state.directory.find_by_email(email).await {
        Ok(Some(account)) => {
            debug!(verified = account.verified, "email lookup: found");
            Json(EmailExistence::found(account.verified)).into_response()
        }
        Ok(None) => {
            debug!("email lookup: not found");
            Json(EmailExistence::missing()).into_response()
        }
        Err(err) => {
            error!(error = %err, "email lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, LOOKUP_FAILED_ERROR)
        }
    }
}
