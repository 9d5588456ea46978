//! HTTP endpoint telling the sign-in screen whether an email already has an
//! account:
//!
//! `GET /custom/check-email-exists/:email`
//!
//! | Outcome | Status | Body |
//! |---|---|---|
//! | no account | 200 | `{"exists":false}` |
//! | account | 200 | `{"exists":true,"isVerified":bool}` |
//! | blank email | 400 | `{"error":"..."}` |
//! | lookup failure | 500 | `{"error":"..."}` |

mod directory;
mod routes;

pub use directory::{AccountStatus, DirectoryError, StoreDirectory, UserDirectory};
pub use routes::{
    build_router, AppState, CHECK_EMAIL_PATH, EMPTY_EMAIL_ERROR, LOOKUP_FAILED_ERROR,
};

use tokio::net::TcpListener;
use tracing::info;

/// Serve `router` on `listener` until Ctrl-C.
pub async fn serve(listener: TcpListener, router: axum::Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "email check server listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %err, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("email check server shutting down");
        })
        .await
}
