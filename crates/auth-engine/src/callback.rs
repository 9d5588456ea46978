//! Loopback listener that completes magic-link and OAuth sign-ins.
//!
//! The provider redirects the browser to `http://127.0.0.1:<port>/callback`
//! with the tokens in the URL fragment, which browsers never send to the
//! server. The first request is answered with a relay page that reloads
//! itself with the fragment moved into the query string; the second request
//! carries the tokens.

use crate::session::RedirectTokens;
use crate::{AuthError, AuthResult};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

pub const DEFAULT_REDIRECT_TIMEOUT: Duration = Duration::from_secs(300);

const CALLBACK_PATH: &str = "/callback";

const RELAY_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Guestlist - Signing in</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<p>Finishing sign-in...</p>
<script>
if (window.location.hash.length > 1) {
  window.location.replace("/callback?" + window.location.hash.substring(1));
} else {
  document.body.innerHTML = "<p>Nothing to do here. Return to the terminal.</p>";
}
</script>
</body>
</html>"#;

fn result_page(title: &str, detail: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Guestlist - {title}</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px;">
<h1>{title}</h1>
<p>{detail}</p>
</body>
</html>"#
    )
}

/// What one request to the listener amounted to.
#[derive(Debug, PartialEq)]
enum CallbackOutcome {
    /// Not the final redirect yet; keep listening.
    Pending,
    Tokens(RedirectTokens),
    Failed(String),
}

fn parse_callback_query(query: &str) -> CallbackOutcome {
    let params: HashMap<String, String> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();

    if let Some(error) = params.get("error") {
        let description = params
            .get("error_description")
            .cloned()
            .unwrap_or_else(|| error.clone());
        return CallbackOutcome::Failed(description);
    }

    match (params.get("access_token"), params.get("refresh_token")) {
        (Some(access_token), Some(refresh_token)) => CallbackOutcome::Tokens(RedirectTokens {
            access_token: access_token.clone(),
            refresh_token: refresh_token.clone(),
            expires_in: params
                .get("expires_in")
                .and_then(|s| s.parse().ok())
                .unwrap_or(3600),
        }),
        (None, None) => CallbackOutcome::Pending,
        _ => CallbackOutcome::Failed("Missing required parameters".to_string()),
    }
}

pub struct RedirectListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl RedirectListener {
    /// Bind on loopback. Port 0 picks a free port.
    pub async fn bind(port: u16) -> AuthResult<Self> {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AuthError::OAuth(format!("Failed to bind to {}: {}", addr, e)))?;
        let local_addr = listener.local_addr()?;
        info!(port = local_addr.port(), "redirect listener ready");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn callback_url(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.local_addr.port(), CALLBACK_PATH)
    }

    /// Serve requests until the tokens arrive, the provider reports an
    /// error, or `timeout` elapses.
    pub async fn wait_for_tokens(self, timeout: Duration) -> AuthResult<RedirectTokens> {
        let serve = async {
            loop {
                let mut socket = match self.listener.accept().await {
                    Ok((socket, _)) => socket,
                    Err(err) => return Err(AuthError::Io(err)),
                };
                match handle_connection(&mut socket).await {
                    Ok(CallbackOutcome::Pending) => continue,
                    Ok(CallbackOutcome::Tokens(tokens)) => return Ok(tokens),
                    Ok(CallbackOutcome::Failed(message)) => return Err(AuthError::OAuth(message)),
                    Err(err) => warn!(error = %err, "redirect request failed"),
                }
            }
        };

        tokio::time::timeout(timeout, serve)
            .await
            .map_err(|_| AuthError::Timeout)?
    }
}

async fn handle_connection(socket: &mut TcpStream) -> AuthResult<CallbackOutcome> {
    let (reader, mut writer) = socket.split();
    let mut reader = BufReader::new(reader);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();
    debug!(method, path = target.split('?').next().unwrap_or_default(), "redirect request");

    if method != "GET" {
        send_response(&mut writer, 405, "Method Not Allowed", "Method Not Allowed").await?;
        return Ok(CallbackOutcome::Pending);
    }

    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    if path != CALLBACK_PATH {
        send_response(&mut writer, 404, "Not Found", "Not Found").await?;
        return Ok(CallbackOutcome::Pending);
    }

    let outcome = parse_callback_query(query);
    let body = match &outcome {
        CallbackOutcome::Pending => RELAY_PAGE.to_string(),
        CallbackOutcome::Tokens(_) => result_page(
            "Signed in",
            "You can close this window and return to the terminal.",
        ),
        CallbackOutcome::Failed(message) => result_page("Sign-in failed", message),
    };
    send_response(&mut writer, 200, "OK", &body).await?;
    Ok(outcome)
}

async fn send_response(
    writer: &mut tokio::net::tcp::WriteHalf<'_>,
    status_code: u16,
    status_text: &str,
    body: &str,
) -> AuthResult<()> {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_code,
        status_text,
        body.len(),
        body
    );
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
