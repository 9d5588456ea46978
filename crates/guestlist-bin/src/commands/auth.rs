//! Sign-in, sign-out and status.

use super::prompt;
use crate::context::AppContext;
use crate::output::{self, OutputFormat};
use anyhow::{anyhow, bail, Result};
use auth_engine::{
    AuthError, AuthResult, GuardDecision, LoginFlow, LoginStep, OAuthProvider, RedirectListener,
    RouteGuard, SessionLifecycle, DEFAULT_REDIRECT_TIMEOUT, GENERIC_ERROR_MESSAGE, LOGIN_PATH,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Failed password or code entries tolerated before giving up.
const MAX_ATTEMPTS: usize = 3;

/// Interactive sign-in. With `oauth`, hands off to the browser instead.
pub async fn login(
    ctx: &AppContext,
    email: Option<String>,
    oauth: Option<OAuthProvider>,
) -> Result<()> {
    let format = ctx.format;
    ctx.resolve_session().await?;
    if RouteGuard::new(&ctx.session).check(LOGIN_PATH) != GuardDecision::Allow {
        output::print_success(&format!("Already logged in as {}", signed_in_as(ctx)), format);
        return Ok(());
    }

    let mut listener = match RedirectListener::bind(ctx.config.callback_port).await {
        Ok(listener) => Some(listener),
        Err(err) => {
            warn!(error = %err, "redirect listener unavailable");
            None
        }
    };
    let mut flow = LoginFlow::new(
        Arc::clone(&ctx.provider),
        ctx.probe()?,
        Arc::clone(&ctx.session),
    );
    if let Some(listener) = &listener {
        flow = flow.with_redirect(listener.callback_url());
    }

    if let Some(provider) = oauth {
        let listener = listener
            .ok_or_else(|| anyhow!("Browser sign-in needs a free callback port"))?;
        let url = flow.start_oauth(provider, &listener.callback_url())?;
        println!("Continue signing in with {} in your browser.", provider);
        if open::that(&url).is_err() {
            println!("Open this URL to continue: {}", url);
        }
        return finish_redirect(ctx, listener).await;
    }

    let email = match email {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    flow.submit_email(&email)
        .await
        .map_err(|err| anyhow!(err.user_message()))?;

    let mut failures = 0;
    loop {
        let view = flow.view();
        if let Some(warning) = &view.warning {
            println!("{}", warning);
        }
        if let Some(info) = &view.info {
            println!("{}", info);
        }

        let attempt: AuthResult<LoginStep> = match view.step {
            LoginStep::Initial => {
                bail!(view.error.unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string()))
            }
            LoginStep::ExistingUserOptions if !view.capabilities.password => {
                flow.request_otp().await
            }
            LoginStep::ExistingUserOptions => {
                let label = if view.capabilities.otp {
                    "Password (leave empty for a one-time code): "
                } else {
                    "Password: "
                };
                let password = rpassword::prompt_password(label)?;
                if password.is_empty() && view.capabilities.otp {
                    flow.request_otp().await
                } else {
                    flow.submit_password(&password).await
                }
            }
            LoginStep::OtpLogin => {
                let label = if view.capabilities.password {
                    "Code from your email (leave empty to use your password): "
                } else {
                    "Code from your email: "
                };
                let code = prompt(label)?;
                if code.is_empty() && view.capabilities.password {
                    flow.use_password_instead()
                } else {
                    flow.submit_otp(&code).await
                }
            }
            LoginStep::NewUserCreation => {
                println!("No account found for {}. Choose a password to create one.", email.trim());
                let password = rpassword::prompt_password("Password: ")?;
                let confirm = rpassword::prompt_password("Confirm password: ")?;
                flow.sign_up(&password, &confirm).await
            }
            LoginStep::AwaitingVerification => return Ok(()),
            LoginStep::AwaitingMagicLink => {
                let Some(listener) = listener.take() else {
                    bail!("Open the link from your email on this machine to finish signing in.");
                };
                return finish_redirect(ctx, listener).await;
            }
            LoginStep::Authenticated => {
                output::print_success(&format!("Logged in as {}", signed_in_as(ctx)), format);
                return Ok(());
            }
        };

        if let Err(err) = attempt {
            output::print_error(&err.user_message(), format);
            if matches!(err, AuthError::Busy) {
                continue;
            }
            failures += 1;
            if failures >= MAX_ATTEMPTS {
                bail!("Too many failed attempts.");
            }
        }
    }
}

async fn finish_redirect(ctx: &AppContext, listener: RedirectListener) -> Result<()> {
    println!("Waiting for the sign-in to complete...");
    let tokens = listener.wait_for_tokens(DEFAULT_REDIRECT_TIMEOUT).await?;
    let identity = ctx.session.complete_redirect(tokens).await?;
    info!(user_id = %identity.id, "signed in through redirect");
    output::print_success(
        &format!("Logged in as {}", identity.email.as_deref().unwrap_or(&identity.id)),
        ctx.format,
    );
    Ok(())
}

fn signed_in_as(ctx: &AppContext) -> String {
    ctx.session
        .identity()
        .map(|identity| identity.email.unwrap_or(identity.id))
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn logout(ctx: &AppContext) -> Result<()> {
    ctx.session.sign_out().await?;
    output::print_success("Logged out successfully", ctx.format);
    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusReport {
    logged_in: bool,
    lifecycle: SessionLifecycle,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
}

pub async fn status(ctx: &AppContext) -> Result<()> {
    ctx.resolve_session().await?;
    let snapshot = ctx.session.current();
    let report = StatusReport {
        logged_in: snapshot.is_authenticated(),
        lifecycle: snapshot.lifecycle,
        user_id: snapshot.identity.as_ref().map(|i| i.id.clone()),
        email: snapshot.identity.as_ref().and_then(|i| i.email.clone()),
    };

    output::print_with(&report, ctx.format, |report| {
        if report.logged_in {
            println!("Auth:     logged in");
            output::print_row("User ID", report.user_id.as_deref().unwrap_or("unknown"));
            output::print_row("Email", output::or_dash(report.email.as_deref()));
        } else {
            println!("Auth:     not logged in");
        }
    });
    if ctx.format == OutputFormat::Text {
        output::print_row("Config", &ctx.paths.config_file().display().to_string());
    }
    Ok(())
}
