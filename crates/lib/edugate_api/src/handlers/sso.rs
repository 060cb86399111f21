//! Single sign-on entry and callback.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::LOCATION;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use axum_extra::extract::cookie::CookieJar;
use edugate_core::auth::sso::SsoProvider;
use edugate_core::auth::tokens::generate_token;
use edugate_core::models::tenant::TenantContext;
use tracing::{debug, warn};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::handlers::auth::session_reply;
use crate::models::{SessionResponse, SsoCallbackQuery};
use crate::services::cookies::{SSO_STATE_COOKIE, cleared, sso_state_cookie};

fn provider(state: &AppState, name: &str) -> AppResult<Arc<dyn SsoProvider>> {
    state
        .sso
        .get(name)
        .ok_or_else(|| AppError::NotFound(format!("Unknown SSO provider '{name}'")))
}

/// `GET /auth/sso/{provider}`: redirect to the provider with a fresh `state`.
pub async fn sso_start_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<Arc<TenantContext>>,
    Path(name): Path<String>,
    jar: CookieJar,
) -> AppResult<Response> {
    let provider = provider(&state, &name)?;
    let nonce = generate_token();
    let url = provider.authorize_url(&nonce)?;
    debug!(tenant_id = ctx.tenant_id(), provider = %name, "sso redirect");

    let jar = jar.add(sso_state_cookie(&nonce, state.config.secure_cookies));
    Ok((StatusCode::FOUND, jar, [(LOCATION, url.to_string())]).into_response())
}

/// `GET /auth/sso/{provider}/callback`: exchange the code and sign in a
/// linked account.
pub async fn sso_callback_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<Arc<TenantContext>>,
    Path(name): Path<String>,
    Query(query): Query<SsoCallbackQuery>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<SessionResponse>)> {
    let provider = provider(&state, &name)?;

    let expected = jar.get(SSO_STATE_COOKIE).map(|c| c.value().to_string());
    if expected.as_deref() != Some(query.state.as_str()) {
        warn!(tenant_id = ctx.tenant_id(), provider = %name, "sso state mismatch");
        return Err(AppError::Unauthorized("Invalid SSO state".into()));
    }

    let mut profile = provider.exchange(&query.code).await?;
    // Links are keyed by the registry name, whatever the provider reports.
    profile.provider = name;
    let grant = state
        .auth
        .sso_login(&profile, ctx.tenant_id(), ctx.school_id())
        .await?;

    let jar = jar.add(cleared(SSO_STATE_COOKIE, state.config.secure_cookies));
    Ok(session_reply(&state, jar, &grant, "Login successful"))
}
