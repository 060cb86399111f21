//! Authentication request handlers.
//!
//! Every handler runs behind a pipeline that has already bound the
//! [`TenantContext`]; protected ones also find the [`AuthenticatedUser`] in
//! the request extensions.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use axum_extra::extract::cookie::CookieJar;
use edugate_core::auth::INVALID_REFRESH_TOKEN;
use edugate_core::auth::service::{RegisterInput, SessionGrant};
use edugate_core::models::tenant::TenantContext;
use edugate_core::models::user::AuthenticatedUser;
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{
    EmailRequest, LoginRequest, MeResponse, MessageResponse, RefreshRequest, RefreshResponse,
    RegisterRequest, RegisterResponse, ResetPasswordRequest, SessionResponse, TokenRequest,
    UserSummary,
};
use crate::services::cookies::{REFRESH_COOKIE, with_session, without_session};

const RESET_SENT: &str = "If an account exists with this email, a password reset link has been sent";
const MAGIC_LINK_SENT: &str = "If an account exists with this email, a magic link has been sent";

/// Set the session cookies and build the body shared by every login path.
pub(crate) fn session_reply(
    state: &AppState,
    jar: CookieJar,
    grant: &SessionGrant,
    message: &str,
) -> (CookieJar, Json<SessionResponse>) {
    let issuer = state.auth.issuer();
    let jar = with_session(
        jar,
        &grant.tokens,
        issuer.access_ttl_secs(),
        issuer.refresh_ttl_secs(),
        state.config.secure_cookies,
    );
    let body = SessionResponse {
        success: true,
        message: message.to_string(),
        user: UserSummary::from(&grant.principal),
        expires_at: grant.tokens.access_token_expires_at,
    };
    (jar, Json(body))
}

/// `POST /auth/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<Arc<TenantContext>>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<SessionResponse>)> {
    let grant = state
        .auth
        .login(&body.email, &body.password, ctx.tenant_id(), ctx.school_id())
        .await?;
    Ok(session_reply(&state, jar, &grant, "Login successful"))
}

/// `POST /auth/register`: create a pending account in the bound tenant.
pub async fn register_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<Arc<TenantContext>>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let input = RegisterInput {
        email: body.email,
        password: body.password,
        first_name: body.first_name,
        last_name: body.last_name,
        role: body.user_type,
        school_id: body.school_id.or_else(|| ctx.school_id().map(str::to_string)),
    };
    let user = state.auth.register(input, ctx.tenant_id()).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: "Registration successful. Please verify your email.".into(),
            user: (&user).into(),
        }),
    ))
}

/// `POST /auth/forgot-password`: same answer whether or not the email exists.
pub async fn forgot_password_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<Arc<TenantContext>>,
    Json(body): Json<EmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    state
        .auth
        .forgot_password(&body.email, ctx.tenant_id())
        .await?;
    Ok(Json(MessageResponse::ok(RESET_SENT)))
}

/// `POST /auth/reset-password`
pub async fn reset_password_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<Arc<TenantContext>>,
    Json(body): Json<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    state
        .auth
        .reset_password(&body.token, &body.password, ctx.tenant_id())
        .await?;
    Ok(Json(MessageResponse::ok("Password reset successful")))
}

/// `POST /auth/magic-link/request`: same answer whether or not the email exists.
pub async fn magic_link_request_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<Arc<TenantContext>>,
    Json(body): Json<EmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    state
        .auth
        .request_magic_link(&body.email, ctx.tenant_id())
        .await?;
    Ok(Json(MessageResponse::ok(MAGIC_LINK_SENT)))
}

/// `POST /auth/magic-link/verify`
pub async fn magic_link_verify_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<Arc<TenantContext>>,
    jar: CookieJar,
    Json(body): Json<TokenRequest>,
) -> AppResult<(CookieJar, Json<SessionResponse>)> {
    let grant = state
        .auth
        .verify_magic_link(&body.token, ctx.tenant_id(), ctx.school_id())
        .await?;
    Ok(session_reply(&state, jar, &grant, "Login successful"))
}

/// `POST /auth/refresh`: rotate both tokens.
///
/// The token comes from the JSON body when present, else the refresh cookie.
/// Any failure also clears the session cookies.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<Arc<TenantContext>>,
    jar: CookieJar,
    body: Bytes,
) -> Response {
    let secure = state.config.secure_cookies;
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<RefreshRequest>(&body)
            .ok()
            .and_then(|r| r.refresh_token)
    };
    let token = from_body
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()))
        .filter(|t| !t.is_empty());
    let Some(token) = token else {
        let err = AppError::Unauthorized(INVALID_REFRESH_TOKEN.into());
        return (without_session(jar, secure), err).into_response();
    };

    match state
        .auth
        .refresh(&token, ctx.tenant_id(), ctx.school_id())
        .await
    {
        Ok(grant) => {
            let issuer = state.auth.issuer();
            let jar = with_session(
                jar,
                &grant.tokens,
                issuer.access_ttl_secs(),
                issuer.refresh_ttl_secs(),
                secure,
            );
            let body = RefreshResponse {
                success: true,
                message: "Token refreshed".into(),
                expires_at: grant.tokens.access_token_expires_at,
            };
            (jar, Json(body)).into_response()
        }
        Err(e) => (without_session(jar, secure), AppError::from(e)).into_response(),
    }
}

/// `POST /auth/logout`: clear the session cookies.
///
/// Tokens are stateless; an access token stays valid until it expires.
pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<AuthenticatedUser>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    info!(user_id = %principal.id, tenant_id = %principal.tenant_id, "user logged out");
    (
        without_session(jar, state.config.secure_cookies),
        Json(MessageResponse::ok("Logged out successfully")),
    )
}

/// `GET /auth/me`: the principal resolved for this request.
pub async fn me_handler(Extension(principal): Extension<AuthenticatedUser>) -> Json<MeResponse> {
    Json(MeResponse {
        success: true,
        user: UserSummary::from(&principal),
    })
}
