//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use edugate_core::auth::AuthError;
use edugate_core::tenant::TenantError;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Body of every 401 caused by a rejected session or unknown tenant.
pub const GENERIC_UNAUTHORIZED: &str = "Unauthorized";

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, "bad_request", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.as_str()),
            AppError::Internal(detail) => {
                error!(%detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Unauthorized(msg) => AppError::Unauthorized(msg),
            AuthError::Session(reason) => {
                debug!(%reason, "session rejected");
                AppError::Unauthorized(GENERIC_UNAUTHORIZED.into())
            }
            AuthError::Forbidden(msg) => AppError::Forbidden(msg),
            AuthError::BadRequest(msg) => AppError::BadRequest(msg),
            AuthError::NotFound(msg) => AppError::NotFound(msg),
            AuthError::TokenError(msg) => AppError::Internal(msg),
            AuthError::DbError(e) => AppError::Internal(e.to_string()),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<TenantError> for AppError {
    fn from(e: TenantError) -> Self {
        match e {
            TenantError::MissingClaim => AppError::Unauthorized(e.to_string()),
            TenantError::UnknownTenant(identity) => {
                warn!(%identity, "request for unknown tenant");
                AppError::Unauthorized(GENERIC_UNAUTHORIZED.into())
            }
            TenantError::UnknownSchool { .. } => {
                debug!(error = %e, "school not bound");
                AppError::NotFound("School not found".into())
            }
            TenantError::InvalidDatabaseName(_)
            | TenantError::Provisioning(_)
            | TenantError::DbError(_) => AppError::Internal(e.to_string()),
        }
    }
}
