//! Authentication and authorization logic.
//!
//! Provides password hashing, JWT management, single-use tokens, the user
//! store contract and the credential flows built on top of them.

pub mod delivery;
pub mod jwt;
pub mod password;
pub mod pg;
pub mod service;
pub mod sso;
pub mod store;
pub mod tokens;

use std::fmt;

use thiserror::Error;

/// Why a presented access token was not turned into a principal.
///
/// Logged server-side; callers only ever see a generic 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRejection {
    MissingToken,
    InvalidToken,
    InvalidPayload,
    UserNotFoundOrInactive,
    TenantMismatch,
    SchoolMismatch,
}

impl fmt::Display for SessionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingToken => "no access token presented",
            Self::InvalidToken => "token signature or expiry invalid",
            Self::InvalidPayload => "token payload invalid",
            Self::UserNotFoundOrInactive => "user not found or inactive",
            Self::TenantMismatch => "tenant mismatch",
            Self::SchoolMismatch => "school mismatch",
        })
    }
}

/// Authentication errors.
///
/// The message carried by `Unauthorized`, `BadRequest` and `NotFound` is safe
/// to show to callers.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("session rejected: {0}")]
    Session(SessionRejection),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<crate::tenant::TenantError> for AuthError {
    fn from(e: crate::tenant::TenantError) -> Self {
        match e {
            crate::tenant::TenantError::DbError(e) => AuthError::DbError(e),
            other => AuthError::Internal(other.to_string()),
        }
    }
}

/// Uniform failure for bad email/password combinations.
pub const INVALID_CREDENTIALS: &str = "Invalid email or password";
/// Uniform failure for every refresh-token problem.
pub const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token";

/// Returned when a tenant already has an account for the email.
pub const EMAIL_ALREADY_REGISTERED: &str = "Email already registered";
