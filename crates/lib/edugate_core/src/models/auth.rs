//! Token models.
//!
//! Claims use camelCase on the wire so the tokens stay readable by the
//! browser clients that already decode them.

use serde::{Deserialize, Serialize};

/// Claims embedded in access tokens: the full principal and its scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    pub id: String,
    /// Subject: user ID (standard JWT `sub` claim).
    pub sub: String,
    pub email: String,
    pub name: String,
    pub tenant_id: Option<String>,
    pub school_id: Option<String>,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

/// Claims embedded in refresh tokens: only what is needed to re-derive a
/// principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Freshly issued access + refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_at: i64,
    pub refresh_token_expires_at: i64,
}
