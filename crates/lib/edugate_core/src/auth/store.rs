//! User persistence contract.
//!
//! Every lookup is scoped by tenant. Token columns hold SHA-256 digests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::AuthError;
use crate::models::user::{NewUser, UserRecord, UserRole};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(
        &self,
        tenant_id: &str,
        email: &str,
    ) -> Result<Option<UserRecord>, AuthError>;

    async fn find_by_id(&self, tenant_id: &str, id: &str)
    -> Result<Option<UserRecord>, AuthError>;

    async fn find_by_reset_token(
        &self,
        tenant_id: &str,
        token_hash: &str,
    ) -> Result<Option<UserRecord>, AuthError>;

    async fn find_by_magic_link_token(
        &self,
        tenant_id: &str,
        token_hash: &str,
    ) -> Result<Option<UserRecord>, AuthError>;

    async fn find_by_sso(
        &self,
        tenant_id: &str,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<UserRecord>, AuthError>;

    async fn email_exists(&self, tenant_id: &str, email: &str) -> Result<bool, AuthError>;

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, AuthError>;

    async fn record_login(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), AuthError>;

    /// Store a reset token digest, replacing any outstanding one.
    async fn set_reset_token(
        &self,
        user_id: &str,
        token_hash: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    /// Set the password and clear the reset token in one update, only if the
    /// stored digest still equals `token_hash` and has not expired at `now`.
    /// Returns whether a row was updated.
    async fn consume_reset_token(
        &self,
        user_id: &str,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError>;

    /// Store a magic-link digest, replacing any outstanding one.
    async fn set_magic_link_token(
        &self,
        user_id: &str,
        token_hash: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    /// Clear the magic link and stamp `last_login_at` in one update, under the
    /// same conditions as [`UserStore::consume_reset_token`].
    async fn consume_magic_link_token(
        &self,
        user_id: &str,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError>;

    /// Permission names granted to `role` within the tenant.
    async fn permissions_for_role(
        &self,
        tenant_id: &str,
        role: UserRole,
    ) -> Result<Vec<String>, AuthError>;
}
