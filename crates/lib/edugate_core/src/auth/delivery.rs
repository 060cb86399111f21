//! Out-of-band delivery of single-use tokens (email in production).

use async_trait::async_trait;
use tracing::{debug, info};

use super::AuthError;

/// Sends single-use secrets to the user they were issued for.
#[async_trait]
pub trait TokenDelivery: Send + Sync {
    async fn deliver_password_reset(
        &self,
        tenant_id: &str,
        email: &str,
        token: &str,
    ) -> Result<(), AuthError>;

    async fn deliver_magic_link(
        &self,
        tenant_id: &str,
        email: &str,
        token: &str,
    ) -> Result<(), AuthError>;

    async fn deliver_email_verification(
        &self,
        tenant_id: &str,
        email: &str,
        token: &str,
    ) -> Result<(), AuthError>;
}

/// Delivery that only emits tracing events. The token itself is logged at
/// debug level so local development can follow the links.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDelivery;

#[async_trait]
impl TokenDelivery for LogDelivery {
    async fn deliver_password_reset(
        &self,
        tenant_id: &str,
        email: &str,
        token: &str,
    ) -> Result<(), AuthError> {
        info!(tenant_id, email, "password reset requested");
        debug!(tenant_id, email, token, "password reset token");
        Ok(())
    }

    async fn deliver_magic_link(
        &self,
        tenant_id: &str,
        email: &str,
        token: &str,
    ) -> Result<(), AuthError> {
        info!(tenant_id, email, "magic link requested");
        debug!(tenant_id, email, token, "magic link token");
        Ok(())
    }

    async fn deliver_email_verification(
        &self,
        tenant_id: &str,
        email: &str,
        token: &str,
    ) -> Result<(), AuthError> {
        info!(tenant_id, email, "email verification issued");
        debug!(tenant_id, email, token, "email verification token");
        Ok(())
    }
}
