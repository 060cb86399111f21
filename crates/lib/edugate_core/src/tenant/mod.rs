//! Tenant resolution, lookup and provisioning.
//!
//! Order per request: [`resolver`] → [`TenantDirectory`] →
//! [`TenantProvisioner`] → [`context::bind_tenant_context`].

pub mod context;
pub mod pg;
pub mod resolver;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::tenant::{School, Tenant};

/// Tenant binding errors.
#[derive(Debug, Error)]
pub enum TenantError {
    #[error("tenant information not found")]
    MissingClaim,

    /// The identity is for server-side logs only.
    #[error("no active tenant for {0}")]
    UnknownTenant(String),

    #[error("school {school_id} not found in tenant {tenant_id}")]
    UnknownSchool { school_id: String, tenant_id: String },

    #[error("invalid database identifier: {0}")]
    InvalidDatabaseName(String),

    #[error("provisioning failed: {0}")]
    Provisioning(String),

    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),
}

/// Lookup contract over persisted tenant and school rows.
///
/// Every lookup returns active rows only.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, TenantError>;

    async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>, TenantError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Tenant>, TenantError>;

    /// Scoped school lookup: a school from another tenant is never returned.
    async fn get_school_by_id(
        &self,
        school_id: &str,
        tenant_id: &str,
    ) -> Result<Option<School>, TenantError>;
}

/// Creates a tenant's isolated store on first use.
///
/// Implementations must be idempotent, including under concurrent calls for
/// the same tenant.
#[async_trait]
pub trait TenantProvisioner: Send + Sync {
    async fn ensure_database_exists(&self, tenant: &Tenant) -> Result<(), TenantError>;
}

/// Validate a tenant database identifier before it is interpolated into DDL.
///
/// Accepts lower-case ASCII letters, digits and underscores, starting with a
/// letter, at most 48 characters.
pub fn validate_database_name(name: &str) -> Result<(), TenantError> {
    let mut chars = name.chars();
    let valid = name.len() <= 48
        && chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(TenantError::InvalidDatabaseName(name.to_string()))
    }
}

/// Schema name holding a tenant's isolated data.
pub fn schema_name(database_name: &str) -> String {
    format!("tenant_{database_name}")
}
