//! Authorization guard chain.
//!
//! Routes declare a [`RoutePolicy`] up front; [`authorize`] evaluates the
//! guards in [`GUARD_ORDER`] and stops at the first refusal.

use tracing::debug;

use crate::auth::AuthError;
use crate::auth::store::UserStore;
use crate::models::tenant::TenantContext;
use crate::models::user::{AuthenticatedUser, UserRole};

/// Requirements a route places on an authenticated principal.
///
/// Empty role or permission lists pass through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutePolicy {
    pub roles: Vec<UserRole>,
    pub permissions: Vec<String>,
}

impl RoutePolicy {
    /// Any authenticated member of the bound tenant.
    pub fn authenticated() -> Self {
        Self::default()
    }

    pub fn with_roles(mut self, roles: &[UserRole]) -> Self {
        self.roles = roles.to_vec();
        self
    }

    pub fn with_permissions(mut self, permissions: &[&str]) -> Self {
        self.permissions = permissions.iter().map(|p| p.to_string()).collect();
        self
    }
}

/// A single authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardStage {
    TenantMembership,
    Role,
    Permission,
}

/// Evaluation order of the guards.
pub const GUARD_ORDER: [GuardStage; 3] = [
    GuardStage::TenantMembership,
    GuardStage::Role,
    GuardStage::Permission,
];

/// Run every guard against `principal`, failing with
/// [`AuthError::Forbidden`] at the first one that refuses.
pub async fn authorize(
    store: &dyn UserStore,
    ctx: &TenantContext,
    principal: &AuthenticatedUser,
    policy: &RoutePolicy,
) -> Result<(), AuthError> {
    for stage in GUARD_ORDER {
        let outcome = match stage {
            GuardStage::TenantMembership => check_membership(ctx, principal),
            GuardStage::Role => check_role(principal, &policy.roles),
            GuardStage::Permission => {
                check_permissions(store, principal, &policy.permissions).await
            }
        };
        if let Err(e) = outcome {
            debug!(?stage, user_id = %principal.id, tenant_id = ctx.tenant_id(), "guard refused");
            return Err(e);
        }
    }
    Ok(())
}

fn check_membership(ctx: &TenantContext, principal: &AuthenticatedUser) -> Result<(), AuthError> {
    if principal.tenant_id != ctx.tenant_id() {
        return Err(AuthError::Forbidden(
            "Access denied: user does not belong to this tenant".into(),
        ));
    }
    if let Some(school_id) = ctx.school_id()
        && principal.school_id.as_deref() != Some(school_id)
    {
        return Err(AuthError::Forbidden(
            "Access denied: user does not belong to this school".into(),
        ));
    }
    Ok(())
}

fn check_role(principal: &AuthenticatedUser, allowed: &[UserRole]) -> Result<(), AuthError> {
    if allowed.is_empty() || allowed.contains(&principal.role) {
        return Ok(());
    }
    let names: Vec<&str> = allowed.iter().map(|r| r.as_str()).collect();
    Err(AuthError::Forbidden(format!(
        "Access denied. Required roles: {}",
        names.join(", ")
    )))
}

async fn check_permissions(
    store: &dyn UserStore,
    principal: &AuthenticatedUser,
    required: &[String],
) -> Result<(), AuthError> {
    if required.is_empty() {
        return Ok(());
    }
    // Reloaded per request; role grants can change while a token is live.
    let granted = store
        .permissions_for_role(&principal.tenant_id, principal.role)
        .await?;
    if required.iter().any(|p| granted.contains(p)) {
        return Ok(());
    }
    Err(AuthError::Forbidden(format!(
        "Access denied. Required permissions: {}",
        required.join(", ")
    )))
}
