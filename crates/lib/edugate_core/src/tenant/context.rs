//! Request context binder: resolver → directory → provisioner → school.

use tracing::{debug, warn};

use super::resolver::resolve_claim;
use super::{TenantDirectory, TenantError, TenantProvisioner};
use crate::models::tenant::{TenantClaim, TenantContext};

/// Resolve the tenant (and optional school) for a request.
///
/// Subdomain lookup wins; the custom domain is the fallback. The tenant's
/// store is provisioned before the context is returned.
pub async fn bind_tenant_context(
    directory: &dyn TenantDirectory,
    provisioner: &dyn TenantProvisioner,
    host: Option<&str>,
    school_header: Option<&str>,
) -> Result<TenantContext, TenantError> {
    let claim = resolve_claim(host, school_header).ok_or(TenantError::MissingClaim)?;
    bind_claim(directory, provisioner, &claim).await
}

/// Bind an already-parsed claim.
pub async fn bind_claim(
    directory: &dyn TenantDirectory,
    provisioner: &dyn TenantProvisioner,
    claim: &TenantClaim,
) -> Result<TenantContext, TenantError> {
    let mut tenant = None;
    if let Some(subdomain) = &claim.subdomain {
        tenant = directory.find_by_subdomain(subdomain).await?;
    }
    if tenant.is_none()
        && let Some(domain) = &claim.custom_domain
    {
        tenant = directory.find_by_domain(domain).await?;
    }

    let Some(tenant) = tenant else {
        warn!(identity = %claim.describe(), "tenant lookup failed");
        return Err(TenantError::UnknownTenant(claim.describe()));
    };

    provisioner.ensure_database_exists(&tenant).await?;

    let school = match &claim.school_id {
        Some(school_id) => {
            let school = directory
                .get_school_by_id(school_id, &tenant.id)
                .await?
                .ok_or_else(|| TenantError::UnknownSchool {
                    school_id: school_id.clone(),
                    tenant_id: tenant.id.clone(),
                })?;
            Some(school)
        }
        None => None,
    };

    debug!(
        tenant_id = %tenant.id,
        school_id = school.as_ref().map(|s| s.id.as_str()).unwrap_or("-"),
        "tenant context bound"
    );
    Ok(TenantContext::new(tenant, school))
}
