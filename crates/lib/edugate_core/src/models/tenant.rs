//! Tenancy domain models.

use serde::{Deserialize, Serialize};

/// An isolated customer organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub subdomain: String,
    pub custom_domain: Option<String>,
    /// Identifier of the tenant's isolated store (schema suffix).
    pub database_name: String,
    pub is_active: bool,
}

/// Optional sub-scope under a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct School {
    pub id: String,
    pub tenant_id: String,
    pub code: String,
    pub is_active: bool,
}

/// Candidate identity parsed from network-level request data.
///
/// Carries no guarantee that the tenant exists; the directory decides that.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantClaim {
    pub subdomain: Option<String>,
    pub custom_domain: Option<String>,
    pub school_id: Option<String>,
}

impl TenantClaim {
    /// Human-readable identity used in server-side log lines.
    pub fn describe(&self) -> String {
        match (&self.subdomain, &self.custom_domain) {
            (Some(sub), Some(domain)) => format!("subdomain={sub} domain={domain}"),
            (Some(sub), None) => format!("subdomain={sub}"),
            (None, Some(domain)) => format!("domain={domain}"),
            (None, None) => "<none>".to_string(),
        }
    }
}

/// Request-scoped tenant binding, resolved once per request.
///
/// Fields are private: once built by the context binder the value can only be
/// read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant: Tenant,
    school: Option<School>,
}

impl TenantContext {
    pub(crate) fn new(tenant: Tenant, school: Option<School>) -> Self {
        Self { tenant, school }
    }

    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant.id
    }

    pub fn school(&self) -> Option<&School> {
        self.school.as_ref()
    }

    pub fn school_id(&self) -> Option<&str> {
        self.school.as_ref().map(|s| s.id.as_str())
    }

    pub fn database_name(&self) -> &str {
        &self.tenant.database_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_prefers_both_identities() {
        let claim = TenantClaim {
            subdomain: Some("acme".into()),
            custom_domain: Some("acme.example.com".into()),
            school_id: None,
        };
        assert_eq!(claim.describe(), "subdomain=acme domain=acme.example.com");
        assert_eq!(TenantClaim::default().describe(), "<none>");
    }
}
