//! In-memory tenant directory, provisioner and user store.
//!
//! Backs the test suites. Concurrency comes from `DashMap` shard locks, so
//! conditional updates are atomic per user.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use tracing::info;

use crate::auth::{AuthError, EMAIL_ALREADY_REGISTERED};
use crate::auth::store::UserStore;
use crate::models::tenant::{School, Tenant};
use crate::models::user::{NewUser, UserRecord, UserRole, UserStatus};
use crate::tenant::{TenantDirectory, TenantError, TenantProvisioner, validate_database_name};
use crate::uuid::uuidv7;

// ---------------------------------------------------------------------------
// Tenant directory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryTenantDirectory {
    tenants: DashMap<String, Tenant>,
    schools: DashMap<String, School>,
}

impl MemoryTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_tenant(&self, tenant: Tenant) {
        self.tenants.insert(tenant.id.clone(), tenant);
    }

    pub fn insert_school(&self, school: School) {
        self.schools.insert(school.id.clone(), school);
    }

    fn find_active(&self, pred: impl Fn(&Tenant) -> bool) -> Option<Tenant> {
        self.tenants
            .iter()
            .find(|t| t.is_active && pred(t.value()))
            .map(|t| t.value().clone())
    }
}

#[async_trait]
impl TenantDirectory for MemoryTenantDirectory {
    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, TenantError> {
        Ok(self.find_active(|t| t.subdomain == subdomain))
    }

    async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>, TenantError> {
        Ok(self.find_active(|t| t.custom_domain.as_deref() == Some(domain)))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Tenant>, TenantError> {
        Ok(self.find_active(|t| t.id == id))
    }

    async fn get_school_by_id(
        &self,
        school_id: &str,
        tenant_id: &str,
    ) -> Result<Option<School>, TenantError> {
        Ok(self
            .schools
            .get(school_id)
            .filter(|s| s.tenant_id == tenant_id && s.is_active)
            .map(|s| s.value().clone()))
    }
}

// ---------------------------------------------------------------------------
// Provisioner
// ---------------------------------------------------------------------------

/// Records which tenant stores exist and how many were ever created.
#[derive(Debug, Default)]
pub struct MemoryProvisioner {
    stores: DashSet<String>,
    created: AtomicUsize,
}

impl MemoryProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(&self, database_name: &str) -> bool {
        self.stores.contains(database_name)
    }

    /// Number of stores actually created (not merely ensured).
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantProvisioner for MemoryProvisioner {
    async fn ensure_database_exists(&self, tenant: &Tenant) -> Result<(), TenantError> {
        validate_database_name(&tenant.database_name)?;
        if self.stores.insert(tenant.database_name.clone()) {
            self.created.fetch_add(1, Ordering::SeqCst);
            info!(tenant_id = %tenant.id, database = %tenant.database_name, "tenant store created");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// User store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: DashMap<String, UserRecord>,
    /// `(tenant_id, email)` pairs already taken.
    emails: DashSet<(String, String)>,
    /// `(tenant_id, role)` → permission names.
    permissions: DashMap<(String, UserRole), Vec<String>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user row as-is.
    pub fn insert(&self, user: UserRecord) {
        self.emails
            .insert((user.tenant_id.clone(), user.email.clone()));
        self.users.insert(user.id.clone(), user);
    }

    pub fn get(&self, id: &str) -> Option<UserRecord> {
        self.users.get(id).map(|u| u.value().clone())
    }

    pub fn set_status(&self, id: &str, status: UserStatus) {
        if let Some(mut user) = self.users.get_mut(id) {
            user.status = status;
        }
    }

    pub fn grant_permission(&self, tenant_id: &str, role: UserRole, permission: &str) {
        self.permissions
            .entry((tenant_id.to_string(), role))
            .or_default()
            .push(permission.to_string());
    }

    fn find(&self, tenant_id: &str, pred: impl Fn(&UserRecord) -> bool) -> Option<UserRecord> {
        self.users
            .iter()
            .find(|u| u.tenant_id == tenant_id && pred(u.value()))
            .map(|u| u.value().clone())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(
        &self,
        tenant_id: &str,
        email: &str,
    ) -> Result<Option<UserRecord>, AuthError> {
        Ok(self.find(tenant_id, |u| u.email == email))
    }

    async fn find_by_id(
        &self,
        tenant_id: &str,
        id: &str,
    ) -> Result<Option<UserRecord>, AuthError> {
        Ok(self
            .users
            .get(id)
            .filter(|u| u.tenant_id == tenant_id)
            .map(|u| u.value().clone()))
    }

    async fn find_by_reset_token(
        &self,
        tenant_id: &str,
        token_hash: &str,
    ) -> Result<Option<UserRecord>, AuthError> {
        Ok(self.find(tenant_id, |u| {
            u.reset_password_token.as_deref() == Some(token_hash)
        }))
    }

    async fn find_by_magic_link_token(
        &self,
        tenant_id: &str,
        token_hash: &str,
    ) -> Result<Option<UserRecord>, AuthError> {
        Ok(self.find(tenant_id, |u| u.magic_link_token.as_deref() == Some(token_hash)))
    }

    async fn find_by_sso(
        &self,
        tenant_id: &str,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<UserRecord>, AuthError> {
        Ok(self.find(tenant_id, |u| {
            u.sso_provider.as_deref() == Some(provider)
                && u.sso_id.as_deref() == Some(provider_user_id)
        }))
    }

    async fn email_exists(&self, tenant_id: &str, email: &str) -> Result<bool, AuthError> {
        Ok(self.find(tenant_id, |u| u.email == email).is_some())
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, AuthError> {
        if !self
            .emails
            .insert((user.tenant_id.clone(), user.email.clone()))
        {
            return Err(AuthError::BadRequest(EMAIL_ALREADY_REGISTERED.into()));
        }
        let record = UserRecord {
            id: uuidv7().to_string(),
            tenant_id: user.tenant_id,
            school_id: user.school_id,
            email: user.email,
            password_hash: Some(user.password_hash),
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            status: UserStatus::Pending,
            sso_provider: None,
            sso_id: None,
            reset_password_token: None,
            reset_password_expires: None,
            magic_link_token: None,
            magic_link_expires: None,
            email_verification_token: Some(user.email_verification_token),
            last_login_at: None,
            created_at: Utc::now(),
        };
        self.users.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn record_login(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), AuthError> {
        if let Some(mut user) = self.users.get_mut(user_id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }

    async fn set_reset_token(
        &self,
        user_id: &str,
        token_hash: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        if let Some(mut user) = self.users.get_mut(user_id) {
            user.reset_password_token = Some(token_hash.to_string());
            user.reset_password_expires = Some(expires);
        }
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        user_id: &str,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let Some(mut user) = self.users.get_mut(user_id) else {
            return Ok(false);
        };
        let live = user.reset_password_token.as_deref() == Some(token_hash)
            && user.reset_password_expires.is_some_and(|exp| exp > now);
        if live {
            user.password_hash = Some(password_hash.to_string());
            user.reset_password_token = None;
            user.reset_password_expires = None;
        }
        Ok(live)
    }

    async fn set_magic_link_token(
        &self,
        user_id: &str,
        token_hash: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        if let Some(mut user) = self.users.get_mut(user_id) {
            user.magic_link_token = Some(token_hash.to_string());
            user.magic_link_expires = Some(expires);
        }
        Ok(())
    }

    async fn consume_magic_link_token(
        &self,
        user_id: &str,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let Some(mut user) = self.users.get_mut(user_id) else {
            return Ok(false);
        };
        let live = user.magic_link_token.as_deref() == Some(token_hash)
            && user.magic_link_expires.is_some_and(|exp| exp > now);
        if live {
            user.magic_link_token = None;
            user.magic_link_expires = None;
            user.last_login_at = Some(now);
        }
        Ok(live)
    }

    async fn permissions_for_role(
        &self,
        tenant_id: &str,
        role: UserRole,
    ) -> Result<Vec<String>, AuthError> {
        Ok(self
            .permissions
            .get(&(tenant_id.to_string(), role))
            .map(|p| p.value().clone())
            .unwrap_or_default())
    }
}
