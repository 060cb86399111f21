//! Credential flows: login, registration, password reset, magic links,
//! refresh, SSO and per-request principal resolution.
//!
//! Every flow converges on [`TokenIssuer::generate_token_pair`] so the token
//! contract is identical whichever path authenticated the user.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::delivery::TokenDelivery;
use super::jwt::TokenIssuer;
use super::password::{
    BCRYPT_COST, check_password_policy, hash_password, hash_password_blocking,
    verify_password_blocking,
};
use super::sso::SsoProfile;
use super::store::UserStore;
use super::tokens::{MAGIC_LINK_TTL, RESET_TOKEN_TTL, generate_token, hash_token};
use super::{
    AuthError, EMAIL_ALREADY_REGISTERED, INVALID_CREDENTIALS, INVALID_REFRESH_TOKEN, SessionRejection,
};
use crate::models::auth::TokenPair;
use crate::models::tenant::TenantContext;
use crate::models::user::{AuthenticatedUser, NewUser, UserRecord, UserRole};
use crate::tenant::TenantDirectory;

const ACCOUNT_NOT_ACTIVE: &str = "Account is not active";
const SCHOOL_MISMATCH: &str = "Account does not belong to this school";
const INVALID_RESET_TOKEN: &str = "Invalid or expired reset token";
const INVALID_MAGIC_LINK: &str = "Invalid or expired magic link";

/// Source of "now" for TTL decisions.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Result of a successful authentication.
#[derive(Debug, Clone)]
pub struct SessionGrant {
    pub principal: AuthenticatedUser,
    pub tokens: TokenPair,
}

/// Registration input. `role` defaults to [`UserRole::LOWEST`].
#[derive(Debug, Clone, Default)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Option<UserRole>,
    pub school_id: Option<String>,
}

/// Roles that cannot be claimed through self-registration.
const PRIVILEGED_ROLES: &[UserRole] = &[UserRole::SuperAdmin, UserRole::Admin];

pub struct AuthService {
    users: Arc<dyn UserStore>,
    directory: Arc<dyn TenantDirectory>,
    issuer: TokenIssuer,
    delivery: Arc<dyn TokenDelivery>,
    bcrypt_cost: u32,
    clock: Clock,
    /// Compared against when the email is unknown, so both login failures
    /// cost one bcrypt verification.
    dummy_hash: OnceLock<String>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        directory: Arc<dyn TenantDirectory>,
        issuer: TokenIssuer,
        delivery: Arc<dyn TokenDelivery>,
    ) -> Self {
        Self {
            users,
            directory,
            issuer,
            delivery,
            bcrypt_cost: BCRYPT_COST,
            clock: Arc::new(Utc::now),
            dummy_hash: OnceLock::new(),
        }
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    // -----------------------------------------------------------------------
    // Primary credentials
    // -----------------------------------------------------------------------

    /// Authenticate with email + password within `tenant_id`.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        tenant_id: &str,
        school_id: Option<&str>,
    ) -> Result<SessionGrant, AuthError> {
        let email = normalize_email(email);
        let user = self.users.find_by_email(tenant_id, &email).await?;

        let stored_hash = user
            .as_ref()
            .and_then(|u| u.password_hash.clone())
            .unwrap_or_else(|| self.dummy_hash().to_string());
        let matches = verify_password_blocking(password.to_string(), stored_hash).await;

        let user = match user {
            Some(u) if matches && u.password_hash.is_some() => u,
            _ => {
                debug!(tenant_id, "login rejected: bad credentials");
                return Err(AuthError::Unauthorized(INVALID_CREDENTIALS.into()));
            }
        };
        if !user.is_active() {
            debug!(tenant_id, user_id = %user.id, status = %user.status, "login rejected: inactive");
            return Err(AuthError::Unauthorized(ACCOUNT_NOT_ACTIVE.into()));
        }

        let now = self.now();
        let grant = self.open_session(&user, tenant_id, school_id, now)?;
        self.users.record_login(&user.id, now).await?;
        info!(tenant_id, user_id = %user.id, "user logged in");
        Ok(grant)
    }

    /// Create a pending user in `tenant_id`.
    pub async fn register(
        &self,
        input: RegisterInput,
        tenant_id: &str,
    ) -> Result<UserRecord, AuthError> {
        let email = normalize_email(&input.email);
        if !looks_like_email(&email) {
            return Err(AuthError::BadRequest("Invalid email address".into()));
        }
        check_password_policy(&input.password)?;

        let role = input.role.unwrap_or(UserRole::LOWEST);
        if PRIVILEGED_ROLES.contains(&role) {
            return Err(AuthError::BadRequest(format!(
                "Role '{role}' cannot be self-registered"
            )));
        }

        if self.users.email_exists(tenant_id, &email).await? {
            return Err(AuthError::BadRequest(EMAIL_ALREADY_REGISTERED.into()));
        }
        if self.directory.find_by_id(tenant_id).await?.is_none() {
            return Err(AuthError::NotFound("Tenant not found".into()));
        }
        if let Some(school_id) = input.school_id.as_deref()
            && self
                .directory
                .get_school_by_id(school_id, tenant_id)
                .await?
                .is_none()
        {
            return Err(AuthError::NotFound("School not found".into()));
        }

        let password_hash = hash_password_blocking(input.password, self.bcrypt_cost).await?;
        let verification = generate_token();

        let user = self
            .users
            .create_user(NewUser {
                tenant_id: tenant_id.to_string(),
                school_id: input.school_id,
                email: email.clone(),
                password_hash,
                first_name: input.first_name.trim().to_string(),
                last_name: input.last_name.trim().to_string(),
                role,
                email_verification_token: hash_token(&verification),
            })
            .await?;

        if let Err(e) = self
            .delivery
            .deliver_email_verification(tenant_id, &email, &verification)
            .await
        {
            warn!(tenant_id, user_id = %user.id, error = %e, "verification delivery failed");
        }
        info!(tenant_id, user_id = %user.id, role = %user.role, "user registered");
        Ok(user)
    }

    // -----------------------------------------------------------------------
    // Password reset
    // -----------------------------------------------------------------------

    /// Issue a reset token if the email is known. Succeeds either way.
    pub async fn forgot_password(&self, email: &str, tenant_id: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(tenant_id, &email).await? else {
            debug!(tenant_id, "password reset for unknown email ignored");
            return Ok(());
        };

        let token = generate_token();
        let expires = self.now() + RESET_TOKEN_TTL;
        self.users
            .set_reset_token(&user.id, &hash_token(&token), expires)
            .await?;
        if let Err(e) = self
            .delivery
            .deliver_password_reset(tenant_id, &user.email, &token)
            .await
        {
            warn!(tenant_id, user_id = %user.id, error = %e, "reset delivery failed");
        }
        Ok(())
    }

    /// Set a new password using a reset token. The token is spent on success.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        tenant_id: &str,
    ) -> Result<(), AuthError> {
        let digest = hash_token(token);
        let now = self.now();
        let user = self
            .users
            .find_by_reset_token(tenant_id, &digest)
            .await?
            .filter(|u| u.reset_password_expires.is_some_and(|exp| exp > now))
            .ok_or_else(|| AuthError::BadRequest(INVALID_RESET_TOKEN.into()))?;

        check_password_policy(new_password)?;
        let password_hash = hash_password_blocking(new_password.to_string(), self.bcrypt_cost).await?;

        if !self
            .users
            .consume_reset_token(&user.id, &digest, &password_hash, now)
            .await?
        {
            // Spent or replaced between lookup and update.
            return Err(AuthError::BadRequest(INVALID_RESET_TOKEN.into()));
        }
        info!(tenant_id, user_id = %user.id, "password reset");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Magic links
    // -----------------------------------------------------------------------

    /// Issue a magic link if the email is known. Succeeds either way.
    pub async fn request_magic_link(&self, email: &str, tenant_id: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(tenant_id, &email).await? else {
            debug!(tenant_id, "magic link for unknown email ignored");
            return Ok(());
        };

        let token = generate_token();
        let expires = self.now() + MAGIC_LINK_TTL;
        self.users
            .set_magic_link_token(&user.id, &hash_token(&token), expires)
            .await?;
        if let Err(e) = self
            .delivery
            .deliver_magic_link(tenant_id, &user.email, &token)
            .await
        {
            warn!(tenant_id, user_id = %user.id, error = %e, "magic link delivery failed");
        }
        Ok(())
    }

    /// Log in with a magic link. The link is spent on success.
    pub async fn verify_magic_link(
        &self,
        token: &str,
        tenant_id: &str,
        school_id: Option<&str>,
    ) -> Result<SessionGrant, AuthError> {
        let digest = hash_token(token);
        let now = self.now();
        let user = self
            .users
            .find_by_magic_link_token(tenant_id, &digest)
            .await?
            .filter(|u| u.magic_link_expires.is_some_and(|exp| exp > now))
            .ok_or_else(|| AuthError::BadRequest(INVALID_MAGIC_LINK.into()))?;

        if !user.is_active() {
            return Err(AuthError::Unauthorized(ACCOUNT_NOT_ACTIVE.into()));
        }
        let grant = self.open_session(&user, tenant_id, school_id, now)?;

        if !self
            .users
            .consume_magic_link_token(&user.id, &digest, now)
            .await?
        {
            return Err(AuthError::BadRequest(INVALID_MAGIC_LINK.into()));
        }
        info!(tenant_id, user_id = %user.id, "user logged in via magic link");
        Ok(grant)
    }

    // -----------------------------------------------------------------------
    // Session continuation
    // -----------------------------------------------------------------------

    /// Exchange a refresh token for a brand-new pair.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        tenant_id: &str,
        school_id: Option<&str>,
    ) -> Result<SessionGrant, AuthError> {
        let claims = self.issuer.verify_refresh(refresh_token)?;
        let user = self
            .users
            .find_by_id(tenant_id, &claims.sub)
            .await?
            .filter(UserRecord::is_active)
            .ok_or_else(|| AuthError::Unauthorized(INVALID_REFRESH_TOKEN.into()))?;

        self.open_session(&user, tenant_id, school_id, self.now())
    }

    /// Verify an access token and re-load its user within the bound tenant.
    pub async fn resolve_principal(
        &self,
        token: &str,
        ctx: &TenantContext,
    ) -> Result<AuthenticatedUser, AuthError> {
        let claims = self.issuer.verify_access(token)?;
        if claims.sub.is_empty() || claims.id != claims.sub {
            return Err(AuthError::Session(SessionRejection::InvalidPayload));
        }
        if let Some(token_tenant) = claims.tenant_id.as_deref()
            && token_tenant != ctx.tenant_id()
        {
            return Err(AuthError::Session(SessionRejection::TenantMismatch));
        }

        let user = self
            .users
            .find_by_id(ctx.tenant_id(), &claims.sub)
            .await?
            .filter(UserRecord::is_active)
            .ok_or(AuthError::Session(SessionRejection::UserNotFoundOrInactive))?;

        if let (Some(token_school), Some(user_school)) =
            (claims.school_id.as_deref(), user.school_id.as_deref())
            && token_school != user_school
        {
            return Err(AuthError::Session(SessionRejection::SchoolMismatch));
        }

        let school_id = claims.school_id.or_else(|| user.school_id.clone());
        Ok(AuthenticatedUser::from_record(&user, school_id))
    }

    // -----------------------------------------------------------------------
    // SSO
    // -----------------------------------------------------------------------

    /// Sign in with a provider-verified profile.
    ///
    /// Only users already linked to `(provider, provider_user_id)` are
    /// accepted; matching on email alone does not link accounts.
    pub async fn sso_login(
        &self,
        profile: &SsoProfile,
        tenant_id: &str,
        school_id: Option<&str>,
    ) -> Result<SessionGrant, AuthError> {
        let user = self
            .users
            .find_by_sso(tenant_id, &profile.provider, &profile.provider_user_id)
            .await?
            .ok_or_else(|| {
                info!(tenant_id, provider = %profile.provider, "sso identity not linked");
                AuthError::Unauthorized("No account is linked to this identity".into())
            })?;
        if !user.is_active() {
            return Err(AuthError::Unauthorized(ACCOUNT_NOT_ACTIVE.into()));
        }

        let now = self.now();
        let grant = self.open_session(&user, tenant_id, school_id, now)?;
        self.users.record_login(&user.id, now).await?;
        info!(tenant_id, user_id = %user.id, provider = %profile.provider, "user logged in via sso");
        Ok(grant)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Check school scope and issue the pair shared by every login path.
    fn open_session(
        &self,
        user: &UserRecord,
        tenant_id: &str,
        school_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<SessionGrant, AuthError> {
        if let (Some(requested), Some(own)) = (school_id, user.school_id.as_deref())
            && requested != own
        {
            return Err(AuthError::Unauthorized(SCHOOL_MISMATCH.into()));
        }
        let school_id = school_id.or(user.school_id.as_deref());
        let tokens = self
            .issuer
            .generate_token_pair(user, Some(tenant_id), school_id, now)?;
        Ok(SessionGrant {
            principal: AuthenticatedUser::from_record(user, school_id.map(str::to_string)),
            tokens,
        })
    }

    fn dummy_hash(&self) -> &str {
        self.dummy_hash.get_or_init(|| {
            hash_password("edugate-placeholder-password", self.bcrypt_cost).unwrap_or_default()
        })
    }
}

/// Trim and lower-case an email for lookup and storage.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !email.contains(' '),
        None => false,
    }
}
