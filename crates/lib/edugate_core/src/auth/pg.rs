//! PostgreSQL-backed user store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::store::UserStore;
use super::{AuthError, EMAIL_ALREADY_REGISTERED};
use crate::models::user::{NewUser, UserRecord, UserRole, UserStatus};
use crate::uuid::uuidv7;

const UNIQUE_VIOLATION: &str = "23505";

const USER_COLUMNS: &str = "id::text, tenant_id::text, school_id::text, email, password_hash, \
     first_name, last_name, role, status, sso_provider, sso_id, \
     reset_password_token, reset_password_expires, magic_link_token, magic_link_expires, \
     email_verification_token, last_login_at, created_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    tenant_id: String,
    school_id: Option<String>,
    email: String,
    password_hash: Option<String>,
    first_name: String,
    last_name: String,
    role: String,
    status: String,
    sso_provider: Option<String>,
    sso_id: Option<String>,
    reset_password_token: Option<String>,
    reset_password_expires: Option<DateTime<Utc>>,
    magic_link_token: Option<String>,
    magic_link_expires: Option<DateTime<Utc>>,
    email_verification_token: Option<String>,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = AuthError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(UserRecord {
            role: row.role.parse::<UserRole>().map_err(AuthError::Internal)?,
            status: row.status.parse::<UserStatus>().map_err(AuthError::Internal)?,
            id: row.id,
            tenant_id: row.tenant_id,
            school_id: row.school_id,
            email: row.email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            sso_provider: row.sso_provider,
            sso_id: row.sso_id,
            reset_password_token: row.reset_password_token,
            reset_password_expires: row.reset_password_expires,
            magic_link_token: row.magic_link_token,
            magic_link_expires: row.magic_link_expires,
            email_verification_token: row.email_verification_token,
            last_login_at: row.last_login_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch one user matching `predicate` (which binds `$1` = tenant, `$2`).
    async fn fetch_where(
        &self,
        predicate: &str,
        tenant_id: &str,
        value: &str,
    ) -> Result<Option<UserRecord>, AuthError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE tenant_id::text = $1 AND {predicate}");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(tenant_id)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(UserRecord::try_from).transpose()
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(
        &self,
        tenant_id: &str,
        email: &str,
    ) -> Result<Option<UserRecord>, AuthError> {
        self.fetch_where("email = $2", tenant_id, email).await
    }

    async fn find_by_id(
        &self,
        tenant_id: &str,
        id: &str,
    ) -> Result<Option<UserRecord>, AuthError> {
        self.fetch_where("id::text = $2", tenant_id, id).await
    }

    async fn find_by_reset_token(
        &self,
        tenant_id: &str,
        token_hash: &str,
    ) -> Result<Option<UserRecord>, AuthError> {
        self.fetch_where("reset_password_token = $2", tenant_id, token_hash)
            .await
    }

    async fn find_by_magic_link_token(
        &self,
        tenant_id: &str,
        token_hash: &str,
    ) -> Result<Option<UserRecord>, AuthError> {
        self.fetch_where("magic_link_token = $2", tenant_id, token_hash)
            .await
    }

    async fn find_by_sso(
        &self,
        tenant_id: &str,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<UserRecord>, AuthError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE tenant_id::text = $1 AND sso_provider = $2 AND sso_id = $3"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(tenant_id)
            .bind(provider)
            .bind(provider_user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(UserRecord::try_from).transpose()
    }

    async fn email_exists(&self, tenant_id: &str, email: &str) -> Result<bool, AuthError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE tenant_id::text = $1 AND email = $2)",
        )
        .bind(tenant_id)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, AuthError> {
        let sql = format!(
            "INSERT INTO users \
               (id, tenant_id, school_id, email, password_hash, first_name, last_name, \
                role, status, email_verification_token) \
             VALUES ($1, $2::uuid, $3::uuid, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(uuidv7())
            .bind(&user.tenant_id)
            .bind(&user.school_id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(user.role.as_str())
            .bind(UserStatus::Pending.as_str())
            .bind(&user.email_verification_token)
            .fetch_one(&self.pool)
            .await;
        match row {
            Ok(row) => UserRecord::try_from(row),
            // Lost a race with a concurrent registration of the same email.
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(AuthError::BadRequest(EMAIL_ALREADY_REGISTERED.into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn record_login(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), AuthError> {
        sqlx::query("UPDATE users SET last_login_at = $2 WHERE id::text = $1")
            .bind(user_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_reset_token(
        &self,
        user_id: &str,
        token_hash: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        sqlx::query(
            "UPDATE users SET reset_password_token = $2, reset_password_expires = $3 \
             WHERE id::text = $1",
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        user_id: &str,
        token_hash: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "UPDATE users \
             SET password_hash = $3, reset_password_token = NULL, reset_password_expires = NULL \
             WHERE id::text = $1 AND reset_password_token = $2 AND reset_password_expires > $4",
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(password_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_magic_link_token(
        &self,
        user_id: &str,
        token_hash: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        sqlx::query(
            "UPDATE users SET magic_link_token = $2, magic_link_expires = $3 WHERE id::text = $1",
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_magic_link_token(
        &self,
        user_id: &str,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "UPDATE users \
             SET magic_link_token = NULL, magic_link_expires = NULL, last_login_at = $3 \
             WHERE id::text = $1 AND magic_link_token = $2 AND magic_link_expires > $3",
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn permissions_for_role(
        &self,
        tenant_id: &str,
        role: UserRole,
    ) -> Result<Vec<String>, AuthError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT permission FROM role_permissions \
             WHERE tenant_id::text = $1 AND role = $2 \
             ORDER BY permission",
        )
        .bind(tenant_id)
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
