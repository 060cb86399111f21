//! PostgreSQL-backed tenant directory and schema-per-tenant provisioner.

use async_trait::async_trait;
use dashmap::DashSet;
use sqlx::{PgConnection, PgPool};
use tracing::info;

use super::{TenantDirectory, TenantError, TenantProvisioner, schema_name, validate_database_name};
use crate::models::tenant::{School, Tenant};

/// SQLSTATE for `unique_violation`; raised when concurrent `CREATE SCHEMA IF
/// NOT EXISTS` calls race on `pg_namespace`.
const UNIQUE_VIOLATION: &str = "23505";
/// SQLSTATE for `duplicate_schema`.
const DUPLICATE_SCHEMA: &str = "42P06";

type TenantRow = (String, String, Option<String>, String, bool);

fn tenant_from_row((id, subdomain, custom_domain, database_name, is_active): TenantRow) -> Tenant {
    Tenant {
        id,
        subdomain,
        custom_domain,
        database_name,
        is_active,
    }
}

/// Tenant directory over the shared `tenants` / `schools` tables.
#[derive(Clone)]
pub struct PgTenantDirectory {
    pool: PgPool,
}

impl PgTenantDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, sql: &str, value: &str) -> Result<Option<Tenant>, TenantError> {
        let row = sqlx::query_as::<_, TenantRow>(sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(tenant_from_row))
    }
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<Tenant>, TenantError> {
        self.find_one(
            "SELECT id::text, subdomain, custom_domain, database_name, is_active \
             FROM tenants WHERE subdomain = $1 AND is_active",
            subdomain,
        )
        .await
    }

    async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>, TenantError> {
        self.find_one(
            "SELECT id::text, subdomain, custom_domain, database_name, is_active \
             FROM tenants WHERE custom_domain = $1 AND is_active",
            domain,
        )
        .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Tenant>, TenantError> {
        self.find_one(
            "SELECT id::text, subdomain, custom_domain, database_name, is_active \
             FROM tenants WHERE id::text = $1 AND is_active",
            id,
        )
        .await
    }

    async fn get_school_by_id(
        &self,
        school_id: &str,
        tenant_id: &str,
    ) -> Result<Option<School>, TenantError> {
        let row = sqlx::query_as::<_, (String, String, String, bool)>(
            "SELECT id::text, tenant_id::text, code, is_active \
             FROM schools \
             WHERE id::text = $1 AND tenant_id::text = $2 AND is_active",
        )
        .bind(school_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, tenant_id, code, is_active)| School {
            id,
            tenant_id,
            code,
            is_active,
        }))
    }
}

/// Provisions one PostgreSQL schema per tenant.
pub struct PgSchemaProvisioner {
    pool: PgPool,
    provisioned: DashSet<String>,
}

impl PgSchemaProvisioner {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            provisioned: DashSet::new(),
        }
    }

    async fn create_schema(&self, database_name: &str) -> Result<(), sqlx::Error> {
        let schema = schema_name(database_name);
        let ddl = format!("CREATE SCHEMA IF NOT EXISTS \"{schema}\"");
        let mut tx = self.pool.begin().await?;
        {
            let conn: &mut PgConnection = &mut tx;
            // Serialise concurrent first-use of the same tenant across connections.
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(&schema)
                .execute(&mut *conn)
                .await?;
            sqlx::query(&ddl).execute(&mut *conn).await?;
        }
        tx.commit().await
    }
}

#[async_trait]
impl TenantProvisioner for PgSchemaProvisioner {
    async fn ensure_database_exists(&self, tenant: &Tenant) -> Result<(), TenantError> {
        if self.provisioned.contains(&tenant.database_name) {
            return Ok(());
        }
        validate_database_name(&tenant.database_name)?;

        match self.create_schema(&tenant.database_name).await {
            Ok(()) => {}
            Err(sqlx::Error::Database(db))
                if matches!(db.code().as_deref(), Some(UNIQUE_VIOLATION | DUPLICATE_SCHEMA)) => {}
            Err(e) => return Err(TenantError::Provisioning(e.to_string())),
        }

        if self.provisioned.insert(tenant.database_name.clone()) {
            info!(
                tenant_id = %tenant.id,
                schema = %schema_name(&tenant.database_name),
                "tenant schema ensured"
            );
        }
        Ok(())
    }
}
