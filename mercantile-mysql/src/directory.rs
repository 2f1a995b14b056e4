//! MySQL-backed tenant directory
//!
//! Durable implementation of [`TenantDirectory`] over the `tenants` table in
//! the master database. Row structs are kept separate from the domain model so
//! column names and storage formats stay localized here; parsing into the
//! validated domain types happens in one place, on the way out of the store.

use crate::config::MySqlConfig;
use crate::error::{MySqlError, MySqlResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use mercantile_core::{
    BusinessType, DatabaseName, LoginName, ProvisioningState, Slug, Tenant, TenantCode,
    TenantPlan, TenantStatus,
};
use mercantile_tenancy::{TenancyError, TenantDirectory};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{FromRow, MySqlPool};
use tracing::info;
use uuid::Uuid;

/// Durable tenant directory backed by the master database.
pub struct MySqlDirectory {
    pool: MySqlPool,
    database_prefix: String,
}

/// Row shape of the `tenants` table.
#[derive(Debug, Clone, FromRow)]
struct TenantRow {
    id: String,
    slug: String,
    code: String,
    name: String,
    business_type: String,
    database_name: String,
    database_username: String,
    database_password: String,
    database_host: String,
    database_port: u16,
    status: String,
    provisioning_state: String,
    plan: String,
    max_users: Option<u32>,
    max_products: Option<u32>,
    max_transactions_per_month: Option<u32>,
    trial_ends_at: Option<NaiveDateTime>,
    subscription_expires_at: Option<NaiveDateTime>,
    last_accessed_at: Option<NaiveDateTime>,
    encryption_key: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const SELECT_COLUMNS: &str = "id, slug, code, name, business_type, database_name, \
     database_username, database_password, database_host, database_port, status, \
     provisioning_state, plan, max_users, max_products, max_transactions_per_month, \
     trial_ends_at, subscription_expires_at, last_accessed_at, encryption_key, \
     created_at, updated_at";

impl MySqlDirectory {
    /// Connect to the master database and apply pending directory migrations.
    pub async fn connect(config: &MySqlConfig) -> MySqlResult<Self> {
        info!("connecting MySQL directory pool");
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.master_url())
            .await
            .map_err(|e| MySqlError::Connection(e.to_string()))?;

        // Migrations run before serving so every query can assume the schema.
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| MySqlError::Migration(e.to_string()))?;
        info!("MySQL directory pool established");

        Ok(Self {
            pool,
            database_prefix: "tenant_".to_string(),
        })
    }

    /// Wrap an existing pool; caller manages the schema.
    pub fn with_pool(pool: MySqlPool) -> Self {
        Self {
            pool,
            database_prefix: "tenant_".to_string(),
        }
    }

    /// Override the database prefix used to verify stored bindings.
    pub fn database_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.database_prefix = prefix.into();
        self
    }

    fn domain(&self, row: TenantRow) -> Result<Tenant, TenancyError> {
        row_to_tenant(row, &self.database_prefix)
    }

    async fn fetch_one_where(
        &self,
        column: &'static str,
        value: &str,
    ) -> Result<Option<Tenant>, TenancyError> {
        let row: Option<TenantRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM tenants WHERE {column} = ?"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.map(|r| self.domain(r)).transpose()
    }
}

#[async_trait]
impl TenantDirectory for MySqlDirectory {
    async fn insert(&self, tenant: &Tenant) -> Result<(), TenancyError> {
        let result = sqlx::query(
            "INSERT INTO tenants (id, slug, code, name, business_type, database_name, \
             database_username, database_password, database_host, database_port, status, \
             provisioning_state, plan, max_users, max_products, max_transactions_per_month, \
             trial_ends_at, subscription_expires_at, last_accessed_at, encryption_key, \
             created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(tenant.id.to_string())
        .bind(tenant.slug.as_str())
        .bind(tenant.code.as_str())
        .bind(&tenant.name)
        .bind(tenant.business_type.to_string())
        .bind(tenant.database_name.as_str())
        .bind(tenant.database_username.as_str())
        .bind(&tenant.database_password)
        .bind(&tenant.database_host)
        .bind(tenant.database_port)
        .bind(tenant.status.to_string())
        .bind(tenant.provisioning_state.to_string())
        .bind(tenant.plan.to_string())
        .bind(tenant.max_users)
        .bind(tenant.max_products)
        .bind(tenant.max_transactions_per_month)
        .bind(tenant.trial_ends_at.map(|t| t.naive_utc()))
        .bind(tenant.subscription_expires_at.map(|t| t.naive_utc()))
        .bind(tenant.last_accessed_at.map(|t| t.naive_utc()))
        .bind(&tenant.encryption_key)
        .bind(tenant.created_at.naive_utc())
        .bind(tenant.updated_at.naive_utc())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(TenancyError::DirectoryConflict(tenant.slug.to_string()))
            }
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn update(&self, tenant: &Tenant) -> Result<(), TenancyError> {
        let result = sqlx::query(
            "UPDATE tenants SET name = ?, business_type = ?, database_password = ?, \
             database_host = ?, database_port = ?, status = ?, provisioning_state = ?, \
             plan = ?, max_users = ?, max_products = ?, max_transactions_per_month = ?, \
             trial_ends_at = ?, subscription_expires_at = ?, last_accessed_at = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(&tenant.name)
        .bind(tenant.business_type.to_string())
        .bind(&tenant.database_password)
        .bind(&tenant.database_host)
        .bind(tenant.database_port)
        .bind(tenant.status.to_string())
        .bind(tenant.provisioning_state.to_string())
        .bind(tenant.plan.to_string())
        .bind(tenant.max_users)
        .bind(tenant.max_products)
        .bind(tenant.max_transactions_per_month)
        .bind(tenant.trial_ends_at.map(|t| t.naive_utc()))
        .bind(tenant.subscription_expires_at.map(|t| t.naive_utc()))
        .bind(tenant.last_accessed_at.map(|t| t.naive_utc()))
        .bind(tenant.updated_at.naive_utc())
        .bind(tenant.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(TenancyError::NotFound(tenant.slug.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), TenancyError> {
        sqlx::query("DELETE FROM tenants WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, TenancyError> {
        self.fetch_one_where("id", &id.to_string()).await
    }

    async fn find_by_slug(&self, slug: &Slug) -> Result<Option<Tenant>, TenancyError> {
        self.fetch_one_where("slug", slug.as_str()).await
    }

    async fn find_by_code(&self, code: &TenantCode) -> Result<Option<Tenant>, TenancyError> {
        self.fetch_one_where("code", code.as_str()).await
    }

    async fn list_in_state(
        &self,
        state: ProvisioningState,
    ) -> Result<Vec<Tenant>, TenancyError> {
        let rows: Vec<TenantRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM tenants WHERE provisioning_state = ? \
             ORDER BY created_at"
        ))
        .bind(state.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.into_iter().map(|r| self.domain(r)).collect()
    }

    async fn count(&self) -> Result<u64, TenancyError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tenants")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(count.max(0) as u64)
    }
}

fn storage_err(err: sqlx::Error) -> TenancyError {
    TenancyError::Storage(err.to_string())
}

fn utc(naive: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(naive, Utc)
}

fn row_to_tenant(row: TenantRow, prefix: &str) -> Result<Tenant, TenancyError> {
    let slug = Slug::parse(row.slug)?;
    let code = TenantCode::parse(row.code)?;
    let database_name = DatabaseName::rehydrate(&row.database_name, prefix, &slug)?;

    let database_username = LoginName::derive(&slug);
    if database_username.as_str() != row.database_username {
        return Err(TenancyError::Storage(format!(
            "stored login '{}' does not match slug '{}'",
            row.database_username, slug
        )));
    }

    Ok(Tenant {
        id: Uuid::parse_str(&row.id)
            .map_err(|e| TenancyError::Storage(format!("corrupt tenant id: {e}")))?,
        code,
        name: row.name,
        business_type: parse_business_type(&row.business_type)?,
        database_name,
        database_username,
        database_password: row.database_password,
        database_host: row.database_host,
        database_port: row.database_port,
        status: parse_status(&row.status)?,
        provisioning_state: parse_state(&row.provisioning_state)?,
        plan: parse_plan(&row.plan)?,
        max_users: row.max_users,
        max_products: row.max_products,
        max_transactions_per_month: row.max_transactions_per_month,
        trial_ends_at: row.trial_ends_at.map(utc),
        subscription_expires_at: row.subscription_expires_at.map(utc),
        last_accessed_at: row.last_accessed_at.map(utc),
        encryption_key: row.encryption_key,
        created_at: utc(row.created_at),
        updated_at: utc(row.updated_at),
        slug,
    })
}

fn parse_status(value: &str) -> Result<TenantStatus, TenancyError> {
    match value {
        "active" => Ok(TenantStatus::Active),
        "inactive" => Ok(TenantStatus::Inactive),
        "suspended" => Ok(TenantStatus::Suspended),
        other => Err(TenancyError::Storage(format!("unknown status '{other}'"))),
    }
}

fn parse_state(value: &str) -> Result<ProvisioningState, TenancyError> {
    match value {
        "creating" => Ok(ProvisioningState::Creating),
        "schema_syncing" => Ok(ProvisioningState::SchemaSyncing),
        "ready" => Ok(ProvisioningState::Ready),
        "destroying" => Ok(ProvisioningState::Destroying),
        other => Err(TenancyError::Storage(format!(
            "unknown provisioning state '{other}'"
        ))),
    }
}

fn parse_plan(value: &str) -> Result<TenantPlan, TenancyError> {
    match value {
        "trial" => Ok(TenantPlan::Trial),
        "basic" => Ok(TenantPlan::Basic),
        "professional" => Ok(TenantPlan::Professional),
        "enterprise" => Ok(TenantPlan::Enterprise),
        other => Err(TenancyError::Storage(format!("unknown plan '{other}'"))),
    }
}

fn parse_business_type(value: &str) -> Result<BusinessType, TenancyError> {
    match value {
        "retail" => Ok(BusinessType::Retail),
        "restaurant" => Ok(BusinessType::Restaurant),
        "grocery" => Ok(BusinessType::Grocery),
        "pharmacy" => Ok(BusinessType::Pharmacy),
        "service" => Ok(BusinessType::Service),
        "wholesale" => Ok(BusinessType::Wholesale),
        other => Err(TenancyError::Storage(format!(
            "unknown business type '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> TenantRow {
        let now = Utc::now().naive_utc();
        TenantRow {
            id: Uuid::new_v4().to_string(),
            slug: "acme".to_string(),
            code: "7KQ2XF9A".to_string(),
            name: "Acme Retail".to_string(),
            business_type: "retail".to_string(),
            database_name: "tenant_acme".to_string(),
            database_username: "tenant_acme".to_string(),
            database_password: "x".repeat(32),
            database_host: "127.0.0.1".to_string(),
            database_port: 3306,
            status: "active".to_string(),
            provisioning_state: "ready".to_string(),
            plan: "trial".to_string(),
            max_users: Some(3),
            max_products: Some(100),
            max_transactions_per_month: Some(500),
            trial_ends_at: Some(now),
            subscription_expires_at: None,
            last_accessed_at: None,
            encryption_key: "ab".repeat(32),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_row_maps_to_domain() {
        let tenant = row_to_tenant(sample_row(), "tenant_").unwrap();
        assert_eq!(tenant.slug.as_str(), "acme");
        assert_eq!(tenant.database_name.as_str(), "tenant_acme");
        assert_eq!(tenant.status, TenantStatus::Active);
        assert_eq!(tenant.plan, TenantPlan::Trial);
        assert_eq!(tenant.max_users, Some(3));
    }

    #[test]
    fn test_drifted_database_name_is_rejected() {
        let mut row = sample_row();
        row.database_name = "tenant_other".to_string();
        assert!(row_to_tenant(row, "tenant_").is_err());
    }

    #[test]
    fn test_drifted_login_is_rejected() {
        let mut row = sample_row();
        row.database_username = "tenant_other".to_string();
        let err = row_to_tenant(row, "tenant_").unwrap_err();
        assert!(matches!(err, TenancyError::Storage(_)));
    }

    #[test]
    fn test_unknown_enum_values_are_storage_errors() {
        let mut row = sample_row();
        row.status = "defunct".to_string();
        assert!(row_to_tenant(row, "tenant_").is_err());

        let mut row = sample_row();
        row.plan = "platinum".to_string();
        assert!(row_to_tenant(row, "tenant_").is_err());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            TenantStatus::Active,
            TenantStatus::Inactive,
            TenantStatus::Suspended,
        ] {
            assert_eq!(parse_status(&status.to_string()).unwrap(), status);
        }
        for state in [
            ProvisioningState::Creating,
            ProvisioningState::SchemaSyncing,
            ProvisioningState::Ready,
            ProvisioningState::Destroying,
        ] {
            assert_eq!(parse_state(&state.to_string()).unwrap(), state);
        }
    }
}
