//! Privileged server access
//!
//! Implements the engine's [`ServerAdmin`] and [`SchemaExecutor`] seams over an
//! admin connection pool. All DDL goes through here; statements only ever see
//! identifiers that arrived as validated newtypes, quoted with backticks on the
//! way into SQL text.

use crate::config::MySqlConfig;
use crate::error::{MySqlError, MySqlResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mercantile_core::{DatabaseName, LoginName};
use mercantile_tenancy::{SchemaExecutor, ServerAdmin, TenancyError};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use tracing::{debug, info};
use uuid::Uuid;

/// Admin-pool implementation of the provisioning seams.
pub struct MySqlServerAdmin {
    pool: MySqlPool,
    master: String,
    ledger_table: String,
}

impl MySqlServerAdmin {
    /// Connect the admin pool.
    ///
    /// The pool targets the server itself rather than any one database, since
    /// most statements here name their database explicitly.
    pub async fn connect(config: &MySqlConfig) -> MySqlResult<Self> {
        info!("connecting MySQL admin pool");
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.server_url)
            .await
            .map_err(|e| MySqlError::Connection(e.to_string()))?;
        info!("MySQL admin pool established");

        Ok(Self {
            pool,
            master: config.master_database.clone(),
            ledger_table: "migrations".to_string(),
        })
    }

    /// Wrap an existing pool.
    pub fn with_pool(pool: MySqlPool, master_database: impl Into<String>) -> Self {
        Self {
            pool,
            master: master_database.into(),
            ledger_table: "migrations".to_string(),
        }
    }

    /// Override the ledger table name.
    pub fn ledger_table(mut self, table: impl Into<String>) -> Self {
        self.ledger_table = table.into();
        self
    }

    /// The underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    async fn execute(&self, sql: &str) -> Result<u64, TenancyError> {
        debug!(statement = first_keywords(sql), "executing admin statement");
        let result = sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ServerAdmin for MySqlServerAdmin {
    async fn create_database(&self, database: &DatabaseName) -> Result<(), TenancyError> {
        self.execute(&create_database_sql(database)).await?;
        Ok(())
    }

    async fn create_login(
        &self,
        login: &LoginName,
        password: &str,
    ) -> Result<(), TenancyError> {
        // DDL cannot take bind parameters, so the password is escaped into a
        // quoted literal. Never logged.
        let sql = create_user_sql(login, password);
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn grant_all(
        &self,
        login: &LoginName,
        database: &DatabaseName,
    ) -> Result<(), TenancyError> {
        self.execute(&grant_sql(login, database)).await?;
        Ok(())
    }

    async fn flush_privileges(&self) -> Result<(), TenancyError> {
        self.execute("FLUSH PRIVILEGES").await?;
        Ok(())
    }

    async fn drop_database(&self, database: &DatabaseName) -> Result<(), TenancyError> {
        self.execute(&format!(
            "DROP DATABASE IF EXISTS {}",
            quote_ident(database.as_str())
        ))
        .await?;
        Ok(())
    }

    async fn drop_login(&self, login: &LoginName) -> Result<(), TenancyError> {
        self.execute(&format!(
            "DROP USER IF EXISTS {}@'%'",
            quote_literal(login.as_str())
        ))
        .await?;
        Ok(())
    }

    async fn database_exists(&self, database: &DatabaseName) -> Result<bool, TenancyError> {
        let found: Option<String> = sqlx::query_scalar(
            "SELECT schema_name FROM information_schema.schemata WHERE schema_name = ?",
        )
        .bind(database.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl SchemaExecutor for MySqlServerAdmin {
    async fn master_tables(&self) -> Result<Vec<String>, TenancyError> {
        sqlx::query_scalar(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = ? AND table_type = 'BASE TABLE' ORDER BY table_name",
        )
        .bind(&self.master)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)
    }

    async fn table_exists(
        &self,
        database: &DatabaseName,
        table: &str,
    ) -> Result<bool, TenancyError> {
        let found: Option<String> = sqlx::query_scalar(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = ? AND table_name = ?",
        )
        .bind(database.as_str())
        .bind(table)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(found.is_some())
    }

    async fn clone_structure(
        &self,
        database: &DatabaseName,
        table: &str,
    ) -> Result<(), TenancyError> {
        self.execute(&clone_table_sql(database, &self.master, table))
            .await?;
        Ok(())
    }

    async fn row_count(
        &self,
        database: &DatabaseName,
        table: &str,
    ) -> Result<u64, TenancyError> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {}.{}",
            quote_ident(database.as_str()),
            quote_ident(table)
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(count.max(0) as u64)
    }

    async fn row_count_since(
        &self,
        database: &DatabaseName,
        table: &str,
        timestamp_column: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, TenancyError> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {}.{} WHERE {} >= ?",
            quote_ident(database.as_str()),
            quote_ident(table),
            quote_ident(timestamp_column)
        ))
        .bind(since.naive_utc())
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(count.max(0) as u64)
    }

    async fn copy_tenant_rows(
        &self,
        database: &DatabaseName,
        table: &str,
        tenant_column: &str,
        tenant_id: Uuid,
    ) -> Result<u64, TenancyError> {
        let sql = format!(
            "INSERT IGNORE INTO {dest}.{table} SELECT * FROM {master}.{table} WHERE {column} = ?",
            dest = quote_ident(database.as_str()),
            master = quote_ident(&self.master),
            table = quote_ident(table),
            column = quote_ident(tenant_column),
        );
        let result = sqlx::query(&sql)
            .bind(tenant_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected())
    }

    async fn copy_all_rows(
        &self,
        database: &DatabaseName,
        table: &str,
    ) -> Result<u64, TenancyError> {
        let sql = format!(
            "INSERT IGNORE INTO {dest}.{table} SELECT * FROM {master}.{table}",
            dest = quote_ident(database.as_str()),
            master = quote_ident(&self.master),
            table = quote_ident(table),
        );
        self.execute(&sql).await
    }

    async fn master_ledger(&self) -> Result<Vec<String>, TenancyError> {
        sqlx::query_scalar(&format!(
            "SELECT migration FROM {}.{} ORDER BY batch, migration",
            quote_ident(&self.master),
            quote_ident(&self.ledger_table)
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)
    }

    async fn tenant_ledger(
        &self,
        database: &DatabaseName,
    ) -> Result<Option<Vec<String>>, TenancyError> {
        if !self.table_exists(database, &self.ledger_table).await? {
            return Ok(None);
        }
        let names = sqlx::query_scalar(&format!(
            "SELECT migration FROM {}.{}",
            quote_ident(database.as_str()),
            quote_ident(&self.ledger_table)
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(Some(names))
    }

    async fn seed_ledger(
        &self,
        database: &DatabaseName,
        migrations: &[String],
        batch: i64,
    ) -> Result<(), TenancyError> {
        if migrations.is_empty() {
            return Ok(());
        }
        let mut builder = sqlx::QueryBuilder::new(format!(
            "INSERT INTO {}.{} (`migration`, `batch`) ",
            quote_ident(database.as_str()),
            quote_ident(&self.ledger_table)
        ));
        builder.push_values(migrations, |mut row, name| {
            row.push_bind(name.as_str()).push_bind(batch);
        });
        builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

fn storage_err(err: sqlx::Error) -> TenancyError {
    TenancyError::Storage(err.to_string())
}

fn first_keywords(sql: &str) -> String {
    sql.split_whitespace().take(3).collect::<Vec<_>>().join(" ")
}

fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

fn create_database_sql(database: &DatabaseName) -> String {
    format!(
        "CREATE DATABASE IF NOT EXISTS {} CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci",
        quote_ident(database.as_str())
    )
}

fn create_user_sql(login: &LoginName, password: &str) -> String {
    format!(
        "CREATE USER IF NOT EXISTS {}@'%' IDENTIFIED BY {}",
        quote_literal(login.as_str()),
        quote_literal(password)
    )
}

fn grant_sql(login: &LoginName, database: &DatabaseName) -> String {
    format!(
        "GRANT ALL PRIVILEGES ON {}.* TO {}@'%'",
        quote_ident(database.as_str()),
        quote_literal(login.as_str())
    )
}

fn clone_table_sql(database: &DatabaseName, master: &str, table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {dest}.{table} LIKE {master}.{table}",
        dest = quote_ident(database.as_str()),
        master = quote_ident(master),
        table = quote_ident(table),
    )
}
