//! In-memory server and fixtures
//!
//! A reference implementation of the [`ServerAdmin`] and [`SchemaExecutor`]
//! seams over plain maps, mirroring the idempotency semantics of the real DDL
//! (`IF NOT EXISTS`, insert-or-ignore). Engine tests — and downstream crates
//! that want to exercise provisioning without a database server — run against
//! this.

use crate::credentials::{CredentialManager, ServerAdmin};
use crate::sync::SchemaExecutor;
use crate::TenancyError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mercantile_core::{
    BusinessType, DatabaseName, LoginName, PlanLimits, ProvisioningState, Slug, Tenant,
    TenantCode, TenantPlan, TenantStatus,
};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

type Row = Map<String, Value>;

#[derive(Debug, Clone, Default)]
struct TableData {
    columns: Vec<String>,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
struct DatabaseData {
    tables: HashMap<String, TableData>,
}

#[derive(Debug, Default)]
struct ServerState {
    databases: HashMap<String, DatabaseData>,
    logins: HashMap<String, String>,
    grants: HashMap<String, HashSet<String>>,
}

/// In-memory database server with one master database.
pub struct InMemoryServer {
    master: String,
    state: RwLock<ServerState>,
    fail_creates: AtomicBool,
    fail_drops: AtomicBool,
}

impl InMemoryServer {
    /// Create a server holding an empty master database of the given name.
    pub fn new(master: impl Into<String>) -> Self {
        let master = master.into();
        let mut state = ServerState::default();
        state.databases.insert(master.clone(), DatabaseData::default());
        Self {
            master,
            state: RwLock::new(state),
            fail_creates: AtomicBool::new(false),
            fail_drops: AtomicBool::new(false),
        }
    }

    /// Make every subsequent create statement fail (provisioning-failure tests).
    pub fn set_fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent drop statement fail (teardown-failure tests).
    pub fn set_fail_drops(&self, fail: bool) {
        self.fail_drops.store(fail, Ordering::SeqCst);
    }

    /// Seed (or replace) a master table.
    pub fn seed_master_table(&self, table: &str, columns: &[&str], rows: Vec<Value>) {
        let rows = rows
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        let mut state = self.state.write();
        let master = state
            .databases
            .entry(self.master.clone())
            .or_default();
        master.tables.insert(
            table.to_string(),
            TableData {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
            },
        );
    }

    /// Seed the master migration ledger with applied migration names.
    pub fn seed_master_ledger(&self, names: &[&str]) {
        let rows = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                serde_json::json!({"migration": name, "batch": (i + 1) as i64})
            })
            .collect();
        self.seed_master_table("migrations", &["migration", "batch"], rows);
    }

    /// Create a tenant's ledger table pre-filled with the given names (batch 1).
    pub fn create_tenant_ledger(&self, tenant: &Tenant, names: &[&str]) {
        let mut state = self.state.write();
        let db = state
            .databases
            .entry(tenant.database_name.as_str().to_string())
            .or_default();
        let rows = names
            .iter()
            .map(|name| {
                let mut row = Row::new();
                row.insert("migration".into(), Value::String((*name).to_string()));
                row.insert("batch".into(), Value::Number(1.into()));
                row
            })
            .collect();
        db.tables.insert(
            "migrations".to_string(),
            TableData {
                columns: vec!["migration".into(), "batch".into()],
                rows,
            },
        );
    }

    /// Insert a single row into an existing table (test arrangement helper).
    pub fn insert_row(&self, database: &DatabaseName, table: &str, row: Value) {
        if let Value::Object(map) = row {
            let mut state = self.state.write();
            if let Some(data) = state
                .databases
                .get_mut(database.as_str())
                .and_then(|db| db.tables.get_mut(table))
            {
                data.rows.push(map);
            }
        }
    }

    /// Convenience wrapper: create the tenant's physical database.
    pub async fn create_database_for(&self, tenant: &Tenant) {
        let _ = ServerAdmin::create_database(self, &tenant.database_name).await;
    }

    /// Ledger entries `(migration, batch)` in the tenant database.
    pub fn tenant_ledger_entries(&self, tenant: &Tenant) -> Vec<(String, i64)> {
        let state = self.state.read();
        state
            .databases
            .get(tenant.database_name.as_str())
            .and_then(|db| db.tables.get("migrations"))
            .map(|t| {
                t.rows
                    .iter()
                    .filter_map(|row| {
                        let name = row.get("migration")?.as_str()?.to_string();
                        let batch = row.get("batch")?.as_i64()?;
                        Some((name, batch))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether a table exists (synchronous test helper).
    pub fn table_exists_sync(&self, database: &DatabaseName, table: &str) -> bool {
        let state = self.state.read();
        state
            .databases
            .get(database.as_str())
            .is_some_and(|db| db.tables.contains_key(table))
    }

    /// Rows of a table; empty when the database or table is missing.
    pub fn rows(&self, database: &DatabaseName, table: &str) -> Vec<Row> {
        let state = self.state.read();
        state
            .databases
            .get(database.as_str())
            .and_then(|db| db.tables.get(table))
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Sorted table names of a database.
    pub fn tables(&self, database: &DatabaseName) -> Vec<String> {
        let state = self.state.read();
        let mut tables: Vec<String> = state
            .databases
            .get(database.as_str())
            .map(|db| db.tables.keys().cloned().collect())
            .unwrap_or_default();
        tables.sort();
        tables
    }

    /// Sorted database names in the server catalog.
    pub fn databases(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().databases.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a login exists.
    pub fn has_login(&self, login: &LoginName) -> bool {
        self.state.read().logins.contains_key(login.as_str())
    }

    /// Databases a login has been granted access to.
    pub fn grants_for(&self, login: &LoginName) -> Vec<String> {
        let state = self.state.read();
        let mut grants: Vec<String> = state
            .grants
            .get(login.as_str())
            .map(|dbs| dbs.iter().cloned().collect())
            .unwrap_or_default();
        grants.sort();
        grants
    }

    fn database_mut<'a>(
        state: &'a mut ServerState,
        database: &DatabaseName,
    ) -> Result<&'a mut DatabaseData, TenancyError> {
        state
            .databases
            .get_mut(database.as_str())
            .ok_or_else(|| TenancyError::Storage(format!("unknown database '{database}'")))
    }

    fn copy_rows(
        &self,
        database: &DatabaseName,
        table: &str,
        filter: Option<(&str, String)>,
    ) -> Result<u64, TenancyError> {
        let mut state = self.state.write();

        let source_rows = state
            .databases
            .get(&self.master)
            .and_then(|db| db.tables.get(table))
            .map(|t| t.rows.clone())
            .ok_or_else(|| {
                TenancyError::Storage(format!("master table '{table}' does not exist"))
            })?;

        let dest = Self::database_mut(&mut state, database)?
            .tables
            .get_mut(table)
            .ok_or_else(|| {
                TenancyError::Storage(format!("table '{table}' missing in '{database}'"))
            })?;

        let mut copied = 0u64;
        for row in source_rows {
            if let Some((column, wanted)) = &filter {
                if row.get(*column).and_then(|v| v.as_str()) != Some(wanted.as_str()) {
                    continue;
                }
            }
            // Insert-or-ignore: primary key is the `id` column when present,
            // otherwise whole-row equality.
            let duplicate = match row.get("id") {
                Some(id) => dest.rows.iter().any(|r| r.get("id") == Some(id)),
                None => dest.rows.contains(&row),
            };
            if !duplicate {
                dest.rows.push(row);
                copied += 1;
            }
        }
        Ok(copied)
    }
}

#[async_trait]
impl ServerAdmin for InMemoryServer {
    async fn create_database(&self, database: &DatabaseName) -> Result<(), TenancyError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(TenancyError::Storage("create refused".into()));
        }
        self.state
            .write()
            .databases
            .entry(database.as_str().to_string())
            .or_default();
        Ok(())
    }

    async fn create_login(
        &self,
        login: &LoginName,
        password: &str,
    ) -> Result<(), TenancyError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(TenancyError::Storage("create refused".into()));
        }
        self.state
            .write()
            .logins
            .entry(login.as_str().to_string())
            .or_insert_with(|| password.to_string());
        Ok(())
    }

    async fn grant_all(
        &self,
        login: &LoginName,
        database: &DatabaseName,
    ) -> Result<(), TenancyError> {
        let mut state = self.state.write();
        if !state.logins.contains_key(login.as_str()) {
            return Err(TenancyError::Storage(format!("unknown login '{login}'")));
        }
        state
            .grants
            .entry(login.as_str().to_string())
            .or_default()
            .insert(database.as_str().to_string());
        Ok(())
    }

    async fn flush_privileges(&self) -> Result<(), TenancyError> {
        Ok(())
    }

    async fn drop_database(&self, database: &DatabaseName) -> Result<(), TenancyError> {
        if self.fail_drops.load(Ordering::SeqCst) {
            return Err(TenancyError::Storage("drop refused".into()));
        }
        self.state.write().databases.remove(database.as_str());
        Ok(())
    }

    async fn drop_login(&self, login: &LoginName) -> Result<(), TenancyError> {
        if self.fail_drops.load(Ordering::SeqCst) {
            return Err(TenancyError::Storage("drop refused".into()));
        }
        let mut state = self.state.write();
        state.logins.remove(login.as_str());
        state.grants.remove(login.as_str());
        Ok(())
    }

    async fn database_exists(&self, database: &DatabaseName) -> Result<bool, TenancyError> {
        Ok(self
            .state
            .read()
            .databases
            .contains_key(database.as_str()))
    }
}

#[async_trait]
impl SchemaExecutor for InMemoryServer {
    async fn master_tables(&self) -> Result<Vec<String>, TenancyError> {
        let state = self.state.read();
        let master = state
            .databases
            .get(&self.master)
            .ok_or_else(|| TenancyError::Storage("master database missing".into()))?;
        let mut tables: Vec<String> = master.tables.keys().cloned().collect();
        tables.sort();
        Ok(tables)
    }

    async fn table_exists(
        &self,
        database: &DatabaseName,
        table: &str,
    ) -> Result<bool, TenancyError> {
        let state = self.state.read();
        let db = state
            .databases
            .get(database.as_str())
            .ok_or_else(|| TenancyError::Storage(format!("unknown database '{database}'")))?;
        Ok(db.tables.contains_key(table))
    }

    async fn clone_structure(
        &self,
        database: &DatabaseName,
        table: &str,
    ) -> Result<(), TenancyError> {
        let mut state = self.state.write();
        let columns = state
            .databases
            .get(&self.master)
            .and_then(|db| db.tables.get(table))
            .map(|t| t.columns.clone())
            .ok_or_else(|| {
                TenancyError::Storage(format!("master table '{table}' does not exist"))
            })?;
        let db = Self::database_mut(&mut state, database)?;
        db.tables.entry(table.to_string()).or_insert(TableData {
            columns,
            rows: Vec::new(),
        });
        Ok(())
    }

    async fn row_count(
        &self,
        database: &DatabaseName,
        table: &str,
    ) -> Result<u64, TenancyError> {
        let state = self.state.read();
        let db = state
            .databases
            .get(database.as_str())
            .ok_or_else(|| TenancyError::Storage(format!("unknown database '{database}'")))?;
        let data = db.tables.get(table).ok_or_else(|| {
            TenancyError::Storage(format!("table '{table}' missing in '{database}'"))
        })?;
        Ok(data.rows.len() as u64)
    }

    async fn row_count_since(
        &self,
        database: &DatabaseName,
        table: &str,
        timestamp_column: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, TenancyError> {
        let state = self.state.read();
        let db = state
            .databases
            .get(database.as_str())
            .ok_or_else(|| TenancyError::Storage(format!("unknown database '{database}'")))?;
        let data = db.tables.get(table).ok_or_else(|| {
            TenancyError::Storage(format!("table '{table}' missing in '{database}'"))
        })?;
        let count = data
            .rows
            .iter()
            .filter(|row| {
                row.get(timestamp_column)
                    .and_then(|v| v.as_str())
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .is_some_and(|ts| ts.with_timezone(&Utc) >= since)
            })
            .count();
        Ok(count as u64)
    }

    async fn copy_tenant_rows(
        &self,
        database: &DatabaseName,
        table: &str,
        tenant_column: &str,
        tenant_id: Uuid,
    ) -> Result<u64, TenancyError> {
        self.copy_rows(database, table, Some((tenant_column, tenant_id.to_string())))
    }

    async fn copy_all_rows(
        &self,
        database: &DatabaseName,
        table: &str,
    ) -> Result<u64, TenancyError> {
        self.copy_rows(database, table, None)
    }

    async fn master_ledger(&self) -> Result<Vec<String>, TenancyError> {
        let state = self.state.read();
        Ok(state
            .databases
            .get(&self.master)
            .and_then(|db| db.tables.get("migrations"))
            .map(|t| {
                t.rows
                    .iter()
                    .filter_map(|row| row.get("migration")?.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn tenant_ledger(
        &self,
        database: &DatabaseName,
    ) -> Result<Option<Vec<String>>, TenancyError> {
        let state = self.state.read();
        let db = state
            .databases
            .get(database.as_str())
            .ok_or_else(|| TenancyError::Storage(format!("unknown database '{database}'")))?;
        Ok(db.tables.get("migrations").map(|t| {
            t.rows
                .iter()
                .filter_map(|row| row.get("migration")?.as_str().map(str::to_string))
                .collect()
        }))
    }

    async fn seed_ledger(
        &self,
        database: &DatabaseName,
        migrations: &[String],
        batch: i64,
    ) -> Result<(), TenancyError> {
        let mut state = self.state.write();
        let db = Self::database_mut(&mut state, database)?;
        let ledger = db.tables.get_mut("migrations").ok_or_else(|| {
            TenancyError::Storage(format!("ledger table missing in '{database}'"))
        })?;
        for name in migrations {
            let mut row = Row::new();
            row.insert("migration".into(), Value::String(name.clone()));
            row.insert("batch".into(), Value::Number(batch.into()));
            ledger.rows.push(row);
        }
        Ok(())
    }
}

/// Build a ready/active tenant record for tests.
pub fn tenant_fixture(slug: &str) -> Tenant {
    let slug = Slug::parse(slug).expect("fixture slug is valid");
    let code = fixture_code(&slug);
    let credentials = CredentialManager::generate(&slug);
    let limits = PlanLimits::for_plan(TenantPlan::Trial);
    let now = Utc::now();
    Tenant {
        id: Uuid::new_v4(),
        code,
        name: format!("{} (fixture)", slug),
        business_type: BusinessType::Retail,
        database_name: DatabaseName::derive("tenant_", &slug),
        database_username: credentials.username,
        database_password: credentials.password,
        database_host: "127.0.0.1".to_string(),
        database_port: 3306,
        status: TenantStatus::Active,
        provisioning_state: ProvisioningState::Ready,
        plan: TenantPlan::Trial,
        max_users: limits.max_users,
        max_products: limits.max_products,
        max_transactions_per_month: limits.max_transactions_per_month,
        trial_ends_at: Some(now + chrono::Duration::days(30)),
        subscription_expires_at: None,
        last_accessed_at: None,
        encryption_key: CredentialManager::generate_encryption_key(),
        created_at: now,
        updated_at: now,
        slug,
    }
}

// Deterministic per-slug code so two fixtures never collide in a directory.
fn fixture_code(slug: &Slug) -> TenantCode {
    let mut code: String = slug
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .take(12)
        .collect();
    while code.len() < 6 {
        code.push('2');
    }
    TenantCode::parse(code).expect("fixture code is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_statements_are_idempotent() {
        let server = InMemoryServer::new("mercantile");
        let tenant = tenant_fixture("acme");

        ServerAdmin::create_database(&server, &tenant.database_name)
            .await
            .unwrap();
        ServerAdmin::create_database(&server, &tenant.database_name)
            .await
            .unwrap();
        server
            .create_login(&tenant.database_username, &tenant.database_password)
            .await
            .unwrap();
        server
            .create_login(&tenant.database_username, "different")
            .await
            .unwrap();

        assert_eq!(server.databases().len(), 2);
        assert!(server.has_login(&tenant.database_username));
    }

    #[tokio::test]
    async fn test_copy_is_insert_or_ignore() {
        let server = InMemoryServer::new("mercantile");
        let tenant = tenant_fixture("acme");
        server.create_database_for(&tenant).await;

        server.seed_master_table(
            "units",
            &["id", "name"],
            vec![serde_json::json!({"id": "1", "name": "each"})],
        );
        server
            .clone_structure(&tenant.database_name, "units")
            .await
            .unwrap();

        let first = server
            .copy_all_rows(&tenant.database_name, "units")
            .await
            .unwrap();
        let second = server
            .copy_all_rows(&tenant.database_name, "units")
            .await
            .unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);
    }

    #[test]
    fn test_fixture_codes_are_distinct() {
        let a = tenant_fixture("acme");
        let b = tenant_fixture("globex");
        assert_ne!(a.code, b.code);
    }
}
