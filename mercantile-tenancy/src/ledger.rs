//! Migration ledger sync
//!
//! The schema synchronizer represents master migrations structurally, so the
//! generic migration runner must never re-execute them inside a tenant database.
//! This module seeds the tenant's ledger with every master migration name it is
//! missing, tagged `batch = 0` to mean "inherited, not independently run".

use crate::sync::SchemaExecutor;
use crate::TenancyError;
use mercantile_core::Tenant;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Batch number marking a ledger row as inherited from the master schema.
pub const INHERITED_BATCH: i64 = 0;

/// Seeds tenant migration ledgers from the master ledger.
pub struct LedgerSync {
    executor: Arc<dyn SchemaExecutor>,
}

impl LedgerSync {
    /// Create a ledger sync over an injected executor.
    pub fn new(executor: Arc<dyn SchemaExecutor>) -> Self {
        Self { executor }
    }

    /// Copy missing master migration names into the tenant ledger.
    ///
    /// Returns the number of rows inserted. No-op when the tenant's ledger
    /// table does not exist yet (structure sync runs first and creates it).
    pub async fn sync(&self, tenant: &Tenant) -> Result<u64, TenancyError> {
        let fail = |e: TenancyError| {
            error!(slug = %tenant.slug, code = %tenant.code, error = %e, "ledger sync failed");
            e
        };

        let tenant_ledger = match self
            .executor
            .tenant_ledger(&tenant.database_name)
            .await
            .map_err(fail)?
        {
            Some(names) => names,
            None => {
                debug!(slug = %tenant.slug, "tenant ledger table absent; skipping ledger sync");
                return Ok(0);
            }
        };

        let applied: HashSet<String> = tenant_ledger.into_iter().collect();
        let missing: Vec<String> = self
            .executor
            .master_ledger()
            .await
            .map_err(fail)?
            .into_iter()
            .filter(|name| !applied.contains(name))
            .collect();

        if missing.is_empty() {
            debug!(slug = %tenant.slug, "tenant ledger already converged");
            return Ok(0);
        }

        self.executor
            .seed_ledger(&tenant.database_name, &missing, INHERITED_BATCH)
            .await
            .map_err(fail)?;

        info!(
            slug = %tenant.slug,
            inserted = missing.len(),
            "tenant ledger seeded from master"
        );
        Ok(missing.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{tenant_fixture, InMemoryServer};

    #[tokio::test]
    async fn test_noop_when_ledger_table_missing() {
        let server = Arc::new(InMemoryServer::new("mercantile"));
        let tenant = tenant_fixture("acme");
        server.create_database_for(&tenant).await;
        server.seed_master_ledger(&["m1", "m2"]);

        let inserted = LedgerSync::new(server.clone()).sync(&tenant).await.unwrap();
        assert_eq!(inserted, 0);
    }

    #[tokio::test]
    async fn test_seeds_missing_names_with_batch_zero() {
        let server = Arc::new(InMemoryServer::new("mercantile"));
        let tenant = tenant_fixture("acme");
        server.create_database_for(&tenant).await;
        server.seed_master_ledger(&["m1", "m2", "m3"]);
        server.create_tenant_ledger(&tenant, &["m1"]);

        let sync = LedgerSync::new(server.clone());
        let inserted = sync.sync(&tenant).await.unwrap();
        assert_eq!(inserted, 2);

        let entries = server.tenant_ledger_entries(&tenant);
        let names: Vec<_> = entries.iter().map(|(n, _)| n.clone()).collect();
        assert!(names.contains(&"m2".to_string()));
        assert!(names.contains(&"m3".to_string()));
        assert!(entries
            .iter()
            .filter(|(n, _)| n.as_str() != "m1")
            .all(|(_, batch)| *batch == INHERITED_BATCH));
    }

    #[tokio::test]
    async fn test_converged_ledger_is_superset_and_stable() {
        let server = Arc::new(InMemoryServer::new("mercantile"));
        let tenant = tenant_fixture("acme");
        server.create_database_for(&tenant).await;
        server.seed_master_ledger(&["m1", "m2"]);
        server.create_tenant_ledger(&tenant, &[]);

        let sync = LedgerSync::new(server.clone());
        assert_eq!(sync.sync(&tenant).await.unwrap(), 2);
        // Second run inserts nothing.
        assert_eq!(sync.sync(&tenant).await.unwrap(), 0);

        let names: HashSet<String> = server
            .tenant_ledger_entries(&tenant)
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        for master_name in ["m1", "m2"] {
            assert!(names.contains(master_name));
        }
    }
}
