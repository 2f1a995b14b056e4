//! Migration/seed runner delegation.
//!
//! Running migrations is an external collaborator's job; the engine only
//! guarantees the correct connection is selected and the ledger is seeded
//! before the runner ever sees the tenant database.

use crate::registry::TenantContext;
use crate::TenancyError;
use async_trait::async_trait;

/// Runs pending schema migrations and seeds against a tenant database.
#[async_trait]
pub trait MigrationRunner: Send + Sync {
    /// Apply whatever the tenant database is still missing.
    ///
    /// Invoked after ledger sync, so migrations already represented
    /// structurally appear applied and are skipped.
    async fn run_pending(&self, context: &TenantContext) -> Result<(), TenancyError>;
}

/// Runner that applies nothing; for tests and externally-migrated deployments.
#[derive(Debug, Clone, Default)]
pub struct NoOpMigrationRunner;

#[async_trait]
impl MigrationRunner for NoOpMigrationRunner {
    async fn run_pending(&self, _context: &TenantContext) -> Result<(), TenancyError> {
        Ok(())
    }
}
