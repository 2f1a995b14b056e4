//! Schema synchronizer
//!
//! Clones the master database's table structures into a tenant database and
//! copies the tenant's partition of the data. The whole operation is idempotent:
//! every structural statement is `IF NOT EXISTS`, every copy is insert-or-ignore,
//! and a table whose tenant copy already holds rows is not copied again. Running
//! `ensure_schema` twice therefore converges on the same table set and row
//! counts as running it once.
//!
//! DDL cannot be transactional on most engines, so instead of atomicity the run
//! keeps an explicit step log: the returned [`SyncReport`] records each step and
//! its outcome in order, and on failure shows exactly which steps completed so a
//! retry can be judged from the log rather than guessed.

use crate::manifest::{PartitionStrategy, SyncManifest};
use crate::TenancyError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mercantile_core::{DatabaseName, Slug, Tenant};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Schema and data operations against the master and tenant databases.
///
/// Implementations run against a privileged connection that can read the master
/// database and write any tenant database. All identifier parameters are the
/// validated newtypes; table names come from the server's own catalog.
#[async_trait]
pub trait SchemaExecutor: Send + Sync {
    /// Tables currently present in the master database.
    async fn master_tables(&self) -> Result<Vec<String>, TenancyError>;

    /// Whether `table` exists in `database`.
    async fn table_exists(
        &self,
        database: &DatabaseName,
        table: &str,
    ) -> Result<bool, TenancyError>;

    /// Create `database.table` with the master table's structure if absent
    /// (`CREATE TABLE IF NOT EXISTS … LIKE master.table`).
    async fn clone_structure(
        &self,
        database: &DatabaseName,
        table: &str,
    ) -> Result<(), TenancyError>;

    /// Total rows in `database.table`.
    async fn row_count(&self, database: &DatabaseName, table: &str)
        -> Result<u64, TenancyError>;

    /// Rows in `database.table` whose `timestamp_column` is at or after `since`.
    async fn row_count_since(
        &self,
        database: &DatabaseName,
        table: &str,
        timestamp_column: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, TenancyError>;

    /// Copy master rows where `tenant_column = tenant_id` into the tenant table,
    /// ignoring rows that already exist. Returns rows copied.
    async fn copy_tenant_rows(
        &self,
        database: &DatabaseName,
        table: &str,
        tenant_column: &str,
        tenant_id: Uuid,
    ) -> Result<u64, TenancyError>;

    /// Copy the master table's full row set into the tenant table, ignoring
    /// rows that already exist. Returns rows copied.
    async fn copy_all_rows(
        &self,
        database: &DatabaseName,
        table: &str,
    ) -> Result<u64, TenancyError>;

    /// Migration names applied to the master database, in application order.
    async fn master_ledger(&self) -> Result<Vec<String>, TenancyError>;

    /// Migration names recorded in the tenant's ledger, or `None` when the
    /// ledger table does not exist yet.
    async fn tenant_ledger(
        &self,
        database: &DatabaseName,
    ) -> Result<Option<Vec<String>>, TenancyError>;

    /// Insert ledger rows with the given batch number.
    async fn seed_ledger(
        &self,
        database: &DatabaseName,
        migrations: &[String],
        batch: i64,
    ) -> Result<(), TenancyError>;
}

/// What a sync step did to a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Ledger table structure, cloned before everything else.
    CloneLedger,
    /// Table structure cloned from master.
    CloneStructure,
    /// Tenant-partitioned row copy.
    CopyTenantRows,
    /// Full reference-data copy.
    CopyAllRows,
}

/// Outcome of one sync step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// Structure created fresh.
    Created,
    /// Structure already present; statement was a no-op.
    AlreadyPresent,
    /// Rows copied.
    Copied(u64),
    /// Copy skipped because the destination already held this many rows.
    Skipped(u64),
}

/// One entry in the ordered step log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStep {
    /// Table the step acted on.
    pub table: String,
    /// What the step did.
    pub action: StepAction,
    /// How it ended.
    pub outcome: StepOutcome,
}

/// Ordered record of a completed sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// Tenant the run was for.
    pub tenant: Slug,
    /// Steps in execution order.
    pub steps: Vec<SyncStep>,
}

impl SyncReport {
    fn new(tenant: Slug) -> Self {
        Self {
            tenant,
            steps: Vec::new(),
        }
    }

    fn record(&mut self, table: &str, action: StepAction, outcome: StepOutcome) {
        self.steps.push(SyncStep {
            table: table.to_string(),
            action,
            outcome,
        });
    }

    /// Number of tables whose structure this run created.
    pub fn tables_created(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.outcome == StepOutcome::Created)
            .count()
    }

    /// Total rows this run copied.
    pub fn rows_copied(&self) -> u64 {
        self.steps
            .iter()
            .map(|s| match s.outcome {
                StepOutcome::Copied(n) => n,
                _ => 0,
            })
            .sum()
    }
}

/// Clones master schema and partitions data into tenant databases.
pub struct SchemaSynchronizer {
    executor: Arc<dyn SchemaExecutor>,
    manifest: SyncManifest,
    ledger_table: String,
}

impl SchemaSynchronizer {
    /// Create a synchronizer over an injected executor and manifest.
    pub fn new(
        executor: Arc<dyn SchemaExecutor>,
        manifest: SyncManifest,
        ledger_table: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            manifest,
            ledger_table: ledger_table.into(),
        }
    }

    /// The manifest in force.
    pub fn manifest(&self) -> &SyncManifest {
        &self.manifest
    }

    /// Bring the tenant database's schema and partitioned data up to date with
    /// the master database. Idempotent; safe to re-invoke after any failure.
    pub async fn ensure_schema(&self, tenant: &Tenant) -> Result<SyncReport, TenancyError> {
        let db = &tenant.database_name;
        let mut report = SyncReport::new(tenant.slug.clone());

        info!(
            slug = %tenant.slug,
            database = %db,
            manifest_version = self.manifest.version,
            "starting schema sync"
        );

        // The ledger structure comes first so ledger seeding is never blocked
        // on table-enumeration order.
        let outcome = self
            .clone_step(tenant, db, &self.ledger_table, StepAction::CloneLedger, &mut report)
            .await?;
        debug!(slug = %tenant.slug, table = %self.ledger_table, ?outcome, "ledger structure ensured");

        let tables = self
            .executor
            .master_tables()
            .await
            .map_err(|e| self.fail(tenant, "<master catalog>", &report, e))?;

        for table in tables {
            if self.manifest.is_excluded(&table) {
                debug!(slug = %tenant.slug, table = %table, "excluded from tenant databases");
                continue;
            }
            if table == self.ledger_table {
                continue; // already cloned above
            }
            self.clone_step(tenant, db, &table, StepAction::CloneStructure, &mut report)
                .await?;
        }

        for step in self.copy_plan(&report) {
            let (table, strategy) = step;
            self.copy_step(tenant, db, &table, strategy, &mut report)
                .await?;
        }

        info!(
            slug = %tenant.slug,
            tables_created = report.tables_created(),
            rows_copied = report.rows_copied(),
            steps = report.steps.len(),
            "schema sync complete"
        );
        Ok(report)
    }

    /// Tables from this run that are candidates for a row copy, with their
    /// manifest strategy. Derived from the structure steps already logged so the
    /// copy phase only visits tables that exist on both sides.
    fn copy_plan(&self, report: &SyncReport) -> Vec<(String, PartitionStrategy)> {
        report
            .steps
            .iter()
            .filter(|s| s.action == StepAction::CloneStructure)
            .map(|s| (s.table.clone(), self.manifest.classify(&s.table)))
            .collect()
    }

    async fn clone_step(
        &self,
        tenant: &Tenant,
        db: &DatabaseName,
        table: &str,
        action: StepAction,
        report: &mut SyncReport,
    ) -> Result<StepOutcome, TenancyError> {
        let existed = self
            .executor
            .table_exists(db, table)
            .await
            .map_err(|e| self.fail(tenant, table, report, e))?;

        let outcome = if existed {
            StepOutcome::AlreadyPresent
        } else {
            self.executor
                .clone_structure(db, table)
                .await
                .map_err(|e| self.fail(tenant, table, report, e))?;
            StepOutcome::Created
        };

        report.record(table, action, outcome);
        Ok(outcome)
    }

    async fn copy_step(
        &self,
        tenant: &Tenant,
        db: &DatabaseName,
        table: &str,
        strategy: PartitionStrategy,
        report: &mut SyncReport,
    ) -> Result<(), TenancyError> {
        let (action, outcome) = match strategy {
            PartitionStrategy::TenantScoped { column } => {
                let action = StepAction::CopyTenantRows;
                let existing = self
                    .executor
                    .row_count(db, table)
                    .await
                    .map_err(|e| self.fail(tenant, table, report, e))?;
                if existing > 0 {
                    // Non-empty is treated as fully synced; the observed count
                    // lands in the log so a suspicious partial copy is auditable.
                    (action, StepOutcome::Skipped(existing))
                } else {
                    let copied = self
                        .executor
                        .copy_tenant_rows(db, table, &column, tenant.id)
                        .await
                        .map_err(|e| self.fail(tenant, table, report, e))?;
                    (action, StepOutcome::Copied(copied))
                }
            }
            PartitionStrategy::Global => {
                let action = StepAction::CopyAllRows;
                let existing = self
                    .executor
                    .row_count(db, table)
                    .await
                    .map_err(|e| self.fail(tenant, table, report, e))?;
                if existing > 0 {
                    (action, StepOutcome::Skipped(existing))
                } else {
                    let copied = self
                        .executor
                        .copy_all_rows(db, table)
                        .await
                        .map_err(|e| self.fail(tenant, table, report, e))?;
                    (action, StepOutcome::Copied(copied))
                }
            }
            // Structure-only tables get no copy step; excluded tables never
            // reach the copy plan at all.
            PartitionStrategy::StructureOnly | PartitionStrategy::Excluded => return Ok(()),
        };

        report.record(table, action, outcome);
        Ok(())
    }

    fn fail(
        &self,
        tenant: &Tenant,
        table: &str,
        report: &SyncReport,
        source: TenancyError,
    ) -> TenancyError {
        error!(
            slug = %tenant.slug,
            code = %tenant.code,
            table = %table,
            completed_steps = report.steps.len(),
            error = %source,
            "schema sync step failed; completed steps remain in effect"
        );
        TenancyError::SchemaSync {
            slug: tenant.slug.to_string(),
            table: table.to_string(),
            reason: source.to_string(),
        }
    }
}
