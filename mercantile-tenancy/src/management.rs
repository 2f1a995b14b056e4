//! Tenant lifecycle management
//!
//! The orchestrator over the whole provisioning engine: composes the credential
//! manager, connection registry, schema synchronizer, ledger sync, and migration
//! runner into the lifecycle operations the rest of the platform calls.
//!
//! State machine: `Creating → SchemaSyncing → Ready`, with `Ready ⇄ Suspended`
//! (administrative, reversible) and `Ready → Destroying → gone` (irreversible).
//! The directory row is written *before* physical provisioning, so a failure at
//! any later point leaves a discoverable `Creating` row for [`TenantManager::sweep_orphans`]
//! instead of an unowned database.

use crate::config::TenancyConfig;
use crate::credentials::{CredentialManager, ServerAdmin};
use crate::directory::TenantDirectory;
use crate::ledger::LedgerSync;
use crate::manifest::SyncManifest;
use crate::migrate::{MigrationRunner, NoOpMigrationRunner};
use crate::registry::{ConnectionRegistry, TenantContext};
use crate::sync::{SchemaExecutor, SchemaSynchronizer};
use crate::TenancyError;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use mercantile_core::{
    BusinessType, DatabaseName, PlanLimits, ProvisioningState, Slug, Tenant, TenantPlan,
    TenantStatus,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Signup attributes for a new tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenantRequest {
    /// Requested slug; validated before anything else happens.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Line of business.
    pub business_type: BusinessType,
    /// Subscription tier.
    pub plan: TenantPlan,
    /// Paid subscription end, for non-trial signups.
    pub subscription_expires_at: Option<DateTime<Utc>>,
}

impl CreateTenantRequest {
    /// Create a request with trial defaults.
    pub fn new(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            name: name.into(),
            business_type: BusinessType::default(),
            plan: TenantPlan::Trial,
            subscription_expires_at: None,
        }
    }

    /// Set the line of business.
    pub fn with_business_type(mut self, business_type: BusinessType) -> Self {
        self.business_type = business_type;
        self
    }

    /// Set the plan.
    pub fn with_plan(mut self, plan: TenantPlan) -> Self {
        self.plan = plan;
        self
    }

    /// Set the subscription end.
    pub fn with_subscription_expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.subscription_expires_at = Some(at);
        self
    }
}

/// One counted resource versus its plan ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitStatus {
    /// Live rows counted in the tenant database.
    pub count: u64,
    /// Plan ceiling; `None` is unlimited.
    pub limit: Option<u32>,
    /// Whether the ceiling has been reached.
    pub reached: bool,
}

impl LimitStatus {
    fn evaluate(count: u64, limit: Option<u32>) -> Self {
        Self {
            count,
            limit,
            reached: limit.is_some_and(|l| count >= u64::from(l)),
        }
    }
}

/// Per-resource limit check result. Informational; enforcement is the caller's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitReport {
    /// Staff accounts.
    pub users: LimitStatus,
    /// Catalog size.
    pub products: LimitStatus,
    /// Sales transactions in the current calendar month.
    pub transactions: LimitStatus,
}

impl LimitReport {
    /// Whether any ceiling has been reached.
    pub fn any_reached(&self) -> bool {
        self.users.reached || self.products.reached || self.transactions.reached
    }
}

/// High-level API over the tenant directory and provisioning engine.
pub struct TenantManager {
    directory: Arc<dyn TenantDirectory>,
    executor: Arc<dyn SchemaExecutor>,
    credentials: CredentialManager,
    registry: Arc<ConnectionRegistry>,
    synchronizer: SchemaSynchronizer,
    ledger: LedgerSync,
    runner: Arc<dyn MigrationRunner>,
    config: TenancyConfig,
}

impl TenantManager {
    /// Compose a manager from its seams, with the default manifest and a no-op
    /// migration runner.
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        admin: Arc<dyn ServerAdmin>,
        executor: Arc<dyn SchemaExecutor>,
        config: TenancyConfig,
    ) -> Self {
        let synchronizer = SchemaSynchronizer::new(
            executor.clone(),
            SyncManifest::business_default(),
            config.ledger_table.clone(),
        );
        Self {
            credentials: CredentialManager::new(admin),
            registry: Arc::new(ConnectionRegistry::new()),
            ledger: LedgerSync::new(executor.clone()),
            runner: Arc::new(NoOpMigrationRunner),
            synchronizer,
            directory,
            executor,
            config,
        }
    }

    /// Replace the sync manifest.
    pub fn with_manifest(mut self, manifest: SyncManifest) -> Self {
        self.synchronizer = SchemaSynchronizer::new(
            self.executor.clone(),
            manifest,
            self.config.ledger_table.clone(),
        );
        self
    }

    /// Replace the migration runner.
    pub fn with_runner(mut self, runner: Arc<dyn MigrationRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// The connection registry, for layers that need to inspect it.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Look up a tenant by slug.
    pub async fn get(&self, slug: &Slug) -> Result<Option<Tenant>, TenancyError> {
        self.directory.find_by_slug(slug).await
    }

    /// Create, provision, and synchronize a new tenant.
    pub async fn create(&self, request: CreateTenantRequest) -> Result<Tenant, TenancyError> {
        let slug = Slug::parse(request.slug.as_str())?;

        // Reject before any physical resource is touched. The directory's
        // unique constraint backs this up under concurrent creates.
        if self.directory.find_by_slug(&slug).await?.is_some() {
            warn!(slug = %slug, "tenant slug already taken");
            return Err(TenancyError::DirectoryConflict(slug.to_string()));
        }

        let credentials = CredentialManager::generate(&slug);
        let limits = PlanLimits::for_plan(request.plan);
        let now = Utc::now();
        let trial_ends_at = (request.plan == TenantPlan::Trial)
            .then(|| now + Duration::days(self.config.trial_days));

        let mut tenant = Tenant {
            id: Uuid::new_v4(),
            code: CredentialManager::generate_code(),
            name: request.name,
            business_type: request.business_type,
            database_name: DatabaseName::derive(&self.config.database_prefix, &slug),
            database_username: credentials.username,
            database_password: credentials.password,
            database_host: self.config.database_host.clone(),
            database_port: self.config.database_port,
            status: TenantStatus::Inactive,
            provisioning_state: ProvisioningState::Creating,
            plan: request.plan,
            max_users: limits.max_users,
            max_products: limits.max_products,
            max_transactions_per_month: limits.max_transactions_per_month,
            trial_ends_at,
            subscription_expires_at: request.subscription_expires_at,
            last_accessed_at: None,
            encryption_key: CredentialManager::generate_encryption_key(),
            created_at: now,
            updated_at: now,
            slug,
        };

        // Directory row first: from here on a crash leaves a discoverable
        // Creating row, never an unowned database.
        self.directory.insert(&tenant).await?;
        info!(slug = %tenant.slug, code = %tenant.code, "tenant directory row created");

        self.provision(&mut tenant).await?;
        Ok(tenant)
    }

    /// Activate a tenant for a unit of work.
    ///
    /// Ensures the connection is registered, defensively re-runs schema sync if
    /// the tenant never completed one, touches `last_accessed_at`, and returns
    /// the request-scoped [`TenantContext`]. Callers may invoke this on every
    /// request; it is idempotent.
    pub async fn activate(&self, slug: &Slug) -> Result<TenantContext, TenancyError> {
        let mut tenant = self.require(slug).await?;

        if tenant.status == TenantStatus::Suspended {
            return Err(TenancyError::Suspended(slug.to_string()));
        }

        if tenant.provisioning_state != ProvisioningState::Ready {
            debug!(slug = %slug, state = %tenant.provisioning_state, "tenant not fully synced; re-running sync");
            self.synchronizer.ensure_schema(&tenant).await?;
            self.registry.purge(&tenant).await;
            self.ledger.sync(&tenant).await?;
            tenant.provisioning_state = ProvisioningState::Ready;
            tenant.status = TenantStatus::Active;
        }

        let descriptor = self.registry.ensure(&tenant).await;
        let now = Utc::now();
        tenant.last_accessed_at = Some(now);
        tenant.updated_at = now;
        self.directory.update(&tenant).await?;

        Ok(TenantContext::new(tenant, descriptor))
    }

    /// Count limited resources and compare against the plan ceilings.
    ///
    /// Never mutates the counted resources; the report is informational and
    /// enforcement (refusing another user, etc.) is the caller's decision.
    pub async fn check_limits(&self, slug: &Slug) -> Result<LimitReport, TenancyError> {
        let context = self.activate(slug).await?;
        let tenant = context.tenant();
        let db = &tenant.database_name;

        let users = self.executor.row_count(db, "users").await?;
        let products = self.executor.row_count(db, "products").await?;
        let transactions = self
            .executor
            .row_count_since(
                db,
                "sales",
                &self.config.transaction_timestamp_column,
                start_of_month(Utc::now()),
            )
            .await?;

        Ok(LimitReport {
            users: LimitStatus::evaluate(users, tenant.max_users),
            products: LimitStatus::evaluate(products, tenant.max_products),
            transactions: LimitStatus::evaluate(transactions, tenant.max_transactions_per_month),
        })
    }

    /// Tear down a tenant: drop its database and login, then delete the
    /// directory row. Irreversible.
    ///
    /// If the drop fails the directory row stays (in `Destroying`) so the
    /// operator can retry; the row is only deleted after a successful drop.
    pub async fn destroy(&self, slug: &Slug) -> Result<(), TenancyError> {
        let mut tenant = self.require(slug).await?;

        tenant.provisioning_state = ProvisioningState::Destroying;
        tenant.status = TenantStatus::Inactive;
        tenant.updated_at = Utc::now();
        self.directory.update(&tenant).await?;

        self.credentials.drop_physical_resources(&tenant).await?;

        self.directory.delete(tenant.id).await?;
        self.registry.purge(&tenant).await;
        info!(slug = %tenant.slug, code = %tenant.code, "tenant destroyed");
        Ok(())
    }

    /// Administratively pause a tenant. Reversible via [`TenantManager::reinstate`].
    pub async fn suspend(&self, slug: &Slug, reason: &str) -> Result<Tenant, TenancyError> {
        let mut tenant = self.require(slug).await?;

        if tenant.provisioning_state != ProvisioningState::Ready {
            return Err(TenancyError::InvalidTransition {
                slug: slug.to_string(),
                reason: format!("cannot suspend while {}", tenant.provisioning_state),
            });
        }

        tenant.status = TenantStatus::Suspended;
        tenant.updated_at = Utc::now();
        self.directory.update(&tenant).await?;
        warn!(slug = %tenant.slug, reason = %reason, "tenant suspended");
        Ok(tenant)
    }

    /// Lift a suspension.
    pub async fn reinstate(&self, slug: &Slug) -> Result<Tenant, TenancyError> {
        let mut tenant = self.require(slug).await?;

        if tenant.status != TenantStatus::Suspended {
            return Err(TenancyError::InvalidTransition {
                slug: slug.to_string(),
                reason: format!("cannot reinstate from {}", tenant.status),
            });
        }

        tenant.status = TenantStatus::Active;
        tenant.updated_at = Utc::now();
        self.directory.update(&tenant).await?;
        info!(slug = %tenant.slug, "tenant reinstated");
        Ok(tenant)
    }

    /// Reconcile half-created tenants: drop physical leftovers of `Creating`
    /// rows older than `older_than` and delete the rows. Returns swept slugs.
    ///
    /// Rows whose drop fails are kept for the next sweep.
    pub async fn sweep_orphans(
        &self,
        older_than: Duration,
    ) -> Result<Vec<Slug>, TenancyError> {
        let cutoff = Utc::now() - older_than;
        let stuck = self
            .directory
            .list_in_state(ProvisioningState::Creating)
            .await?;

        let mut swept = Vec::new();
        for tenant in stuck {
            if tenant.created_at > cutoff {
                continue;
            }
            match self.credentials.drop_physical_resources(&tenant).await {
                Ok(()) => {
                    self.directory.delete(tenant.id).await?;
                    self.registry.purge(&tenant).await;
                    info!(slug = %tenant.slug, "orphaned tenant swept");
                    swept.push(tenant.slug.clone());
                }
                Err(e) => {
                    warn!(slug = %tenant.slug, error = %e, "orphan sweep skipped tenant; will retry");
                }
            }
        }
        Ok(swept)
    }

    async fn provision(&self, tenant: &mut Tenant) -> Result<(), TenancyError> {
        self.credentials.create_physical_resources(tenant).await?;

        tenant.provisioning_state = ProvisioningState::SchemaSyncing;
        tenant.updated_at = Utc::now();
        self.directory.update(tenant).await?;

        self.synchronizer.ensure_schema(tenant).await?;
        // DDL just ran; drop any cached connection metadata.
        self.registry.purge(tenant).await;
        self.ledger.sync(tenant).await?;

        let descriptor = self.registry.ensure(tenant).await;
        let context = TenantContext::new(tenant.clone(), descriptor);
        self.runner.run_pending(&context).await?;

        tenant.status = TenantStatus::Active;
        tenant.provisioning_state = ProvisioningState::Ready;
        tenant.updated_at = Utc::now();
        self.directory.update(tenant).await?;
        info!(slug = %tenant.slug, database = %tenant.database_name, "tenant ready");
        Ok(())
    }

    async fn require(&self, slug: &Slug) -> Result<Tenant, TenancyError> {
        self.directory
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| TenancyError::NotFound(slug.to_string()))
    }
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::testing::InMemoryServer;
    use serde_json::json;

    fn manager() -> (TenantManager, Arc<InMemoryServer>, Arc<InMemoryDirectory>) {
        let server = Arc::new(InMemoryServer::new("mercantile"));
        server.seed_master_ledger(&["0001_init", "0002_products"]);
        server.seed_master_table("users", &["id", "tenant_id", "name"], vec![]);
        server.seed_master_table("products", &["id", "tenant_id", "name"], vec![]);
        server.seed_master_table("sales", &["id", "tenant_id", "created_at"], vec![]);
        let directory = Arc::new(InMemoryDirectory::new());
        let manager = TenantManager::new(
            directory.clone(),
            server.clone(),
            server.clone(),
            TenancyConfig::new("mercantile"),
        );
        (manager, server, directory)
    }

    #[tokio::test]
    async fn test_create_provisions_and_marks_ready() {
        let (manager, server, _) = manager();

        let before = Utc::now();
        let tenant = manager
            .create(CreateTenantRequest::new("acme", "Acme Retail"))
            .await
            .unwrap();

        assert_eq!(tenant.database_name.as_str(), "tenant_acme");
        assert_eq!(tenant.status, TenantStatus::Active);
        assert_eq!(tenant.provisioning_state, ProvisioningState::Ready);

        // Trial window is thirty days from signup.
        let ends = tenant.trial_ends_at.unwrap();
        assert!(ends >= before + Duration::days(30));
        assert!(ends <= Utc::now() + Duration::days(30));

        assert!(server.databases().contains(&"tenant_acme".to_string()));
        assert!(server.has_login(&tenant.database_username));
    }

    #[tokio::test]
    async fn test_grant_is_scoped_to_one_database() {
        let (manager, server, _) = manager();

        let acme = manager
            .create(CreateTenantRequest::new("acme", "Acme"))
            .await
            .unwrap();
        let globex = manager
            .create(CreateTenantRequest::new("globex", "Globex"))
            .await
            .unwrap();

        assert_eq!(server.grants_for(&acme.database_username), vec!["tenant_acme"]);
        assert_eq!(
            server.grants_for(&globex.database_username),
            vec!["tenant_globex"]
        );
    }

    #[tokio::test]
    async fn test_duplicate_slug_rejected_before_physical_resources() {
        let (manager, server, _) = manager();

        manager
            .create(CreateTenantRequest::new("acme", "Acme"))
            .await
            .unwrap();
        let databases_before = server.databases();

        let err = manager
            .create(CreateTenantRequest::new("acme", "Imposter"))
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::DirectoryConflict(_)));
        assert_eq!(server.databases(), databases_before);
    }

    #[tokio::test]
    async fn test_invalid_slug_rejected() {
        let (manager, _, directory) = manager();
        let err = manager
            .create(CreateTenantRequest::new("Bad Slug!", "Nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::Identifier(_)));
        assert_eq!(directory.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_provisioning_leaves_discoverable_creating_row() {
        let (manager, server, directory) = manager();
        server.set_fail_creates(true);

        let err = manager
            .create(CreateTenantRequest::new("acme", "Acme"))
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::Provisioning { .. }));

        let stuck = directory
            .list_in_state(ProvisioningState::Creating)
            .await
            .unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].status, TenantStatus::Inactive);
    }

    #[tokio::test]
    async fn test_sweep_orphans_reclaims_stuck_rows() {
        let (manager, server, directory) = manager();
        server.set_fail_creates(true);
        let _ = manager.create(CreateTenantRequest::new("acme", "Acme")).await;
        server.set_fail_creates(false);

        let swept = manager.sweep_orphans(Duration::zero()).await.unwrap();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].as_str(), "acme");
        assert_eq!(directory.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_respects_age_cutoff() {
        let (manager, server, directory) = manager();
        server.set_fail_creates(true);
        let _ = manager.create(CreateTenantRequest::new("acme", "Acme")).await;
        server.set_fail_creates(false);

        // Row is brand new; a one-hour cutoff must not touch it.
        let swept = manager.sweep_orphans(Duration::hours(1)).await.unwrap();
        assert!(swept.is_empty());
        assert_eq!(directory.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_suspend_blocks_activation_until_reinstated() {
        let (manager, _, _) = manager();
        let tenant = manager
            .create(CreateTenantRequest::new("acme", "Acme"))
            .await
            .unwrap();

        manager.suspend(&tenant.slug, "payment overdue").await.unwrap();
        let err = manager.activate(&tenant.slug).await.unwrap_err();
        assert!(matches!(err, TenancyError::Suspended(_)));

        manager.reinstate(&tenant.slug).await.unwrap();
        assert!(manager.activate(&tenant.slug).await.is_ok());
    }

    #[tokio::test]
    async fn test_reinstate_requires_suspension() {
        let (manager, _, _) = manager();
        let tenant = manager
            .create(CreateTenantRequest::new("acme", "Acme"))
            .await
            .unwrap();

        let err = manager.reinstate(&tenant.slug).await.unwrap_err();
        assert!(matches!(err, TenancyError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_activate_touches_last_accessed() {
        let (manager, _, directory) = manager();
        let tenant = manager
            .create(CreateTenantRequest::new("acme", "Acme"))
            .await
            .unwrap();
        assert!(tenant.last_accessed_at.is_none());

        let context = manager.activate(&tenant.slug).await.unwrap();
        assert!(context.tenant().last_accessed_at.is_some());

        let stored = directory.find_by_id(tenant.id).await.unwrap().unwrap();
        assert!(stored.last_accessed_at.is_some());
    }

    #[tokio::test]
    async fn test_destroy_drops_everything_and_forgets_tenant() {
        let (manager, server, directory) = manager();
        let tenant = manager
            .create(CreateTenantRequest::new("acme", "Acme"))
            .await
            .unwrap();

        manager.destroy(&tenant.slug).await.unwrap();

        assert!(!server.databases().contains(&"tenant_acme".to_string()));
        assert!(!server.has_login(&tenant.database_username));
        assert_eq!(directory.count().await.unwrap(), 0);

        // A destroyed tenant cannot be activated; nothing recreates implicitly.
        let err = manager.activate(&tenant.slug).await.unwrap_err();
        assert!(matches!(err, TenancyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_drop_keeps_directory_row() {
        let (manager, server, directory) = manager();
        let tenant = manager
            .create(CreateTenantRequest::new("acme", "Acme"))
            .await
            .unwrap();

        server.set_fail_drops(true);
        let err = manager.destroy(&tenant.slug).await.unwrap_err();
        assert!(matches!(err, TenancyError::Teardown { .. }));
        assert_eq!(directory.count().await.unwrap(), 1);

        // Operator retries once the server recovers.
        server.set_fail_drops(false);
        manager.destroy(&tenant.slug).await.unwrap();
        assert_eq!(directory.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_check_limits_counts_live_rows() {
        let (manager, server, _) = manager();
        let tenant = manager
            .create(CreateTenantRequest::new("acme", "Acme"))
            .await
            .unwrap();

        // Trial ceiling is three users; give the tenant exactly three.
        let db = &tenant.database_name;
        for i in 0..3 {
            server.insert_row(
                db,
                "users",
                json!({"id": format!("u{i}"), "tenant_id": tenant.id.to_string(), "name": format!("user {i}")}),
            );
        }

        let report = manager.check_limits(&tenant.slug).await.unwrap();
        assert_eq!(report.users.count, 3);
        assert!(report.users.reached);
        assert!(!report.products.reached);
        assert!(report.any_reached());
    }

    #[tokio::test]
    async fn test_check_limits_counts_current_month_transactions() {
        let (manager, server, _) = manager();
        let tenant = manager
            .create(CreateTenantRequest::new("acme", "Acme"))
            .await
            .unwrap();

        let db = &tenant.database_name;
        let now = Utc::now();
        let last_year = now - Duration::days(400);
        server.insert_row(
            db,
            "sales",
            json!({"id": "s1", "tenant_id": tenant.id.to_string(), "created_at": now.to_rfc3339()}),
        );
        server.insert_row(
            db,
            "sales",
            json!({"id": "s2", "tenant_id": tenant.id.to_string(), "created_at": last_year.to_rfc3339()}),
        );

        let report = manager.check_limits(&tenant.slug).await.unwrap();
        assert_eq!(report.transactions.count, 1);
    }

    #[test]
    fn test_start_of_month() {
        let now = Utc.with_ymd_and_hms(2026, 8, 6, 15, 30, 0).unwrap();
        let start = start_of_month(now);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap());
    }
}
