//! Tenant directory record
//!
//! The directory row stored in the master (control-plane) database. One record
//! per customer account; the physical database binding on it is derived from the
//! slug at creation time and never mutates afterwards.

use crate::ident::{ConnectionName, DatabaseName, LoginName, Slug, TenantCode};
use crate::plan::{PlanLimits, TenantPlan};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Administrative status of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    /// Operational; physical database and login exist.
    Active,
    /// Not yet (or no longer) serving requests.
    Inactive,
    /// Administratively paused; reversible.
    Suspended,
}

impl std::fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Suspended => write!(f, "suspended"),
        }
    }
}

/// Where a tenant sits in the provisioning state machine.
///
/// The row is written in `Creating` *before* any physical resource is touched, so
/// a crash mid-provisioning leaves a discoverable record rather than an orphaned
/// database with no owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    /// Directory row exists; physical resources may or may not yet.
    Creating,
    /// Database and login exist; schema clone in progress.
    SchemaSyncing,
    /// Fully provisioned and synced.
    Ready,
    /// Teardown in progress.
    Destroying,
}

impl std::fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Creating => write!(f, "creating"),
            Self::SchemaSyncing => write!(f, "schema_syncing"),
            Self::Ready => write!(f, "ready"),
            Self::Destroying => write!(f, "destroying"),
        }
    }
}

/// Line of business, used for seed-data selection by external collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BusinessType {
    #[default]
    Retail,
    Restaurant,
    Grocery,
    Pharmacy,
    Service,
    Wholesale,
}

impl std::fmt::Display for BusinessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retail => write!(f, "retail"),
            Self::Restaurant => write!(f, "restaurant"),
            Self::Grocery => write!(f, "grocery"),
            Self::Pharmacy => write!(f, "pharmacy"),
            Self::Service => write!(f, "service"),
            Self::Wholesale => write!(f, "wholesale"),
        }
    }
}

/// A tenant directory record.
///
/// Identity (`id`, `slug`, `code`) and the database binding are fixed at creation;
/// everything else is mutable through the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    /// Stable unique identifier; also the partition key in tenant-scoped tables.
    pub id: Uuid,
    /// URL-safe unique slug; the database name derives from it.
    pub slug: Slug,
    /// Short opaque unique code; the connection name derives from it.
    pub code: TenantCode,
    /// Display name.
    pub name: String,
    /// Line of business.
    pub business_type: BusinessType,

    /// Physical database name (`prefix + slug`). Never mutates.
    pub database_name: DatabaseName,
    /// Dedicated login scoped to exactly this database.
    pub database_username: LoginName,
    /// Login password. Never exposed through [`TenantSummary`].
    pub database_password: String,
    /// Database server host.
    pub database_host: String,
    /// Database server port.
    pub database_port: u16,

    /// Administrative status.
    pub status: TenantStatus,
    /// Provisioning state machine position.
    pub provisioning_state: ProvisioningState,

    /// Subscription tier.
    pub plan: TenantPlan,
    /// Resolved ceiling: staff accounts.
    pub max_users: Option<u32>,
    /// Resolved ceiling: catalog size.
    pub max_products: Option<u32>,
    /// Resolved ceiling: monthly sales transactions.
    pub max_transactions_per_month: Option<u32>,

    /// End of the evaluation window.
    pub trial_ends_at: Option<DateTime<Utc>>,
    /// End of the paid subscription.
    pub subscription_expires_at: Option<DateTime<Utc>>,
    /// Last successful activation.
    pub last_accessed_at: Option<DateTime<Utc>>,

    /// Per-tenant key for application-level field encryption. Never exposed
    /// through [`TenantSummary`].
    pub encryption_key: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Registry key for this tenant's connection configuration.
    pub fn connection_name(&self) -> ConnectionName {
        ConnectionName::derive(&self.code)
    }

    /// Whether the tenant should be served at all.
    pub fn is_operational(&self) -> bool {
        self.status == TenantStatus::Active
            && self.provisioning_state == ProvisioningState::Ready
    }

    /// Whether the trial window has lapsed at `now`.
    pub fn trial_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.trial_ends_at, Some(ends) if ends < now)
    }

    /// Secret-free view for business-facing collaborators.
    pub fn summary(&self) -> TenantSummary {
        TenantSummary {
            slug: self.slug.clone(),
            name: self.name.clone(),
            business_type: self.business_type,
            subdomain: self.slug.as_str().to_string(),
            plan: self.plan,
            status: self.status,
            trial_ends_at: self.trial_ends_at,
        }
    }

    /// Apply the resolved ceilings of a plan onto this record.
    pub fn apply_plan(&mut self, plan: TenantPlan) {
        let limits = PlanLimits::for_plan(plan);
        self.plan = plan;
        self.max_users = limits.max_users;
        self.max_products = limits.max_products;
        self.max_transactions_per_month = limits.max_transactions_per_month;
    }
}

/// The external surface of a directory record.
///
/// Deliberately omits `database_password` and `encryption_key`; this is the only
/// tenant shape business collaborators and API layers see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantSummary {
    pub slug: Slug,
    pub name: String,
    pub business_type: BusinessType,
    pub subdomain: String,
    pub plan: TenantPlan,
    pub status: TenantStatus,
    pub trial_ends_at: Option<DateTime<Utc>>,
}
