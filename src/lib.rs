// Mercantile - multi-tenant business-management backend.
//
// The hard core of the platform is its tenant database provisioning and
// isolation engine: one dedicated physical database and login per tenant,
// schema-synchronized from the master database and partitioned by tenant.

// Re-export the domain model
pub use mercantile_core::*;

// Re-export the provisioning engine
pub use mercantile_tenancy;

#[cfg(feature = "mysql")]
pub use mercantile_mysql;

/// Prelude: the types most applications need.
pub mod prelude {
    pub use mercantile_core::{
        BusinessType, ProvisioningState, Slug, Tenant, TenantPlan, TenantStatus,
        TenantSummary,
    };
    pub use mercantile_tenancy::prelude::*;

    #[cfg(feature = "mysql")]
    pub use mercantile_mysql::{MySqlConfig, MySqlDirectory, MySqlServerAdmin};
}
