//! # Mercantile Core
//!
//! Shared domain model for the Mercantile multi-tenant business platform: the
//! tenant directory record, subscription plans and ceilings, and the validated
//! identifier types that gate every dynamic SQL identifier in the system.
//!
//! Higher layers (`mercantile-tenancy`, `mercantile-mysql`) build on these types;
//! this crate has no I/O of its own.

#![warn(clippy::all)]

mod ident;
mod plan;
mod tenant;

pub use ident::{
    ConnectionName, DatabaseName, IdentifierError, LoginName, Slug, TenantCode,
};
pub use plan::{PlanLimits, TenantPlan};
pub use tenant::{BusinessType, ProvisioningState, Tenant, TenantStatus, TenantSummary};
