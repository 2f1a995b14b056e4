//! Error taxonomy for the provisioning engine.
//!
//! Every failure carries the tenant slug so operators can trace a tenant's
//! provisioning history through the logs. Nothing in this crate succeeds with
//! partial state silently; anything short of full success is one of these.

use mercantile_core::IdentifierError;
use thiserror::Error;

/// Errors surfaced by the tenancy engine.
#[derive(Debug, Error)]
pub enum TenancyError {
    /// No directory record for the given identifier.
    #[error("tenant not found: {0}")]
    NotFound(String),

    /// Tenant exists but is administratively suspended.
    #[error("tenant '{0}' is suspended")]
    Suspended(String),

    /// Tenant exists but is not serving requests.
    #[error("tenant '{0}' is not active")]
    Inactive(String),

    /// Slug, code, or database name collided with an existing record. Raised
    /// before any physical resource is touched.
    #[error("tenant directory conflict: {0}")]
    DirectoryConflict(String),

    /// A caller-supplied identifier failed validation.
    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    /// A credential/database/grant statement failed during creation. The
    /// directory row is left in `Creating` for the orphan sweeper.
    #[error("provisioning failed for tenant '{slug}': {reason}")]
    Provisioning { slug: String, reason: String },

    /// A clone or copy statement failed mid-sync. Completed steps remain in
    /// effect; the whole sync is safe to re-invoke.
    #[error("schema sync failed for tenant '{slug}' on '{table}': {reason}")]
    SchemaSync {
        slug: String,
        table: String,
        reason: String,
    },

    /// A drop statement failed. The directory row must not be deleted until a
    /// retried drop succeeds.
    #[error("teardown failed for tenant '{slug}': {reason}")]
    Teardown { slug: String, reason: String },

    /// Lifecycle operation requested from a state that does not permit it.
    #[error("invalid lifecycle transition for tenant '{slug}': {reason}")]
    InvalidTransition { slug: String, reason: String },

    /// Tenant resolution from a request token failed.
    #[error("tenant resolution failed: {0}")]
    Resolution(String),

    /// Underlying store or server error outside the lifecycle taxonomy.
    #[error("storage error: {0}")]
    Storage(String),

    /// Engine configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for tenancy operations.
pub type TenancyResult<T> = Result<T, TenancyError>;
