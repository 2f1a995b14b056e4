//! Connection registry and tenant context
//!
//! Process-wide map from connection name to connection configuration. Entries are
//! created lazily on first access and must be purged after any DDL against the
//! tenant's database so later connections see fresh schema metadata.
//!
//! Activation deliberately does **not** set a process-wide "current tenant".
//! It returns a [`TenantContext`] value that callers thread through every unit of
//! work, so concurrent requests on different tenants cannot cross-contaminate.

use chrono::{DateTime, Utc};
use mercantile_core::{ConnectionName, DatabaseName, LoginName, Tenant};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Connection configuration for one tenant database.
///
/// Not persisted; lives only as long as the process.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionDescriptor {
    /// Registry key, derived from the tenant code.
    pub name: ConnectionName,
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Tenant database.
    pub database: DatabaseName,
    /// Dedicated tenant login.
    pub username: LoginName,
    /// Login password.
    pub password: String,
}

impl ConnectionDescriptor {
    /// Build the descriptor for a tenant's database binding.
    pub fn for_tenant(tenant: &Tenant) -> Self {
        Self {
            name: tenant.connection_name(),
            host: tenant.database_host.clone(),
            port: tenant.database_port,
            database: tenant.database_name.clone(),
            username: tenant.database_username.clone(),
            password: tenant.database_password.clone(),
        }
    }

    /// Connection URL for database drivers. Contains the password; never log it.
    pub fn url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }
}

impl std::fmt::Display for ConnectionDescriptor {
    // Redacted; safe for logs.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

/// Process-wide registry of tenant connection configurations.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<ConnectionName, ConnectionDescriptor>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the tenant's connection if absent; returns the live descriptor.
    ///
    /// No-op when an entry already exists under the tenant's connection name.
    pub async fn ensure(&self, tenant: &Tenant) -> ConnectionDescriptor {
        let name = tenant.connection_name();

        {
            let entries = self.entries.read().await;
            if let Some(descriptor) = entries.get(&name) {
                return descriptor.clone();
            }
        }

        let descriptor = ConnectionDescriptor::for_tenant(tenant);
        debug!(connection = %name, tenant = %tenant.slug, "registering tenant connection");
        let mut entries = self.entries.write().await;
        entries
            .entry(name)
            .or_insert_with(|| descriptor.clone())
            .clone()
    }

    /// Invalidate the tenant's cached connection configuration.
    ///
    /// Must be called after any DDL against the tenant database; the next
    /// `ensure` rebuilds the entry from the directory record.
    pub async fn purge(&self, tenant: &Tenant) {
        let name = tenant.connection_name();
        debug!(connection = %name, tenant = %tenant.slug, "purging tenant connection");
        self.entries.write().await.remove(&name);
    }

    /// Whether a connection is currently registered.
    pub async fn contains(&self, name: &ConnectionName) -> bool {
        self.entries.read().await.contains_key(name)
    }

    /// Number of registered connections.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Request-scoped tenant context.
///
/// Produced by activation; holds the tenant snapshot and its live connection
/// descriptor. Business collaborators receive this by value (or reference) and
/// never consult process-global state.
#[derive(Debug, Clone)]
pub struct TenantContext {
    tenant: Tenant,
    descriptor: ConnectionDescriptor,
    activated_at: DateTime<Utc>,
}

impl TenantContext {
    /// Build a context from a tenant and its descriptor.
    pub fn new(tenant: Tenant, descriptor: ConnectionDescriptor) -> Self {
        Self {
            tenant,
            descriptor,
            activated_at: Utc::now(),
        }
    }

    /// The tenant this context is scoped to.
    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    /// The connection descriptor for the tenant's database.
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// When this context was produced.
    pub fn activated_at(&self) -> DateTime<Utc> {
        self.activated_at
    }
}
