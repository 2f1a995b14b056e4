//! Tenant directory store
//!
//! Persistence seam for the tenant directory. The MySQL-backed implementation
//! lives in `mercantile-mysql`; the in-memory store here mirrors the same
//! unique constraints and is what the engine's own tests run against.

use crate::TenancyError;
use async_trait::async_trait;
use mercantile_core::{ProvisioningState, Slug, Tenant, TenantCode};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Store of tenant directory records.
///
/// Implementations must enforce uniqueness of `slug`, `code`, and
/// `database_name` and surface violations as
/// [`TenancyError::DirectoryConflict`] — the unique constraint is the only
/// collision defense for concurrent creates.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Insert a new record.
    async fn insert(&self, tenant: &Tenant) -> Result<(), TenancyError>;

    /// Update an existing record.
    async fn update(&self, tenant: &Tenant) -> Result<(), TenancyError>;

    /// Delete a record.
    async fn delete(&self, id: Uuid) -> Result<(), TenancyError>;

    /// Find by id.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, TenancyError>;

    /// Find by slug.
    async fn find_by_slug(&self, slug: &Slug) -> Result<Option<Tenant>, TenancyError>;

    /// Find by tenant code.
    async fn find_by_code(&self, code: &TenantCode) -> Result<Option<Tenant>, TenancyError>;

    /// All records currently in the given provisioning state.
    async fn list_in_state(
        &self,
        state: ProvisioningState,
    ) -> Result<Vec<Tenant>, TenancyError>;

    /// Total number of records.
    async fn count(&self) -> Result<u64, TenancyError>;
}

/// In-memory directory for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    tenants: RwLock<HashMap<Uuid, Tenant>>,
}

impl InMemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantDirectory for InMemoryDirectory {
    async fn insert(&self, tenant: &Tenant) -> Result<(), TenancyError> {
        let mut tenants = self.tenants.write();
        let conflict = tenants.values().any(|t| {
            t.id == tenant.id
                || t.slug == tenant.slug
                || t.code == tenant.code
                || t.database_name == tenant.database_name
        });
        if conflict {
            return Err(TenancyError::DirectoryConflict(tenant.slug.to_string()));
        }
        tenants.insert(tenant.id, tenant.clone());
        Ok(())
    }

    async fn update(&self, tenant: &Tenant) -> Result<(), TenancyError> {
        let mut tenants = self.tenants.write();
        if !tenants.contains_key(&tenant.id) {
            return Err(TenancyError::NotFound(tenant.slug.to_string()));
        }
        tenants.insert(tenant.id, tenant.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), TenancyError> {
        self.tenants.write().remove(&id);
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, TenancyError> {
        Ok(self.tenants.read().get(&id).cloned())
    }

    async fn find_by_slug(&self, slug: &Slug) -> Result<Option<Tenant>, TenancyError> {
        Ok(self
            .tenants
            .read()
            .values()
            .find(|t| &t.slug == slug)
            .cloned())
    }

    async fn find_by_code(&self, code: &TenantCode) -> Result<Option<Tenant>, TenancyError> {
        Ok(self
            .tenants
            .read()
            .values()
            .find(|t| &t.code == code)
            .cloned())
    }

    async fn list_in_state(
        &self,
        state: ProvisioningState,
    ) -> Result<Vec<Tenant>, TenancyError> {
        let mut found: Vec<Tenant> = self
            .tenants
            .read()
            .values()
            .filter(|t| t.provisioning_state == state)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    async fn count(&self) -> Result<u64, TenancyError> {
        Ok(self.tenants.read().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::tenant_fixture;

    #[tokio::test]
    async fn test_insert_and_find() {
        let directory = InMemoryDirectory::new();
        let tenant = tenant_fixture("acme");

        directory.insert(&tenant).await.unwrap();
        let found = directory.find_by_slug(&tenant.slug).await.unwrap().unwrap();
        assert_eq!(found.id, tenant.id);

        let by_code = directory.find_by_code(&tenant.code).await.unwrap().unwrap();
        assert_eq!(by_code.id, tenant.id);
    }

    #[tokio::test]
    async fn test_duplicate_slug_conflicts() {
        let directory = InMemoryDirectory::new();
        let tenant = tenant_fixture("acme");
        let mut twin = tenant_fixture("acme");
        twin.id = Uuid::new_v4();

        directory.insert(&tenant).await.unwrap();
        let err = directory.insert(&twin).await.unwrap_err();
        assert!(matches!(err, TenancyError::DirectoryConflict(_)));
        assert_eq!(directory.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let directory = InMemoryDirectory::new();
        let tenant = tenant_fixture("acme");
        let err = directory.update(&tenant).await.unwrap_err();
        assert!(matches!(err, TenancyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_in_state() {
        let directory = InMemoryDirectory::new();
        let mut creating = tenant_fixture("acme");
        creating.provisioning_state = ProvisioningState::Creating;
        let ready = tenant_fixture("globex");

        directory.insert(&creating).await.unwrap();
        directory.insert(&ready).await.unwrap();

        let stuck = directory
            .list_in_state(ProvisioningState::Creating)
            .await
            .unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].slug, creating.slug);
    }
}
