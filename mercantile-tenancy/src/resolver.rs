//! Tenant resolution
//!
//! Maps the tenant-identifying token on an inbound request (subdomain or header
//! value) to a directory record. The routing layer resolves first, then calls
//! `TenantManager::activate` before any tenant-scoped collaborator touches
//! persistence.
//!
//! Resolvers return the secret-free [`TenantSummary`]; the full record stays
//! inside the engine.

use crate::directory::TenantDirectory;
use crate::TenancyError;
use async_trait::async_trait;
use mercantile_core::{Slug, Tenant, TenantCode, TenantStatus, TenantSummary};
use std::sync::Arc;
use tracing::debug;

/// Resolves a request token to a tenant.
#[async_trait]
pub trait TenantResolver: Send + Sync {
    /// Resolve a token (host name, header value) to a tenant summary.
    async fn resolve(&self, token: &str) -> Result<TenantSummary, TenancyError>;
}

fn admit(tenant: Tenant) -> Result<TenantSummary, TenancyError> {
    match tenant.status {
        TenantStatus::Active => Ok(tenant.summary()),
        TenantStatus::Suspended => Err(TenancyError::Suspended(tenant.slug.to_string())),
        TenantStatus::Inactive => Err(TenancyError::Inactive(tenant.slug.to_string())),
    }
}

/// Resolves tenants from a subdomain (`acme.example.com` → tenant `acme`).
pub struct SubdomainResolver {
    directory: Arc<dyn TenantDirectory>,
    base_domain: String,
}

impl SubdomainResolver {
    /// Create a resolver for the given base domain.
    pub fn new(directory: Arc<dyn TenantDirectory>, base_domain: impl Into<String>) -> Self {
        Self {
            directory,
            base_domain: base_domain.into(),
        }
    }

    fn extract_subdomain(&self, host: &str) -> Option<String> {
        // Strip port if present.
        let host = host.split(':').next().unwrap_or(host);
        let suffix = format!(".{}", self.base_domain);
        let subdomain = host.strip_suffix(suffix.as_str())?;
        if subdomain.is_empty() || subdomain.contains('.') || subdomain == "www" {
            return None;
        }
        Some(subdomain.to_string())
    }
}

#[async_trait]
impl TenantResolver for SubdomainResolver {
    async fn resolve(&self, host: &str) -> Result<TenantSummary, TenancyError> {
        let subdomain = self
            .extract_subdomain(host)
            .ok_or_else(|| TenancyError::Resolution(format!("no tenant subdomain in '{host}'")))?;

        let slug = Slug::parse(subdomain.as_str())
            .map_err(|_| TenancyError::Resolution(format!("'{subdomain}' is not a tenant slug")))?;

        debug!(host = %host, slug = %slug, "resolving tenant from subdomain");
        let tenant = self
            .directory
            .find_by_slug(&slug)
            .await?
            .ok_or_else(|| TenancyError::NotFound(slug.to_string()))?;

        admit(tenant)
    }
}

/// Resolves tenants from an opaque header token: tenant code first, slug as a
/// fallback.
pub struct TokenResolver {
    directory: Arc<dyn TenantDirectory>,
}

impl TokenResolver {
    /// Create a token resolver over the directory.
    pub fn new(directory: Arc<dyn TenantDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl TenantResolver for TokenResolver {
    async fn resolve(&self, token: &str) -> Result<TenantSummary, TenancyError> {
        if let Ok(code) = TenantCode::parse(token) {
            if let Some(tenant) = self.directory.find_by_code(&code).await? {
                return admit(tenant);
            }
        }

        if let Ok(slug) = Slug::parse(token) {
            if let Some(tenant) = self.directory.find_by_slug(&slug).await? {
                return admit(tenant);
            }
        }

        Err(TenancyError::NotFound(token.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::testing::tenant_fixture;

    async fn directory_with(slugs: &[&str]) -> Arc<InMemoryDirectory> {
        let directory = Arc::new(InMemoryDirectory::new());
        for slug in slugs {
            directory.insert(&tenant_fixture(slug)).await.unwrap();
        }
        directory
    }

    #[tokio::test]
    async fn test_subdomain_resolution() {
        let directory = directory_with(&["acme"]).await;
        let resolver = SubdomainResolver::new(directory, "mercantile.app");

        let summary = resolver.resolve("acme.mercantile.app").await.unwrap();
        assert_eq!(summary.subdomain, "acme");

        let summary = resolver.resolve("acme.mercantile.app:8443").await.unwrap();
        assert_eq!(summary.slug.as_str(), "acme");
    }

    #[tokio::test]
    async fn test_bare_and_www_hosts_do_not_resolve() {
        let directory = directory_with(&["acme"]).await;
        let resolver = SubdomainResolver::new(directory, "mercantile.app");

        for host in ["mercantile.app", "www.mercantile.app", "a.b.mercantile.app"] {
            let err = resolver.resolve(host).await.unwrap_err();
            assert!(matches!(err, TenancyError::Resolution(_)), "host: {host}");
        }
    }

    #[tokio::test]
    async fn test_unknown_subdomain_is_not_found() {
        let directory = directory_with(&["acme"]).await;
        let resolver = SubdomainResolver::new(directory, "mercantile.app");

        let err = resolver.resolve("globex.mercantile.app").await.unwrap_err();
        assert!(matches!(err, TenancyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_suspended_tenant_is_refused() {
        let directory = Arc::new(InMemoryDirectory::new());
        let mut tenant = tenant_fixture("acme");
        tenant.status = TenantStatus::Suspended;
        directory.insert(&tenant).await.unwrap();

        let resolver = SubdomainResolver::new(directory, "mercantile.app");
        let err = resolver.resolve("acme.mercantile.app").await.unwrap_err();
        assert!(matches!(err, TenancyError::Suspended(_)));
    }

    #[tokio::test]
    async fn test_token_resolution_by_code_and_slug() {
        let directory = Arc::new(InMemoryDirectory::new());
        let tenant = tenant_fixture("acme");
        directory.insert(&tenant).await.unwrap();

        let resolver = TokenResolver::new(directory);
        let by_code = resolver.resolve(tenant.code.as_str()).await.unwrap();
        assert_eq!(by_code.slug, tenant.slug);

        let by_slug = resolver.resolve("acme").await.unwrap();
        assert_eq!(by_slug.slug, tenant.slug);
    }

    #[tokio::test]
    async fn test_resolved_summary_carries_no_secrets() {
        let directory = Arc::new(InMemoryDirectory::new());
        let tenant = tenant_fixture("acme");
        directory.insert(&tenant).await.unwrap();

        let resolver = TokenResolver::new(directory);
        let summary = resolver.resolve("acme").await.unwrap();
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains(&tenant.database_password));
        assert!(!json.contains(&tenant.encryption_key));
    }
}
