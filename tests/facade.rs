//! Smoke test: the facade crate exposes the full signup-to-activation flow.

use mercantile::prelude::*;
use mercantile_tenancy::directory::InMemoryDirectory;
use mercantile_tenancy::testing::InMemoryServer;
use mercantile_tenancy::CreateTenantRequest;
use std::sync::Arc;

#[tokio::test]
async fn signup_and_activate_through_the_facade() {
    let server = Arc::new(InMemoryServer::new("mercantile"));
    server.seed_master_ledger(&["0001_init"]);
    let directory = Arc::new(InMemoryDirectory::new());

    let manager = TenantManager::new(
        directory.clone(),
        server.clone(),
        server.clone(),
        TenancyConfig::new("mercantile"),
    );

    let tenant = manager
        .create(CreateTenantRequest::new("acme", "Acme Retail").with_plan(TenantPlan::Basic))
        .await
        .unwrap();
    assert_eq!(tenant.database_name.as_str(), "tenant_acme");
    assert_eq!(tenant.status, TenantStatus::Active);

    let context = manager.activate(&tenant.slug).await.unwrap();
    assert_eq!(context.descriptor().database.as_str(), "tenant_acme");
}
