//! Credential lifecycle
//!
//! Generates per-tenant database logins and drives the physical CREATE/GRANT/DROP
//! statement sequence through an injected [`ServerAdmin`]. Every statement the
//! admin issues is idempotent (`IF NOT EXISTS` / re-grant), so a partially failed
//! creation can be retried without first cleaning up.
//!
//! No retry logic lives here; the lifecycle manager decides when to retry.

use crate::TenancyError;
use async_trait::async_trait;
use mercantile_core::{DatabaseName, LoginName, Slug, Tenant, TenantCode};
use rand::Rng;
use std::sync::Arc;
use tracing::{error, info};

const PASSWORD_LEN: usize = 32;
const PASSWORD_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

const CODE_LEN: usize = 8;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Administrative access to the database server.
///
/// Implementations issue the actual DDL against an admin connection; every
/// method must be idempotent so the caller can re-run a failed sequence.
/// Identifier arguments only accept the validated newtypes from
/// `mercantile-core` — raw strings never reach a statement.
#[async_trait]
pub trait ServerAdmin: Send + Sync {
    /// `CREATE DATABASE IF NOT EXISTS`.
    async fn create_database(&self, database: &DatabaseName) -> Result<(), TenancyError>;

    /// `CREATE USER IF NOT EXISTS … IDENTIFIED BY …`.
    async fn create_login(&self, login: &LoginName, password: &str)
        -> Result<(), TenancyError>;

    /// `GRANT ALL PRIVILEGES ON <db>.* TO <login>`. Scope is exactly one
    /// database; a login never gains access to another tenant's database.
    async fn grant_all(
        &self,
        login: &LoginName,
        database: &DatabaseName,
    ) -> Result<(), TenancyError>;

    /// `FLUSH PRIVILEGES`.
    async fn flush_privileges(&self) -> Result<(), TenancyError>;

    /// `DROP DATABASE IF EXISTS`. Destroys all tenant data.
    async fn drop_database(&self, database: &DatabaseName) -> Result<(), TenancyError>;

    /// `DROP USER IF EXISTS`.
    async fn drop_login(&self, login: &LoginName) -> Result<(), TenancyError>;

    /// Whether the database currently exists in the server catalog.
    async fn database_exists(&self, database: &DatabaseName) -> Result<bool, TenancyError>;
}

/// Generated login material for a new tenant.
#[derive(Debug, Clone)]
pub struct TenantCredentials {
    /// Deterministic login name (`tenant_<slug>`).
    pub username: LoginName,
    /// Random fixed-length password.
    pub password: String,
}

/// Issues and revokes per-tenant database credentials.
pub struct CredentialManager {
    admin: Arc<dyn ServerAdmin>,
}

impl CredentialManager {
    /// Create a credential manager over an injected server admin.
    pub fn new(admin: Arc<dyn ServerAdmin>) -> Self {
        Self { admin }
    }

    /// Generate login material for a slug.
    ///
    /// The username is a pure function of the slug; the password is
    /// cryptographically random with a fixed length. Uniqueness rests on the
    /// directory-level uniqueness of the slug itself.
    pub fn generate(slug: &Slug) -> TenantCredentials {
        TenantCredentials {
            username: LoginName::derive(slug),
            password: random_string(PASSWORD_ALPHABET, PASSWORD_LEN),
        }
    }

    /// Generate a fresh tenant code.
    pub fn generate_code() -> TenantCode {
        TenantCode::parse(random_string(CODE_ALPHABET, CODE_LEN))
            .expect("generated code matches the code pattern")
    }

    /// Generate a 256-bit hex-encoded field-encryption key.
    pub fn generate_encryption_key() -> String {
        let mut rng = rand::rng();
        let bytes: Vec<u8> = (0..32).map(|_| rng.random()).collect();
        hex::encode(bytes)
    }

    /// Create the tenant's database, login, and grant.
    ///
    /// Statement order: database, user, grant, flush. All idempotent; re-running
    /// after a partial failure converges on the same end state.
    pub async fn create_physical_resources(&self, tenant: &Tenant) -> Result<(), TenancyError> {
        info!(
            slug = %tenant.slug,
            database = %tenant.database_name,
            "provisioning physical database resources"
        );

        self.step(tenant, self.admin.create_database(&tenant.database_name))
            .await?;
        self.step(
            tenant,
            self.admin
                .create_login(&tenant.database_username, &tenant.database_password),
        )
        .await?;
        self.step(
            tenant,
            self.admin
                .grant_all(&tenant.database_username, &tenant.database_name),
        )
        .await?;
        self.step(tenant, self.admin.flush_privileges()).await?;

        info!(slug = %tenant.slug, "physical resources provisioned");
        Ok(())
    }

    /// Drop the tenant's database and login. Irreversible.
    pub async fn drop_physical_resources(&self, tenant: &Tenant) -> Result<(), TenancyError> {
        info!(
            slug = %tenant.slug,
            database = %tenant.database_name,
            "dropping physical database resources"
        );

        let result: Result<(), TenancyError> = async {
            self.admin.drop_database(&tenant.database_name).await?;
            self.admin.drop_login(&tenant.database_username).await?;
            self.admin.flush_privileges().await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                info!(slug = %tenant.slug, "physical resources dropped");
                Ok(())
            }
            Err(e) => {
                error!(slug = %tenant.slug, code = %tenant.code, error = %e, "teardown statement failed");
                Err(TenancyError::Teardown {
                    slug: tenant.slug.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Whether the tenant's database exists in the server catalog.
    pub async fn database_exists(&self, tenant: &Tenant) -> Result<bool, TenancyError> {
        self.admin.database_exists(&tenant.database_name).await
    }

    async fn step(
        &self,
        tenant: &Tenant,
        fut: impl std::future::Future<Output = Result<(), TenancyError>>,
    ) -> Result<(), TenancyError> {
        fut.await.map_err(|e| {
            error!(slug = %tenant.slug, code = %tenant.code, error = %e, "provisioning statement failed");
            TenancyError::Provisioning {
                slug: tenant.slug.to_string(),
                reason: e.to_string(),
            }
        })
    }
}

fn random_string(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_is_deterministic() {
        let slug = Slug::parse("acme").unwrap();
        let a = CredentialManager::generate(&slug);
        let b = CredentialManager::generate(&slug);
        assert_eq!(a.username.as_str(), "tenant_acme");
        assert_eq!(a.username, b.username);
    }

    #[test]
    fn test_password_is_random_fixed_length() {
        let slug = Slug::parse("acme").unwrap();
        let a = CredentialManager::generate(&slug);
        let b = CredentialManager::generate(&slug);
        assert_eq!(a.password.len(), PASSWORD_LEN);
        assert_eq!(b.password.len(), PASSWORD_LEN);
        assert_ne!(a.password, b.password);
    }

    #[test]
    fn test_generated_code_parses() {
        let code = CredentialManager::generate_code();
        assert_eq!(code.as_str().len(), CODE_LEN);
        assert!(TenantCode::parse(code.as_str()).is_ok());
    }

    #[test]
    fn test_encryption_key_is_hex_256_bit() {
        let key = CredentialManager::generate_encryption_key();
        assert_eq!(key.len(), 64);
        assert!(hex::decode(&key).is_ok());
    }
}
