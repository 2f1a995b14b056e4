//! Validated SQL identifiers
//!
//! Every dynamic identifier that can reach a DDL statement (database names, login
//! names, connection names) is wrapped in a newtype that can only be constructed
//! from an already-validated slug or tenant code. Raw user input never gets an
//! identifier position in a statement.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static SLUG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-z][a-z0-9_]{1,31}$").expect("slug pattern compiles"));

static CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[A-Z0-9]{6,12}$").expect("code pattern compiles"));

/// Errors raised while validating tenant identifiers.
#[derive(Debug, thiserror::Error)]
pub enum IdentifierError {
    #[error("invalid tenant slug '{0}': expected ^[a-z][a-z0-9_]{{1,31}}$")]
    InvalidSlug(String),

    #[error("invalid tenant code '{0}': expected 6-12 uppercase alphanumerics")]
    InvalidCode(String),
}

/// URL-safe tenant slug.
///
/// The slug is the only piece of caller-supplied input that ever feeds an SQL
/// identifier, so it is validated once here and carried as a distinct type from
/// then on.
///
/// # Examples
///
/// ```
/// use mercantile_core::Slug;
///
/// let slug = Slug::parse("acme").unwrap();
/// assert_eq!(slug.as_str(), "acme");
/// assert!(Slug::parse("Acme Corp!").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    /// Validate and wrap a slug.
    pub fn parse(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        if SLUG_PATTERN.is_match(&value) {
            Ok(Self(value))
        } else {
            Err(IdentifierError::InvalidSlug(value))
        }
    }

    /// The slug as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Slug {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self {
        slug.0
    }
}

impl std::fmt::Display for Slug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short opaque tenant code, unique across the directory.
///
/// Used to derive connection names; generated server-side, never parsed from
/// request input except through [`TenantCode::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantCode(String);

impl TenantCode {
    /// Validate and wrap a tenant code.
    pub fn parse(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        if CODE_PATTERN.is_match(&value) {
            Ok(Self(value))
        } else {
            Err(IdentifierError::InvalidCode(value))
        }
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TenantCode {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TenantCode> for String {
    fn from(code: TenantCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for TenantCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Physical database name, a pure function of prefix + slug.
///
/// Immutable once derived; there is deliberately no way to build one from a free
/// string outside this crate.
///
/// # Examples
///
/// ```
/// use mercantile_core::{DatabaseName, Slug};
///
/// let slug = Slug::parse("acme").unwrap();
/// let db = DatabaseName::derive("tenant_", &slug);
/// assert_eq!(db.as_str(), "tenant_acme");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatabaseName(String);

impl DatabaseName {
    /// Derive the database name for a slug.
    pub fn derive(prefix: &str, slug: &Slug) -> Self {
        Self(format!("{}{}", prefix, slug.as_str()))
    }

    /// Rehydrate a stored database name, checking it against its slug.
    pub fn rehydrate(
        stored: &str,
        prefix: &str,
        slug: &Slug,
    ) -> Result<Self, IdentifierError> {
        let derived = Self::derive(prefix, slug);
        if derived.0 == stored {
            Ok(derived)
        } else {
            Err(IdentifierError::InvalidSlug(format!(
                "database name '{}' does not match slug '{}'",
                stored, slug
            )))
        }
    }

    /// The database name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DatabaseName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Dedicated database login for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoginName(String);

impl LoginName {
    /// Derive the login name for a slug (`tenant_<slug>`).
    pub fn derive(slug: &Slug) -> Self {
        Self(format!("tenant_{}", slug.as_str()))
    }

    /// The login name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LoginName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry key for a tenant's connection configuration.
///
/// Deterministic function of the tenant code so repeated registrations of the
/// same tenant land on the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionName(String);

impl ConnectionName {
    /// Derive the connection name for a tenant code.
    pub fn derive(code: &TenantCode) -> Self {
        Self(format!("tenant_{}", code.as_str().to_lowercase()))
    }

    /// The connection name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_accepts_lowercase() {
        assert!(Slug::parse("acme").is_ok());
        assert!(Slug::parse("acme_west_2").is_ok());
    }

    #[test]
    fn test_slug_rejects_hostile_input() {
        assert!(Slug::parse("acme; DROP DATABASE master").is_err());
        assert!(Slug::parse("Acme").is_err());
        assert!(Slug::parse("a`b").is_err());
        assert!(Slug::parse("").is_err());
        assert!(Slug::parse("9lives").is_err());
    }

    #[test]
    fn test_slug_rejects_overlong() {
        let long = "a".repeat(33);
        assert!(Slug::parse(long).is_err());
    }

    #[test]
    fn test_database_name_is_pure_function_of_slug() {
        let slug = Slug::parse("acme").unwrap();
        assert_eq!(DatabaseName::derive("tenant_", &slug).as_str(), "tenant_acme");
        assert_eq!(
            DatabaseName::derive("tenant_", &slug),
            DatabaseName::derive("tenant_", &slug)
        );
    }

    #[test]
    fn test_rehydrate_rejects_mismatch() {
        let slug = Slug::parse("acme").unwrap();
        assert!(DatabaseName::rehydrate("tenant_acme", "tenant_", &slug).is_ok());
        assert!(DatabaseName::rehydrate("tenant_other", "tenant_", &slug).is_err());
    }

    #[test]
    fn test_login_name() {
        let slug = Slug::parse("acme").unwrap();
        assert_eq!(LoginName::derive(&slug).as_str(), "tenant_acme");
    }

    #[test]
    fn test_connection_name_deterministic() {
        let code = TenantCode::parse("7KQ2XF9A").unwrap();
        let a = ConnectionName::derive(&code);
        let b = ConnectionName::derive(&code);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "tenant_7kq2xf9a");
    }

    #[test]
    fn test_code_rejects_lowercase() {
        assert!(TenantCode::parse("abc123").is_err());
        assert!(TenantCode::parse("ABC123").is_ok());
    }
}
