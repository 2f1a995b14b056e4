//! Sync manifest
//!
//! Versioned, reviewable classification of master tables: which are partitioned
//! by tenant, which are copied wholesale as reference data, which are cloned as
//! empty structure, and which never reach a tenant database at all. The manifest
//! is the single source of truth for partitioning; the synchronizer never guesses
//! from column names at runtime.

use crate::TenancyError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a master table is materialized in tenant databases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PartitionStrategy {
    /// Structure cloned; rows copied where `column = tenant id`.
    TenantScoped {
        /// The tenant-identifying column.
        column: String,
    },
    /// Structure cloned; full row set copied once.
    Global,
    /// Structure cloned; rows left for the tenant to produce.
    StructureOnly,
    /// Never cloned into tenant databases.
    Excluded,
}

/// Versioned table-classification manifest.
///
/// # Examples
///
/// ```
/// use mercantile_tenancy::{PartitionStrategy, SyncManifest};
///
/// let manifest = SyncManifest::new(1)
///     .tenant_scoped("products", "tenant_id")
///     .global("units")
///     .excluded("tenants");
/// assert!(manifest.is_excluded("tenants"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncManifest {
    /// Manifest revision; bumped whenever classification changes.
    pub version: u32,
    tables: BTreeMap<String, PartitionStrategy>,
}

impl SyncManifest {
    /// Create an empty manifest at the given revision.
    pub fn new(version: u32) -> Self {
        Self {
            version,
            tables: BTreeMap::new(),
        }
    }

    /// The manifest shipped for the business domain schema.
    pub fn business_default() -> Self {
        Self::new(1)
            // Partitioned business data.
            .tenant_scoped("users", "tenant_id")
            .tenant_scoped("customers", "tenant_id")
            .tenant_scoped("products", "tenant_id")
            .tenant_scoped("product_stocks", "tenant_id")
            .tenant_scoped("price_levels", "tenant_id")
            .tenant_scoped("sales", "tenant_id")
            .tenant_scoped("sale_items", "tenant_id")
            .tenant_scoped("invoices", "tenant_id")
            .tenant_scoped("payments", "tenant_id")
            // Reference data copied to every tenant once.
            .global("business_types")
            .global("units")
            .global("currencies")
            .global("tax_rates")
            // Ledger structure is cloned; rows are seeded by ledger sync.
            .structure_only("migrations")
            // Control-plane tables that never leave the master database.
            .excluded("tenants")
            .excluded("plans")
            .excluded("admin_users")
    }

    /// Parse a manifest from TOML.
    ///
    /// ```toml
    /// version = 2
    ///
    /// [tables.products]
    /// strategy = "tenant_scoped"
    /// column = "tenant_id"
    ///
    /// [tables.units]
    /// strategy = "global"
    /// ```
    pub fn from_toml_str(input: &str) -> Result<Self, TenancyError> {
        toml::from_str(input).map_err(|e| TenancyError::Config(e.to_string()))
    }

    /// Render the manifest as TOML for review.
    pub fn to_toml_string(&self) -> Result<String, TenancyError> {
        toml::to_string_pretty(self).map_err(|e| TenancyError::Config(e.to_string()))
    }

    /// Classify a master table. Unlisted tables default to [`PartitionStrategy::StructureOnly`].
    pub fn classify(&self, table: &str) -> PartitionStrategy {
        self.tables
            .get(table)
            .cloned()
            .unwrap_or(PartitionStrategy::StructureOnly)
    }

    /// Whether the table is excluded from tenant databases entirely.
    pub fn is_excluded(&self, table: &str) -> bool {
        matches!(self.tables.get(table), Some(PartitionStrategy::Excluded))
    }

    /// Tables with an explicit rule.
    pub fn tables(&self) -> impl Iterator<Item = (&str, &PartitionStrategy)> {
        self.tables.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Add a tenant-scoped rule.
    pub fn tenant_scoped(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.tables.insert(
            table.into(),
            PartitionStrategy::TenantScoped {
                column: column.into(),
            },
        );
        self
    }

    /// Add a global (reference-data) rule.
    pub fn global(mut self, table: impl Into<String>) -> Self {
        self.tables.insert(table.into(), PartitionStrategy::Global);
        self
    }

    /// Add a structure-only rule.
    pub fn structure_only(mut self, table: impl Into<String>) -> Self {
        self.tables
            .insert(table.into(), PartitionStrategy::StructureOnly);
        self
    }

    /// Add an exclusion rule.
    pub fn excluded(mut self, table: impl Into<String>) -> Self {
        self.tables
            .insert(table.into(), PartitionStrategy::Excluded);
        self
    }
}

impl Default for SyncManifest {
    fn default() -> Self {
        Self::business_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlisted_defaults_to_structure_only() {
        let manifest = SyncManifest::new(1);
        assert_eq!(
            manifest.classify("anything"),
            PartitionStrategy::StructureOnly
        );
    }

    #[test]
    fn test_business_default_excludes_directory() {
        let manifest = SyncManifest::business_default();
        assert!(manifest.is_excluded("tenants"));
        assert_eq!(
            manifest.classify("products"),
            PartitionStrategy::TenantScoped {
                column: "tenant_id".to_string()
            }
        );
        assert_eq!(manifest.classify("units"), PartitionStrategy::Global);
    }

    #[test]
    fn test_toml_round_trip() {
        let manifest = SyncManifest::new(2)
            .tenant_scoped("products", "tenant_id")
            .global("units")
            .excluded("tenants");

        let rendered = manifest.to_toml_string().unwrap();
        let parsed = SyncManifest::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_toml_parse() {
        let manifest = SyncManifest::from_toml_str(
            r#"
            version = 3

            [tables.products]
            strategy = "tenant_scoped"
            column = "tenant_id"

            [tables.units]
            strategy = "global"
            "#,
        )
        .unwrap();

        assert_eq!(manifest.version, 3);
        assert_eq!(
            manifest.classify("products"),
            PartitionStrategy::TenantScoped {
                column: "tenant_id".to_string()
            }
        );
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = SyncManifest::from_toml_str("version = \"not a number\"").unwrap_err();
        assert!(matches!(err, TenancyError::Config(_)));
    }
}
