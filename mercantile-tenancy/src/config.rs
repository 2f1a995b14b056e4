//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the tenancy engine.
///
/// # Examples
///
/// ```
/// use mercantile_tenancy::TenancyConfig;
///
/// let config = TenancyConfig::new("mercantile")
///     .database_prefix("tenant_")
///     .trial_days(30);
/// assert_eq!(config.master_database, "mercantile");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Master (control-plane) database name; the schema every tenant mirrors.
    pub master_database: String,

    /// Prefix for derived tenant database names.
    #[serde(default = "default_database_prefix")]
    pub database_prefix: String,

    /// Database server host recorded on new tenant bindings.
    #[serde(default = "default_database_host")]
    pub database_host: String,

    /// Database server port recorded on new tenant bindings.
    #[serde(default = "default_database_port")]
    pub database_port: u16,

    /// Length of the evaluation window for trial-plan tenants.
    #[serde(default = "default_trial_days")]
    pub trial_days: i64,

    /// Name of the migration ledger table.
    #[serde(default = "default_ledger_table")]
    pub ledger_table: String,

    /// Timestamp column used for current-period transaction counting.
    #[serde(default = "default_transaction_timestamp_column")]
    pub transaction_timestamp_column: String,
}

fn default_database_prefix() -> String {
    "tenant_".to_string()
}

fn default_database_host() -> String {
    "127.0.0.1".to_string()
}

fn default_database_port() -> u16 {
    3306
}

fn default_trial_days() -> i64 {
    30
}

fn default_ledger_table() -> String {
    "migrations".to_string()
}

fn default_transaction_timestamp_column() -> String {
    "created_at".to_string()
}

impl TenancyConfig {
    /// Create a configuration for the given master database.
    pub fn new(master_database: impl Into<String>) -> Self {
        Self {
            master_database: master_database.into(),
            database_prefix: default_database_prefix(),
            database_host: default_database_host(),
            database_port: default_database_port(),
            trial_days: default_trial_days(),
            ledger_table: default_ledger_table(),
            transaction_timestamp_column: default_transaction_timestamp_column(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Uses the following environment variables:
    /// - `MERCANTILE_MASTER_DB`: Required master database name
    /// - `MERCANTILE_DB_PREFIX`: Tenant database prefix (default: `tenant_`)
    /// - `MERCANTILE_DB_HOST`: Server host (default: `127.0.0.1`)
    /// - `MERCANTILE_DB_PORT`: Server port (default: `3306`)
    /// - `MERCANTILE_TRIAL_DAYS`: Trial length in days (default: `30`)
    pub fn from_env() -> Result<Self, crate::TenancyError> {
        let master = std::env::var("MERCANTILE_MASTER_DB")
            .map_err(|_| crate::TenancyError::Config("MERCANTILE_MASTER_DB not set".into()))?;

        let mut config = Self::new(master);

        if let Ok(prefix) = std::env::var("MERCANTILE_DB_PREFIX") {
            config.database_prefix = prefix;
        }

        if let Ok(host) = std::env::var("MERCANTILE_DB_HOST") {
            config.database_host = host;
        }

        if let Ok(port) = std::env::var("MERCANTILE_DB_PORT") {
            config.database_port = port
                .parse()
                .map_err(|_| crate::TenancyError::Config("Invalid MERCANTILE_DB_PORT".into()))?;
        }

        if let Ok(days) = std::env::var("MERCANTILE_TRIAL_DAYS") {
            config.trial_days = days
                .parse()
                .map_err(|_| crate::TenancyError::Config("Invalid MERCANTILE_TRIAL_DAYS".into()))?;
        }

        Ok(config)
    }

    /// Set the tenant database prefix.
    pub fn database_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.database_prefix = prefix.into();
        self
    }

    /// Set the server host for new tenant bindings.
    pub fn database_host(mut self, host: impl Into<String>) -> Self {
        self.database_host = host.into();
        self
    }

    /// Set the server port for new tenant bindings.
    pub fn database_port(mut self, port: u16) -> Self {
        self.database_port = port;
        self
    }

    /// Set the trial window length.
    pub fn trial_days(mut self, days: i64) -> Self {
        self.trial_days = days;
        self
    }

    /// Set the migration ledger table name.
    pub fn ledger_table(mut self, table: impl Into<String>) -> Self {
        self.ledger_table = table.into();
        self
    }
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self::new("mercantile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TenancyConfig::default();
        assert_eq!(config.database_prefix, "tenant_");
        assert_eq!(config.trial_days, 30);
        assert_eq!(config.ledger_table, "migrations");
    }

    #[test]
    fn test_builders() {
        let config = TenancyConfig::new("pos_master")
            .database_prefix("shop_")
            .database_port(3307)
            .trial_days(14);
        assert_eq!(config.master_database, "pos_master");
        assert_eq!(config.database_prefix, "shop_");
        assert_eq!(config.database_port, 3307);
        assert_eq!(config.trial_days, 14);
    }
}
