//! Error types for the MySQL adapter.

use thiserror::Error;

/// Errors raised while setting up or using the MySQL adapter.
#[derive(Error, Debug)]
pub enum MySqlError {
    /// Connection or pool setup error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Query execution error.
    #[error("query error: {0}")]
    Query(#[from] sqlx::Error),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for adapter operations.
pub type MySqlResult<T> = Result<T, MySqlError>;

impl From<MySqlError> for mercantile_tenancy::TenancyError {
    fn from(err: MySqlError) -> Self {
        mercantile_tenancy::TenancyError::Storage(err.to_string())
    }
}
