//! # Mercantile MySQL
//!
//! MySQL integration for the Mercantile tenant provisioning engine.
//!
//! Provides the concrete implementations of the engine's seams over `sqlx`
//! connection pools:
//!
//! - [`MySqlServerAdmin`] — privileged DDL: databases, logins, grants, schema
//!   cloning, partitioned row copies, ledger reads and seeding
//! - [`MySqlDirectory`] — the durable tenant directory in the master database
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mercantile_mysql::{MySqlConfig, MySqlDirectory, MySqlServerAdmin};
//! use mercantile_tenancy::{TenancyConfig, TenantManager};
//! use std::sync::Arc;
//!
//! let config = MySqlConfig::from_env()?;
//! let admin = Arc::new(MySqlServerAdmin::connect(&config).await?);
//! let directory = Arc::new(MySqlDirectory::connect(&config).await?);
//!
//! let manager = TenantManager::new(
//!     directory,
//!     admin.clone(),
//!     admin,
//!     TenancyConfig::new(&config.master_database),
//! );
//! ```

#![warn(clippy::all)]

mod admin;
mod config;
mod directory;
mod error;

pub use admin::MySqlServerAdmin;
pub use config::MySqlConfig;
pub use directory::MySqlDirectory;
pub use error::{MySqlError, MySqlResult};

// Re-export sqlx for consumers building their own queries on these pools.
pub use sqlx;
