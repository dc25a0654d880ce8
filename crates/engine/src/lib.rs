//! # pg-migrate-engine
//!
//! Versioned schema migrations for PostgreSQL. Scripts live on disk as
//! `<version>_<name>.sql` files, applied versions are tracked in a
//! goose-compatible bookkeeping table, and every script runs in its own
//! transaction together with its bookkeeping row.
//!
//! ```no_run
//! use pg_migrate_engine::{DatabaseConfig, ConfigOverrides, MigrationCommand, MigrationSource, Migrator, PostgresDatabase};
//!
//! # async fn run() -> pg_migrate_engine::MigrateResult<()> {
//! let config = DatabaseConfig::load(&ConfigOverrides::default())?;
//! let db = PostgresDatabase::connect(&config).await?;
//! let migrator = Migrator::new(MigrationSource::from_dir(&config.migrations_dir), db);
//! migrator.run(MigrationCommand::Up).await?;
//! migrator.database().close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod migrations;

pub use config::{ConfigOverrides, ConfigSource, DatabaseConfig};
pub use error::{DatabaseError, MigrateError, MigrateResult};
pub use logging::{init_logging, LoggingConfig};
pub use migrations::{
    CommandOutcome, ExecutionReport, Migration, MigrationCommand, MigrationSource, Migrator,
    PostgresDatabase, StatusReport, VersionScheme,
};
