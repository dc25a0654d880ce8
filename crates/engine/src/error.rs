//! Error types for the migration engine
//!
//! Every failure surfaced by the engine belongs to exactly one of five
//! categories. Nothing is retried; the first error ends the operation.

use thiserror::Error;

/// Result type alias for engine operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Error types for migration operations
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Bad or missing connection parameters
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or inconsistent migration source
    #[error("Migration source error: {0}")]
    Source(String),

    /// Bookkeeping table read/write failure
    #[error("Version ledger error: {0}")]
    Ledger(String),

    /// Requested target version unreachable or invalid
    #[error("Plan error: {0}")]
    Plan(String),

    /// A script's payload failed mid-transaction
    #[error("Migration {version} failed: {message}")]
    Execution { version: i64, message: String },
}

impl MigrateError {
    /// Short category name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            MigrateError::Config(_) => "config",
            MigrateError::Source(_) => "source",
            MigrateError::Ledger(_) => "ledger",
            MigrateError::Plan(_) => "plan",
            MigrateError::Execution { .. } => "execution",
        }
    }

    /// Version involved in the failure, when there is one
    pub fn version(&self) -> Option<i64> {
        match self {
            MigrateError::Execution { version, .. } => Some(*version),
            _ => None,
        }
    }
}

/// Errors reported by a [`TargetDatabase`](crate::migrations::TargetDatabase) adapter
///
/// The layer that observes one decides which [`MigrateError`] it becomes.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Driver error
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    /// Statement rejected by a non-sqlx backend
    #[error("{0}")]
    Rejected(String),
}

impl DatabaseError {
    pub fn rejected(message: impl Into<String>) -> Self {
        DatabaseError::Rejected(message.into())
    }
}
