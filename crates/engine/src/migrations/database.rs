//! Target database seam
//!
//! The engine drives any store that can run SQL statements inside a
//! transaction and persist the bookkeeping table. [`PostgresDatabase`] is the
//! production adapter.
//!
//! [`PostgresDatabase`]: super::postgres::PostgresDatabase

use async_trait::async_trait;

use super::definitions::AppliedVersionRecord;
use crate::error::DatabaseError;

/// A SQL store the engine can migrate
#[async_trait]
pub trait TargetDatabase: Send + Sync {
    type Transaction: ScriptTransaction;

    /// Create the bookkeeping table if it does not exist
    async fn ensure_version_table(&self) -> Result<(), DatabaseError>;

    /// Every bookkeeping row, oldest first
    async fn version_records(&self) -> Result<Vec<AppliedVersionRecord>, DatabaseError>;

    /// Start a transaction scoped to one script
    async fn begin(&self) -> Result<Self::Transaction, DatabaseError>;

    /// Run a statement outside any transaction
    async fn execute(&self, statement: &str) -> Result<(), DatabaseError>;

    /// Serialize concurrent invocations. No-op unless the adapter supports it.
    async fn lock(&self) -> Result<(), DatabaseError> {
        Ok(())
    }

    async fn unlock(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// A transaction covering one script and its bookkeeping row
#[async_trait]
pub trait ScriptTransaction: Send {
    async fn execute(&mut self, statement: &str) -> Result<(), DatabaseError>;

    /// Append a bookkeeping row
    async fn insert_version(&mut self, record: &AppliedVersionRecord) -> Result<(), DatabaseError>;

    async fn commit(self) -> Result<(), DatabaseError>;

    async fn rollback(self) -> Result<(), DatabaseError>;
}
