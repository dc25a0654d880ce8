//! Version Ledger - bookkeeping of applied versions
//!
//! The ledger table is append-only: applying a script writes a row with
//! `is_applied = true`, reverting writes one with `is_applied = false`. The
//! latest row of a version decides its state. Rows with a version of zero or
//! below are ignored.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

use super::database::{ScriptTransaction, TargetDatabase};
use super::definitions::AppliedVersionRecord;
use crate::error::{MigrateError, MigrateResult};

/// Read/write access to the bookkeeping table
pub struct VersionLedger<'a, D: TargetDatabase> {
    db: &'a D,
}

impl<'a, D: TargetDatabase> VersionLedger<'a, D> {
    pub fn new(db: &'a D) -> Self {
        Self { db }
    }

    /// Ensure the bookkeeping table exists. Safe to call on every invocation.
    pub async fn initialize(&self) -> MigrateResult<()> {
        self.db
            .ensure_version_table()
            .await
            .map_err(|e| MigrateError::Ledger(format!("failed to create version table: {}", e)))
    }

    /// Latest record of every currently applied version
    pub async fn records(&self) -> MigrateResult<BTreeMap<i64, AppliedVersionRecord>> {
        let rows = self
            .db
            .version_records()
            .await
            .map_err(|e| MigrateError::Ledger(format!("failed to read version table: {}", e)))?;

        Ok(latest_applied(rows))
    }

    pub async fn applied_versions(&self) -> MigrateResult<BTreeSet<i64>> {
        Ok(self.records().await?.into_keys().collect())
    }

    /// Highest applied version, or 0 when nothing is applied
    pub async fn current_version(&self) -> MigrateResult<i64> {
        Ok(self
            .records()
            .await?
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0))
    }

    pub async fn is_applied(&self, version: i64) -> MigrateResult<bool> {
        Ok(self.records().await?.contains_key(&version))
    }

    /// Record `version` as applied inside the script's transaction
    pub async fn record_applied(
        tx: &mut D::Transaction,
        version: i64,
        applied_at: DateTime<Utc>,
    ) -> MigrateResult<()> {
        let record = AppliedVersionRecord {
            version,
            applied_at,
            is_applied: true,
        };
        tx.insert_version(&record).await.map_err(|e| {
            MigrateError::Ledger(format!("failed to record version {}: {}", version, e))
        })
    }

    /// Record `version` as reverted inside the script's transaction
    pub async fn record_reverted(tx: &mut D::Transaction, version: i64) -> MigrateResult<()> {
        let record = AppliedVersionRecord {
            version,
            applied_at: Utc::now(),
            is_applied: false,
        };
        tx.insert_version(&record).await.map_err(|e| {
            MigrateError::Ledger(format!(
                "failed to record revert of version {}: {}",
                version, e
            ))
        })
    }
}

/// Fold rows (oldest first) into the latest state per version, keeping
/// only versions whose latest row says applied.
fn latest_applied(rows: Vec<AppliedVersionRecord>) -> BTreeMap<i64, AppliedVersionRecord> {
    let mut latest = BTreeMap::new();
    for row in rows.into_iter().filter(|row| row.version > 0) {
        latest.insert(row.version, row);
    }
    latest.retain(|_, row| row.is_applied);
    latest
}
