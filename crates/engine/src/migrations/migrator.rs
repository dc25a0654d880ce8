//! Migrator - one entry point per engine command
//!
//! Wires the source, ledger, plan computer and executor together. Migrating
//! commands hold the database lock for their whole duration.

use std::collections::BTreeSet;
use tracing::{info, warn};

use super::database::TargetDatabase;
use super::definitions::{
    CommandOutcome, ExecutionReport, MigrationCommand, MigrationStatus, StatusEntry, StatusReport,
};
use super::executor::Executor;
use super::ledger::VersionLedger;
use super::plan::{self, MigrationPlan, PlanTarget};
use super::source::MigrationSource;
use crate::error::{MigrateError, MigrateResult};

/// Runs engine commands against one database
pub struct Migrator<D: TargetDatabase> {
    source: MigrationSource,
    db: D,
}

impl<D: TargetDatabase> Migrator<D> {
    pub fn new(source: MigrationSource, db: D) -> Self {
        Self { source, db }
    }

    pub fn source(&self) -> &MigrationSource {
        &self.source
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    pub fn into_database(self) -> D {
        self.db
    }

    /// Run a single command
    pub async fn run(&self, command: MigrationCommand) -> MigrateResult<CommandOutcome> {
        let target = match command {
            MigrationCommand::Up => PlanTarget::Up,
            MigrationCommand::UpByOne => PlanTarget::UpByOne,
            MigrationCommand::UpTo(version) => PlanTarget::UpTo(version),
            MigrationCommand::Down => PlanTarget::Down,
            MigrationCommand::DownTo(version) => PlanTarget::DownTo(version),
            MigrationCommand::Redo => PlanTarget::Redo,
            MigrationCommand::Reset => PlanTarget::Reset,
            MigrationCommand::Status => return self.status().await.map(CommandOutcome::Status),
            MigrationCommand::Version => return self.version().await.map(CommandOutcome::Version),
            MigrationCommand::Create { name, scheme } => {
                return self.source.create(&name, scheme).map(CommandOutcome::Created)
            }
            MigrationCommand::Fix => return self.source.fix().map(CommandOutcome::Fixed),
        };

        self.migrate(target).await.map(CommandOutcome::Executed)
    }

    /// Move the schema to `target`, holding the lock throughout
    pub async fn migrate(&self, target: PlanTarget) -> MigrateResult<ExecutionReport> {
        self.db
            .lock()
            .await
            .map_err(|e| MigrateError::Ledger(format!("failed to acquire migration lock: {}", e)))?;

        let result = self.migrate_locked(target).await;

        if let Err(e) = self.db.unlock().await {
            warn!(error = %e, "Failed to release migration lock");
        }
        result
    }

    async fn migrate_locked(&self, target: PlanTarget) -> MigrateResult<ExecutionReport> {
        let plan = self.plan(target).await?;

        if plan.is_empty() {
            let current = VersionLedger::new(&self.db).current_version().await?;
            info!(current_version = current, "No migrations to run");
            return Ok(ExecutionReport::default());
        }

        let report = Executor::new(&self.db).execute(&plan).await?;
        let current = VersionLedger::new(&self.db).current_version().await?;
        info!(
            applied = report.applied.len(),
            reverted = report.reverted.len(),
            execution_time_ms = report.execution_time_ms as u64,
            current_version = current,
            "Migration complete"
        );
        Ok(report)
    }

    /// The plan `target` would execute right now, without running it
    pub async fn plan(&self, target: PlanTarget) -> MigrateResult<MigrationPlan> {
        let migrations = self.source.load_all()?;

        let ledger = VersionLedger::new(&self.db);
        ledger.initialize().await?;
        let applied = ledger.applied_versions().await?;

        plan::compute(target, &migrations, &applied)
    }

    /// Every known migration with its state, ascending by version
    pub async fn status(&self) -> MigrateResult<StatusReport> {
        let migrations = self.source.load_all()?;

        let ledger = VersionLedger::new(&self.db);
        ledger.initialize().await?;
        let records = ledger.records().await?;

        let known: BTreeSet<i64> = migrations.iter().map(|m| m.version).collect();
        let mut entries: Vec<StatusEntry> = migrations
            .iter()
            .map(|migration| StatusEntry {
                version: migration.version,
                file: Some(migration.file_name()),
                status: match records.get(&migration.version) {
                    Some(record) => MigrationStatus::Applied {
                        applied_at: record.applied_at,
                    },
                    None => MigrationStatus::Pending,
                },
            })
            .collect();

        for (version, record) in records.iter().filter(|(v, _)| !known.contains(v)) {
            warn!(version = *version, "Applied version has no migration file");
            entries.push(StatusEntry {
                version: *version,
                file: None,
                status: MigrationStatus::Applied {
                    applied_at: record.applied_at,
                },
            });
        }
        entries.sort_by_key(|entry| entry.version);

        Ok(StatusReport {
            current_version: records.keys().next_back().copied().unwrap_or(0),
            entries,
        })
    }

    /// Highest applied version
    pub async fn version(&self) -> MigrateResult<i64> {
        let ledger = VersionLedger::new(&self.db);
        ledger.initialize().await?;
        ledger.current_version().await
    }
}

#[cfg(test)]
#[path = "migrator_tests.rs"]
mod tests;
