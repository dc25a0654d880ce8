//! Executor - runs a plan against the target database
//!
//! Steps run strictly in plan order. Each step gets its own transaction, and
//! the bookkeeping row is written in that same transaction. The first failure
//! rolls back its own step and stops the plan; earlier steps stay committed.

use chrono::Utc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::database::{ScriptTransaction, TargetDatabase};
use super::definitions::{ExecutionReport, MigrationDirection};
use super::ledger::VersionLedger;
use super::plan::{MigrationPlan, PlanStep};
use crate::error::{MigrateError, MigrateResult};

/// Executes migration plans step by step
pub struct Executor<'a, D: TargetDatabase> {
    db: &'a D,
}

impl<'a, D: TargetDatabase> Executor<'a, D> {
    pub fn new(db: &'a D) -> Self {
        Self { db }
    }

    /// Run every step of `plan`, stopping at the first failure
    pub async fn execute(&self, plan: &MigrationPlan) -> MigrateResult<ExecutionReport> {
        let start_time = Instant::now();
        let mut report = ExecutionReport::default();

        for step in &plan.steps {
            let step_start = Instant::now();
            info!(
                version = step.version(),
                direction = %step.direction,
                file = %step.migration.file_name(),
                "Running migration"
            );

            if let Err(err) = self.run_step(step).await {
                error!(
                    version = step.version(),
                    direction = %step.direction,
                    error = %err,
                    "Migration failed, stopping"
                );
                return Err(err);
            }

            info!(
                version = step.version(),
                elapsed_ms = step_start.elapsed().as_millis() as u64,
                "OK {}",
                step.migration.file_name()
            );
            match step.direction {
                MigrationDirection::Up => report.applied.push(step.version()),
                MigrationDirection::Down => report.reverted.push(step.version()),
            }
        }

        report.execution_time_ms = start_time.elapsed().as_millis();
        Ok(report)
    }

    async fn run_step(&self, step: &PlanStep) -> MigrateResult<()> {
        if step.migration.use_transaction {
            self.run_in_transaction(step).await
        } else {
            self.run_without_transaction(step).await
        }
    }

    async fn run_in_transaction(&self, step: &PlanStep) -> MigrateResult<()> {
        let version = step.version();
        let mut transaction = self.db.begin().await.map_err(|e| MigrateError::Execution {
            version,
            message: format!("failed to start transaction: {}", e),
        })?;

        match Self::apply(&mut transaction, step).await {
            Ok(()) => transaction
                .commit()
                .await
                .map_err(|e| MigrateError::Execution {
                    version,
                    message: format!("failed to commit: {}", e),
                }),
            Err(err) => {
                if let Err(rollback_err) = transaction.rollback().await {
                    warn!(version, error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Statements and bookkeeping row of one step, inside `transaction`
    async fn apply(transaction: &mut D::Transaction, step: &PlanStep) -> MigrateResult<()> {
        let version = step.version();
        for statement in step.migration.statements(step.direction) {
            debug!(version, %statement, "Executing statement");
            transaction
                .execute(statement)
                .await
                .map_err(|e| MigrateError::Execution {
                    version,
                    message: e.to_string(),
                })?;
        }

        match step.direction {
            MigrationDirection::Up => {
                VersionLedger::<D>::record_applied(transaction, version, Utc::now()).await
            }
            MigrationDirection::Down => VersionLedger::<D>::record_reverted(transaction, version).await,
        }
    }

    /// Scripts marked `NO TRANSACTION`: statements run one by one, the
    /// bookkeeping row is written afterwards in its own transaction.
    async fn run_without_transaction(&self, step: &PlanStep) -> MigrateResult<()> {
        let version = step.version();
        for (index, statement) in step.migration.statements(step.direction).iter().enumerate() {
            debug!(version, %statement, "Executing statement outside transaction");
            if let Err(e) = self.db.execute(statement).await {
                if index > 0 {
                    warn!(
                        version,
                        completed = index,
                        "Non-transactional migration stopped part way; earlier statements remain applied"
                    );
                }
                return Err(MigrateError::Execution {
                    version,
                    message: e.to_string(),
                });
            }
        }

        let mut transaction = self.db.begin().await.map_err(|e| MigrateError::Execution {
            version,
            message: format!("failed to start transaction: {}", e),
        })?;
        let recorded = match step.direction {
            MigrationDirection::Up => {
                VersionLedger::<D>::record_applied(&mut transaction, version, Utc::now()).await
            }
            MigrationDirection::Down => {
                VersionLedger::<D>::record_reverted(&mut transaction, version).await
            }
        };
        if let Err(err) = recorded {
            if let Err(rollback_err) = transaction.rollback().await {
                warn!(version, error = %rollback_err, "Rollback failed");
            }
            return Err(err);
        }
        transaction.commit().await.map_err(|e| {
            MigrateError::Ledger(format!("failed to commit version {}: {}", version, e))
        })
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
