//! Plan Computer - decides which scripts run, in which direction and order
//!
//! Planning is pure: it only looks at the loaded scripts and the set of
//! applied versions, and fails before anything is executed.

use std::collections::{BTreeMap, BTreeSet};

use super::definitions::{Migration, MigrationDirection};
use crate::error::{MigrateError, MigrateResult};

/// Where a migrating command wants the schema to end up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanTarget {
    /// Apply every pending script
    Up,
    /// Apply the next pending script
    UpByOne,
    /// Apply pending scripts up to and including the version
    UpTo(i64),
    /// Revert the most recently applied script
    Down,
    /// Revert applied scripts above the version
    DownTo(i64),
    /// Revert and reapply the most recently applied script
    Redo,
    /// Revert everything
    Reset,
}

/// One script execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub migration: Migration,
    pub direction: MigrationDirection,
}

impl PlanStep {
    pub fn version(&self) -> i64 {
        self.migration.version
    }
}

/// Ordered list of scripts to execute
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    pub steps: Vec<PlanStep>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// `(version, direction)` of every step, in order
    pub fn summary(&self) -> Vec<(i64, MigrationDirection)> {
        self.steps
            .iter()
            .map(|step| (step.version(), step.direction))
            .collect()
    }
}

/// Compute the plan that moves `applied` to `target`.
///
/// `migrations` must be sorted ascending with unique versions, as produced by
/// [`MigrationSource::load_all`](super::source::MigrationSource::load_all).
pub fn compute(
    target: PlanTarget,
    migrations: &[Migration],
    applied: &BTreeSet<i64>,
) -> MigrateResult<MigrationPlan> {
    let by_version: BTreeMap<i64, &Migration> =
        migrations.iter().map(|m| (m.version, m)).collect();

    let steps = match target {
        PlanTarget::Up => apply_steps(migrations, applied, i64::MAX, None)?,
        PlanTarget::UpByOne => apply_steps(migrations, applied, i64::MAX, Some(1))?,
        PlanTarget::UpTo(version) => {
            require_known(&by_version, version)?;
            apply_steps(migrations, applied, version, None)?
        }
        PlanTarget::Down => {
            let top = applied.iter().next_back().copied();
            revert_steps(&by_version, top)?
        }
        PlanTarget::DownTo(version) => {
            if version != 0 {
                require_known(&by_version, version)?;
            }
            revert_steps(
                &by_version,
                applied.iter().rev().copied().filter(|v| *v > version),
            )?
        }
        PlanTarget::Redo => {
            let top = applied.iter().next_back().copied().ok_or_else(|| {
                MigrateError::Plan("no applied migration to redo".to_string())
            })?;
            let mut steps = revert_steps(&by_version, Some(top))?;
            steps.push(PlanStep {
                migration: (*by_version[&top]).clone(),
                direction: MigrationDirection::Up,
            });
            steps
        }
        PlanTarget::Reset => revert_steps(&by_version, applied.iter().rev().copied())?,
    };

    Ok(MigrationPlan { steps })
}

fn require_known(by_version: &BTreeMap<i64, &Migration>, version: i64) -> MigrateResult<()> {
    if by_version.contains_key(&version) {
        Ok(())
    } else {
        Err(MigrateError::Plan(format!(
            "no migration with version {}",
            version
        )))
    }
}

/// Pending scripts up to `limit`, ascending. Refuses to fill gaps below the
/// current version.
fn apply_steps(
    migrations: &[Migration],
    applied: &BTreeSet<i64>,
    limit: i64,
    max_steps: Option<usize>,
) -> MigrateResult<Vec<PlanStep>> {
    let current = applied.iter().next_back().copied().unwrap_or(0);
    let pending: Vec<&Migration> = migrations
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .collect();

    let missing: Vec<String> = pending
        .iter()
        .filter(|m| m.version < current)
        .map(|m| m.version.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(MigrateError::Plan(format!(
            "found {} missing migration(s) below current version {}: {}",
            missing.len(),
            current,
            missing.join(", ")
        )));
    }

    Ok(pending
        .into_iter()
        .filter(|m| m.version <= limit)
        .take(max_steps.unwrap_or(usize::MAX))
        .map(|m| PlanStep {
            migration: m.clone(),
            direction: MigrationDirection::Up,
        })
        .collect())
}

/// Down steps for `versions`, in the given (descending) order. Every version
/// must still have its script in the source; an empty down section reverts
/// as a no-op.
fn revert_steps(
    by_version: &BTreeMap<i64, &Migration>,
    versions: impl IntoIterator<Item = i64>,
) -> MigrateResult<Vec<PlanStep>> {
    versions
        .into_iter()
        .map(|version| {
            let migration = by_version.get(&version).ok_or_else(|| {
                MigrateError::Plan(format!(
                    "applied version {} has no migration file in the source",
                    version
                ))
            })?;
            Ok(PlanStep {
                migration: (*migration).clone(),
                direction: MigrationDirection::Down,
            })
        })
        .collect()
}
