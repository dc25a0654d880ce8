//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the fundamental types used throughout the migration system:
//! scripts read from the source, ledger records, commands and results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Versions at or above this value are timestamp-style (`YYYYMMDDHHMMSS`)
pub const TIMESTAMP_VERSION_FLOOR: i64 = 19_700_101_000_000;

/// Represents one versioned migration script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    /// Unique, positive version parsed from the file name
    pub version: i64,
    /// Human-readable suffix of the file name
    pub name: String,
    /// Statements of the up action
    pub up: Vec<String>,
    /// Statements of the down action; empty when the script has no down section
    pub down: Vec<String>,
    /// Whether statements run inside a transaction
    pub use_transaction: bool,
    /// File the script was read from
    pub path: PathBuf,
}

impl Migration {
    /// File name of the script, for display
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}_{}.sql", self.version, self.name))
    }

    /// Statements to run for the given direction
    pub fn statements(&self, direction: MigrationDirection) -> &[String] {
        match direction {
            MigrationDirection::Up => &self.up,
            MigrationDirection::Down => &self.down,
        }
    }
}

/// One row of engine bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedVersionRecord {
    pub version: i64,
    pub applied_at: DateTime<Utc>,
    /// False when the row records a revert
    pub is_applied: bool,
}

/// Configuration for the migration system
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Directory where migration files are stored
    pub migrations_dir: PathBuf,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("migrations"),
        }
    }
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationDirection {
    /// Apply the migration (run UP statements)
    Up,
    /// Rollback the migration (run DOWN statements)
    Down,
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationDirection::Up => write!(f, "up"),
            MigrationDirection::Down => write!(f, "down"),
        }
    }
}

/// How `create` allocates the next version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionScheme {
    /// `YYYYMMDDHHMMSS` from the current UTC time
    #[default]
    Timestamp,
    /// Highest existing version plus one, zero-padded
    Sequential,
}

/// A single engine operation with its typed argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationCommand {
    Up,
    UpByOne,
    UpTo(i64),
    Down,
    DownTo(i64),
    Redo,
    Reset,
    Status,
    Version,
    Create { name: String, scheme: VersionScheme },
    Fix,
}

impl MigrationCommand {
    /// Command name as typed on the command line
    pub fn name(&self) -> &'static str {
        match self {
            MigrationCommand::Up => "up",
            MigrationCommand::UpByOne => "up-by-one",
            MigrationCommand::UpTo(_) => "up-to",
            MigrationCommand::Down => "down",
            MigrationCommand::DownTo(_) => "down-to",
            MigrationCommand::Redo => "redo",
            MigrationCommand::Reset => "reset",
            MigrationCommand::Status => "status",
            MigrationCommand::Version => "version",
            MigrationCommand::Create { .. } => "create",
            MigrationCommand::Fix => "fix",
        }
    }

    /// Whether the command needs a database connection
    pub fn requires_database(&self) -> bool {
        !matches!(self, MigrationCommand::Create { .. } | MigrationCommand::Fix)
    }
}

impl fmt::Display for MigrationCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationCommand::UpTo(version) | MigrationCommand::DownTo(version) => {
                write!(f, "{} {}", self.name(), version)
            }
            MigrationCommand::Create { name, .. } => write!(f, "create {}", name),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Result of executing a plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Versions whose up action committed, in order
    pub applied: Vec<i64>,
    /// Versions whose down action committed, in order
    pub reverted: Vec<i64>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl ExecutionReport {
    /// Number of scripts that ran
    pub fn steps(&self) -> usize {
        self.applied.len() + self.reverted.len()
    }

    pub fn is_noop(&self) -> bool {
        self.steps() == 0
    }
}

/// A file renamed by `fix`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rename {
    pub from: PathBuf,
    pub to: PathBuf,
    pub old_version: i64,
    pub new_version: i64,
}

/// Migration status in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum MigrationStatus {
    /// Migration is pending (not yet applied)
    Pending,
    /// Migration has been applied
    Applied {
        /// When it was applied
        applied_at: DateTime<Utc>,
    },
}

/// One line of `status` output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub version: i64,
    /// Script file name, or `None` for an applied version missing from the source
    pub file: Option<String>,
    pub status: MigrationStatus,
}

/// Output of `status`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub current_version: i64,
    pub entries: Vec<StatusEntry>,
}

impl StatusReport {
    pub fn pending(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.status == MigrationStatus::Pending)
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    Applied At                  Migration")?;
        writeln!(f, "    =======================================")?;
        for entry in &self.entries {
            let applied = match &entry.status {
                MigrationStatus::Applied { applied_at } => {
                    applied_at.format("%a %b %e %H:%M:%S %Y").to_string()
                }
                MigrationStatus::Pending => "Pending".to_string(),
            };
            let file = entry
                .file
                .clone()
                .unwrap_or_else(|| format!("{} (no migration file)", entry.version));
            writeln!(f, "    {:<27} -- {}", applied, file)?;
        }
        Ok(())
    }
}

/// What a command produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Executed(ExecutionReport),
    Status(StatusReport),
    Version(i64),
    Created(Migration),
    Fixed(Vec<Rename>),
}
