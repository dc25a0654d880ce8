//! Migration System
//!
//! Versioned SQL scripts applied to a target database, with bookkeeping of
//! which versions are applied.
//!
//! - [`source`] loads, creates and renumbers script files
//! - [`ledger`] reads and writes the bookkeeping table
//! - [`plan`] decides what runs for a command
//! - [`executor`] runs a plan step by step
//! - [`migrator`] ties them together behind [`MigrationCommand`]

pub mod database;
pub mod definitions;
pub mod executor;
pub mod ledger;
pub mod migrator;
pub mod plan;
pub mod postgres;
pub mod source;

#[cfg(test)]
pub(crate) mod memory;

pub use database::{ScriptTransaction, TargetDatabase};
pub use definitions::*;
pub use executor::Executor;
pub use ledger::VersionLedger;
pub use migrator::Migrator;
pub use plan::{MigrationPlan, PlanStep, PlanTarget};
pub use postgres::{LedgerQueries, PostgresDatabase, PostgresTransaction};
pub use source::MigrationSource;
