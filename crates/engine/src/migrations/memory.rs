//! In-memory [`TargetDatabase`] for engine tests
//!
//! Understands just enough SQL to make schema effects observable:
//! `CREATE TABLE <name>` and `DROP TABLE <name>` change the table set, any
//! statement containing `FAIL` is rejected, everything else succeeds without
//! effect. Transactions work on a snapshot that replaces the shared state on
//! commit.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::database::{ScriptTransaction, TargetDatabase};
use super::definitions::AppliedVersionRecord;
use crate::error::DatabaseError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct MemoryState {
    pub tables: BTreeSet<String>,
    pub ledger: Vec<AppliedVersionRecord>,
    pub ledger_table: bool,
}

impl MemoryState {
    fn apply(&mut self, statement: &str) -> Result<(), DatabaseError> {
        let upper = statement.to_ascii_uppercase();
        if upper.contains("FAIL") {
            return Err(DatabaseError::rejected(format!(
                "simulated failure in: {}",
                statement.trim()
            )));
        }

        let tokens: Vec<&str> = upper.split_whitespace().collect();
        match tokens.as_slice() {
            ["CREATE", "TABLE", name, ..] => {
                let name = table_name(name);
                if !self.tables.insert(name.clone()) {
                    return Err(DatabaseError::rejected(format!(
                        "relation \"{}\" already exists",
                        name
                    )));
                }
            }
            ["DROP", "TABLE", name, ..] => {
                let name = table_name(name);
                if !self.tables.remove(&name) {
                    return Err(DatabaseError::rejected(format!(
                        "table \"{}\" does not exist",
                        name
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn table_name(token: &str) -> String {
    token
        .trim_end_matches(|c: char| c == ';' || c == '(')
        .to_ascii_lowercase()
}

#[derive(Debug, Default)]
pub(crate) struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
    executed: Arc<Mutex<Vec<String>>>,
    locked: AtomicBool,
    lock_calls: AtomicUsize,
    fail_commits: AtomicBool,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MemoryState {
        self.state.lock().unwrap().clone()
    }

    pub fn tables(&self) -> BTreeSet<String> {
        self.state().tables
    }

    /// Every statement attempted so far, committed or not
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    pub fn lock_calls(&self) -> usize {
        self.lock_calls.load(Ordering::SeqCst)
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TargetDatabase for MemoryDatabase {
    type Transaction = MemoryTransaction;

    async fn ensure_version_table(&self) -> Result<(), DatabaseError> {
        self.state.lock().unwrap().ledger_table = true;
        Ok(())
    }

    async fn version_records(&self) -> Result<Vec<AppliedVersionRecord>, DatabaseError> {
        let state = self.state.lock().unwrap();
        if !state.ledger_table {
            return Err(DatabaseError::rejected(
                "relation \"goose_db_version\" does not exist",
            ));
        }
        Ok(state.ledger.clone())
    }

    async fn begin(&self) -> Result<Self::Transaction, DatabaseError> {
        Ok(MemoryTransaction {
            shared: Arc::clone(&self.state),
            working: self.state(),
            executed: Arc::clone(&self.executed),
            fail_commit: self.fail_commits.load(Ordering::SeqCst),
        })
    }

    async fn execute(&self, statement: &str) -> Result<(), DatabaseError> {
        self.executed.lock().unwrap().push(statement.to_string());
        self.state.lock().unwrap().apply(statement)
    }

    async fn lock(&self) -> Result<(), DatabaseError> {
        self.lock_calls.fetch_add(1, Ordering::SeqCst);
        if self.locked.swap(true, Ordering::SeqCst) {
            return Err(DatabaseError::rejected("lock already held"));
        }
        Ok(())
    }

    async fn unlock(&self) -> Result<(), DatabaseError> {
        self.locked.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct MemoryTransaction {
    shared: Arc<Mutex<MemoryState>>,
    working: MemoryState,
    executed: Arc<Mutex<Vec<String>>>,
    fail_commit: bool,
}

#[async_trait]
impl ScriptTransaction for MemoryTransaction {
    async fn execute(&mut self, statement: &str) -> Result<(), DatabaseError> {
        self.executed.lock().unwrap().push(statement.to_string());
        self.working.apply(statement)
    }

    async fn insert_version(&mut self, record: &AppliedVersionRecord) -> Result<(), DatabaseError> {
        if !self.working.ledger_table {
            return Err(DatabaseError::rejected(
                "relation \"goose_db_version\" does not exist",
            ));
        }
        self.working.ledger.push(record.clone());
        Ok(())
    }

    async fn commit(self) -> Result<(), DatabaseError> {
        if self.fail_commit {
            return Err(DatabaseError::rejected("could not serialize access"));
        }
        *self.shared.lock().unwrap() = self.working;
        Ok(())
    }

    async fn rollback(self) -> Result<(), DatabaseError> {
        Ok(())
    }
}
