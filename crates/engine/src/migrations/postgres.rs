//! PostgreSQL adapter
//!
//! Implements [`TargetDatabase`] on top of a single-connection sqlx pool. The
//! pool never recycles its connection, so the session-level advisory lock
//! taken by [`lock`](TargetDatabase::lock) covers every statement of the
//! invocation.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{Executor, PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};

use super::database::{ScriptTransaction, TargetDatabase};
use super::definitions::AppliedVersionRecord;
use crate::config::DatabaseConfig;
use crate::error::{DatabaseError, MigrateError, MigrateResult};

/// Advisory lock key shared by every invocation against the same database
pub const ADVISORY_LOCK_ID: i64 = 5_887_940_537_704_921_958;

/// SQL for the bookkeeping table
#[derive(Debug, Clone)]
pub struct LedgerQueries {
    table: String,
}

impl LedgerQueries {
    /// `table` may be schema-qualified
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// SQL to create the tracking table
    pub fn create_table(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                id SERIAL PRIMARY KEY,\n    \
                version_id BIGINT NOT NULL,\n    \
                is_applied BOOLEAN NOT NULL,\n    \
                tstamp TIMESTAMP NULL DEFAULT now()\n\
            )",
            self.table
        )
    }

    /// SQL to write the initial version 0 row into an empty table
    pub fn seed_version_zero(&self) -> String {
        format!(
            "INSERT INTO {table} (version_id, is_applied) \
             SELECT 0, TRUE WHERE NOT EXISTS (SELECT 1 FROM {table})",
            table = self.table
        )
    }

    /// SQL to read every row, oldest first
    pub fn select_versions(&self) -> String {
        format!(
            "SELECT version_id, is_applied, tstamp FROM {} ORDER BY id ASC",
            self.table
        )
    }

    /// SQL to append a row
    pub fn insert_version(&self) -> String {
        format!(
            "INSERT INTO {} (version_id, is_applied, tstamp) VALUES ($1, $2, $3)",
            self.table
        )
    }

    pub fn lock() -> &'static str {
        "SELECT pg_advisory_lock($1)"
    }

    pub fn unlock() -> &'static str {
        "SELECT pg_advisory_unlock($1)"
    }
}

/// Production [`TargetDatabase`]
#[derive(Debug, Clone)]
pub struct PostgresDatabase {
    pool: PgPool,
    queries: LedgerQueries,
    lock: bool,
}

impl PostgresDatabase {
    /// Open the single connection used by this invocation
    pub async fn connect(config: &DatabaseConfig) -> MigrateResult<Self> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name)
            .options([("search_path", config.schema.as_str())]);

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| {
                MigrateError::Config(format!(
                    "failed to connect to {}: {}",
                    config.display_url(),
                    e
                ))
            })?;

        info!(url = %config.display_url(), schema = %config.schema, "Connected to database");
        Ok(Self::from_pool(pool, config.qualified_table(), config.lock))
    }

    /// Wrap an existing pool. It should hold at most one connection when
    /// `lock` is set.
    pub fn from_pool(pool: PgPool, table: impl Into<String>, lock: bool) -> Self {
        Self {
            pool,
            queries: LedgerQueries::new(table),
            lock,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the connection
    pub async fn close(&self) {
        self.pool.close().await;
        debug!("Database connection closed");
    }
}

#[async_trait]
impl TargetDatabase for PostgresDatabase {
    type Transaction = PostgresTransaction;

    async fn ensure_version_table(&self) -> Result<(), DatabaseError> {
        sqlx::query(&self.queries.create_table())
            .execute(&self.pool)
            .await?;
        sqlx::query(&self.queries.seed_version_zero())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn version_records(&self) -> Result<Vec<AppliedVersionRecord>, DatabaseError> {
        let rows = sqlx::query(&self.queries.select_versions())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(decode_record)
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(DatabaseError::from)
    }

    async fn begin(&self) -> Result<Self::Transaction, DatabaseError> {
        let tx = self.pool.begin().await?;
        Ok(PostgresTransaction {
            tx,
            queries: self.queries.clone(),
        })
    }

    async fn execute(&self, statement: &str) -> Result<(), DatabaseError> {
        // plain &str goes through the simple query protocol, so scripts may
        // contain several commands and dollar-quoted bodies
        (&self.pool).execute(statement).await?;
        Ok(())
    }

    async fn lock(&self) -> Result<(), DatabaseError> {
        if !self.lock {
            return Ok(());
        }
        debug!(lock_id = ADVISORY_LOCK_ID, "Acquiring advisory lock");
        sqlx::query(LedgerQueries::lock())
            .bind(ADVISORY_LOCK_ID)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn unlock(&self) -> Result<(), DatabaseError> {
        if !self.lock {
            return Ok(());
        }
        sqlx::query(LedgerQueries::unlock())
            .bind(ADVISORY_LOCK_ID)
            .execute(&self.pool)
            .await?;
        debug!(lock_id = ADVISORY_LOCK_ID, "Released advisory lock");
        Ok(())
    }
}

fn decode_record(row: &PgRow) -> Result<AppliedVersionRecord, sqlx::Error> {
    let version: i64 = row.try_get("version_id")?;
    let is_applied: bool = row.try_get("is_applied")?;
    let tstamp: Option<NaiveDateTime> = row.try_get("tstamp")?;

    Ok(AppliedVersionRecord {
        version,
        applied_at: tstamp.map(|t| t.and_utc()).unwrap_or_default(),
        is_applied,
    })
}

/// One script's transaction
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
    queries: LedgerQueries,
}

#[async_trait]
impl ScriptTransaction for PostgresTransaction {
    async fn execute(&mut self, statement: &str) -> Result<(), DatabaseError> {
        (&mut *self.tx).execute(statement).await?;
        Ok(())
    }

    async fn insert_version(&mut self, record: &AppliedVersionRecord) -> Result<(), DatabaseError> {
        sqlx::query(&self.queries.insert_version())
            .bind(record.version)
            .bind(record.is_applied)
            .bind(record.applied_at.naive_utc())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self) -> Result<(), DatabaseError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), DatabaseError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
