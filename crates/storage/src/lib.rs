// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! SQL storage for benchwatch.
//!
//! All queries are free functions taking `&mut SqliteConnection`, so callers
//! decide the transaction scope: pass `&mut *tx` to group writes atomically
//! or a pooled connection for single reads.
//!
//! Natural keys carry unique constraints and every get-or-create is a
//! conditional insert (`ON CONFLICT DO NOTHING`) followed by a read, so two
//! writers racing on the same key converge on one row instead of failing.

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod dimensions;
pub mod reports;
pub mod results;
pub mod revisions;
mod rows;

use benchwatch_core::config::DatabaseConfig;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub use reports::ReportListing;
pub use results::SeriesPoint;
pub use sqlx::SqliteConnection;

/// Errors raised by the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The database rejected a query.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migrations failed.
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// A stored value could not be decoded into a domain type.
    #[error("Corrupt row in {table}: {message}")]
    Corrupt { table: &'static str, message: String },
}

impl From<StorageError> for benchwatch_core::Error {
    fn from(err: StorageError) -> Self {
        benchwatch_core::Error::Storage(err.to_string())
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Busy timeout for concurrent writers on a file database.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection pool plus schema management.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database described by `config`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        if config.url.contains(":memory:") {
            return Self::in_memory().await;
        }

        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        info!(url = %config.url, max_connections = config.max_connections, "Database connected");
        Ok(Self { pool })
    }

    /// A private in-memory database with the schema applied.
    ///
    /// The pool holds exactly one connection that never expires, since an
    /// in-memory database lives and dies with its connection.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check out a connection for reads or single writes.
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Start a write transaction.
    ///
    /// `BEGIN IMMEDIATE` takes the write lock up front, waiting out the busy
    /// timeout if another writer holds it. A deferred transaction that reads
    /// first cannot upgrade once another writer committed in WAL mode and
    /// fails with `SQLITE_BUSY` without waiting.
    pub async fn begin_immediate(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Round-trip a trivial query.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
