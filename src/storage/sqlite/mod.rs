//! Embedded (SQLite) storage adapter.
//!
//! Statements arrive in the networked dialect and are translated before
//! they reach the engine. An empty database file is bootstrapped with the
//! schema on first connect.

mod bootstrap;
mod convert;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Sqlite;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::EmbeddedConfig;
use crate::interfaces::storage_adapter::{
    BackendKind, Executor, Result, StorageAdapter, StorageError, Transaction,
};
use crate::storage::value::{ExecResult, Row, Value};

/// Writers are serialised by the engine, so a small pool is enough for
/// concurrent readers.
const POOL_SIZE: u32 = 4;
const BEGIN_IMMEDIATE: &str = "BEGIN IMMEDIATE";

/// SQLite implementation of StorageAdapter.
pub struct SqliteAdapter {
    config: EmbeddedConfig,
    pool: RwLock<Option<SqlitePool>>,
}

impl SqliteAdapter {
    /// Create an adapter for the configured file. Nothing is opened until `connect`.
    pub fn new(config: EmbeddedConfig) -> Self {
        Self {
            config,
            pool: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &str {
        &self.config.path
    }

    async fn pool(&self) -> Result<SqlitePool> {
        self.pool
            .read()
            .await
            .as_ref()
            .cloned()
            .ok_or(StorageError::NotConnected)
    }

    async fn open_pool(&self) -> Result<SqlitePool> {
        if let Some(parent) = Path::new(&self.config.path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&self.config.path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(self.config.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(POOL_SIZE)
            .connect_with(options)
            .await?;
        Ok(pool)
    }
}

#[async_trait]
impl StorageAdapter for SqliteAdapter {
    fn backend(&self) -> BackendKind {
        BackendKind::Embedded
    }

    async fn connect(&self) -> Result<()> {
        let mut slot = self.pool.write().await;
        if slot.is_some() {
            return Ok(());
        }

        let pool = self.open_pool().await?;
        let seed = match &self.config.seed {
            Some(path) => Some(tokio::fs::read_to_string(path).await?),
            None => None,
        };
        if let Err(e) = bootstrap::bootstrap_if_empty(&pool, seed.as_deref()).await {
            pool.close().await;
            return Err(e);
        }

        info!(path = %self.config.path, "Connected to embedded database");
        *slot = Some(pool);
        Ok(())
    }

    async fn disconnect(&self) {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
            info!(path = %self.config.path, "Embedded database closed");
        }
    }

    async fn is_connected(&self) -> bool {
        self.pool.read().await.is_some()
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let pool = self.pool().await?;
        let mut conn = pool.acquire().await?;
        convert::fetch(&mut conn, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        let pool = self.pool().await?;
        let mut conn = pool.acquire().await?;
        convert::run(&mut conn, sql, params).await
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let pool = self.pool().await?;
        // Take the write lock up front. A deferred transaction that reads
        // before writing fails with SQLITE_BUSY instead of waiting out the
        // busy timeout when another writer is active.
        let tx = pool.begin_with(BEGIN_IMMEDIATE).await?;
        debug!("Embedded transaction started");
        Ok(Box::new(SqliteTransaction { tx }))
    }
}

/// Open embedded transaction. The driver rolls back if this is dropped
/// without a commit.
pub struct SqliteTransaction {
    tx: sqlx::Transaction<'static, Sqlite>,
}

#[async_trait]
impl Executor for SqliteTransaction {
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        convert::fetch(&mut self.tx, sql, params).await
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        convert::run(&mut self.tx, sql, params).await
    }
}

#[async_trait]
impl Transaction for SqliteTransaction {
    fn as_executor(&mut self) -> &mut dyn Executor {
        self
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
