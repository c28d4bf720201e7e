//! Networked (MySQL) storage adapter.
//!
//! SQL is already in this engine's dialect and passes through unchanged.
//! All work goes through a bounded pool; callers beyond the bound wait in
//! the pool's queue until `acquire_timeout`.

mod convert;

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPool, MySqlPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::MySql;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::NetworkedConfig;
use crate::interfaces::storage_adapter::{
    BackendKind, Executor, RawConnection, Result, StorageAdapter, StorageError, Transaction,
};
use crate::storage::dialect::split_statements;
use crate::storage::schema::SCHEMA_SQL;
use crate::storage::value::{ExecResult, Row, Value};

/// MySQL implementation of StorageAdapter.
pub struct MySqlAdapter {
    config: NetworkedConfig,
    pool: RwLock<Option<MySqlPool>>,
}

impl MySqlAdapter {
    /// Create an adapter for the configured server. Nothing is opened until `connect`.
    pub fn new(config: NetworkedConfig) -> Self {
        Self {
            config,
            pool: RwLock::new(None),
        }
    }

    /// `host:port/database`, safe to log.
    pub fn endpoint(&self) -> String {
        format!(
            "{}:{}/{}",
            self.config.host, self.config.port, self.config.database
        )
    }

    async fn pool(&self) -> Result<MySqlPool> {
        self.pool
            .read()
            .await
            .as_ref()
            .cloned()
            .ok_or(StorageError::NotConnected)
    }

    async fn open_pool(&self) -> Result<MySqlPool> {
        let options = MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.user)
            .password(&self.config.password)
            .database(&self.config.database)
            .charset("utf8mb4");

        let pool = MySqlPoolOptions::new()
            .max_connections(self.config.max_connections)
            .acquire_timeout(Duration::from_secs(self.config.acquire_timeout_secs))
            .connect_with(options)
            .await?;

        // Verify the server is reachable with these credentials
        pool.acquire().await?;
        Ok(pool)
    }

    /// Apply the schema statement by statement. Every statement is
    /// `CREATE TABLE IF NOT EXISTS`, so this is safe against a live database.
    async fn apply_schema(pool: &MySqlPool) -> Result<()> {
        let mut conn = pool.acquire().await?;
        let statements = split_statements(SCHEMA_SQL);
        for statement in &statements {
            sqlx::Executor::execute(&mut *conn, statement.as_str()).await?;
        }
        info!(statements = statements.len(), "Networked schema applied");
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for MySqlAdapter {
    fn backend(&self) -> BackendKind {
        BackendKind::Networked
    }

    async fn connect(&self) -> Result<()> {
        let mut slot = self.pool.write().await;
        if slot.is_some() {
            return Ok(());
        }

        let pool = self.open_pool().await?;
        if self.config.bootstrap {
            if let Err(e) = Self::apply_schema(&pool).await {
                pool.close().await;
                return Err(e);
            }
        }

        info!(
            endpoint = %self.endpoint(),
            max_connections = self.config.max_connections,
            "Connected to networked database"
        );
        *slot = Some(pool);
        Ok(())
    }

    async fn disconnect(&self) {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
            info!(endpoint = %self.endpoint(), "Networked database pool closed");
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
        let tx = pool.begin().await?;
        debug!("Networked transaction started");
        Ok(Box::new(MySqlTransaction { tx }))
    }

    async fn acquire_connection(&self) -> Result<Box<dyn RawConnection>> {
        let pool = self.pool().await?;
        let conn = pool.acquire().await?;
        Ok(Box::new(MySqlRawConnection {
            conn: Some(conn),
            in_transaction: false,
        }))
    }
}

/// Open networked transaction on one pooled connection. The connection
/// returns to the pool on commit, rollback or drop.
pub struct MySqlTransaction {
    tx: sqlx::Transaction<'static, MySql>,
}

#[async_trait]
impl Executor for MySqlTransaction {
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        convert::fetch(&mut self.tx, sql, params).await
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        convert::run(&mut self.tx, sql, params).await
    }
}

#[async_trait]
impl Transaction for MySqlTransaction {
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

/// A pooled connection under caller-managed transaction control.
///
/// The pool knows nothing about transactions opened here, so a handle
/// dropped mid-transaction closes its connection instead of returning it.
pub struct MySqlRawConnection {
    conn: Option<PoolConnection<MySql>>,
    in_transaction: bool,
}

impl MySqlRawConnection {
    fn conn(&mut self) -> Result<&mut MySqlConnection> {
        self.conn.as_deref_mut().ok_or(StorageError::NotConnected)
    }

    async fn statement(&mut self, sql: &'static str) -> Result<()> {
        let conn = self.conn()?;
        sqlx::Executor::execute(conn, sql).await?;
        Ok(())
    }
}

#[async_trait]
impl Executor for MySqlRawConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        convert::fetch(self.conn()?, sql, params).await
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecResult> {
        convert::run(self.conn()?, sql, params).await
    }
}

#[async_trait]
impl RawConnection for MySqlRawConnection {
    fn as_executor(&mut self) -> &mut dyn Executor {
        self
    }

    async fn begin(&mut self) -> Result<()> {
        if self.in_transaction {
            // BEGIN would implicitly commit the open transaction
            return Err(StorageError::Unsupported {
                backend: BackendKind::Networked,
                operation: "nested begin",
            });
        }
        self.statement("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.statement("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.statement("ROLLBACK").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn release(mut self: Box<Self>) -> Result<()> {
        if self.in_transaction {
            warn!("Raw connection released with open transaction; rolling back");
            self.rollback().await?;
        }
        // Dropping the pool connection returns it to the pool
        self.conn.take();
        Ok(())
    }
}

impl Drop for MySqlRawConnection {
    fn drop(&mut self) {
        if !self.in_transaction {
            return;
        }
        if let Some(conn) = self.conn.take() {
            warn!("Raw connection dropped with open transaction; closing it");
            drop(conn.detach());
        }
    }
}
