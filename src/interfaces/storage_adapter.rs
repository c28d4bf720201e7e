//! Storage adapter interface.
//!
//! One contract over two structurally different engines. Statements are
//! authored in the networked engine's dialect; adapters are responsible for
//! making them run on their engine and for binding every parameter.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;

use crate::storage::value::{ExecResult, Row, Value};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database not connected")]
    NotConnected,

    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        backend: BackendKind,
        operation: &'static str,
    },

    #[error("Unknown storage backend: '{0}' (expected 'embedded' or 'networked')")]
    UnknownBackend(String),

    #[error("Untranslatable SQL construct for embedded engine: {construct}")]
    Dialect { construct: String },

    #[error("Storage operation exceeded deadline of {0:?}")]
    Timeout(Duration),

    #[error("Failed to decode column '{column}': {reason}")]
    Decode { column: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StorageError {
    /// Whether the underlying database rejected a write on a unique key.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StorageError::Database(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}

/// Storage engine discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Single-file in-process engine (SQLite).
    Embedded,
    /// Pooled client-server engine (MySQL).
    Networked,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Embedded => "embedded",
            BackendKind::Networked => "networked",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = StorageError;

    /// Accepts the kind names and the engine names used by older deployments.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "embedded" | "sqlite" => Ok(BackendKind::Embedded),
            "networked" | "mysql" => Ok(BackendKind::Networked),
            _ => Err(StorageError::UnknownBackend(s.to_string())),
        }
    }
}

/// Statement execution against one connection context.
///
/// Implemented by open transactions and raw connection handles. Every call
/// on the same executor runs on the same underlying connection.
#[async_trait]
pub trait Executor: Send {
    /// Run a read and return all rows.
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run a write and return the last-inserted id and affected row count.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecResult>;
}

/// An open transaction.
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait Transaction: Executor {
    fn as_executor(&mut self) -> &mut dyn Executor;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// A raw connection checked out for manual transaction sequencing.
///
/// The caller owns begin/commit/rollback ordering. The connection goes back
/// to its pool on `release` or drop.
#[async_trait]
pub trait RawConnection: Executor {
    fn as_executor(&mut self) -> &mut dyn Executor;

    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Return the connection to its pool, rolling back any open transaction.
    async fn release(self: Box<Self>) -> Result<()>;
}

/// Interface every storage backend provides.
///
/// Implementations:
/// - `SqliteAdapter`: embedded single-file engine with dialect translation
/// - `MySqlAdapter`: pooled networked engine, SQL passed through unchanged
///
/// Any operation before `connect` or after `disconnect` fails with
/// [`StorageError::NotConnected`]. Driver failures are returned unchanged;
/// nothing below this layer retries.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Engine behind this adapter.
    fn backend(&self) -> BackendKind;

    /// Establish readiness. Idempotent.
    async fn connect(&self) -> Result<()>;

    /// Release all held resources.
    async fn disconnect(&self);

    async fn is_connected(&self) -> bool;

    /// Execute a read with positional parameters.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute a write with positional parameters.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ExecResult>;

    /// Open a transaction on one connection.
    ///
    /// Most callers want the closure form, `<dyn StorageAdapter>::transaction`.
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    /// Check out a raw connection for manual begin/commit/rollback.
    ///
    /// Backends that cannot hand out connections fail explicitly.
    async fn acquire_connection(&self) -> Result<Box<dyn RawConnection>> {
        Err(StorageError::Unsupported {
            backend: self.backend(),
            operation: "acquire_connection",
        })
    }
}
