//! Storage implementations.
//!
//! Two adapters behind one contract: [`SqliteAdapter`] (embedded) and
//! [`MySqlAdapter`] (networked). The configured one is built once by
//! [`create_adapter`] and handed to services as `Arc<dyn StorageAdapter>`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, warn};

pub mod dialect;
pub mod schema;
pub mod value;

#[cfg(feature = "embedded")]
pub mod sqlite;

#[cfg(feature = "networked")]
pub mod mysql;

pub use crate::config::{EmbeddedConfig, NetworkedConfig, StorageConfig};
pub use crate::interfaces::storage_adapter::{
    BackendKind, Executor, RawConnection, Result, StorageAdapter, StorageError, Transaction,
};
pub use value::{ExecResult, Row, Value};

#[cfg(feature = "embedded")]
pub use sqlite::SqliteAdapter;

#[cfg(feature = "networked")]
pub use mysql::MySqlAdapter;

/// Build the configured adapter without connecting it.
pub fn create_adapter(config: &StorageConfig) -> Result<Arc<dyn StorageAdapter>> {
    let kind: BackendKind = config.backend.parse()?;

    match kind {
        #[cfg(feature = "embedded")]
        BackendKind::Embedded => {
            info!(backend = %kind, path = %config.embedded.path, "Storage adapter selected");
            Ok(Arc::new(SqliteAdapter::new(config.embedded.clone())))
        }
        #[cfg(feature = "networked")]
        BackendKind::Networked => {
            let adapter = MySqlAdapter::new(config.networked.clone());
            info!(backend = %kind, endpoint = %adapter.endpoint(), "Storage adapter selected");
            Ok(Arc::new(adapter))
        }
        #[allow(unreachable_patterns)]
        other => Err(StorageError::Unsupported {
            backend: other,
            operation: "create_adapter (backend feature not compiled in)",
        }),
    }
}

/// Build the configured adapter and connect it.
pub async fn connect_adapter(config: &StorageConfig) -> Result<Arc<dyn StorageAdapter>> {
    let adapter = create_adapter(config)?;
    adapter.connect().await?;
    Ok(adapter)
}

impl dyn StorageAdapter + '_ {
    /// Run `f` inside one transaction.
    ///
    /// Every statement `f` issues through its executor runs on the same
    /// connection. `Ok` commits, `Err` rolls back and returns the error.
    /// If the returned future is dropped midway the driver rolls back.
    ///
    /// ```ignore
    /// let id = adapter
    ///     .transaction(|tx| {
    ///         Box::pin(async move {
    ///             let parent = tx.execute("INSERT INTO ...", &params).await?;
    ///             tx.execute("INSERT INTO ...", &child_params).await?;
    ///             Ok(parent.last_insert_id)
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        T: Send,
        E: From<StorageError> + Send,
        F: for<'t> FnOnce(&'t mut dyn Executor) -> BoxFuture<'t, std::result::Result<T, E>>
            + Send,
    {
        let mut tx = self.begin().await?;
        let outcome = f(tx.as_executor()).await;
        match outcome {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed after transaction error");
                }
                Err(e)
            }
        }
    }
}

/// Bound `fut` by an optional deadline.
///
/// On expiry the future is dropped, which rolls back any transaction it
/// holds, and the caller sees [`StorageError::Timeout`].
pub async fn with_deadline<T, E, F>(deadline: Option<Duration>, fut: F) -> std::result::Result<T, E>
where
    E: From<StorageError>,
    F: Future<Output = std::result::Result<T, E>>,
{
    match deadline {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(limit).into()),
        },
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_backend_fails_fast() {
        let config = StorageConfig {
            backend: "postgres".to_string(),
            ..StorageConfig::default()
        };
        let err = create_adapter(&config).err().unwrap();
        assert!(matches!(err, StorageError::UnknownBackend(ref s) if s == "postgres"));
    }

    #[cfg(feature = "embedded")]
    #[test]
    fn test_create_embedded_adapter_does_not_connect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.db");
        let adapter = create_adapter(&StorageConfig::embedded(path.to_string_lossy())).unwrap();
        assert_eq!(adapter.backend(), BackendKind::Embedded);
        assert!(!path.exists());
    }

    #[cfg(feature = "networked")]
    #[test]
    fn test_create_networked_adapter_from_legacy_name() {
        let config = StorageConfig {
            backend: "MySQL".to_string(),
            ..StorageConfig::default()
        };
        let adapter = create_adapter(&config).unwrap();
        assert_eq!(adapter.backend(), BackendKind::Networked);
    }

    #[cfg(feature = "embedded")]
    mod transaction_tests {
        use super::*;

        async fn connected(dir: &tempfile::TempDir) -> Arc<dyn StorageAdapter> {
            let path = dir.path().join("tx.db");
            connect_adapter(&StorageConfig::embedded(path.to_string_lossy()))
                .await
                .unwrap()
        }

        async fn class_count(adapter: &Arc<dyn StorageAdapter>) -> i64 {
            adapter
                .query("SELECT COUNT(*) AS n FROM classes", &[])
                .await
                .unwrap()[0]
                .get_i64("n")
                .unwrap()
        }

        #[tokio::test]
        async fn test_transaction_commits_on_ok() {
            let dir = tempfile::tempdir().unwrap();
            let adapter = connected(&dir).await;

            let id: Option<i64> = adapter
                .transaction(|tx| {
                    Box::pin(async move {
                        let res = tx
                            .execute(
                                "INSERT INTO classes (kode, nama) VALUES (?, ?)",
                                &["X1".into(), "Kelas X-1".into()],
                            )
                            .await?;
                        // Visible inside the same transaction
                        let rows = tx.query("SELECT id FROM classes", &[]).await?;
                        assert_eq!(rows.len(), 1);
                        Ok::<_, StorageError>(res.last_insert_id)
                    })
                })
                .await
                .unwrap();

            assert!(id.is_some());
            assert_eq!(class_count(&adapter).await, 1);
        }

        #[tokio::test]
        async fn test_transaction_rolls_back_on_err() {
            let dir = tempfile::tempdir().unwrap();
            let adapter = connected(&dir).await;

            let result: Result<()> = adapter
                .transaction(|tx| {
                    Box::pin(async move {
                        tx.execute(
                            "INSERT INTO classes (kode, nama) VALUES (?, ?)",
                            &["X1".into(), "Kelas X-1".into()],
                        )
                        .await?;
                        Err(StorageError::NotConnected)
                    })
                })
                .await;

            assert!(matches!(result, Err(StorageError::NotConnected)));
            assert_eq!(class_count(&adapter).await, 0);
        }

        #[tokio::test]
        async fn test_deadline_rolls_back_transaction() {
            let dir = tempfile::tempdir().unwrap();
            let adapter = connected(&dir).await;

            let result: Result<()> = with_deadline(
                Some(Duration::from_millis(50)),
                adapter.transaction(|tx| {
                    Box::pin(async move {
                        tx.execute(
                            "INSERT INTO classes (kode, nama) VALUES (?, ?)",
                            &["X1".into(), "Kelas X-1".into()],
                        )
                        .await?;
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        Ok(())
                    })
                }),
            )
            .await;

            assert!(matches!(result, Err(StorageError::Timeout(_))));
            assert_eq!(class_count(&adapter).await, 0);
        }
    }

    #[tokio::test]
    async fn test_with_deadline_passes_through_without_limit() {
        let value: Result<u8> = with_deadline(None, async { Ok(7) }).await;
        assert_eq!(value.unwrap(), 7);
    }
}
