//! StorageAdapter contract tests.
//!
//! The same statements, written once in the networked dialect, must give
//! the same results on every backend. Each function cleans up the rows it
//! creates so the suite can share one database.

use std::sync::Arc;

use siswaconnect::storage::{StorageAdapter, StorageError, Value};

async fn count(adapter: &Arc<dyn StorageAdapter>, sql: &str, params: &[Value]) -> i64 {
    adapter
        .query(sql, params)
        .await
        .expect("count query should succeed")[0]
        .get_i64("n")
        .expect("count column")
}

async fn cleanup_classes(adapter: &Arc<dyn StorageAdapter>, prefix: &str) {
    adapter
        .execute(
            "DELETE FROM classes WHERE kode LIKE ?",
            &[format!("{}%", prefix).into()],
        )
        .await
        .expect("cleanup should succeed");
}

// =============================================================================
// Result shape
// =============================================================================

pub async fn test_execute_reports_insert_id_and_affected_rows(adapter: &Arc<dyn StorageAdapter>) {
    let insert = adapter
        .execute(
            "INSERT INTO `classes` (`kode`, `nama`) VALUES (?, ?)",
            &["CT-A1".into(), "Contract A1".into()],
        )
        .await
        .expect("insert should succeed");
    assert_eq!(insert.affected_rows, 1);
    let id = insert.last_insert_id.expect("insert should report its id");
    assert!(id > 0);

    let update = adapter
        .execute(
            "UPDATE `classes` SET `nama` = ? WHERE `kode` LIKE ?",
            &["Contract A1 renamed".into(), "CT-A%".into()],
        )
        .await
        .expect("update should succeed");
    assert_eq!(update.affected_rows, 1);
    assert_eq!(update.last_insert_id, None);

    cleanup_classes(adapter, "CT-A").await;
}

pub async fn test_query_returns_named_columns(adapter: &Arc<dyn StorageAdapter>) {
    let id = adapter
        .execute(
            "INSERT INTO teachers (nama, mapel, nip) VALUES (?, ?, ?)",
            &["Contract Teacher".into(), "Fisika".into(), Value::Null],
        )
        .await
        .expect("insert should succeed")
        .last_insert_id
        .expect("insert id");

    let rows = adapter
        .query(
            "SELECT id, nama, mapel, nip, is_active FROM teachers WHERE id = ?",
            &[id.into()],
        )
        .await
        .expect("select should succeed");
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.get_i64("id").unwrap(), id);
    assert_eq!(row.get_str("nama").unwrap(), "Contract Teacher");
    assert_eq!(row.get_opt_str("nip").unwrap(), None);
    assert!(row.get_bool("is_active").unwrap());
    assert_eq!(
        row.columns().collect::<Vec<_>>(),
        ["id", "nama", "mapel", "nip", "is_active"]
    );

    let empty = adapter
        .query("SELECT id FROM teachers WHERE id = ?", &[(-1i64).into()])
        .await
        .expect("empty select should succeed");
    assert!(empty.is_empty());

    adapter
        .execute("DELETE FROM teachers WHERE id = ?", &[id.into()])
        .await
        .expect("cleanup should succeed");
}

// =============================================================================
// Dialect
// =============================================================================

pub async fn test_networked_time_functions_run_everywhere(adapter: &Arc<dyn StorageAdapter>) {
    let rows = adapter
        .query("SELECT NOW() AS now_ts, CURDATE() AS today", &[])
        .await
        .expect("time functions should run on every backend");
    let now = rows[0].get_str("now_ts").unwrap();
    let today = rows[0].get_str("today").unwrap();
    assert!(now.starts_with(&today), "{now} should start with {today}");
}

// =============================================================================
// Errors
// =============================================================================

pub async fn test_unique_violation_is_detectable(adapter: &Arc<dyn StorageAdapter>) {
    adapter
        .execute(
            "INSERT INTO classes (kode, nama) VALUES (?, ?)",
            &["CT-U1".into(), "Contract U1".into()],
        )
        .await
        .expect("first insert should succeed");

    let err = adapter
        .execute(
            "INSERT INTO classes (kode, nama) VALUES (?, ?)",
            &["CT-U1".into(), "Contract U1 again".into()],
        )
        .await
        .expect_err("duplicate code should fail");
    assert!(err.is_unique_violation(), "unexpected error: {err}");

    cleanup_classes(adapter, "CT-U").await;
}

// =============================================================================
// Transactions
// =============================================================================

pub async fn test_transaction_commit(adapter: &Arc<dyn StorageAdapter>) {
    let ids: (i64, i64) = adapter
        .transaction(|tx| {
            Box::pin(async move {
                let a = tx
                    .execute(
                        "INSERT INTO classes (kode, nama) VALUES (?, ?)",
                        &["CT-C1".into(), "Contract C1".into()],
                    )
                    .await?;
                let b = tx
                    .execute(
                        "INSERT INTO classes (kode, nama) VALUES (?, ?)",
                        &["CT-C2".into(), "Contract C2".into()],
                    )
                    .await?;
                let seen = tx
                    .query(
                        "SELECT COUNT(*) AS n FROM classes WHERE kode LIKE ?",
                        &["CT-C%".into()],
                    )
                    .await?;
                assert_eq!(seen[0].get_i64("n")?, 2);
                Ok::<_, StorageError>((
                    a.last_insert_id.unwrap_or_default(),
                    b.last_insert_id.unwrap_or_default(),
                ))
            })
        })
        .await
        .expect("transaction should commit");

    assert!(ids.0 > 0 && ids.1 > ids.0);
    assert_eq!(
        count(adapter, "SELECT COUNT(*) AS n FROM classes WHERE kode LIKE ?", &["CT-C%".into()]).await,
        2
    );
    cleanup_classes(adapter, "CT-C").await;
}

pub async fn test_transaction_rollback(adapter: &Arc<dyn StorageAdapter>) {
    let result: Result<(), StorageError> = adapter
        .transaction(|tx| {
            Box::pin(async move {
                tx.execute(
                    "INSERT INTO classes (kode, nama) VALUES (?, ?)",
                    &["CT-R1".into(), "Contract R1".into()],
                )
                .await?;
                // Second row violates the unique key, failing the batch
                tx.execute(
                    "INSERT INTO classes (kode, nama) VALUES (?, ?)",
                    &["CT-R1".into(), "Contract R1 dup".into()],
                )
                .await?;
                Ok(())
            })
        })
        .await;

    assert!(result.is_err());
    assert_eq!(
        count(adapter, "SELECT COUNT(*) AS n FROM classes WHERE kode LIKE ?", &["CT-R%".into()]).await,
        0
    );
}

pub async fn test_explicit_transaction_handle(adapter: &Arc<dyn StorageAdapter>) {
    let mut tx = adapter.begin().await.expect("begin should succeed");
    tx.execute(
        "INSERT INTO classes (kode, nama) VALUES (?, ?)",
        &["CT-H1".into(), "Contract H1".into()],
    )
    .await
    .expect("insert in transaction");
    tx.rollback().await.expect("rollback should succeed");
    assert_eq!(
        count(adapter, "SELECT COUNT(*) AS n FROM classes WHERE kode LIKE ?", &["CT-H%".into()]).await,
        0
    );

    let mut tx = adapter.begin().await.expect("begin should succeed");
    tx.execute(
        "INSERT INTO classes (kode, nama) VALUES (?, ?)",
        &["CT-H2".into(), "Contract H2".into()],
    )
    .await
    .expect("insert in transaction");
    tx.commit().await.expect("commit should succeed");
    assert_eq!(
        count(adapter, "SELECT COUNT(*) AS n FROM classes WHERE kode LIKE ?", &["CT-H%".into()]).await,
        1
    );
    cleanup_classes(adapter, "CT-H").await;
}

// =============================================================================
// Lifecycle (run last: leaves the adapter disconnected)
// =============================================================================

pub async fn test_not_connected_after_disconnect(adapter: &Arc<dyn StorageAdapter>) {
    adapter.disconnect().await;
    assert!(!adapter.is_connected().await);
    assert!(matches!(
        adapter.query("SELECT 1", &[]).await,
        Err(StorageError::NotConnected)
    ));
    assert!(matches!(
        adapter.execute("DELETE FROM classes", &[]).await,
        Err(StorageError::NotConnected)
    ));
    assert!(matches!(adapter.begin().await, Err(StorageError::NotConnected)));
    // Disconnecting twice is harmless
    adapter.disconnect().await;
}

/// Run every contract test against one connected adapter.
#[macro_export]
macro_rules! run_adapter_contract_tests {
    ($adapter:expr) => {
        use $crate::storage::adapter_contract_tests::*;

        test_execute_reports_insert_id_and_affected_rows($adapter).await;
        println!("  test_execute_reports_insert_id_and_affected_rows: PASSED");

        test_query_returns_named_columns($adapter).await;
        println!("  test_query_returns_named_columns: PASSED");

        test_networked_time_functions_run_everywhere($adapter).await;
        println!("  test_networked_time_functions_run_everywhere: PASSED");

        test_unique_violation_is_detectable($adapter).await;
        println!("  test_unique_violation_is_detectable: PASSED");

        test_transaction_commit($adapter).await;
        println!("  test_transaction_commit: PASSED");

        test_transaction_rollback($adapter).await;
        println!("  test_transaction_rollback: PASSED");

        test_explicit_transaction_handle($adapter).await;
        println!("  test_explicit_transaction_handle: PASSED");

        test_not_connected_after_disconnect($adapter).await;
        println!("  test_not_connected_after_disconnect: PASSED");
    };
}
