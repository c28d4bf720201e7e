//! First-run schema bootstrap for the embedded engine.

use sqlx::{Row as _, SqlitePool};
use tracing::{debug, info};

use crate::interfaces::storage_adapter::Result;
use crate::storage::dialect::{split_statements, translate_checked};
use crate::storage::schema::SCHEMA_SQL;

/// Apply the schema and optional seed script when the database holds no
/// user tables. Returns whether anything was applied.
///
/// Both scripts are checked for untranslatable constructs before any
/// statement runs, and everything runs in one transaction.
pub(super) async fn bootstrap_if_empty(pool: &SqlitePool, seed: Option<&str>) -> Result<bool> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    )
    .fetch_one(pool)
    .await?;
    let existing: i64 = row.try_get("n")?;
    if existing > 0 {
        debug!(tables = existing, "Embedded database already initialised");
        return Ok(false);
    }

    let mut statements = split_statements(&translate_checked(SCHEMA_SQL)?);
    let schema_count = statements.len();
    if let Some(seed) = seed {
        statements.extend(split_statements(&translate_checked(seed)?));
    }

    let mut tx = pool.begin().await?;
    for statement in &statements {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    info!(
        schema_statements = schema_count,
        seed_statements = statements.len() - schema_count,
        "Embedded database bootstrapped"
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use sqlx::Row;

    use super::*;
    use crate::interfaces::storage_adapter::StorageError;
    use crate::storage::schema::TABLES;

    async fn memory_pool() -> SqlitePool {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true)
            .foreign_keys(true);
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap()
    }

    async fn count(pool: &SqlitePool, sql: &str) -> i64 {
        sqlx::query(sql).fetch_one(pool).await.unwrap().get(0)
    }

    #[tokio::test]
    async fn test_bootstrap_runs_once() {
        let pool = memory_pool().await;
        assert!(bootstrap_if_empty(&pool, None).await.unwrap());
        assert!(!bootstrap_if_empty(&pool, None).await.unwrap());

        let tables = count(
            &pool,
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .await;
        assert_eq!(tables, TABLES.len() as i64);
    }

    #[tokio::test]
    async fn test_bootstrap_applies_seed() {
        let pool = memory_pool().await;
        let seed = "INSERT INTO classes (kode, nama, is_active) VALUES ('X1', 'Kelas X-1', TRUE);\n\
                    INSERT INTO classes (kode, nama) VALUES ('X2', 'Kelas X-2');";
        bootstrap_if_empty(&pool, Some(seed)).await.unwrap();
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM classes WHERE is_active = 1").await, 2);
    }

    #[tokio::test]
    async fn test_untranslatable_seed_aborts_before_any_write() {
        let pool = memory_pool().await;
        let seed = "INSERT INTO classes (kode, nama) VALUES ('X1', 'A') ON DUPLICATE KEY UPDATE nama = 'A'";
        let err = bootstrap_if_empty(&pool, Some(seed)).await.unwrap_err();
        assert!(matches!(err, StorageError::Dialect { .. }));

        let tables = count(&pool, "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'").await;
        assert_eq!(tables, 0);
    }

    #[tokio::test]
    async fn test_failing_seed_rolls_back_schema() {
        let pool = memory_pool().await;
        let seed = "INSERT INTO no_such_table VALUES (1)";
        assert!(bootstrap_if_empty(&pool, Some(seed)).await.is_err());

        let tables = count(&pool, "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'").await;
        assert_eq!(tables, 0);
    }
}
