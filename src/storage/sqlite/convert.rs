//! Parameter binding and row decoding for the embedded engine.

use sqlx::query::Query;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Column, Database, Row as _, Sqlite, TypeInfo, ValueRef};

use crate::interfaces::storage_adapter::Result;
use crate::storage::dialect;
use crate::storage::value::{ExecResult, Row, Value};

type SqliteQuery<'q> = Query<'q, Sqlite, <Sqlite as Database>::Arguments<'q>>;

fn bind<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<i64>),
        Value::Int(n) => query.bind(*n),
        Value::Real(n) => query.bind(*n),
        Value::Text(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
    }
}

fn bind_all<'q>(sql: &'q str, params: &[Value]) -> SqliteQuery<'q> {
    params.iter().fold(sqlx::query(sql), bind)
}

/// Decode by the stored value's storage class; the embedded engine types values, not columns.
fn to_row(row: &SqliteRow) -> Result<Row> {
    let mut columns = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            match type_name.as_str() {
                "INTEGER" | "BOOLEAN" => Value::Int(row.try_get::<i64, _>(index)?),
                "REAL" => Value::Real(row.try_get::<f64, _>(index)?),
                "BLOB" => Value::Bytes(row.try_get::<Vec<u8>, _>(index)?),
                _ => Value::Text(row.try_get::<String, _>(index)?),
            }
        };
        columns.push((column.name().to_string(), value));
    }
    Ok(Row::new(columns))
}

/// Translate, bind and run a read on one connection.
pub(super) async fn fetch(
    conn: &mut SqliteConnection,
    sql: &str,
    params: &[Value],
) -> Result<Vec<Row>> {
    let translated = dialect::to_embedded(sql);
    let rows = bind_all(&translated, params).fetch_all(&mut *conn).await?;
    rows.iter().map(to_row).collect()
}

/// Translate, bind and run a write on one connection.
pub(super) async fn run(
    conn: &mut SqliteConnection,
    sql: &str,
    params: &[Value],
) -> Result<ExecResult> {
    let translated = dialect::to_embedded(sql);
    let result = bind_all(&translated, params).execute(&mut *conn).await?;
    // The engine reports the connection's last rowid even for updates.
    let last_insert_id = if is_insert(&translated) && result.rows_affected() > 0 {
        result.last_insert_rowid()
    } else {
        0
    };
    Ok(ExecResult::new(last_insert_id, result.rows_affected()))
}

fn is_insert(sql: &str) -> bool {
    let head = sql.trim_start();
    ["INSERT", "REPLACE"].iter().any(|kw| {
        head.get(..kw.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(kw))
    })
}
