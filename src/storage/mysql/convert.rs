//! Parameter binding and row decoding for the networked engine.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::mysql::{MySqlArguments, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, MySql, Row as _, TypeInfo, ValueRef};

use crate::interfaces::storage_adapter::Result;
use crate::storage::value::{ExecResult, Row, Value};

type MySqlQuery<'q> = Query<'q, MySql, MySqlArguments>;

fn bind<'q>(query: MySqlQuery<'q>, value: &Value) -> MySqlQuery<'q> {
    match value {
        Value::Null => query.bind(None::<i64>),
        Value::Int(n) => query.bind(*n),
        Value::Real(n) => query.bind(*n),
        Value::Text(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
    }
}

fn bind_all<'q>(sql: &'q str, params: &[Value]) -> MySqlQuery<'q> {
    params.iter().fold(sqlx::query(sql), bind)
}

/// Decode by declared column type. Temporal columns are rendered as text in
/// the same shape the embedded engine stores them.
fn to_row(row: &MySqlRow) -> Result<Row> {
    let mut columns = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            decode(row, index, &type_name)?
        };
        columns.push((column.name().to_string(), value));
    }
    Ok(Row::new(columns))
}

fn decode(row: &MySqlRow, index: usize, type_name: &str) -> Result<Value> {
    let value = match type_name {
        "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            Value::Int(row.try_get::<i64, _>(index)?)
        }
        name if name.ends_with("UNSIGNED") => Value::Int(row.try_get::<u64, _>(index)? as i64),
        "FLOAT" | "DOUBLE" => Value::Real(row.try_get::<f64, _>(index)?),
        "DATE" => Value::Text(
            row.try_get::<NaiveDate, _>(index)?
                .format("%Y-%m-%d")
                .to_string(),
        ),
        "DATETIME" | "TIMESTAMP" => Value::Text(
            row.try_get::<NaiveDateTime, _>(index)?
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        ),
        "TIME" => Value::Text(
            row.try_get::<NaiveTime, _>(index)?
                .format("%H:%M:%S")
                .to_string(),
        ),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => {
            Value::Bytes(row.try_get::<Vec<u8>, _>(index)?)
        }
        // Text, enum, set, decimal and json all arrive as UTF-8 text
        _ => Value::Text(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}

/// Bind and run a read on one connection. SQL is passed through unchanged.
pub(super) async fn fetch(
    conn: &mut MySqlConnection,
    sql: &str,
    params: &[Value],
) -> Result<Vec<Row>> {
    let rows = bind_all(sql, params).fetch_all(&mut *conn).await?;
    rows.iter().map(to_row).collect()
}

/// Bind and run a write on one connection.
pub(super) async fn run(
    conn: &mut MySqlConnection,
    sql: &str,
    params: &[Value],
) -> Result<ExecResult> {
    let result = bind_all(sql, params).execute(&mut *conn).await?;
    Ok(ExecResult::new(
        result.last_insert_id() as i64,
        result.rows_affected(),
    ))
}
