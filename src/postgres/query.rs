use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use deadpool_postgres::Object;
use serde_json::Value;
use tokio_postgres::Row;

use super::params::Params;
use super::rows::PgRows;
use super::stmt::PgStmt;
use crate::context::Context;
use crate::error::{DbError, DbResult};
use crate::traits::Rows;
use crate::types::{ExecResult, RowValues};

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns `DbError` if the index is out of range or the column cannot be decoded.
pub fn extract_value(row: &Row, idx: usize) -> DbResult<RowValues> {
    let Some(column) = row.columns().get(idx) else {
        return Err(DbError::ScanError(format!(
            "column index {idx} out of range for {} columns",
            row.len()
        )));
    };
    let type_info = column.type_();

    match type_info.name() {
        "int2" => {
            let val: Option<i16> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))))
        }
        "int4" => {
            let val: Option<i32> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))))
        }
        "int8" => {
            let val: Option<i64> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Int))
        }
        "float4" => {
            let val: Option<f32> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Float(f64::from(v))))
        }
        "float8" => {
            let val: Option<f64> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Float))
        }
        "bool" => {
            let val: Option<bool> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Bool))
        }
        "timestamp" => {
            let val: Option<NaiveDateTime> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Timestamp))
        }
        "timestamptz" => {
            let val: Option<DateTime<Utc>> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Timestamp(v.naive_utc())))
        }
        "json" | "jsonb" => {
            let val: Option<Value> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::JSON))
        }
        "bytea" => {
            let val: Option<Vec<u8>> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Blob))
        }
        // text, varchar, bpchar, name and anything else that decodes as a string
        _ => {
            let val: Option<String> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Text))
        }
    }
}

pub(crate) async fn prepare_on(
    client: &Arc<Object>,
    ctx: &Context,
    query: &str,
) -> DbResult<PgStmt> {
    let stmt = ctx
        .run(async {
            client
                .prepare(query)
                .await
                .map_err(|e| DbError::ExecutionError(format!("postgres prepare error: {e}")))
        })
        .await?;
    Ok(PgStmt::new(Arc::clone(client), stmt))
}

pub(crate) async fn query_on(
    client: &Arc<Object>,
    ctx: &Context,
    query: &str,
    params: &[RowValues],
) -> DbResult<Box<dyn Rows>> {
    let stream = ctx
        .run(async {
            client
                .query_raw(query, params.iter())
                .await
                .map_err(|e| DbError::ExecutionError(format!("postgres select error: {e}")))
        })
        .await?;
    Ok(Box::new(PgRows::new(stream, Some(Arc::clone(client)))))
}

pub(crate) async fn exec_on(
    client: &Object,
    ctx: &Context,
    query: &str,
    params: &[RowValues],
) -> DbResult<ExecResult> {
    let converted = Params::convert(params);
    let rows_affected = ctx
        .run(async {
            client
                .execute(query, converted.as_refs())
                .await
                .map_err(|e| DbError::ExecutionError(format!("postgres execute error: {e}")))
        })
        .await?;
    Ok(ExecResult { rows_affected })
}
