use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::traits::{Rows, Scannable, Scanner};
use crate::types::RowValues;

/// A destination binding for one column of a scanned row.
pub trait ScanDest: Send {
    /// # Errors
    /// Returns `DbError::ScanError` when `value` cannot be stored in `self`.
    fn assign(&mut self, value: &RowValues) -> DbResult<()>;
}

fn mismatch(target: &str, value: &RowValues) -> DbError {
    DbError::ScanError(format!("cannot scan {} value into {target}", value.kind()))
}

impl ScanDest for i64 {
    fn assign(&mut self, value: &RowValues) -> DbResult<()> {
        *self = *value.as_int().ok_or_else(|| mismatch("i64", value))?;
        Ok(())
    }
}

impl ScanDest for i32 {
    fn assign(&mut self, value: &RowValues) -> DbResult<()> {
        let wide = *value.as_int().ok_or_else(|| mismatch("i32", value))?;
        *self = i32::try_from(wide)
            .map_err(|_| DbError::ScanError(format!("value {wide} out of range for i32")))?;
        Ok(())
    }
}

impl ScanDest for f64 {
    fn assign(&mut self, value: &RowValues) -> DbResult<()> {
        *self = value.as_float().ok_or_else(|| mismatch("f64", value))?;
        Ok(())
    }
}

impl ScanDest for bool {
    fn assign(&mut self, value: &RowValues) -> DbResult<()> {
        *self = *value.as_bool().ok_or_else(|| mismatch("bool", value))?;
        Ok(())
    }
}

impl ScanDest for String {
    fn assign(&mut self, value: &RowValues) -> DbResult<()> {
        value
            .as_text()
            .ok_or_else(|| mismatch("String", value))?
            .clone_into(self);
        Ok(())
    }
}

impl ScanDest for NaiveDateTime {
    fn assign(&mut self, value: &RowValues) -> DbResult<()> {
        *self = value
            .as_timestamp()
            .ok_or_else(|| mismatch("NaiveDateTime", value))?;
        Ok(())
    }
}

impl ScanDest for JsonValue {
    fn assign(&mut self, value: &RowValues) -> DbResult<()> {
        *self = match value {
            RowValues::JSON(json) => json.clone(),
            RowValues::Text(text) => serde_json::from_str(text)
                .map_err(|e| DbError::ScanError(format!("invalid json text: {e}")))?,
            other => return Err(mismatch("serde_json::Value", other)),
        };
        Ok(())
    }
}

impl ScanDest for Vec<u8> {
    fn assign(&mut self, value: &RowValues) -> DbResult<()> {
        *self = match value {
            RowValues::Blob(bytes) => bytes.clone(),
            RowValues::Text(text) => text.as_bytes().to_vec(),
            other => return Err(mismatch("Vec<u8>", other)),
        };
        Ok(())
    }
}

impl ScanDest for RowValues {
    fn assign(&mut self, value: &RowValues) -> DbResult<()> {
        value.clone_into(self);
        Ok(())
    }
}

impl<T: ScanDest + Default> ScanDest for Option<T> {
    fn assign(&mut self, value: &RowValues) -> DbResult<()> {
        if value.is_null() {
            *self = None;
            return Ok(());
        }
        let mut inner = T::default();
        inner.assign(value)?;
        *self = Some(inner);
        Ok(())
    }
}

async fn close_after_failure<R: Rows>(rows: &mut R) {
    if let Err(err) = rows.close().await {
        debug!(error = %err, "closing rows after a failed scan");
    }
}

async fn scan_first<R, F>(mut rows: R, scan: F) -> DbResult<()>
where
    R: Rows,
    F: FnOnce(&mut R) -> DbResult<()>,
{
    if !rows.next().await {
        let err = rows.take_err().unwrap_or(DbError::NoRows);
        close_after_failure(&mut rows).await;
        return Err(err);
    }
    if let Err(err) = scan(&mut rows) {
        close_after_failure(&mut rows).await;
        return Err(err);
    }
    rows.close().await
}

/// Scan the first row into `dest` and close `rows`.
///
/// Exactly one row is consumed and `rows` is closed exactly once whatever happens.
///
/// # Errors
/// - the iteration error if `rows` stopped with one before yielding a row,
/// - `DbError::NoRows` if there was no row,
/// - the scan error if the row did not fit `dest`,
/// - otherwise the result of closing `rows`.
pub async fn scan_one<R: Rows>(rows: R, dest: &mut [&mut dyn ScanDest]) -> DbResult<()> {
    scan_first(rows, |rows| rows.scan(dest)).await
}

/// [`scan_one`] for a [`Scannable`] target.
///
/// # Errors
/// Same as [`scan_one`].
pub async fn scan_one_into<R, S>(rows: R, target: &mut S) -> DbResult<()>
where
    R: Rows,
    S: Scannable + Send + ?Sized,
{
    scan_first(rows, |rows| target.scan_from(rows)).await
}
