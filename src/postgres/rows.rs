use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::Object;
use futures_util::StreamExt;
use tokio_postgres::{Row, RowStream};

use super::query::extract_value;
use crate::error::{DbError, DbResult};
use crate::scan::ScanDest;
use crate::traits::{Rows, Scanner};

/// Streaming result set. Holds its pooled connection until closed or dropped.
pub struct PgRows {
    stream: Option<Pin<Box<RowStream>>>,
    current: Option<Row>,
    err: Option<DbError>,
    affected: Option<u64>,
    conn: Option<Arc<Object>>,
}

impl PgRows {
    pub(crate) fn new(stream: RowStream, conn: Option<Arc<Object>>) -> Self {
        Self {
            stream: Some(Box::pin(stream)),
            current: None,
            err: None,
            affected: None,
            conn,
        }
    }

    /// Rows affected by the statement, available once the stream is exhausted.
    #[must_use]
    pub fn rows_affected(&self) -> Option<u64> {
        self.affected
            .or_else(|| self.stream.as_ref().and_then(|s| s.rows_affected()))
    }

    /// Column names of the current row.
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        self.current
            .as_ref()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default()
    }
}

impl Scanner for PgRows {
    fn scan(&mut self, dest: &mut [&mut dyn ScanDest]) -> DbResult<()> {
        let Some(row) = self.current.as_ref() else {
            return Err(DbError::ScanError("scan called without a current row".into()));
        };
        if row.len() != dest.len() {
            return Err(DbError::ScanError(format!(
                "expected {} destination arguments, not {}",
                row.len(),
                dest.len()
            )));
        }
        for (idx, slot) in dest.iter_mut().enumerate() {
            let value = extract_value(row, idx)?;
            slot.assign(&value).map_err(|e| match e {
                DbError::ScanError(msg) => DbError::ScanError(format!("column {idx}: {msg}")),
                other => other,
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl Rows for PgRows {
    async fn next(&mut self) -> bool {
        self.current = None;
        if self.err.is_some() {
            return false;
        }
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };
        match stream.next().await {
            Some(Ok(row)) => {
                self.current = Some(row);
                true
            }
            Some(Err(e)) => {
                self.err = Some(e.into());
                false
            }
            None => {
                // an exhausted RowStream reports a closed connection if polled again
                self.affected = stream.rows_affected();
                self.stream = None;
                false
            }
        }
    }

    fn take_err(&mut self) -> Option<DbError> {
        self.err.take()
    }

    async fn close(&mut self) -> DbResult<()> {
        self.current = None;
        self.stream = None;
        self.conn = None;
        Ok(())
    }
}
