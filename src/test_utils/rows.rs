use std::collections::VecDeque;

use async_trait::async_trait;

use super::CallLog;
use crate::error::{DbError, DbResult};
use crate::scan::ScanDest;
use crate::traits::{Rows, Scanner};
use crate::types::RowValues;

/// In-memory result set.
///
/// Records `rows.next`, `rows.scan`, `rows.err` and `rows.close`. An iteration error set with
/// [`MockRows::with_iter_error`] is reported once the scripted rows run out.
#[derive(Debug, Default)]
pub struct MockRows {
    log: CallLog,
    rows: VecDeque<Vec<RowValues>>,
    current: Option<Vec<RowValues>>,
    iter_err: Option<DbError>,
    scan_err: Option<DbError>,
    close_err: Option<DbError>,
    closed: usize,
}

impl MockRows {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    #[must_use]
    pub fn with_row(mut self, row: Vec<RowValues>) -> Self {
        self.rows.push_back(row);
        self
    }

    #[must_use]
    pub fn with_iter_error(mut self, err: DbError) -> Self {
        self.iter_err = Some(err);
        self
    }

    #[must_use]
    pub fn with_scan_error(mut self, err: DbError) -> Self {
        self.scan_err = Some(err);
        self
    }

    #[must_use]
    pub fn with_close_error(mut self, err: DbError) -> Self {
        self.close_err = Some(err);
        self
    }

    /// Rows not yet reached by `next`.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    /// Number of times `close` was called.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closed
    }
}

impl Scanner for MockRows {
    fn scan(&mut self, dest: &mut [&mut dyn ScanDest]) -> DbResult<()> {
        self.log.record("rows.scan");
        if let Some(err) = self.scan_err.take() {
            return Err(err);
        }
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| DbError::ScanError("scan called without a current row".into()))?;
        if row.len() != dest.len() {
            return Err(DbError::ScanError(format!(
                "expected {} destination arguments, not {}",
                row.len(),
                dest.len()
            )));
        }
        for (value, slot) in row.iter().zip(dest.iter_mut()) {
            slot.assign(value)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Rows for MockRows {
    async fn next(&mut self) -> bool {
        self.log.record("rows.next");
        self.current = self.rows.pop_front();
        self.current.is_some()
    }

    fn take_err(&mut self) -> Option<DbError> {
        self.log.record("rows.err");
        self.iter_err.take()
    }

    async fn close(&mut self) -> DbResult<()> {
        self.log.record("rows.close");
        self.closed += 1;
        self.current = None;
        self.close_err.take().map_or(Ok(()), Err)
    }
}
