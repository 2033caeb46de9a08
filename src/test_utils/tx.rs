use std::sync::Mutex;

use async_trait::async_trait;

use super::{CallLog, MockRows, locked};
use crate::context::Context;
use crate::error::{DbError, DbResult};
use crate::traits::{Db, Rows, Stmt, StmtPreparor, Tx, TxBeginor};
use crate::types::{ExecResult, RowValues, TxOptions};

fn check(ctx: &Context) -> DbResult<()> {
    ctx.err().map_or(Ok(()), |cause| Err(DbError::Context(cause)))
}

/// Prepared statement fake. Records `stmt.exec`, `stmt.query` and `stmt.close`.
#[derive(Debug, Default)]
pub struct MockStmt {
    log: CallLog,
    result: ExecResult,
    rows: Mutex<Option<MockRows>>,
    close_err: Option<DbError>,
}

impl MockStmt {
    #[must_use]
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_rows_affected(mut self, rows_affected: u64) -> Self {
        self.result = ExecResult { rows_affected };
        self
    }

    /// Rows handed out by the next `query`; later queries get an empty result.
    #[must_use]
    pub fn with_rows(self, rows: MockRows) -> Self {
        *locked(&self.rows) = Some(rows);
        self
    }

    #[must_use]
    pub fn with_close_error(mut self, err: DbError) -> Self {
        self.close_err = Some(err);
        self
    }
}

#[async_trait]
impl Stmt for MockStmt {
    async fn exec(&self, ctx: &Context, _params: &[RowValues]) -> DbResult<ExecResult> {
        self.log.record("stmt.exec");
        check(ctx)?;
        Ok(self.result)
    }

    async fn query(&self, ctx: &Context, _params: &[RowValues]) -> DbResult<Box<dyn Rows>> {
        self.log.record("stmt.query");
        check(ctx)?;
        let rows = locked(&self.rows)
            .take()
            .unwrap_or_else(|| MockRows::new().with_log(self.log.clone()));
        Ok(Box::new(rows))
    }

    async fn close(self) -> DbResult<()> {
        self.log.record("stmt.close");
        self.close_err.map_or(Ok(()), Err)
    }
}

/// Hands out [`MockStmt`]s. Records `prepare <query>`.
#[derive(Debug, Default)]
pub struct MockStmtPreparor {
    log: CallLog,
    prepare_err: Mutex<Option<DbError>>,
    stmt: Mutex<Option<MockStmt>>,
}

impl MockStmtPreparor {
    #[must_use]
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn fail_next_prepare(self, err: DbError) -> Self {
        *locked(&self.prepare_err) = Some(err);
        self
    }

    /// Statement returned by the next successful prepare.
    #[must_use]
    pub fn with_stmt(self, stmt: MockStmt) -> Self {
        *locked(&self.stmt) = Some(stmt);
        self
    }
}

#[async_trait]
impl StmtPreparor for MockStmtPreparor {
    type Stmt = MockStmt;

    async fn prepare_context(&self, ctx: &Context, query: &str) -> DbResult<MockStmt> {
        self.log.record(format!("prepare {query}"));
        check(ctx)?;
        if let Some(err) = locked(&self.prepare_err).take() {
            return Err(err);
        }
        Ok(locked(&self.stmt)
            .take()
            .unwrap_or_else(|| MockStmt::new(self.log.clone())))
    }
}

/// Transaction fake with the usual finished-state rules: once committed or rolled back, both
/// `commit` and `rollback` report `TxDone`.
///
/// Records `tx.commit`, `tx.rollback`, `tx.query`, `tx.exec` and `prepare <query>`.
#[derive(Debug, Default)]
pub struct MockTx {
    log: CallLog,
    commit_err: Option<DbError>,
    rollback_err: Option<DbError>,
    keep_open_after_commit: bool,
    finished: bool,
}

impl MockTx {
    #[must_use]
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_commit_error(mut self, err: DbError) -> Self {
        self.commit_err = Some(err);
        self
    }

    #[must_use]
    pub fn with_rollback_error(mut self, err: DbError) -> Self {
        self.rollback_err = Some(err);
        self
    }

    /// A successful commit leaves the transaction open, so a following rollback runs.
    #[must_use]
    pub fn keep_open_after_commit(mut self) -> Self {
        self.keep_open_after_commit = true;
        self
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[async_trait]
impl Db for MockTx {
    async fn query_context(
        &self,
        ctx: &Context,
        _query: &str,
        _params: &[RowValues],
    ) -> DbResult<Box<dyn Rows>> {
        self.log.record("tx.query");
        check(ctx)?;
        Ok(Box::new(MockRows::new().with_log(self.log.clone())))
    }

    async fn exec_context(
        &self,
        ctx: &Context,
        _query: &str,
        _params: &[RowValues],
    ) -> DbResult<ExecResult> {
        self.log.record("tx.exec");
        check(ctx)?;
        Ok(ExecResult::default())
    }

    async fn begin(&self, _ctx: &Context, _opts: &TxOptions) -> DbResult<Box<dyn Tx>> {
        Err(DbError::NestedTransaction)
    }

    async fn close(&self) -> DbResult<()> {
        Err(DbError::CannotCloseTx)
    }
}

#[async_trait]
impl Tx for MockTx {
    async fn commit(&mut self) -> DbResult<()> {
        self.log.record("tx.commit");
        if self.finished {
            return Err(DbError::TxDone);
        }
        if let Some(err) = self.commit_err.take() {
            self.finished = true;
            return Err(err);
        }
        self.finished = !self.keep_open_after_commit;
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.log.record("tx.rollback");
        if self.finished {
            return Err(DbError::TxDone);
        }
        self.finished = true;
        self.rollback_err.take().map_or(Ok(()), Err)
    }
}

#[async_trait]
impl StmtPreparor for MockTx {
    type Stmt = MockStmt;

    async fn prepare_context(&self, ctx: &Context, query: &str) -> DbResult<MockStmt> {
        self.log.record(format!("prepare {query}"));
        check(ctx)?;
        Ok(MockStmt::new(self.log.clone()))
    }
}

/// Hands out [`MockTx`]s and remembers the options each begin was called with. Records
/// `begin`.
#[derive(Debug, Default)]
pub struct MockTxBeginor {
    log: CallLog,
    begin_err: Mutex<Option<DbError>>,
    tx: Mutex<Option<MockTx>>,
    seen: Mutex<Vec<TxOptions>>,
}

impl MockTxBeginor {
    #[must_use]
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn fail_next_begin(self, err: DbError) -> Self {
        *locked(&self.begin_err) = Some(err);
        self
    }

    /// Transaction returned by the next successful begin.
    #[must_use]
    pub fn with_tx(self, tx: MockTx) -> Self {
        *locked(&self.tx) = Some(tx);
        self
    }

    #[must_use]
    pub fn seen_options(&self) -> Vec<TxOptions> {
        locked(&self.seen).clone()
    }
}

#[async_trait]
impl TxBeginor for MockTxBeginor {
    type Tx = MockTx;

    async fn begin_tx(&self, ctx: &Context, opts: &TxOptions) -> DbResult<MockTx> {
        self.log.record("begin");
        locked(&self.seen).push(*opts);
        check(ctx)?;
        if let Some(err) = locked(&self.begin_err).take() {
            return Err(err);
        }
        Ok(locked(&self.tx)
            .take()
            .unwrap_or_else(|| MockTx::new(self.log.clone())))
    }
}
