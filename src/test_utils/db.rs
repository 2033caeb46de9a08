use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{CallLog, MockRows, MockTx, locked};
use crate::context::Context;
use crate::error::{DbError, DbResult};
use crate::traits::{Db, Pingable, Rows, Tx};
use crate::types::{ExecResult, RowValues, TxOptions};

/// Connection-level fake. Records `db.query <sql>`, `db.exec <sql>`, `db.begin` and
/// `db.close`.
#[derive(Debug, Default)]
pub struct MockDb {
    log: CallLog,
    rows: Mutex<VecDeque<MockRows>>,
    exec_result: ExecResult,
    fail_with: Mutex<Option<DbError>>,
}

impl MockDb {
    #[must_use]
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Queue a result set for the next `query_context`.
    #[must_use]
    pub fn with_rows(self, rows: MockRows) -> Self {
        locked(&self.rows).push_back(rows);
        self
    }

    #[must_use]
    pub fn with_rows_affected(mut self, rows_affected: u64) -> Self {
        self.exec_result = ExecResult { rows_affected };
        self
    }

    /// The next query, exec or begin fails with `err`.
    #[must_use]
    pub fn fail_next(self, err: DbError) -> Self {
        *locked(&self.fail_with) = Some(err);
        self
    }

    fn scripted_failure(&self, ctx: &Context) -> DbResult<()> {
        if let Some(cause) = ctx.err() {
            return Err(DbError::Context(cause));
        }
        locked(&self.fail_with).take().map_or(Ok(()), Err)
    }
}

#[async_trait]
impl Db for MockDb {
    async fn query_context(
        &self,
        ctx: &Context,
        query: &str,
        _params: &[RowValues],
    ) -> DbResult<Box<dyn Rows>> {
        self.log.record(format!("db.query {query}"));
        self.scripted_failure(ctx)?;
        let rows = locked(&self.rows)
            .pop_front()
            .unwrap_or_else(|| MockRows::new().with_log(self.log.clone()));
        Ok(Box::new(rows))
    }

    async fn exec_context(
        &self,
        ctx: &Context,
        query: &str,
        _params: &[RowValues],
    ) -> DbResult<ExecResult> {
        self.log.record(format!("db.exec {query}"));
        self.scripted_failure(ctx)?;
        Ok(self.exec_result)
    }

    async fn begin(&self, ctx: &Context, _opts: &TxOptions) -> DbResult<Box<dyn Tx>> {
        self.log.record("db.begin");
        self.scripted_failure(ctx)?;
        Ok(Box::new(MockTx::new(self.log.clone())))
    }

    async fn close(&self) -> DbResult<()> {
        self.log.record("db.close");
        Ok(())
    }
}

/// Answers pings from a script of results. Once the script runs out every ping fails.
///
/// Records `ping` and `ping_context`, and the deadline of every context it was pinged with.
#[derive(Debug, Default)]
pub struct MockPingable {
    log: CallLog,
    script: Mutex<VecDeque<DbResult<()>>>,
    deadlines: Mutex<Vec<Option<Instant>>>,
}

impl MockPingable {
    #[must_use]
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn then_ok(self) -> Self {
        locked(&self.script).push_back(Ok(()));
        self
    }

    #[must_use]
    pub fn then_fail(self, err: DbError) -> Self {
        locked(&self.script).push_back(Err(err));
        self
    }

    /// Queue `n` failures.
    #[must_use]
    pub fn then_fail_times(self, n: usize) -> Self {
        {
            let mut script = locked(&self.script);
            for i in 0..n {
                script.push_back(Err(DbError::ConnectionError(format!("refused #{i}"))));
            }
        }
        self
    }

    /// Deadlines of the contexts passed to `ping_context`, in call order.
    #[must_use]
    pub fn deadlines_seen(&self) -> Vec<Option<Instant>> {
        locked(&self.deadlines).clone()
    }

    fn next_result(&self) -> DbResult<()> {
        locked(&self.script)
            .pop_front()
            .unwrap_or_else(|| Err(DbError::ConnectionError("connection refused".into())))
    }
}

#[async_trait]
impl Pingable for MockPingable {
    async fn ping(&self) -> DbResult<()> {
        self.log.record("ping");
        self.next_result()
    }

    async fn ping_context(&self, ctx: &Context) -> DbResult<()> {
        self.log.record("ping_context");
        locked(&self.deadlines).push(ctx.deadline());
        if let Some(cause) = ctx.err() {
            return Err(DbError::Context(cause));
        }
        self.next_result()
    }
}
