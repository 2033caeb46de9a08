use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::Object;
use tokio::runtime::Handle;
use tracing::debug;

use super::query::{exec_on, prepare_on, query_on};
use super::stmt::PgStmt;
use crate::context::Context;
use crate::error::{DbError, DbResult};
use crate::traits::{Db, Rows, StmtPreparor, Tx};
use crate::types::{ExecResult, RowValues, TxOptions};

/// A transaction on a pooled postgres connection.
///
/// Dropping a `PgTx` that was neither committed nor rolled back schedules a `ROLLBACK` on
/// the current runtime before the connection goes back to the pool.
pub struct PgTx {
    client: Arc<Object>,
    done: bool,
}

fn spawn_rollback(client: Arc<Object>) {
    spawn_on_current(async move {
        if let Err(e) = client.simple_query("ROLLBACK").await {
            debug!(error = %e, "background rollback failed");
        }
    });
}

/// Spawn `task` on the current runtime. Returns `false`, and logs, when there is none.
fn spawn_on_current<F>(task: F) -> bool
where
    F: Future<Output = ()> + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(task);
            true
        }
        Err(e) => {
            debug!(
                error = %e,
                "no runtime to roll back an unfinished transaction; connection returns to the pool inside it"
            );
            false
        }
    }
}

impl PgTx {
    /// Issue `BEGIN` with `opts` on `client`.
    ///
    /// # Errors
    /// Returns `DbError::Context` if `ctx` finishes first, or `DbError::ExecutionError` if the
    /// server rejects the `BEGIN`.
    pub async fn start(ctx: &Context, client: Object, opts: &TxOptions) -> DbResult<Self> {
        let client = Arc::new(client);
        let sql = opts.begin_sql();
        let began = ctx
            .run(async {
                client
                    .simple_query(&sql)
                    .await
                    .map_err(|e| DbError::ExecutionError(format!("postgres begin error: {e}")))
            })
            .await;
        match began {
            Ok(_) => Ok(Self {
                client,
                done: false,
            }),
            Err(err) => {
                // the BEGIN may have reached the server before the context finished
                if err.is_cancelled() {
                    spawn_rollback(client);
                }
                Err(err)
            }
        }
    }

    async fn finish(&mut self, sql: &str, action: &str) -> DbResult<()> {
        if self.done {
            return Err(DbError::TxDone);
        }
        self.done = true;
        match self.client.simple_query(sql).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let _ = self.client.simple_query("ROLLBACK").await;
                Err(DbError::ExecutionError(format!("postgres {action} error: {e}")))
            }
        }
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl Drop for PgTx {
    fn drop(&mut self) {
        if !self.done {
            spawn_rollback(Arc::clone(&self.client));
        }
    }
}

#[async_trait]
impl Db for PgTx {
    async fn query_context(
        &self,
        ctx: &Context,
        query: &str,
        params: &[RowValues],
    ) -> DbResult<Box<dyn Rows>> {
        query_on(&self.client, ctx, query, params).await
    }

    async fn exec_context(
        &self,
        ctx: &Context,
        query: &str,
        params: &[RowValues],
    ) -> DbResult<ExecResult> {
        exec_on(&self.client, ctx, query, params).await
    }

    async fn begin(&self, _ctx: &Context, _opts: &TxOptions) -> DbResult<Box<dyn Tx>> {
        Err(DbError::NestedTransaction)
    }

    async fn close(&self) -> DbResult<()> {
        Err(DbError::CannotCloseTx)
    }
}

#[async_trait]
impl Tx for PgTx {
    async fn commit(&mut self) -> DbResult<()> {
        self.finish("COMMIT", "commit").await
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.finish("ROLLBACK", "rollback").await
    }
}

#[async_trait]
impl StmtPreparor for PgTx {
    type Stmt = PgStmt;

    async fn prepare_context(&self, ctx: &Context, query: &str) -> DbResult<PgStmt> {
        prepare_on(&self.client, ctx, query).await
    }
}
