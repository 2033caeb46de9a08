use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};

use super::query::{exec_on, prepare_on, query_on};
use super::stmt::PgStmt;
use super::tx::PgTx;
use crate::context::Context;
use crate::error::{DbError, DbResult};
use crate::traits::{Pingable, Rows, StmtPreparor, TxBeginor};
use crate::types::{ExecResult, RowValues, TxOptions};

/// Check a connection out of `pool`, giving up when `ctx` finishes.
pub(crate) async fn acquire(pool: &Pool, ctx: &Context) -> DbResult<Object> {
    ctx.run(async { pool.get().await.map_err(DbError::from) })
        .await
}

pub(crate) async fn query_pool(
    pool: &Pool,
    ctx: &Context,
    query: &str,
    params: &[RowValues],
) -> DbResult<Box<dyn Rows>> {
    let client = Arc::new(acquire(pool, ctx).await?);
    query_on(&client, ctx, query, params).await
}

pub(crate) async fn exec_pool(
    pool: &Pool,
    ctx: &Context,
    query: &str,
    params: &[RowValues],
) -> DbResult<ExecResult> {
    let client = acquire(pool, ctx).await?;
    exec_on(&client, ctx, query, params).await
}

#[async_trait]
impl Pingable for Pool {
    async fn ping(&self) -> DbResult<()> {
        let client = self.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn ping_context(&self, ctx: &Context) -> DbResult<()> {
        ctx.run(self.ping()).await
    }
}

#[async_trait]
impl TxBeginor for Pool {
    type Tx = PgTx;

    async fn begin_tx(&self, ctx: &Context, opts: &TxOptions) -> DbResult<PgTx> {
        let client = acquire(self, ctx).await?;
        PgTx::start(ctx, client, opts).await
    }
}

#[async_trait]
impl StmtPreparor for Pool {
    type Stmt = PgStmt;

    async fn prepare_context(&self, ctx: &Context, query: &str) -> DbResult<PgStmt> {
        let client = Arc::new(acquire(self, ctx).await?);
        prepare_on(&client, ctx, query).await
    }
}
