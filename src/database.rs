//! [`Db`] implementations over a postgres connection pool.
//!
//! Use [`Database`] when failed statements should be logged and [`Simple`] when nothing but
//! the trait implementations is wanted.

use async_trait::async_trait;
use deadpool_postgres::Pool;
use tracing::{Dispatch, debug, dispatcher};

use crate::context::Context;
use crate::error::DbResult;
use crate::postgres::{PgStmt, PgTx, exec_pool, query_pool};
use crate::traits::{Db, Pingable, Rows, StmtPreparor, Tx, TxBeginor};
use crate::types::{ExecResult, RowValues, TxOptions};

/// A pool wrapper that logs failed queries and statements at debug level to its own logger.
///
/// The default logger discards everything:
/// ```rust,no_run
/// # use sql_helpers::{Config, Database, DbResult};
/// # fn demo() -> DbResult<()> {
/// let pool = Config::from_env()?.create_pg_pool()?;
/// let db = Database::new(pool).with_logger(tracing::Dispatch::default());
/// # let _ = db;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Database {
    pool: Pool,
    logger: Dispatch,
}

impl Database {
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            logger: Dispatch::none(),
        }
    }

    #[must_use]
    pub fn with_logger(mut self, logger: Dispatch) -> Self {
        self.logger = logger;
        self
    }

    #[must_use]
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    #[must_use]
    pub fn logger(&self) -> &Dispatch {
        &self.logger
    }

    #[must_use]
    pub fn into_pool(self) -> Pool {
        self.pool
    }

    fn log_failure<T>(&self, query: &str, result: DbResult<T>) -> DbResult<T> {
        if let Err(err) = &result {
            dispatcher::with_default(&self.logger, || {
                debug!(error = %err, "{query}");
            });
        }
        result
    }
}

#[async_trait]
impl Db for Database {
    async fn query_context(
        &self,
        ctx: &Context,
        query: &str,
        params: &[RowValues],
    ) -> DbResult<Box<dyn Rows>> {
        let result = query_pool(&self.pool, ctx, query, params).await;
        self.log_failure(query, result)
    }

    async fn exec_context(
        &self,
        ctx: &Context,
        query: &str,
        params: &[RowValues],
    ) -> DbResult<ExecResult> {
        let result = exec_pool(&self.pool, ctx, query, params).await;
        self.log_failure(query, result)
    }

    async fn begin(&self, ctx: &Context, opts: &TxOptions) -> DbResult<Box<dyn Tx>> {
        let tx = self.pool.begin_tx(ctx, opts).await?;
        Ok(Box::new(tx))
    }

    async fn close(&self) -> DbResult<()> {
        self.pool.close();
        Ok(())
    }
}

#[async_trait]
impl Pingable for Database {
    async fn ping(&self) -> DbResult<()> {
        self.pool.ping().await
    }

    async fn ping_context(&self, ctx: &Context) -> DbResult<()> {
        self.pool.ping_context(ctx).await
    }
}

#[async_trait]
impl TxBeginor for Database {
    type Tx = PgTx;

    async fn begin_tx(&self, ctx: &Context, opts: &TxOptions) -> DbResult<PgTx> {
        self.pool.begin_tx(ctx, opts).await
    }
}

#[async_trait]
impl StmtPreparor for Database {
    type Stmt = PgStmt;

    async fn prepare_context(&self, ctx: &Context, query: &str) -> DbResult<PgStmt> {
        self.pool.prepare_context(ctx, query).await
    }
}

/// Bare pool wrapper implementing [`Db`]. No logging.
#[derive(Clone)]
pub struct Simple {
    pool: Pool,
}

impl Simple {
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl Db for Simple {
    async fn query_context(
        &self,
        ctx: &Context,
        query: &str,
        params: &[RowValues],
    ) -> DbResult<Box<dyn Rows>> {
        query_pool(&self.pool, ctx, query, params).await
    }

    async fn exec_context(
        &self,
        ctx: &Context,
        query: &str,
        params: &[RowValues],
    ) -> DbResult<ExecResult> {
        exec_pool(&self.pool, ctx, query, params).await
    }

    async fn begin(&self, ctx: &Context, opts: &TxOptions) -> DbResult<Box<dyn Tx>> {
        let tx = self.pool.begin_tx(ctx, opts).await?;
        Ok(Box::new(tx))
    }

    async fn close(&self) -> DbResult<()> {
        self.pool.close();
        Ok(())
    }
}

#[async_trait]
impl Pingable for Simple {
    async fn ping(&self) -> DbResult<()> {
        self.pool.ping().await
    }

    async fn ping_context(&self, ctx: &Context) -> DbResult<()> {
        self.pool.ping_context(ctx).await
    }
}

#[async_trait]
impl TxBeginor for Simple {
    type Tx = PgTx;

    async fn begin_tx(&self, ctx: &Context, opts: &TxOptions) -> DbResult<PgTx> {
        self.pool.begin_tx(ctx, opts).await
    }
}

#[async_trait]
impl StmtPreparor for Simple {
    type Stmt = PgStmt;

    async fn prepare_context(&self, ctx: &Context, query: &str) -> DbResult<PgStmt> {
        self.pool.prepare_context(ctx, query).await
    }
}
