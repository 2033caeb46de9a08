//! Capability traits the helpers are written against.
//!
//! Each capability is a separate trait so a helper only asks for what it uses and tests can
//! hand it a minimal fake (see the `test_utils` module).

use async_trait::async_trait;

use crate::context::Context;
use crate::error::DbResult;
use crate::scan::ScanDest;
use crate::types::{ExecResult, RowValues, TxOptions};

/// Something that can copy the current row into destination bindings.
pub trait Scanner: Send {
    /// Assign column `i` of the current row to `dest[i]`.
    ///
    /// # Errors
    /// Returns `DbError::ScanError` if there is no current row, the column count differs from
    /// `dest.len()`, or a value does not fit its destination.
    fn scan(&mut self, dest: &mut [&mut dyn ScanDest]) -> DbResult<()>;
}

/// A type that knows how to populate itself from a [`Scanner`].
pub trait Scannable {
    /// # Errors
    /// Propagates the scanner's error.
    fn scan_from(&mut self, scanner: &mut dyn Scanner) -> DbResult<()>;
}

/// Result set iterator returned by queries. Must be closed exactly once.
#[async_trait]
pub trait Rows: Scanner {
    /// Advance to the next row. `false` once exhausted or after an iteration error.
    async fn next(&mut self) -> bool;

    /// Take the error that stopped iteration, if any.
    fn take_err(&mut self) -> Option<crate::DbError>;

    async fn close(&mut self) -> DbResult<()>;
}

/// Reachability probe.
#[async_trait]
pub trait Pingable: Send + Sync {
    async fn ping(&self) -> DbResult<()>;

    async fn ping_context(&self, ctx: &Context) -> DbResult<()>;
}

/// A prepared statement. Closing consumes it.
#[async_trait]
pub trait Stmt: Send + Sync {
    async fn exec(&self, ctx: &Context, params: &[RowValues]) -> DbResult<ExecResult>;

    async fn query(&self, ctx: &Context, params: &[RowValues]) -> DbResult<Box<dyn Rows>>;

    async fn close(self) -> DbResult<()>
    where
        Self: Sized;
}

#[async_trait]
pub trait StmtPreparor: Send + Sync {
    type Stmt: Stmt;

    async fn prepare_context(&self, ctx: &Context, query: &str) -> DbResult<Self::Stmt>;
}

#[async_trait]
pub trait TxBeginor: Send + Sync {
    type Tx: Tx;

    async fn begin_tx(&self, ctx: &Context, opts: &TxOptions) -> DbResult<Self::Tx>;
}

/// Object-safe form of [`TxBeginor`], implemented for every `TxBeginor`.
#[async_trait]
pub trait DynTxBeginor: Send + Sync {
    async fn begin_dyn(&self, ctx: &Context, opts: &TxOptions) -> DbResult<Box<dyn Tx>>;
}

#[async_trait]
impl<B> DynTxBeginor for B
where
    B: TxBeginor,
    B::Tx: 'static,
{
    async fn begin_dyn(&self, ctx: &Context, opts: &TxOptions) -> DbResult<Box<dyn Tx>> {
        let tx = self.begin_tx(ctx, opts).await?;
        Ok(Box::new(tx))
    }
}

/// Abstract database handle.
#[async_trait]
pub trait Db: Send + Sync {
    async fn query_context(
        &self,
        ctx: &Context,
        query: &str,
        params: &[RowValues],
    ) -> DbResult<Box<dyn Rows>>;

    async fn exec_context(
        &self,
        ctx: &Context,
        query: &str,
        params: &[RowValues],
    ) -> DbResult<ExecResult>;

    async fn begin(&self, ctx: &Context, opts: &TxOptions) -> DbResult<Box<dyn Tx>>;

    async fn close(&self) -> DbResult<()>;
}

/// A transaction. After the first `commit` or `rollback` both return `DbError::TxDone`.
#[async_trait]
pub trait Tx: Db {
    async fn commit(&mut self) -> DbResult<()>;

    async fn rollback(&mut self) -> DbResult<()>;
}

impl<S: Scanner + ?Sized> Scanner for Box<S> {
    fn scan(&mut self, dest: &mut [&mut dyn ScanDest]) -> DbResult<()> {
        (**self).scan(dest)
    }
}

#[async_trait]
impl<R: Rows + ?Sized> Rows for Box<R> {
    async fn next(&mut self) -> bool {
        (**self).next().await
    }

    fn take_err(&mut self) -> Option<crate::DbError> {
        (**self).take_err()
    }

    async fn close(&mut self) -> DbResult<()> {
        (**self).close().await
    }
}

impl<S: Scanner + ?Sized> Scanner for &mut S {
    fn scan(&mut self, dest: &mut [&mut dyn ScanDest]) -> DbResult<()> {
        (**self).scan(dest)
    }
}

#[async_trait]
impl<R: Rows + ?Sized> Rows for &mut R {
    async fn next(&mut self) -> bool {
        (**self).next().await
    }

    fn take_err(&mut self) -> Option<crate::DbError> {
        (**self).take_err()
    }

    async fn close(&mut self) -> DbResult<()> {
        (**self).close().await
    }
}
