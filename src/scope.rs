//! Helpers that tie a prepared statement or transaction to the lifetime of one callback.
//!
//! The resource a helper acquires is always released before the helper returns. Errors are
//! reported with a fixed precedence: acquiring the resource, then the callback, then
//! releasing it. Lower-priority errors that lose are logged at debug level.

use tracing::debug;

use crate::context::Context;
use crate::error::DbError;
use crate::traits::{Stmt, StmtPreparor, Tx, TxBeginor};
use crate::types::TxOptions;

/// Prepare `query`, run `f` with the statement and close the statement.
///
/// ```rust,no_run
/// # use sql_helpers::{Context, DbError, RowValues, Simple, Stmt, with_stmt};
/// # async fn demo(db: &Simple) -> Result<(), DbError> {
/// let ctx = Context::background();
/// let affected = with_stmt(&ctx, db, "DELETE FROM t WHERE id = $1", async |stmt| {
///     stmt.exec(&ctx, &[RowValues::Int(7)]).await
/// })
/// .await?;
/// # let _ = affected;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// The prepare error (and `f` is never called), else the error from `f`, else the error
/// from closing the statement.
pub async fn with_stmt<P, T, E, F>(ctx: &Context, db: &P, query: &str, f: F) -> Result<T, E>
where
    P: StmtPreparor + ?Sized,
    E: From<DbError>,
    F: AsyncFnOnce(&P::Stmt) -> Result<T, E>,
{
    let stmt = db.prepare_context(ctx, query).await?;
    let result = f(&stmt).await;
    let closed = stmt.close().await;
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err.into()),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            debug!(error = %close_err, query, "statement close failed after callback error");
            Err(err)
        }
    }
}

/// Begin a transaction, run `f` in it and commit if `f` succeeds.
///
/// A rollback is always attempted afterwards; once the transaction was committed that
/// rollback reports `TxDone`, which is ignored.
///
/// # Errors
/// The begin error (and `f` is never called), else the error from `f` (no commit), else the
/// commit error, else a rollback error other than `TxDone`.
pub async fn with_tx<B, T, E, F>(
    ctx: &Context,
    db: &B,
    opts: Option<TxOptions>,
    f: F,
) -> Result<T, E>
where
    B: TxBeginor + ?Sized,
    E: From<DbError>,
    F: AsyncFnOnce(&mut B::Tx) -> Result<T, E>,
{
    let opts = opts.unwrap_or_default();
    let mut tx = db.begin_tx(ctx, &opts).await?;
    run_in_tx(&mut tx, f).await
}

/// [`with_tx`] around [`with_stmt`]: the statement is prepared inside the transaction and
/// closed before the transaction finishes.
///
/// # Errors
/// As for [`with_tx`] and [`with_stmt`].
pub async fn with_tx_stmt<B, T, E, F>(
    ctx: &Context,
    db: &B,
    opts: Option<TxOptions>,
    query: &str,
    f: F,
) -> Result<T, E>
where
    B: TxBeginor + ?Sized,
    B::Tx: StmtPreparor,
    E: From<DbError>,
    F: AsyncFnOnce(&<B::Tx as StmtPreparor>::Stmt) -> Result<T, E>,
{
    with_tx(ctx, db, opts, async move |tx: &mut B::Tx| {
        with_stmt(ctx, &*tx, query, f).await
    })
    .await
}

/// [`with_tx`] for a transaction the caller already started.
///
/// If `ctx` is already done the callback is skipped and the transaction rolled back.
///
/// # Errors
/// `DbError::Context` for a finished context, otherwise as for [`with_tx`].
pub async fn tx_do<X, T, E, F>(ctx: &Context, tx: &mut X, f: F) -> Result<T, E>
where
    X: Tx + ?Sized,
    E: From<DbError>,
    F: AsyncFnOnce(&mut X) -> Result<T, E>,
{
    if let Some(cause) = ctx.err() {
        if let Err(err) = tx.rollback().await {
            debug!(error = %err, "rollback of abandoned transaction failed");
        }
        return Err(DbError::Context(cause).into());
    }
    run_in_tx(tx, f).await
}

async fn run_in_tx<X, T, E, F>(tx: &mut X, f: F) -> Result<T, E>
where
    X: Tx + ?Sized,
    E: From<DbError>,
    F: AsyncFnOnce(&mut X) -> Result<T, E>,
{
    let mut result = match f(&mut *tx).await {
        Ok(value) => tx.commit().await.map(|()| value).map_err(E::from),
        Err(err) => Err(err),
    };
    if let Err(rollback_err) = tx.rollback().await {
        if result.is_ok() && !rollback_err.is_tx_done() {
            result = Err(rollback_err.into());
        } else if !rollback_err.is_tx_done() {
            debug!(error = %rollback_err, "rollback failed after earlier error");
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancelCause;
    use crate::test_utils::{CallLog, MockStmt, MockStmtPreparor, MockTx, MockTxBeginor};
    use crate::types::{ExecResult, IsolationLevel};

    fn boom() -> DbError {
        DbError::Other("boom".into())
    }

    fn is_boom(err: &DbError) -> bool {
        matches!(err, DbError::Other(m) if m == "boom")
    }

    #[tokio::test]
    async fn with_stmt_prepare_failure_skips_callback() {
        let ctx = Context::background();
        let log = CallLog::default();
        let mut called = false;
        let db = MockStmtPreparor::new(log.clone()).fail_next_prepare(DbError::Timeout {
            cause: CancelCause::DeadlineExceeded,
        });
        let res: Result<(), DbError> =
            with_stmt(&ctx, &db, "select * from table where id = $1", async |_stmt| {
                called = true;
                Ok(())
            })
            .await;
        assert!(!called);
        assert!(res.unwrap_err().is_timeout());
        assert_eq!(log.calls(), ["prepare select * from table where id = $1"]);
    }

    #[tokio::test]
    async fn with_stmt_closes_after_success() {
        let ctx = Context::background();
        let log = CallLog::default();
        let db = MockStmtPreparor::new(log.clone());
        let res: Result<ExecResult, DbError> = with_stmt(&ctx, &db, "delete", async |stmt| {
            stmt.exec(&ctx, &[]).await
        })
        .await;
        assert_eq!(res.unwrap(), ExecResult::default());
        assert_eq!(log.calls(), ["prepare delete", "stmt.exec", "stmt.close"]);
    }

    #[tokio::test]
    async fn with_stmt_callback_error_beats_close_error() {
        let ctx = Context::background();
        let log = CallLog::default();
        let db = MockStmtPreparor::new(log.clone())
            .with_stmt(MockStmt::new(log.clone()).with_close_error(DbError::Other("close".into())));
        let res: Result<(), DbError> = with_stmt(&ctx, &db, "q", async |_stmt| Err(boom())).await;
        assert!(is_boom(&res.unwrap_err()));
        assert_eq!(log.count("stmt.close"), 1);
    }

    #[tokio::test]
    async fn with_stmt_reports_close_error_after_success() {
        let ctx = Context::background();
        let log = CallLog::default();
        let db = MockStmtPreparor::new(log.clone())
            .with_stmt(MockStmt::new(log.clone()).with_close_error(boom()));
        let res: Result<u8, DbError> = with_stmt(&ctx, &db, "q", async |_stmt| Ok(1)).await;
        assert!(is_boom(&res.unwrap_err()));
    }

    #[tokio::test]
    async fn with_stmt_cancelled_context_aborts_prepare() {
        let ctx = Context::background();
        ctx.cancel();
        let log = CallLog::default();
        let mut called = false;
        let db = MockStmtPreparor::new(log.clone());
        let res: Result<(), DbError> = with_stmt(&ctx, &db, "q", async |_stmt| {
            called = true;
            Ok(())
        })
        .await;
        assert!(!called);
        assert_eq!(res.unwrap_err().cancel_cause(), Some(CancelCause::Cancelled));
        assert_eq!(log.count("stmt.close"), 0);
    }

    #[tokio::test]
    async fn with_tx_begin_failure_skips_callback() {
        let ctx = Context::background();
        let log = CallLog::default();
        let mut called = false;
        let db = MockTxBeginor::new(log.clone()).fail_next_begin(boom());
        let res: Result<(), DbError> = with_tx(&ctx, &db, None, async |_tx| {
            called = true;
            Ok(())
        })
        .await;
        assert!(!called);
        assert!(is_boom(&res.unwrap_err()));
        assert_eq!(log.calls(), ["begin"]);
        assert_eq!(db.seen_options(), [TxOptions::default()]);
    }

    #[tokio::test]
    async fn with_tx_commits_once_on_success() {
        let ctx = Context::background();
        let log = CallLog::default();
        let db = MockTxBeginor::new(log.clone());
        let opts = TxOptions::default().isolation(IsolationLevel::Serializable);
        let res: Result<&str, DbError> =
            with_tx(&ctx, &db, Some(opts), async |_tx| Ok("done")).await;
        assert_eq!(res.unwrap(), "done");
        assert_eq!(log.calls(), ["begin", "tx.commit", "tx.rollback"]);
        assert_eq!(db.seen_options(), [opts]);
    }

    #[tokio::test]
    async fn with_tx_callback_error_rolls_back_without_commit() {
        let ctx = Context::background();
        let log = CallLog::default();
        let db = MockTxBeginor::new(log.clone());
        let res: Result<(), DbError> = with_tx(&ctx, &db, None, async |_tx| Err(boom())).await;
        assert!(is_boom(&res.unwrap_err()));
        assert_eq!(log.count("tx.commit"), 0);
        assert_eq!(log.count("tx.rollback"), 1);
    }

    #[tokio::test]
    async fn with_tx_commit_error_is_returned() {
        let ctx = Context::background();
        let log = CallLog::default();
        let db = MockTxBeginor::new(log.clone())
            .with_tx(MockTx::new(log.clone()).with_commit_error(boom()));
        let res: Result<(), DbError> = with_tx(&ctx, &db, None, async |_tx| Ok(())).await;
        assert!(is_boom(&res.unwrap_err()));
        assert_eq!(log.calls(), ["begin", "tx.commit", "tx.rollback"]);
    }

    #[tokio::test]
    async fn with_tx_surfaces_unexpected_rollback_error() {
        let ctx = Context::background();
        let log = CallLog::default();
        // Commit succeeds but leaves the driver open, so the trailing rollback fails for real.
        let db = MockTxBeginor::new(log.clone()).with_tx(
            MockTx::new(log.clone())
                .keep_open_after_commit()
                .with_rollback_error(boom()),
        );
        let res: Result<(), DbError> = with_tx(&ctx, &db, None, async |_tx| Ok(())).await;
        assert!(is_boom(&res.unwrap_err()));
    }

    #[tokio::test]
    async fn with_tx_stmt_prepares_inside_transaction() {
        let ctx = Context::background();
        let log = CallLog::default();
        let db = MockTxBeginor::new(log.clone());
        let res: Result<u64, DbError> =
            with_tx_stmt(&ctx, &db, None, "insert into t values (1)", async |stmt| {
                stmt.exec(&ctx, &[]).await.map(|r| r.rows_affected)
            })
            .await;
        assert_eq!(res.unwrap(), 0);
        assert_eq!(
            log.calls(),
            [
                "begin",
                "prepare insert into t values (1)",
                "stmt.exec",
                "stmt.close",
                "tx.commit",
                "tx.rollback"
            ]
        );
    }

    #[tokio::test]
    async fn with_tx_stmt_begin_failure_skips_callback() {
        let ctx = Context::background();
        let log = CallLog::default();
        let mut called = false;
        let db = MockTxBeginor::new(log.clone()).fail_next_begin(boom());
        let res: Result<(), DbError> = with_tx_stmt(&ctx, &db, None, "", async |_stmt| {
            called = true;
            Ok(())
        })
        .await;
        assert!(!called);
        assert!(is_boom(&res.unwrap_err()));
        assert_eq!(log.calls(), ["begin"]);
    }

    #[tokio::test]
    async fn tx_do_commits_existing_transaction() {
        let ctx = Context::background();
        let log = CallLog::default();
        let mut tx = MockTx::new(log.clone());
        let res: Result<(), DbError> = tx_do(&ctx, &mut tx, async |_tx| Ok(())).await;
        assert!(res.is_ok());
        assert_eq!(log.calls(), ["tx.commit", "tx.rollback"]);
        assert!(tx.is_finished());
    }

    #[tokio::test]
    async fn tx_do_on_cancelled_context_rolls_back() {
        let ctx = Context::background();
        ctx.cancel();
        let log = CallLog::default();
        let mut called = false;
        let mut tx = MockTx::new(log.clone());
        let res: Result<(), DbError> = tx_do(&ctx, &mut tx, async |_tx| {
            called = true;
            Ok(())
        })
        .await;
        assert!(!called);
        assert!(res.unwrap_err().is_cancelled());
        assert_eq!(log.calls(), ["tx.rollback"]);
    }

    #[derive(Debug)]
    enum AppError {
        Db(DbError),
        Invalid,
    }

    impl From<DbError> for AppError {
        fn from(err: DbError) -> Self {
            Self::Db(err)
        }
    }

    #[tokio::test]
    async fn caller_error_type_passes_through() {
        let ctx = Context::background();
        let log = CallLog::default();
        let db = MockTxBeginor::new(log.clone());
        let res: Result<(), AppError> =
            with_tx(&ctx, &db, None, async |_tx| Err(AppError::Invalid)).await;
        assert!(matches!(res, Err(AppError::Invalid)));

        let failing = MockTxBeginor::new(log.clone()).fail_next_begin(boom());
        let res: Result<(), AppError> = with_tx(&ctx, &failing, None, async |_tx| Ok(())).await;
        assert!(matches!(res, Err(AppError::Db(ref e)) if is_boom(e)));
    }
}
