//! Starting a transaction from whatever handle the caller has.

use std::any::{Any, type_name};

use deadpool_postgres::Pool;

use crate::context::Context;
use crate::database::{Database, Simple};
use crate::error::{DbError, DbResult};
use crate::postgres::PgTx;
use crate::traits::{Db, DynTxBeginor, Tx, TxBeginor};
use crate::types::TxOptions;

/// The handles [`begin`] knows how to start a transaction from.
pub enum BeginSource<'a> {
    /// An open transaction. Always rejected.
    Tx(&'a dyn Tx),
    /// A connection abstraction; uses [`Db::begin`].
    Db(&'a dyn Db),
    /// A raw driver pool.
    Pool(&'a Pool),
    /// Anything able to begin a transaction.
    Beginor(&'a dyn DynTxBeginor),
    /// A handle of an unknown type, kept for the error message.
    Unsupported(&'static str),
}

impl<'a> BeginSource<'a> {
    /// Classify `value` by the capabilities of its concrete type.
    #[must_use]
    pub fn inspect<T: Any>(value: &'a T) -> Self {
        let any: &'a dyn Any = value;
        if let Some(tx) = any.downcast_ref::<PgTx>() {
            Self::Tx(tx)
        } else if let Some(tx) = any.downcast_ref::<Box<dyn Tx>>() {
            Self::Tx(tx.as_ref())
        } else if let Some(pool) = any.downcast_ref::<Pool>() {
            Self::Pool(pool)
        } else if let Some(db) = any.downcast_ref::<Database>() {
            Self::Db(db)
        } else if let Some(db) = any.downcast_ref::<Simple>() {
            Self::Db(db)
        } else if let Some(db) = any.downcast_ref::<Box<dyn Db>>() {
            Self::Db(db.as_ref())
        } else {
            Self::Unsupported(type_name::<T>())
        }
    }

    /// A transaction-beginning capability.
    pub fn beginor<B>(beginor: &'a B) -> Self
    where
        B: TxBeginor,
        B::Tx: 'static,
    {
        Self::Beginor(beginor)
    }
}

impl<'a> From<&'a Pool> for BeginSource<'a> {
    fn from(pool: &'a Pool) -> Self {
        Self::Pool(pool)
    }
}

impl<'a> From<&'a Database> for BeginSource<'a> {
    fn from(db: &'a Database) -> Self {
        Self::Db(db)
    }
}

impl<'a> From<&'a Simple> for BeginSource<'a> {
    fn from(db: &'a Simple) -> Self {
        Self::Db(db)
    }
}

impl<'a> From<&'a PgTx> for BeginSource<'a> {
    fn from(tx: &'a PgTx) -> Self {
        Self::Tx(tx)
    }
}

impl<'a> From<&'a dyn Db> for BeginSource<'a> {
    fn from(db: &'a dyn Db) -> Self {
        Self::Db(db)
    }
}

impl<'a> From<&'a dyn Tx> for BeginSource<'a> {
    fn from(tx: &'a dyn Tx) -> Self {
        Self::Tx(tx)
    }
}

impl<'a> From<&'a dyn DynTxBeginor> for BeginSource<'a> {
    fn from(beginor: &'a dyn DynTxBeginor) -> Self {
        Self::Beginor(beginor)
    }
}

/// Begin a transaction on `source` with `opts` (the default options when `None`).
///
/// # Errors
/// `DbError::NestedTransaction` for a transaction, `DbError::UnsupportedHandle` for an
/// unknown handle, otherwise whatever beginning the transaction returned.
pub async fn begin<'a>(
    ctx: &Context,
    opts: Option<TxOptions>,
    source: impl Into<BeginSource<'a>>,
) -> DbResult<Box<dyn Tx>> {
    let opts = opts.unwrap_or_default();
    match source.into() {
        BeginSource::Tx(_) => Err(DbError::NestedTransaction),
        BeginSource::Db(db) => db.begin(ctx, &opts).await,
        BeginSource::Pool(pool) => Ok(Box::new(pool.begin_tx(ctx, &opts).await?)),
        BeginSource::Beginor(beginor) => beginor.begin_dyn(ctx, &opts).await,
        BeginSource::Unsupported(name) => Err(DbError::UnsupportedHandle(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::test_utils::{CallLog, MockDb, MockTx, MockTxBeginor};
    use crate::types::IsolationLevel;

    #[tokio::test]
    async fn begins_through_db() {
        let ctx = Context::background();
        let log = CallLog::default();
        let db = MockDb::new(log.clone());
        let mut tx = begin(&ctx, None, &db as &dyn Db).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(log.calls(), ["db.begin", "tx.commit"]);
    }

    #[tokio::test]
    async fn begins_through_beginor_with_options() {
        let ctx = Context::background();
        let log = CallLog::default();
        let beginor = MockTxBeginor::new(log.clone());
        let opts = TxOptions::default()
            .isolation(IsolationLevel::RepeatableRead)
            .read_only(true);
        let mut tx = begin(&ctx, Some(opts), BeginSource::beginor(&beginor))
            .await
            .unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(beginor.seen_options(), [opts]);
        assert_eq!(log.calls(), ["begin", "tx.rollback"]);
    }

    #[tokio::test]
    async fn rejects_nested_transaction() {
        let ctx = Context::background();
        let log = CallLog::default();
        let tx = MockTx::new(log.clone());
        let err = begin(&ctx, None, &tx as &dyn Tx).await.err().unwrap();
        assert!(matches!(err, DbError::NestedTransaction));
        assert!(log.calls().is_empty());
    }

    #[tokio::test]
    async fn inspect_classifies_boxed_handles() {
        let ctx = Context::background();
        let log = CallLog::default();
        let boxed_tx: Box<dyn Tx> = Box::new(MockTx::new(log.clone()));
        assert!(matches!(BeginSource::inspect(&boxed_tx), BeginSource::Tx(_)));

        let boxed_db: Box<dyn Db> = Box::new(MockDb::new(log.clone()));
        let tx = begin(&ctx, None, BeginSource::inspect(&boxed_db)).await;
        assert!(tx.is_ok());
        assert_eq!(log.calls(), ["db.begin"]);
    }

    #[tokio::test]
    async fn unknown_handle_names_its_type() {
        let ctx = Context::background();
        let err = begin(&ctx, None, BeginSource::inspect(&42_u32))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DbError::UnsupportedHandle(ref name) if name == "u32"));
        assert!(err.to_string().contains("u32"));
    }

    #[tokio::test]
    async fn pool_source_honours_cancelled_context() {
        let pool = Config::default()
            .with_dbname("app")
            .with_user("app")
            .create_pg_pool()
            .unwrap();
        assert!(matches!(BeginSource::inspect(&pool), BeginSource::Pool(_)));

        let ctx = Context::background();
        ctx.cancel();
        let err = begin(&ctx, None, &pool).await.err().unwrap();
        assert!(err.is_cancelled());
    }
}
