//! Small helpers around a SQL connection pool.
//!
//! - [`Config`] builds connection settings from explicit values and environment variables and
//!   renders them as a URI or a postgres pool.
//! - Capability traits ([`Db`], [`Tx`], [`Rows`], [`Pingable`], [`StmtPreparor`],
//!   [`TxBeginor`]) that the helpers are written against, so they can be driven by a fake.
//! - Scoped helpers ([`with_stmt`], [`with_tx`], [`with_tx_stmt`], [`tx_do`]) that always
//!   release the statement or transaction they open.
//! - [`scan_one`] for single-row queries and [`wait_for`] for waiting until a database is up.
//!
//! ```rust,no_run
//! use sql_helpers::prelude::*;
//!
//! # async fn demo() -> DbResult<()> {
//! let pool = Config::from_env()?.create_pg_pool()?;
//! let ctx = Context::background();
//! wait_for(&ctx, &pool, WaitOptions::new()).await?;
//!
//! let db = Database::new(pool);
//! let mut name = String::new();
//! let rows = db
//!     .query_context(&ctx, "SELECT name FROM users WHERE id = $1", &[RowValues::Int(1)])
//!     .await?;
//! scan_one(rows, &mut [&mut name]).await?;
//!
//! with_tx(&ctx, &db, None, async |tx| {
//!     tx.exec_context(&ctx, "UPDATE users SET seen = now() WHERE id = $1", &[RowValues::Int(1)])
//!         .await
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod context;
pub mod database;
pub mod error;
pub mod postgres;
pub mod prelude;
pub mod scan;
pub mod scope;
pub mod traits;
pub mod tx;
pub mod types;
pub mod wait;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{Config, EnvSource, ProcessEnv};
pub use context::{CancelCause, Context};
pub use database::{Database, Simple};
pub use error::{DbError, DbResult};
pub use postgres::{PgRows, PgStmt, PgTx};
pub use scan::{ScanDest, scan_one, scan_one_into};
pub use scope::{tx_do, with_stmt, with_tx, with_tx_stmt};
pub use traits::{
    Db, DynTxBeginor, Pingable, Rows, Scannable, Scanner, Stmt, StmtPreparor, Tx, TxBeginor,
};
pub use tx::{BeginSource, begin};
pub use types::{DatabaseType, ExecResult, IsolationLevel, RowValues, TxOptions};
pub use wait::{WaitOptions, wait_for};
