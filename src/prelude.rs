//! Convenient imports for common functionality.

pub use crate::config::Config;
pub use crate::context::Context;
pub use crate::database::{Database, Simple};
pub use crate::error::{DbError, DbResult};
pub use crate::scan::{ScanDest, scan_one, scan_one_into};
pub use crate::scope::{tx_do, with_stmt, with_tx, with_tx_stmt};
pub use crate::traits::{
    Db, Pingable, Rows, Scannable, Scanner, Stmt, StmtPreparor, Tx, TxBeginor,
};
pub use crate::tx::begin;
pub use crate::types::{RowValues, TxOptions};
pub use crate::wait::{WaitOptions, wait_for};
