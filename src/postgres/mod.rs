// PostgreSQL adapters - the capability traits implemented on top of deadpool-postgres
//
// - params: conversion of RowValues into tokio-postgres parameters
// - query: cell extraction and the per-connection query/exec/prepare helpers
// - rows: streaming result set
// - stmt: prepared statement bound to a pooled connection
// - tx: transaction on a pooled connection
// - pool: trait impls for deadpool_postgres::Pool

pub mod params;
pub mod query;
pub mod rows;
pub mod stmt;
pub mod tx;

mod pool;

pub(crate) use pool::{acquire, exec_pool, query_pool};
pub use params::Params;
pub use query::extract_value;
pub use rows::PgRows;
pub use stmt::PgStmt;
pub use tx::PgTx;
