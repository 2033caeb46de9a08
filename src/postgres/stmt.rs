use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::Object;
use tokio_postgres::Statement;

use super::params::Params;
use super::rows::PgRows;
use crate::context::Context;
use crate::error::{DbError, DbResult};
use crate::traits::{Rows, Stmt};
use crate::types::{ExecResult, RowValues};

/// A statement prepared on one pooled connection.
///
/// The server-side statement is deallocated when the `PgStmt` is closed or dropped.
pub struct PgStmt {
    client: Arc<Object>,
    stmt: Statement,
}

impl PgStmt {
    pub(crate) fn new(client: Arc<Object>, stmt: Statement) -> Self {
        Self { client, stmt }
    }

    #[must_use]
    pub fn statement(&self) -> &Statement {
        &self.stmt
    }
}

#[async_trait]
impl Stmt for PgStmt {
    async fn exec(&self, ctx: &Context, params: &[RowValues]) -> DbResult<ExecResult> {
        let converted = Params::convert(params);
        let rows_affected = ctx
            .run(async {
                self.client
                    .execute(&self.stmt, converted.as_refs())
                    .await
                    .map_err(|e| DbError::ExecutionError(format!("postgres execute error: {e}")))
            })
            .await?;
        Ok(ExecResult { rows_affected })
    }

    async fn query(&self, ctx: &Context, params: &[RowValues]) -> DbResult<Box<dyn Rows>> {
        let stream = ctx
            .run(async {
                self.client
                    .query_raw(&self.stmt, params.iter())
                    .await
                    .map_err(|e| DbError::ExecutionError(format!("postgres select error: {e}")))
            })
            .await?;
        Ok(Box::new(PgRows::new(stream, Some(Arc::clone(&self.client)))))
    }

    async fn close(self) -> DbResult<()> {
        drop(self.stmt);
        Ok(())
    }
}
