use thiserror::Error;

use crate::context::CancelCause;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[error(transparent)]
    PoolError(#[from] deadpool_postgres::PoolError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("no rows in result set")]
    NoRows,

    #[error("transaction has already been committed or rolled back")]
    TxDone,

    #[error("cannot close a transaction, use commit or rollback")]
    CannotCloseTx,

    #[error("cannot start a transaction from a transaction")]
    NestedTransaction,

    #[error("cannot start a transaction using {0}")]
    UnsupportedHandle(String),

    #[error("context {0}")]
    Context(CancelCause),

    #[error("could not reach database: database ping timeout ({cause})")]
    Timeout { cause: CancelCause },

    #[error("Scan error: {0}")]
    ScanError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Other database error: {0}")]
    Other(String),
}

impl DbError {
    /// The result set had no row to scan.
    #[must_use]
    pub fn is_no_rows(&self) -> bool {
        matches!(self, Self::NoRows)
    }

    /// The transaction was already finished when commit or rollback was called.
    #[must_use]
    pub fn is_tx_done(&self) -> bool {
        matches!(self, Self::TxDone)
    }

    /// `wait_for` gave up before the database answered a ping.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The supplied [`Context`](crate::Context) finished before the operation did.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Context(_))
    }

    /// The cancellation cause carried by context and timeout errors.
    #[must_use]
    pub fn cancel_cause(&self) -> Option<CancelCause> {
        match self {
            Self::Context(cause) | Self::Timeout { cause } => Some(*cause),
            _ => None,
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_carries_cause() {
        let err = DbError::Timeout {
            cause: CancelCause::DeadlineExceeded,
        };
        assert!(err.is_timeout());
        assert!(!err.is_cancelled());
        assert_eq!(err.cancel_cause(), Some(CancelCause::DeadlineExceeded));
        assert!(err.to_string().contains("could not reach database"));
        assert!(err.to_string().contains("deadline exceeded"));
    }

    #[test]
    fn sentinel_predicates() {
        assert!(DbError::NoRows.is_no_rows());
        assert!(DbError::TxDone.is_tx_done());
        assert!(!DbError::CannotCloseTx.is_tx_done());
        assert!(DbError::Context(CancelCause::Cancelled).is_cancelled());
        assert_eq!(DbError::NoRows.cancel_cause(), None);
    }

    #[test]
    fn cannot_close_tx_message_points_to_commit() {
        assert!(DbError::CannotCloseTx.to_string().contains("commit or rollback"));
    }
}
