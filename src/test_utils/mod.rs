//! Scripted fakes for the capability traits.
//!
//! Each fake writes the calls it receives into a shared [`CallLog`], so a test can assert on
//! the exact order of prepare/exec/commit/rollback/close across several fakes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[cfg(test)]
mod capture;
mod db;
mod rows;
mod tx;

#[cfg(test)]
pub(crate) use capture::LogCapture;
pub use db::{MockDb, MockPingable};
pub use rows::MockRows;
pub use tx::{MockStmt, MockStmtPreparor, MockTx, MockTxBeginor};

/// Ordered record of calls made against the fakes sharing it.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn record(&self, call: impl Into<String>) {
        self.entries().push(call.into());
    }

    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.entries().clone()
    }

    /// How many times `call` was recorded.
    #[must_use]
    pub fn count(&self, call: &str) -> usize {
        self.entries().iter().filter(|c| *c == call).count()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    fn entries(&self) -> MutexGuard<'_, Vec<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn locked<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_is_shared_between_clones() {
        let log = CallLog::default();
        let other = log.clone();
        log.record("a");
        other.record("b");
        other.record("a");
        assert_eq!(log.calls(), ["a", "b", "a"]);
        assert_eq!(log.count("a"), 2);
        log.clear();
        assert!(other.calls().is_empty());
    }
}
