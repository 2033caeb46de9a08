//! Cooperative cancellation with an optional deadline.
//!
//! Every operation that talks to the database takes a [`Context`]. Cancelling a context, or
//! letting its deadline pass, makes any in-progress begin/prepare/ping through it return
//! [`DbError::Context`]. Child contexts are cancelled with their parent but never the other
//! way round.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{DbError, DbResult};

/// Why a [`Context`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelCause {
    /// `cancel` was called on the context or one of its parents.
    Cancelled,
    /// The context deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("canceled"),
            Self::DeadlineExceeded => f.write_str("deadline exceeded"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A child context sharing this context's deadline.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// A child context that finishes at `deadline` or at the parent's deadline, whichever
    /// comes first.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// A child context that finishes after `timeout`. A timeout too large to represent as an
    /// instant means no deadline of its own.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.child(),
        }
    }

    /// Cancel this context and all of its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `Some(cause)` once the context has finished.
    #[must_use]
    pub fn err(&self) -> Option<CancelCause> {
        if self.token.is_cancelled() {
            return Some(CancelCause::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelCause::DeadlineExceeded),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves when the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        let _ = self.finished().await;
    }

    /// Like [`Context::done`] but reports the cause.
    pub async fn finished(&self) -> CancelCause {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                () = self.token.cancelled() => CancelCause::Cancelled,
                () = tokio::time::sleep_until(deadline) => CancelCause::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                CancelCause::Cancelled
            }
        }
    }

    /// Drive `fut` unless the context finishes first.
    ///
    /// # Errors
    /// Returns `DbError::Context` if the context is (or becomes) done before `fut` completes,
    /// otherwise whatever `fut` returns.
    pub async fn run<T, F>(&self, fut: F) -> DbResult<T>
    where
        F: Future<Output = DbResult<T>>,
    {
        if let Some(cause) = self.err() {
            return Err(DbError::Context(cause));
        }
        tokio::select! {
            biased;
            cause = self.finished() => Err(DbError::Context(cause)),
            res = fut => res,
        }
    }
}
