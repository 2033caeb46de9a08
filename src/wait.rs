//! Block until a database answers pings.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval_at};
use tracing::{Dispatch, dispatcher, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::context::Context;
use crate::error::{DbError, DbResult};
use crate::traits::Pingable;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
const MIN_INTERVAL: Duration = Duration::from_millis(1);
// Roughly thirty years. Keeps `now + interval` representable.
const MAX_INTERVAL: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Settings for [`wait_for`].
#[derive(Clone)]
pub struct WaitOptions {
    interval: Duration,
    timeout: Option<Duration>,
    logger: Option<Dispatch>,
    clock: Arc<dyn Clock>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: None,
            logger: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl fmt::Debug for WaitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitOptions")
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("logger", &self.logger.is_some())
            .finish_non_exhaustive()
    }
}

impl WaitOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Time between retries after the first failed ping. Clamped to between one millisecond
    /// and about thirty years.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval.clamp(MIN_INTERVAL, MAX_INTERVAL);
        self
    }

    /// Give up after `timeout`. A zero timeout, or one too large to turn into a deadline,
    /// means wait forever.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Where progress is logged. Defaults to the dispatcher current when `wait_for` runs.
    #[must_use]
    pub fn logger(mut self, logger: Dispatch) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Time source used to turn the timeout into a deadline.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn get_interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Wait until `db` answers a ping.
///
/// The first ping goes out immediately through `ping_context`; after that `db` is pinged
/// once per interval until it answers or `ctx` (bounded by the configured timeout) finishes.
///
/// ```rust,no_run
/// # use std::time::Duration;
/// # use sql_helpers::{Config, Context, DbResult, WaitOptions, wait_for};
/// # async fn demo() -> DbResult<()> {
/// let pool = Config::from_env()?.create_pg_pool()?;
/// let opts = WaitOptions::new()
///     .interval(Duration::from_millis(500))
///     .timeout(Duration::from_secs(30));
/// wait_for(&Context::background(), &pool, opts).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// Returns `DbError::Timeout` carrying the cancellation cause if the database was not reached
/// before the deadline or `ctx` was cancelled.
pub async fn wait_for<P>(ctx: &Context, db: &P, opts: WaitOptions) -> DbResult<()>
where
    P: Pingable + ?Sized,
{
    let logger = opts
        .logger
        .unwrap_or_else(|| dispatcher::get_default(Dispatch::clone));
    let deadline = opts
        .timeout
        .and_then(|timeout| opts.clock.now().checked_add(timeout));
    let ctx = match deadline {
        Some(deadline) => ctx.with_deadline(deadline),
        None => ctx.child(),
    };

    if db.ping_context(&ctx).await.is_ok() {
        return Ok(());
    }

    // interval is at most MAX_INTERVAL
    let start = tokio::time::Instant::now() + opts.interval;
    let mut ticker = interval_at(start, opts.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            cause = ctx.finished() => {
                return Err(DbError::Timeout { cause });
            }
            _ = ticker.tick() => {
                match db.ping().await {
                    Ok(()) => {
                        dispatcher::with_default(&logger, || info!("database connected"));
                        return Ok(());
                    }
                    Err(err) => dispatcher::with_default(&logger, || {
                        warn!(error = %err, "failed to ping database, retrying...");
                    }),
                }
            }
        }
    }
}
