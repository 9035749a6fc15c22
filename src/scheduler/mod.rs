//! Fixed-period tick scheduler
//!
//! Fires a tick callback every `frequency`, starting either immediately or on
//! the next wall-clock multiple of an aligned period. Each tick is spawned as
//! its own task, so a tick that overruns the period never delays the next
//! fire; overlap is handled by the pipeline's tick guard.
//!
//! Cancelling the returned [`ScheduleHandle`] stops future fires only. A tick
//! that is already running finishes on its own.
//!
//! # Example
//!
//! ```no_run
//! use ftp_inbound::config::ScheduleAnchor;
//! use ftp_inbound::scheduler::Scheduler;
//! use std::time::Duration;
//!
//! # async fn example() -> ftp_inbound::Result<()> {
//! let scheduler = Scheduler::new(Duration::from_secs(60), ScheduleAnchor::AlignedSecs(30))?;
//! let handle = scheduler.arm(|| async {
//!     tracing::info!("tick");
//! });
//!
//! // Later, on shutdown
//! handle.cancel();
//! # Ok(())
//! # }
//! ```

use crate::config::ScheduleAnchor;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Period and anchor of a tick schedule
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scheduler {
    period: Duration,
    anchor: ScheduleAnchor,
}

impl Scheduler {
    /// Create a schedule firing every `period`
    ///
    /// # Errors
    /// Returns [`Error::Config`] for a zero period or a zero aligned anchor.
    pub fn new(period: Duration, anchor: ScheduleAnchor) -> Result<Self> {
        if period.is_zero() {
            return Err(Error::config(
                "frequency",
                "poll frequency must be greater than zero",
            ));
        }
        if anchor == ScheduleAnchor::AlignedSecs(0) {
            return Err(Error::config(
                "scheduleAnchor",
                "aligned anchor must be at least one second",
            ));
        }
        Ok(Self { period, anchor })
    }

    /// Interval between fires
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Delay from `now` until the first fire
    ///
    /// For [`ScheduleAnchor::AlignedSecs`] this is the distance to the next
    /// multiple of the alignment since the Unix epoch (zero when `now` is
    /// exactly on a boundary).
    pub fn first_delay(&self, now: DateTime<Utc>) -> Duration {
        match self.anchor {
            ScheduleAnchor::Immediate => Duration::ZERO,
            ScheduleAnchor::AlignedSecs(0) => Duration::ZERO,
            ScheduleAnchor::AlignedSecs(secs) => {
                let align_ms = secs.saturating_mul(1000) as i64;
                let into_period = now.timestamp_millis().rem_euclid(align_ms);
                if into_period == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_millis((align_ms - into_period) as u64)
                }
            }
        }
    }

    /// Start firing `tick` on the current tokio runtime
    ///
    /// Must be called from within a runtime.
    pub fn arm<F, Fut>(&self, tick: F) -> ScheduleHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let first = self.first_delay(Utc::now());
        let period = self.period;

        info!(
            period_secs = period.as_secs_f64(),
            first_in_ms = first.as_millis() as u64,
            "Scheduler armed"
        );

        let cancelled = token.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        tokio::spawn(tick());
                    }
                }
            }

            debug!("Scheduler stopped firing");
        });

        ScheduleHandle {
            token,
            task: Some(task),
        }
    }
}

/// Handle to an armed schedule
#[derive(Debug)]
pub struct ScheduleHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ScheduleHandle {
    /// Stop future fires; in-flight ticks are not interrupted
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel and wait until the firing loop has exited
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "Scheduler task ended abnormally");
        }
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
