//! Phase-corrected periodic wakeups.
//!
//! Deadlines sit on a fixed grid (`origin + k * period`), so a slow loop
//! iteration delays one wakeup but never shifts the ones after it. A
//! wakeup that is already overdue is collapsed into a single immediate
//! tick; working out how many packets were missed is the emission loop's
//! job.

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Periodic wakeup source for the emission loop.
#[derive(Debug)]
pub struct Ticker {
    // ---
    interval: Interval,
}

impl Ticker {
    // ---
    /// Creates a ticker whose deadlines are `origin + k * period` for
    /// `k >= 1`.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero (as does `tokio::time::interval_at`).
    pub fn new(origin: Instant, period: Duration) -> Self {
        // ---
        let mut interval = interval_at(origin + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }

    /// Waits for the next deadline and returns it.
    ///
    /// Cancel-safe, though the emission loop never races it.
    pub async fn tick(&mut self) -> Instant {
        // ---
        self.interval.tick().await
    }
}
