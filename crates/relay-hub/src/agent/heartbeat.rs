//! Keepalive timing: the read-liveness deadline and the ping ticker.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Read-side liveness deadline.
///
/// Starts one window after admission and is pushed forward each time the
/// peer answers on the keepalive channel. Ordinary data frames do not
/// extend it.
#[derive(Debug)]
pub struct Liveness {
    window: Duration,
    deadline: Instant,
}

impl Liveness {
    /// Start a liveness window from now.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: Instant::now() + window,
        }
    }

    /// The peer answered; restart the window.
    pub fn mark_alive(&mut self) {
        self.deadline = Instant::now() + self.window;
    }

    /// Instant after which the connection is considered dead.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Ticker for keepalive probes. The first tick fires one full period from now.
pub fn ping_ticker(period: Duration) -> Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_is_one_window_out() {
        let liveness = Liveness::new(Duration::from_secs(60));
        assert_eq!(liveness.remaining(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn mark_alive_restarts_window() {
        let mut liveness = Liveness::new(Duration::from_secs(60));
        time::advance(Duration::from_secs(50)).await;
        assert_eq!(liveness.remaining(), Duration::from_secs(10));
        liveness.mark_alive();
        assert_eq!(liveness.remaining(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_saturates_at_zero() {
        let liveness = Liveness::new(Duration::from_secs(1));
        time::advance(Duration::from_secs(5)).await;
        assert_eq!(liveness.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn ping_ticker_skips_immediate_tick() {
        let start = Instant::now();
        let mut ticker = ping_ticker(Duration::from_secs(54));
        let _ = ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(54));
        let _ = ticker.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(108));
    }
}
