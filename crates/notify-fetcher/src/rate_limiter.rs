//! A minimal token-bucket limiter gating the fetch loop to a fixed rate.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Gates callers to at most `rps` ticks per second.
///
/// Backed by a single `tokio::time::Interval` rather than a dedicated
/// crate: the corpus has no leaky-bucket/governor dependency, and a
/// fixed-period ticker is all the fetch loop needs.
pub struct RateLimiter {
    interval: Mutex<Interval>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(rps: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / f64::from(rps.max(1)));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval: Mutex::new(ticker),
        }
    }

    /// Waits until the next token is available.
    pub async fn take(&self) {
        self.interval.lock().await.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn first_take_does_not_block() {
        let rl = RateLimiter::new(10);
        let start = Instant::now();
        rl.take().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn successive_takes_are_spaced_by_the_configured_period() {
        let rl = RateLimiter::new(20);
        rl.take().await;
        let start = Instant::now();
        rl.take().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
