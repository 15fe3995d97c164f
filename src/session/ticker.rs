use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Elapsed-time ticker for an active recording
///
/// The first tick fires one full period after creation. Dropping the ticker
/// cancels it.
#[derive(Debug)]
pub struct Ticker {
    interval: Interval,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}
