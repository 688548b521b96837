//! Time sources. The variant is picked when the engine is built and never changes mid-run.

use std::sync::atomic::{AtomicI64, Ordering};

pub trait Clock: Send + Sync {
    /// Current logical time, Unix milliseconds.
    fn now(&self) -> i64;
}

/// Replay time. Only moves when the feed hands over the next event, and never backwards.
#[derive(Debug, Default)]
pub struct ReplayClock {
    now: AtomicI64,
}

impl ReplayClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Moves time forward to `timestamp`. Earlier timestamps leave the clock where it is.
    pub fn advance_to(&self, timestamp: i64) -> i64 {
        let previous = self.now.fetch_max(timestamp, Ordering::SeqCst);
        previous.max(timestamp)
    }
}

impl Clock for ReplayClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Wall-clock time for live mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct WallClock;

impl WallClock {
    pub fn new() -> Self {
        Self
    }

    /// Sleeps until wall time reaches `deadline`. Returns immediately if it already has.
    pub async fn sleep_until(&self, deadline: i64) {
        let remaining = deadline - self.now();
        if remaining > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(remaining as u64)).await;
        }
    }
}

impl Clock for WallClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
