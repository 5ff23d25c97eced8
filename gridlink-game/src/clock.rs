//! Wall-clock abstraction so regeneration and cache expiry can be simulated.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of "now" in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Production clock backed by `chrono::Utc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually advanced clock. Clones share the same instant.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    #[must_use]
    pub fn starting_at(millis: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(millis)),
        }
    }

    pub fn advance_millis(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.advance_millis(minutes * 60 * 1000);
    }

    pub fn set_millis(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_millis(&self) -> i64 {
        (**self).now_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::starting_at(1_000);
        let other = clock.clone();
        clock.advance_minutes(1);
        assert_eq!(other.now_millis(), 61_000);
        other.set_millis(5);
        assert_eq!(clock.now_millis(), 5);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }
}
