//! # Clock
//!
//! A single injectable time source, used both for interval math and for
//! `first_observed`/`last_accessed` wall-clock stamps, so tests can control
//! both through one injected clock. `pltm-core` has no async/network
//! dependency, so this is a
//! plain synchronous trait rather than a tokio `Instant` wrapper; the app
//! layer supplies `SystemClock` in production and tests supply `FixedClock`.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// A source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to a fixed instant, adjustable by tests to exercise decay
/// and calibration without wall-clock sleeps.
#[derive(Debug)]
pub struct FixedClock {
    millis_since_epoch: AtomicI64,
}

impl FixedClock {
    #[must_use]
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            millis_since_epoch: AtomicI64::new(at.timestamp_millis()),
        }
    }

    pub fn advance(&self, delta: chrono::Duration) {
        self.millis_since_epoch
            .fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis_since_epoch
            .store(at.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis_since_epoch.load(Ordering::SeqCst))
            .unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let start = Utc::now();
        let clock = FixedClock::new(start);
        clock.advance(chrono::Duration::hours(10));
        assert!(clock.now() >= start + chrono::Duration::hours(10));
    }

    #[test]
    fn fixed_clock_set_overrides() {
        let clock = FixedClock::new(Utc::now());
        let target = Utc::now() + chrono::Duration::days(30);
        clock.set(target);
        assert_eq!(clock.now().timestamp_millis(), target.timestamp_millis());
    }
}
