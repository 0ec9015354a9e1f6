//! Time sources.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;

    /// Seconds since the Unix epoch.
    fn now(&self) -> i64 {
        self.now_millis().div_euclid(1000)
    }
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test can keep a handle while the
/// collection owns another.
///
/// ```
/// use ankit_sched::{Clock, ManualClock};
///
/// let clock = ManualClock::at(1_000);
/// let shared = clock.clone();
/// clock.advance(60);
/// assert_eq!(shared.now(), 1_060);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// A clock frozen at `secs` epoch seconds.
    pub fn at(secs: i64) -> Self {
        Self { millis: Arc::new(AtomicI64::new(secs * 1000)) }
    }

    /// Jump to `secs` epoch seconds.
    pub fn set(&self, secs: i64) {
        self.millis.store(secs * 1000, Ordering::SeqCst);
    }

    /// Move forward by `secs` seconds.
    pub fn advance(&self, secs: i64) {
        self.advance_millis(secs * 1000);
    }

    /// Move forward by `millis` milliseconds.
    pub fn advance_millis(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_millis() {
        let clock = ManualClock::at(10);
        clock.advance_millis(1500);
        assert_eq!(clock.now_millis(), 11_500);
        assert_eq!(clock.now(), 11);
    }

    #[test]
    fn test_negative_time_floors() {
        let clock = ManualClock::at(0);
        clock.advance_millis(-1);
        assert_eq!(clock.now(), -1);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
