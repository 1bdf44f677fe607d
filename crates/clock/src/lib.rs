//! # Meridian Clock
//!
//! The swappable source of "now". Live operation and historical replay share
//! one code path through the engine and the exit evaluator; the only thing
//! that differs is which `TimeProvider` is injected. The provider is always
//! threaded explicitly, never patched in globally.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// A source of the current logical time.
pub trait TimeProvider: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock, used in live mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeProvider for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A bar-sequence clock, advanced by the replay harness one bar at a time.
///
/// Stored as epoch milliseconds so the harness can advance it while the
/// engine and the historical data client hold shared references.
#[derive(Debug)]
pub struct ReplayClock {
    current_ms: AtomicI64,
}

impl ReplayClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current_ms: AtomicI64::new(start.timestamp_millis()),
        }
    }

    /// Moves the clock to the given bar timestamp. The harness only ever
    /// advances forward; moving backwards would desynchronize the replay.
    pub fn advance_to(&self, timestamp: DateTime<Utc>) {
        self.current_ms
            .store(timestamp.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn current_ms(&self) -> i64 {
        self.current_ms.load(Ordering::SeqCst)
    }
}

impl TimeProvider for ReplayClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.current_ms())
            .single()
            .expect("replay clock holds a valid millisecond timestamp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_clock_reports_advanced_time() {
        let start = Utc.timestamp_millis_opt(1_640_995_200_000).single().unwrap();
        let clock = ReplayClock::new(start);
        assert_eq!(clock.now(), start);

        let next = Utc.timestamp_millis_opt(1_640_996_100_000).single().unwrap();
        clock.advance_to(next);
        assert_eq!(clock.now(), next);
    }

    #[test]
    fn system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
