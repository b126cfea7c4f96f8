//! Revision clock
//!
//! The transaction manager reads the clock once per commit. `SystemClock`
//! is the production source; `ManualClock` gives tests full control over
//! commit timestamps.

use annals_core::Timestamp;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Source of commit timestamps
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time
    fn now(&self) -> Timestamp;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Clock that only moves when told to
///
/// # Example
///
/// ```
/// use annals_concurrency::{Clock, ManualClock};
/// use annals_core::Timestamp;
/// use std::time::Duration;
///
/// let clock = ManualClock::new(Timestamp::from_secs(10));
/// clock.advance(Duration::from_millis(5));
/// assert_eq!(clock.now(), Timestamp::from_micros(10_005_000));
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    /// Clock frozen at `start`
    pub fn new(start: Timestamp) -> Self {
        ManualClock {
            micros: AtomicU64::new(start.as_micros()),
        }
    }

    /// Jump to `timestamp`; may move backwards
    pub fn set(&self, timestamp: Timestamp) {
        self.micros.store(timestamp.as_micros(), Ordering::SeqCst);
    }

    /// Move forward by `by`
    pub fn advance(&self, by: Duration) {
        self.micros
            .fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_micros(self.micros.load(Ordering::SeqCst))
    }
}
