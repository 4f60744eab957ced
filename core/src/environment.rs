//! Environment traits injected into the engine.
//!
//! All external dependencies are abstracted behind traits so tests can substitute
//! deterministic implementations (see `railbook-testing`).

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability
///
/// Every time-windowed policy (booking cutoff, cancellation cutoff, sweep trigger,
/// boarding window) reads the current time through this trait, never through
/// `Utc::now()` directly.
///
/// # Examples
///
/// ```
/// use railbook_core::environment::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let earlier = clock.now();
/// assert!(clock.now() >= earlier);
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Issues strictly increasing timestamps on top of a [`Clock`].
///
/// Reservation creation time is the fairness key for waitlist promotion, so two
/// reservations created within the same clock tick (or under a frozen test clock)
/// must still be totally ordered. Each stamp is `max(now, previous + 1µs)`.
#[derive(Debug)]
pub struct MonotonicStamper {
    last_micros: std::sync::atomic::AtomicI64,
}

impl MonotonicStamper {
    /// Create a stamper that has not issued anything yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_micros: std::sync::atomic::AtomicI64::new(i64::MIN),
        }
    }

    /// Issue the next timestamp, never equal to or earlier than a previous one.
    pub fn stamp(&self, clock: &dyn Clock) -> DateTime<Utc> {
        use std::sync::atomic::Ordering;

        let now = clock.now().timestamp_micros();
        let mut previous = self.last_micros.load(Ordering::Acquire);
        loop {
            let next = now.max(previous.saturating_add(1));
            match self.last_micros.compare_exchange_weak(
                previous,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return DateTime::from_timestamp_micros(next).unwrap_or_else(|| clock.now()),
                Err(actual) => previous = actual,
            }
        }
    }
}

impl Default for MonotonicStamper {
    fn default() -> Self {
        Self::new()
    }
}
