//! Time-window rules for booking, cancellation, sweeping and boarding.
//!
//! All checks are pure functions of a schedule and "now" so they can be tested
//! without a store or a clock.

use chrono::{DateTime, Duration, Utc};
use railbook_core::Schedule;

/// Cutoff and boarding windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BookingPolicy {
    cutoff: Duration,
    boarding_window: Duration,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self::new(Duration::hours(3), Duration::minutes(15))
    }
}

impl BookingPolicy {
    /// Policy with the given cutoff window and boarding window.
    #[must_use]
    pub const fn new(cutoff: Duration, boarding_window: Duration) -> Self {
        Self {
            cutoff,
            boarding_window,
        }
    }

    /// Cutoff window length.
    #[must_use]
    pub const fn cutoff(&self) -> Duration {
        self.cutoff
    }

    /// Boarding window length.
    #[must_use]
    pub const fn boarding_window(&self) -> Duration {
        self.boarding_window
    }

    /// New reservations are refused in `[departure - cutoff, departure)`.
    #[must_use]
    pub fn reservation_closed(&self, schedule: &Schedule, now: DateTime<Utc>) -> bool {
        self.in_cutoff_window(schedule, now)
    }

    /// Cancellation closes at `arrival - cutoff` and stays closed afterwards.
    #[must_use]
    pub fn cancellation_closed(&self, schedule: &Schedule, now: DateTime<Utc>) -> bool {
        now > schedule.arrival_time - self.cutoff
    }

    /// Unresolved waiting reservations are swept in `[departure - cutoff, departure)`.
    #[must_use]
    pub fn sweep_due(&self, schedule: &Schedule, now: DateTime<Utc>) -> bool {
        self.in_cutoff_window(schedule, now)
    }

    /// Boarding is open in `[arrival - boarding_window, arrival)`.
    #[must_use]
    pub fn boarding_open(&self, schedule: &Schedule, now: DateTime<Utc>) -> bool {
        now >= schedule.arrival_time - self.boarding_window && now < schedule.arrival_time
    }

    fn in_cutoff_window(&self, schedule: &Schedule, now: DateTime<Utc>) -> bool {
        now >= schedule.departure_time - self.cutoff && now < schedule.departure_time
    }
}
