//! # Railbook Testing
//!
//! Testing utilities and helpers for the Railbook reservation engine.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - [`InMemoryInventoryStore`]: a complete `InventoryStore` with fault injection
//! - Fixtures for seeding trains, seats, schedules and passengers
//! - [`check_invariants`]: the capacity / seat-uniqueness invariants as an assertion
//!
//! ## Example
//!
//! ```
//! use railbook_testing::{InMemoryInventoryStore, fixtures, test_clock};
//! use railbook_core::environment::Clock;
//! use chrono::Duration;
//!
//! let store = InMemoryInventoryStore::new();
//! let clock = test_clock();
//! let seeded = fixtures::seed_train(&store, 2);
//! let schedule = fixtures::seed_schedule(&store, &seeded.train, clock.now() + Duration::days(1));
//!
//! assert_eq!(store.seats_of(seeded.train.id).len(), 2);
//! assert!(railbook_testing::check_invariants(&store, seeded.train.id).is_ok());
//! # let _ = schedule;
//! ```

use chrono::{DateTime, Utc};
use railbook_core::environment::Clock;

mod memory;

pub use memory::{InMemoryInventoryStore, StoreOp, check_invariants};

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, PoisonError, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use railbook_testing::mocks::FixedClock;
    /// use railbook_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time, so a test can keep one handle and give another
    /// to the engine, then step through cutoff windows.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a manual clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock forward (or backward, for negative durations)
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.write().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute time
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.write().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(epoch())
    }

    /// Create a manual clock starting at 2025-01-01 00:00:00 UTC
    #[must_use]
    pub fn manual_clock() -> ManualClock {
        ManualClock::new(epoch())
    }

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }
}

/// Seeding helpers for tests and demos
pub mod fixtures {
    use crate::InMemoryInventoryStore;
    use chrono::{DateTime, Duration, Utc};
    use railbook_core::{Passenger, Role, Schedule, Seat, Train};

    /// A train together with its seat pool.
    #[derive(Debug, Clone)]
    pub struct SeededTrain {
        /// The train record as inserted
        pub train: Train,
        /// Seats `A1..An`, in number order
        pub seats: Vec<Seat>,
    }

    /// Insert a train with `total_seats` seats in compartment `A`.
    #[must_use]
    pub fn seed_train(store: &InMemoryInventoryStore, total_seats: u32) -> SeededTrain {
        let number = u32::try_from(store.trains().len()).unwrap_or(0) + 1;
        let train = Train::new(format!("Test Train {number}"), 10_000 + number, total_seats);
        let seats: Vec<Seat> = (1..=total_seats)
            .map(|n| Seat::new(train.id, format!("A{n}"), "A"))
            .collect();

        store.put_train(train.clone());
        for seat in &seats {
            store.put_seat(seat.clone());
        }

        SeededTrain { train, seats }
    }

    /// Insert a six-hour schedule departing at `departure`.
    #[must_use]
    pub fn seed_schedule(
        store: &InMemoryInventoryStore,
        train: &Train,
        departure: DateTime<Utc>,
    ) -> Schedule {
        let schedule = Schedule {
            id: railbook_core::ScheduleId::new(),
            train_id: train.id,
            departure_time: departure,
            arrival_time: departure + Duration::hours(6),
        };
        store.put_schedule(schedule.clone());
        schedule
    }

    /// Insert a passenger with a generated unique name.
    #[must_use]
    pub fn seed_passenger(store: &InMemoryInventoryStore, role: Role) -> Passenger {
        let passenger = Passenger {
            id: railbook_core::PassengerId::new(),
            name: format!("passenger-{}", store.passenger_count() + 1),
            email: "rider@example.com".to_string(),
            password_hash: "$2b$10$fixture".to_string(),
            role,
        };
        store.put_passenger(passenger.clone());
        passenger
    }
}

/// Install a test-friendly tracing subscriber (idempotent).
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, manual_clock, test_clock};
